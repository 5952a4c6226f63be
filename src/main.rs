use actix_web::{web, App, HttpServer};
use log::info;
use s3_mock_server::app_state::AppState;
use s3_mock_server::handlers;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if std::path::Path::new("server_log.yaml").exists() {
        log4rs::init_file("server_log.yaml", Default::default()).expect("invalid log4rs config");
    } else {
        env_logger::init();
    }

    let state = AppState::new();
    let bind_address = state.config.address.clone();
    let port = state.config.port;
    let reset_on_close = state.config.reset_on_close;
    let store = state.store.clone();
    let state = web::Data::new(state);

    info!("Starting s3_mock_server on {bind_address}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::default().limit(5 * 1024 * 1024 * 1024))
            .default_service(web::route().to(handlers::dispatch))
    })
    .bind((bind_address, port))?
    .run()
    .await?;

    // `HttpServer::run` resolves once the listener has been shut down
    // gracefully (Ctrl-C/SIGTERM); `resetOnClose` wipes persisted state
    // only at that point, never on an ordinary in-flight request.
    if reset_on_close {
        info!("resetOnClose is set, wiping persisted state");
        if let Err(err) = store.reset() {
            log::error!("failed to reset store on shutdown: {err}");
        }
    }
    Ok(())
}
