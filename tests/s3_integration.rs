//! Additional HTTP-level coverage: copy semantics, tagging, CORS
//! preflight/simple-request augmentation, and bucket-name validation.

use actix_web::{http::StatusCode, test, web, App};
use s3_mock_server::app_state::AppState;
use s3_mock_server::handlers;

fn test_app_data() -> web::Data<AppState> {
    web::Data::new(AppState::new_for_testing())
}

macro_rules! make_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .default_service(web::route().to(handlers::dispatch)),
        )
        .await
    };
}

#[actix_web::test]
async fn copy_object_with_replace_directive_overrides_metadata() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/bucket1/src")
            .insert_header(("x-amz-meta-a", "1"))
            .set_payload("content")
            .to_request(),
    )
    .await;

    let copy = test::TestRequest::put()
        .uri("/bucket1/dst")
        .insert_header(("x-amz-copy-source", "/bucket1/src"))
        .insert_header(("x-amz-metadata-directive", "REPLACE"))
        .insert_header(("x-amz-meta-b", "2"))
        .to_request();
    let resp = test::call_service(&app, copy).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let get = test::call_service(&app, test::TestRequest::get().uri("/bucket1/dst").to_request()).await;
    assert_eq!(get.headers().get("content-type").unwrap(), "application/octet-stream");
    assert!(get.headers().get("x-amz-meta-a").is_none());
    assert_eq!(get.headers().get("x-amz-meta-b").unwrap(), "2");
    assert_eq!(test::read_body(get).await, "content".as_bytes());
}

#[actix_web::test]
async fn object_tagging_round_trips_without_changing_etag() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    let put = test::call_service(&app, test::TestRequest::put().uri("/bucket1/obj").set_payload("x").to_request()).await;
    let etag_before = put.headers().get("ETag").unwrap().to_str().unwrap().to_string();

    let tagging_xml = "<Tagging><TagSet><Tag><Key>env</Key><Value>test</Value></Tag></TagSet></Tagging>";
    let put_tags = test::call_service(
        &app,
        test::TestRequest::put().uri("/bucket1/obj?tagging").set_payload(tagging_xml).to_request(),
    )
    .await;
    assert_eq!(put_tags.status(), StatusCode::OK);

    let get_tags = test::call_service(&app, test::TestRequest::get().uri("/bucket1/obj?tagging").to_request()).await;
    let body = String::from_utf8(test::read_body(get_tags).await.to_vec()).unwrap();
    assert!(body.contains("<Key>env</Key><Value>test</Value>"));

    let get = test::call_service(&app, test::TestRequest::get().uri("/bucket1/obj").to_request()).await;
    assert_eq!(get.headers().get("ETag").unwrap().to_str().unwrap(), etag_before);
}

#[actix_web::test]
async fn cors_preflight_matches_rule_and_replies_200() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    let cors_xml = "<CORSConfiguration><CORSRule><AllowedOrigin>http://example.com</AllowedOrigin><AllowedMethod>GET</AllowedMethod><AllowedHeader>*</AllowedHeader></CORSRule></CORSConfiguration>";
    test::call_service(&app, test::TestRequest::put().uri("/bucket1?cors").set_payload(cors_xml).to_request()).await;

    let preflight = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/bucket1")
        .insert_header(("origin", "http://example.com"))
        .insert_header(("access-control-request-method", "GET"))
        .to_request();
    let resp = test::call_service(&app, preflight).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "http://example.com");
}

#[actix_web::test]
async fn cors_simple_request_augments_a_matching_origin_only() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/obj").set_payload("x").to_request()).await;

    let cors_xml = "<CORSConfiguration><CORSRule><AllowedOrigin>http://example.com</AllowedOrigin><AllowedMethod>GET</AllowedMethod></CORSRule></CORSConfiguration>";
    test::call_service(&app, test::TestRequest::put().uri("/bucket1?cors").set_payload(cors_xml).to_request()).await;

    let matching = test::TestRequest::get()
        .uri("/bucket1/obj")
        .insert_header(("origin", "http://example.com"))
        .to_request();
    let resp = test::call_service(&app, matching).await;
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "http://example.com");

    let non_matching = test::TestRequest::get()
        .uri("/bucket1/obj")
        .insert_header(("origin", "http://other.com"))
        .to_request();
    let resp = test::call_service(&app, non_matching).await;
    assert!(resp.headers().get("Access-Control-Allow-Origin").is_none());
}

#[actix_web::test]
async fn invalid_bucket_name_is_rejected() {
    let state = test_app_data();
    let app = make_app!(state);

    let resp = test::call_service(&app, test::TestRequest::put().uri("/AB").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("<Code>InvalidBucketName</Code>"));
}

#[actix_web::test]
async fn delete_objects_bulk_reports_every_requested_key() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/a").to_request()).await;

    let body = "<Delete><Object><Key>a</Key></Object><Object><Key>missing</Key></Object></Delete>";
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/bucket1?delete").set_payload(body).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let xml = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert_eq!(xml.matches("<Deleted>").count(), 2);
}
