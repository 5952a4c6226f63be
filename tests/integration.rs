//! End-to-end HTTP tests driving the full `actix_web` app through
//! `handlers::dispatch`.

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
                .app_data(web::PayloadConfig::default().limit(64 * 1024 * 1024))
                .default_service(web::route().to(handlers::dispatch)),
        )
        .await
    };
}

#[actix_web::test]
async fn put_get_round_trip_matches_known_etag() {
    let state = test_app_data();
    let app = make_app!(state);

    let create = test::TestRequest::put().uri("/bucket1").to_request();
    assert_eq!(test::call_service(&app, create).await.status(), StatusCode::OK);

    let put = test::TestRequest::put()
        .uri("/bucket1/text")
        .set_payload("Hello!")
        .to_request();
    let resp = test::call_service(&app, put).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let etag = resp.headers().get("ETag").unwrap().to_str().unwrap().to_string();
    assert_eq!(etag, "\"952d2c56d0485958336747bcdd98590d\"");

    let get = test::TestRequest::get().uri("/bucket1/text").to_request();
    let resp = test::call_service(&app, get).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "binary/octet-stream");
    let body = test::read_body(resp).await;
    assert_eq!(body, "Hello!".as_bytes());
}

#[actix_web::test]
async fn trailing_slash_makes_a_distinct_key() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    test::call_service(&app, test::TestRequest::put().uri("/bucket1/text").set_payload("A").to_request()).await;
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/text/").set_payload("B").to_request()).await;

    let a = test::call_service(&app, test::TestRequest::get().uri("/bucket1/text").to_request()).await;
    let b = test::call_service(&app, test::TestRequest::get().uri("/bucket1/text/").to_request()).await;
    assert_eq!(test::read_body(a).await, "A".as_bytes());
    assert_eq!(test::read_body(b).await, "B".as_bytes());
}

#[actix_web::test]
async fn deleting_a_missing_key_is_not_an_error() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    let resp = test::call_service(&app, test::TestRequest::delete().uri("/bucket1/nonexistent").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn listing_with_delimiter_groups_first_segment_as_common_prefix() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    for key in ["akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3"] {
        test::call_service(&app, test::TestRequest::put().uri(&format!("/bucket1/{key}")).to_request()).await;
    }

    let list = test::call_service(
        &app,
        test::TestRequest::get().uri("/bucket1?list-type=2&delimiter=%2F").to_request(),
    )
    .await;
    let body = String::from_utf8(test::read_body(list).await.to_vec()).unwrap();
    assert_eq!(body.matches("<Contents>").count(), 6);
    assert!(body.contains("<Prefix>key/</Prefix>"));
}

#[actix_web::test]
async fn listing_prefix_filters_unrelated_keys() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    for key in ["akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3"] {
        test::call_service(&app, test::TestRequest::put().uri(&format!("/bucket1/{key}")).to_request()).await;
    }

    let list = test::call_service(&app, test::TestRequest::get().uri("/bucket1?prefix=key").to_request()).await;
    let body = String::from_utf8(test::read_body(list).await.to_vec()).unwrap();
    assert_eq!(body.matches("<Contents>").count(), 4);
    assert!(!body.contains("akey"));
}

#[actix_web::test]
async fn continuation_token_resumes_a_truncated_listing() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    for i in 0..500 {
        let key = format!("key{i:03}");
        test::call_service(&app, test::TestRequest::put().uri(&format!("/bucket1/{key}")).to_request()).await;
    }

    let first = test::call_service(&app, test::TestRequest::get().uri("/bucket1?list-type=2&max-keys=400").to_request()).await;
    let first_body = String::from_utf8(test::read_body(first).await.to_vec()).unwrap();
    assert!(first_body.contains("<IsTruncated>true</IsTruncated>"));
    let token_start = first_body.find("<NextContinuationToken>").unwrap() + "<NextContinuationToken>".len();
    let token_end = first_body[token_start..].find("</NextContinuationToken>").unwrap() + token_start;
    let token = &first_body[token_start..token_end];

    let second = test::call_service(
        &app,
        test::TestRequest::get().uri(&format!("/bucket1?list-type=2&continuation-token={token}")).to_request(),
    )
    .await;
    let second_body = String::from_utf8(test::read_body(second).await.to_vec()).unwrap();
    assert_eq!(second_body.matches("<Contents>").count(), 100);
    assert!(!second_body.contains("<NextContinuationToken>"));
}

#[actix_web::test]
async fn max_keys_zero_returns_empty_not_truncated() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/a").to_request()).await;

    let list = test::call_service(&app, test::TestRequest::get().uri("/bucket1?max-keys=0").to_request()).await;
    let body = String::from_utf8(test::read_body(list).await.to_vec()).unwrap();
    assert!(!body.contains("<Contents>"));
    assert!(body.contains("<IsTruncated>false</IsTruncated>"));
}

#[actix_web::test]
async fn sigv4_header_missing_signature_is_authorization_header_malformed() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    let req = test::TestRequest::get()
        .uri("/bucket1/text")
        .insert_header((
            "authorization",
            "AWS4-HMAC-SHA256 Credential=S3RVER/20060301/us-east-1/s3/aws4_request",
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("<Code>AuthorizationHeaderMalformed</Code>"));
}

#[actix_web::test]
async fn range_requests_clamp_and_reject_out_of_bounds() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    let body = vec![b'x'; 100];
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/blob").set_payload(body).to_request()).await;

    let ok = test::call_service(
        &app,
        test::TestRequest::get().uri("/bucket1/blob").insert_header(("range", "bytes=0-99")).to_request(),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(ok.headers().get("content-length").unwrap(), "100");

    let clamped = test::call_service(
        &app,
        test::TestRequest::get().uri("/bucket1/blob").insert_header(("range", "bytes=0-1000000")).to_request(),
    )
    .await;
    assert_eq!(clamped.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(clamped.headers().get("content-length").unwrap(), "100");

    let past_eof = test::call_service(
        &app,
        test::TestRequest::get().uri("/bucket1/blob").insert_header(("range", "bytes=200-300")).to_request(),
    )
    .await;
    assert_eq!(past_eof.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(past_eof.headers().get("content-range").unwrap(), "bytes */100");
}

#[actix_web::test]
async fn multipart_upload_assembles_parts_and_final_etag_has_part_count_suffix() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;

    let initiate = test::call_service(&app, test::TestRequest::post().uri("/bucket1/big?uploads").to_request()).await;
    let initiate_body = String::from_utf8(test::read_body(initiate).await.to_vec()).unwrap();
    let id_start = initiate_body.find("<UploadId>").unwrap() + "<UploadId>".len();
    let id_end = initiate_body[id_start..].find("</UploadId>").unwrap() + id_start;
    let upload_id = initiate_body[id_start..id_end].to_string();

    let part1 = vec![b'a'; 5 * 1024 * 1024];
    let part2 = vec![b'b'; 5 * 1024 * 1024];
    let r1 = test::call_service(
        &app,
        test::TestRequest::put()
            .uri(&format!("/bucket1/big?partNumber=1&uploadId={upload_id}"))
            .set_payload(part1)
            .to_request(),
    )
    .await;
    let etag1 = r1.headers().get("ETag").unwrap().to_str().unwrap().to_string();
    let r2 = test::call_service(
        &app,
        test::TestRequest::put()
            .uri(&format!("/bucket1/big?partNumber=2&uploadId={upload_id}"))
            .set_payload(part2)
            .to_request(),
    )
    .await;
    let etag2 = r2.headers().get("ETag").unwrap().to_str().unwrap().to_string();

    let complete_body = format!(
        "<CompleteMultipartUpload><Part><PartNumber>1</PartNumber><ETag>{etag1}</ETag></Part><Part><PartNumber>2</PartNumber><ETag>{etag2}</ETag></Part></CompleteMultipartUpload>"
    );
    let complete = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/bucket1/big?uploadId={upload_id}"))
            .set_payload(complete_body)
            .to_request(),
    )
    .await;
    assert_eq!(complete.status(), StatusCode::OK);
    let complete_xml = String::from_utf8(test::read_body(complete).await.to_vec()).unwrap();
    assert!(complete_xml.contains("-2</ETag>"));
}

#[actix_web::test]
async fn website_routing_rule_redirects_with_replaced_key_prefix() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/site").to_request()).await;

    let website_xml = r#"<WebsiteConfiguration><IndexDocument><Suffix>index.html</Suffix></IndexDocument>
<RoutingRules><RoutingRule><Condition><KeyPrefixEquals>test</KeyPrefixEquals></Condition>
<Redirect><ReplaceKeyPrefixWith>replacement</ReplaceKeyPrefixWith></Redirect></RoutingRule></RoutingRules>
</WebsiteConfiguration>"#;
    let put_cfg = test::call_service(
        &app,
        test::TestRequest::put().uri("/site?website").set_payload(website_xml).to_request(),
    )
    .await;
    assert_eq!(put_cfg.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/site/test/key")
        .insert_header(("host", "site.s3-website-us-east-1.amazonaws.com"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    let location = resp.headers().get("Location").unwrap().to_str().unwrap();
    assert_eq!(location, "http://site.s3-website-us-east-1.amazonaws.com/site/replacement/key");
}

#[actix_web::test]
async fn bucket_not_empty_blocks_deletion() {
    let state = test_app_data();
    let app = make_app!(state);
    test::call_service(&app, test::TestRequest::put().uri("/bucket1").to_request()).await;
    test::call_service(&app, test::TestRequest::put().uri("/bucket1/a").to_request()).await;

    let resp = test::call_service(&app, test::TestRequest::delete().uri("/bucket1").to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    test::call_service(&app, test::TestRequest::delete().uri("/bucket1/a").to_request()).await;
    let resp2 = test::call_service(&app, test::TestRequest::delete().uri("/bucket1").to_request()).await;
    assert_eq!(resp2.status(), StatusCode::NO_CONTENT);
}
