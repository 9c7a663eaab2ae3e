mod common;

use http::StatusCode;

use common::{backend, catch_all, client, gateway_config, gateway_url, spawn_backend};

async fn engine_with(middlewares: &[&str]) -> (waypoint::Engine, String) {
    let api = spawn_backend("api").await;
    let mut frontend = catch_all("api");
    frontend.middlewares = middlewares.iter().map(|name| name.to_string()).collect();

    let engine = waypoint::default_engine();
    engine
        .load_config(gateway_config(vec![frontend], vec![backend("api", api)]))
        .await
        .unwrap();
    let url = gateway_url(&engine).await;
    (engine, url)
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_guards_the_backend() {
    let (_engine, url) = engine_with(&["auth"]).await;
    let client = client();

    let anonymous = client.get(format!("{url}/private")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);
    assert!(!anonymous.headers().contains_key("x-echo-backend"));
    assert_eq!(anonymous.text().await.unwrap(), "403 forbidden");

    let rejected = client
        .get(format!("{url}/private"))
        .header("authorization", "123123")
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    let accepted = client
        .get(format!("{url}/private"))
        .header("authorization", "Bearer s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(accepted.headers()["x-echo-backend"], "api");
}

#[tokio::test(flavor = "multi_thread")]
async fn request_id_reaches_backend_and_client() {
    let (_engine, url) = engine_with(&["request_id", "security_headers"]).await;

    let response = client().get(format!("{url}/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    let request_id = headers["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
    assert_eq!(headers["x-echo-request-id"], request_id);
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
}

#[tokio::test(flavor = "multi_thread")]
async fn middlewares_run_in_configured_order() {
    // Auth first: a refused request never gets an id.
    let (_engine, url) = engine_with(&["auth", "request_id"]).await;
    let refused = client().get(format!("{url}/")).send().await.unwrap();
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);
    assert!(!refused.headers().contains_key("x-request-id"));

    // Request id first: it wraps the refusal.
    let (_engine, url) = engine_with(&["request_id", "auth"]).await;
    let refused = client().get(format!("{url}/")).send().await.unwrap();
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);
    assert!(refused.headers().contains_key("x-request-id"));
}
