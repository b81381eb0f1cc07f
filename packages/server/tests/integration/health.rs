use crate::common::{TestApp, routes};

#[tokio::test]
async fn index_reports_running() {
    let app = TestApp::spawn().await;
    let res = app.get(routes::INDEX).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "MedData Hub API is running...");
}

#[tokio::test]
async fn health_pings_database() {
    let app = TestApp::spawn().await;
    let res = app.get(routes::HEALTH).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "ok");
}

#[tokio::test]
async fn openapi_document_lists_asset_routes() {
    let app = TestApp::spawn().await;
    let res = app.get(routes::OPENAPI).await;

    assert_eq!(res.status, 200);
    let paths = res.body["paths"].as_object().expect("paths object");
    assert!(paths.contains_key("/assets"), "paths: {:?}", paths.keys());
    assert!(paths.contains_key("/assets/{id}"));
    assert!(paths.contains_key("/assets/{id}/file"));
}

#[tokio::test]
async fn cors_is_permissive_without_configured_origins() {
    let app = TestApp::spawn().await;
    let res = app
        .client
        .get(format!("http://{}{}", app.addr, routes::INDEX))
        .header("Origin", "http://example.org")
        .send()
        .await
        .unwrap();

    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
