//! HTTP surface tests against a live listener: session-gated routes without a
//! cookie, and the health root.

use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use filegate::context::AppContext;
use filegate::mail::{MailDispatcher, MemoryMailDispatcher};
use filegate::server::{app, AppState};

/// Bind an ephemeral port, serve the app in a background task and return the
/// base url.
async fn spawn_server(root: &std::path::Path) -> Result<String> {
    let mail = Arc::new(MemoryMailDispatcher::default()) as Arc<dyn MailDispatcher>;
    let ctx = Arc::new(AppContext::new(&[9u8; 32], root, mail)?);
    let state = AppState::new(ctx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app(state)).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn root_answers() -> Result<()> {
    let tmp = tempdir()?;
    let base = spawn_server(tmp.path()).await?;
    let resp = reqwest::get(format!("{base}/")).await?;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn session_gated_routes_without_a_cookie_are_forbidden() -> Result<()> {
    let tmp = tempdir()?;
    let base = spawn_server(tmp.path()).await?;
    let client = reqwest::Client::new();

    for path in ["/list/", "/download-file/1/", "/secure-download/sometoken/"] {
        let resp = client.get(format!("{base}{path}")).send().await?;
        assert_eq!(resp.status(), 403, "path {path}");
        let body: serde_json::Value = resp.json().await?;
        assert_eq!(body["message"], "User is not authenticated.");
    }

    // Upload needs a multipart content type to reach the session check.
    let resp = client
        .post(format!("{base}/upload/"))
        .header("content-type", "multipart/form-data; boundary=xyz")
        .body("--xyz--\r\n")
        .send()
        .await?;
    assert_eq!(resp.status(), 403);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["message"], "User is not authenticated.");
    Ok(())
}
