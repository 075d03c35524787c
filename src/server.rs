//!
//! filegate HTTP server
//! --------------------
//! This module defines the Axum-based HTTP API for filegate.
//!
//! Responsibilities:
//! - Session management with a simple cookie model backed by the user store.
//! - Registration, login/logout and email verification endpoints.
//! - Role-gated upload, listing and download-link endpoints delegating to the
//!   access-control core.
//! - Capability-token redemption streaming stored content back as an
//!   attachment.

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use getrandom::getrandom;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::access;
use crate::capability;
use crate::context::AppContext;
use crate::error::AppError;
use crate::mail::{HttpMailDispatcher, LogMailDispatcher, MailDispatcher};
use crate::store::users::UserRecord;
use crate::token::TokenCipher;
use crate::verification::{self, VerifiedOutcome};

const SESSION_COOKIE: &str = "filegate_session";

/// Shared server state injected into all handlers.
///
/// Holds the application context (cipher, stores, mail) and the session id ->
/// user id mapping.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub sessions: Arc<RwLock<HashMap<String, i64>>>,
}

impl AppState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }
}

/// Mount all routes onto a router bound to the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "filegate ok" }))
        .route("/user_registration/", post(user_registration))
        .route("/verify/", post(verify))
        .route("/login_view/", post(login_view))
        .route("/logout_view/", get(logout_view))
        .route("/upload/", post(upload))
        .route("/list/", get(list_files))
        .route("/download-file/{file_id}/", get(download_file))
        .route("/secure-download/{token}/", get(secure_download))
        .with_state(state)
}

/// Start the filegate HTTP server bound to the given port, with stores rooted
/// under `data_root`.
pub async fn run_with_ports(http_port: u16, data_root: &str) -> anyhow::Result<()> {
    let cipher = match std::env::var("FILEGATE_TOKEN_KEY") {
        Ok(encoded) => {
            info!("Token key loaded from FILEGATE_TOKEN_KEY");
            TokenCipher::from_base64(&encoded)?
        }
        Err(_) => {
            // Links stop working across restarts without a configured key.
            warn!("FILEGATE_TOKEN_KEY not set; using an ephemeral token key");
            TokenCipher::new(&TokenCipher::generate_key()?)
        }
    };
    run_with_cipher(http_port, data_root, cipher).await
}

async fn run_with_cipher(http_port: u16, data_root: &str, cipher: TokenCipher) -> anyhow::Result<()> {
    let mail: Arc<dyn MailDispatcher> = match HttpMailDispatcher::from_env() {
        Some(d) => {
            info!("Mail dispatcher: HTTP API");
            Arc::new(d)
        }
        None => {
            warn!("Mail API not configured; verification codes will only be logged");
            Arc::new(LogMailDispatcher)
        }
    };

    let ctx = Arc::new(AppContext::with_cipher(cipher, std::path::Path::new(data_root), mail)?);
    let state = AppState::new(ctx);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

// Backward-compatible entry that uses defaults
/// Convenience entry point using the default port (8000) and data root "data".
pub async fn run() -> anyhow::Result<()> {
    let http_port: u16 = std::env::var("FILEGATE_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8000);
    let data_root = std::env::var("FILEGATE_DATA_FOLDER").unwrap_or_else(|_| "data".to_string());
    run_with_ports(http_port, &data_root).await
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn get_sid_from_headers(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

async fn get_user_from_headers(state: &AppState, headers: &HeaderMap) -> Option<UserRecord> {
    let sid = get_sid_from_headers(headers)?;
    let user_id = { state.sessions.read().await.get(&sid).copied() }?;
    state.ctx.users.get(user_id)
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, sid
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

/// Map an AppError to the API's JSON error shape.
fn error_json(err: &AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"message": err.message()})))
}

fn not_authenticated() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::FORBIDDEN, Json(json!({"message": "User is not authenticated."})))
}

#[derive(Debug, Deserialize)]
struct RegistrationPayload {
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
    name: Option<String>,
}

async fn user_registration(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationPayload>,
) -> impl IntoResponse {
    let (Some(email), Some(password), Some(role), Some(name)) =
        (payload.email, payload.password, payload.role, payload.name)
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "Invalid registration details."})));
    };
    if email.is_empty() || password.is_empty() || role.is_empty() || name.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "Invalid registration details."})));
    }
    match verification::register(&state.ctx, &email, &password, &role, &name) {
        Ok(user) => {
            info!(target: "filegate::server", "registered user={} role={}", user.id, user.role.as_str());
            (StatusCode::OK, Json(json!({"message": "Registration successful!"})))
        }
        Err(e) => error_json(&e),
    }
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    email: Option<String>,
    // Clients send the code as either a string or a number.
    code: Option<serde_json::Value>,
}

fn code_as_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn verify(State(state): State<AppState>, Json(payload): Json<VerifyPayload>) -> impl IntoResponse {
    let email = payload.email.filter(|e| !e.is_empty());
    let code = payload.code.as_ref().and_then(code_as_string).filter(|c| !c.is_empty());
    match (email, code) {
        (Some(email), None) => match verification::issue(&state.ctx, &email).await {
            Ok(_) => (StatusCode::OK, Json(json!({"message": "Sent verification code to email."}))),
            Err(e) => {
                error!("verification mail failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.message()})))
            }
        },
        (Some(email), Some(code)) => match verification::redeem(&state.ctx, &email, &code) {
            VerifiedOutcome::Verified => (StatusCode::OK, Json(json!({"message": "Code verified"}))),
            VerifiedOutcome::Expired => (StatusCode::BAD_REQUEST, Json(json!({"message": "Expired code"}))),
            VerifiedOutcome::WrongCode => {
                (StatusCode::BAD_REQUEST, Json(json!({"message": "Code is not correct"})))
            }
            VerifiedOutcome::NoActiveCode => {
                (StatusCode::BAD_REQUEST, Json(json!({"message": "Code does not exist"})))
            }
        },
        _ => (StatusCode::BAD_REQUEST, Json(json!({"message": "Send code"}))),
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn login_view(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match state.ctx.users.authenticate(&payload.email, &payload.password) {
        Some(user) => {
            // generate session id
            let mut bytes = [0u8; 16];
            let _ = getrandom(&mut bytes);
            let mut sid = String::with_capacity(32);
            use std::fmt::Write as _;
            for b in &bytes {
                let _ = write!(&mut sid, "{:02x}", b);
            }
            state.sessions.write().await.insert(sid.clone(), user.id);
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&sid));
            (StatusCode::OK, headers, Json(json!({"message": "Login successful"})))
        }
        None => (
            StatusCode::FORBIDDEN,
            HeaderMap::new(),
            Json(json!({"message": "Incorrect credentials"})),
        ),
    }
}

async fn logout_view(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(sid) = get_sid_from_headers(&headers) else {
        return (StatusCode::OK, HeaderMap::new(), Json(json!({"message": "User is not authenticated."})));
    };
    let removed = state.sessions.write().await.remove(&sid).is_some();
    if !removed {
        return (StatusCode::OK, HeaderMap::new(), Json(json!({"message": "User is not authenticated."})));
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"message": "Logout successful."})))
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let Some(user) = get_user_from_headers(&state, &headers).await else {
        return not_authenticated();
    };

    // Pull the "file" part out of the multipart body.
    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
                        continue;
                    };
                    match field.bytes().await {
                        Ok(bytes) => {
                            upload = Some((file_name, bytes.to_vec()));
                            break;
                        }
                        Err(e) => {
                            error!("multipart read failed: {e}");
                            return (
                                StatusCode::BAD_REQUEST,
                                Json(json!({"message": "No file provided."})),
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("multipart parse failed: {e}");
                return (StatusCode::BAD_REQUEST, Json(json!({"message": "No file provided."})));
            }
        }
    }
    let Some((file_name, bytes)) = upload else {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "No file provided."})));
    };

    match access::upload(&state.ctx, &user, &file_name, &bytes) {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({"message": "File uploaded successfully.", "file_id": record.id})),
        ),
        Err(e) => error_json(&e),
    }
}

async fn list_files(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(user) = get_user_from_headers(&state, &headers).await else {
        return not_authenticated();
    };
    match access::list(&state.ctx, &user) {
        Ok(files) => {
            let rows: Vec<serde_json::Value> = files
                .iter()
                .map(|f| {
                    json!({
                        "id": f.id,
                        "file_name": f.file_name,
                        "file_size_kb": f.size_kb,
                        "last_opened": f.last_opened.to_rfc3339(),
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({"files": rows})))
        }
        Err(e) => error_json(&e),
    }
}

async fn download_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_id): Path<i64>,
) -> impl IntoResponse {
    let Some(user) = get_user_from_headers(&state, &headers).await else {
        return not_authenticated();
    };
    match access::generate_link(&state.ctx, &user, file_id) {
        Ok(token) => {
            let link = format!("/secure-download/{}/", token);
            (StatusCode::OK, Json(json!({"download-link": link, "message": "success"})))
        }
        Err(e) => error_json(&e),
    }
}

async fn secure_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response {
    let Some(user) = get_user_from_headers(&state, &headers).await else {
        return not_authenticated().into_response();
    };
    match capability::redeem_link(&state.ctx, &token, user.id) {
        Ok(handle) => {
            let disposition = format!("attachment; filename=\"{}\"", handle.file.file_name);
            let mut resp = handle.content.into_response();
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                resp.headers_mut().insert(header::CONTENT_DISPOSITION, value);
            }
            resp
        }
        Err(e) => error_json(&e).into_response(),
    }
}
