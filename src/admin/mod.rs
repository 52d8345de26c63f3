/// Album picker page and share-token endpoint.
pub mod server;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{SHARE_TOKEN_KEY, env_file};
use crate::core::signals::ReloadFlag;

/// Largest accepted request body
const MAX_BODY: usize = 16 * 1024;

/// Everything the admin handlers touch
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub env_file: PathBuf,
    pub credentials_file: PathBuf,
    pub reload: ReloadFlag,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    share_token: Option<String>,
}

pub fn router(ctx: Arc<AdminContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/token", post(save_token))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .with_state(ctx)
}

async fn index(State(ctx): State<Arc<AdminContext>>) -> Response {
    info!("GET /");
    let Some(client_id) = client_id(&ctx.credentials_file) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Error: '{}' not found or invalid. Please ensure it is in your project directory.",
                ctx.credentials_file.display()
            ),
        )
            .into_response();
    };
    let current = env_file::read_key(&ctx.env_file, SHARE_TOKEN_KEY)
        .or_else(|| std::env::var(SHARE_TOKEN_KEY).ok())
        .unwrap_or_default();
    Html(setup_page(&client_id, &current)).into_response()
}

async fn save_token(
    State(ctx): State<Arc<AdminContext>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Response {
    info!("POST /token");
    let token = match payload {
        Ok(Json(request)) => request.share_token.filter(|t| !t.trim().is_empty()),
        Err(e) => {
            warn!("Unreadable token request: {}", e);
            None
        }
    };
    let Some(token) = token else {
        warn!("Token request without a share token");
        return error_json(StatusCode::BAD_REQUEST, "No token provided");
    };

    if let Err(e) = env_file::set_key(&ctx.env_file, SHARE_TOKEN_KEY, token.trim()) {
        error!("Failed to save share token to {}: {}", ctx.env_file.display(), e);
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save token.");
    }
    info!("Saved new album share token, the frame will reload shortly");
    ctx.reload.request();
    Json(json!({"status": "success"})).into_response()
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "Not found")
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "message": message}))).into_response()
}

/// OAuth client id from an `installed` or `web` credentials file
pub fn client_id(credentials_file: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(credentials_file).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let section = value.get("installed").or_else(|| value.get("web"))?;
    section.get("client_id")?.as_str().map(str::to_string)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Picker page: signs in with the OAuth client, lists the shared albums and posts the
/// chosen album's share token. A token can also be pasted by hand.
fn setup_page(client_id: &str, current_token: &str) -> String {
    let client_id = escape_html(client_id);
    let current = if current_token.is_empty() {
        "none".to_string()
    } else {
        escape_html(current_token)
    };
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Photo Frame Setup</title>
<meta name="google-client-id" content="{client_id}">
<script src="https://accounts.google.com/gsi/client" async defer></script>
</head>
<body>
<h1>Photo Frame Setup</h1>
<p>Current album share token: <code id="current">{current}</code></p>
<button id="pick">Choose a shared album from Google Photos</button>
<ul id="albums"></ul>
<form id="token-form">
  <label for="share-token">Or paste an album share token</label>
  <input id="share-token" name="shareToken" size="60">
  <button type="submit">Save</button>
</form>
<p id="status"></p>
<script>
const clientId = document.querySelector('meta[name="google-client-id"]').content;
const statusLine = document.getElementById("status");

async function saveToken(shareToken) {{
  const response = await fetch("/token", {{
    method: "POST",
    headers: {{"Content-Type": "application/json"}},
    body: JSON.stringify({{shareToken}}),
  }});
  const result = await response.json();
  statusLine.textContent =
    result.status === "success" ? "Saved. The frame will switch albums shortly." : result.message;
  if (result.status === "success") {{
    document.getElementById("current").textContent = shareToken;
  }}
}}

async function showAlbums(accessToken) {{
  const response = await fetch("https://photoslibrary.googleapis.com/v1/sharedAlbums?pageSize=50", {{
    headers: {{Authorization: "Bearer " + accessToken}},
  }});
  const data = await response.json();
  const list = document.getElementById("albums");
  list.replaceChildren();
  for (const album of data.sharedAlbums || []) {{
    if (!album.shareInfo || !album.shareInfo.shareToken) continue;
    const button = document.createElement("button");
    button.textContent = (album.title || "Untitled") + " (" + (album.mediaItemsCount || 0) + " photos)";
    button.addEventListener("click", () => saveToken(album.shareInfo.shareToken));
    const item = document.createElement("li");
    item.append(button);
    list.append(item);
  }}
  if (!list.children.length) statusLine.textContent = "No shared albums found.";
}}

document.getElementById("pick").addEventListener("click", () => {{
  const tokenClient = google.accounts.oauth2.initTokenClient({{
    client_id: clientId,
    scope: "https://www.googleapis.com/auth/photoslibrary.sharing",
    callback: (reply) => {{
      if (reply.error) {{
        statusLine.textContent = "Sign-in failed: " + reply.error;
        return;
      }}
      showAlbums(reply.access_token);
    }},
  }});
  tokenClient.requestAccessToken();
}});

document.getElementById("token-form").addEventListener("submit", (event) => {{
  event.preventDefault();
  saveToken(document.getElementById("share-token").value);
}});
</script>
</body>
</html>
"#
    )
}
