//! Minimal local translation server for testing the overlay without a model.
//!
//! `POST /translate {text, target}` answers `{text}`. It tries a LibreTranslate instance
//! first and falls back to a tagged echo of the input, so the overlay always has
//! something to show.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LIBRE_URL: &str = "http://127.0.0.1:5000/translate";
pub const DEFAULT_TARGET: &str = "en";

#[derive(Debug, thiserror::Error)]
enum LibreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("no translation in response")]
    NoTranslation,
}

#[derive(Clone)]
pub struct ServerState {
    libre_url: Arc<str>,
    client: reqwest::Client,
}

impl ServerState {
    pub fn new(libre_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            libre_url: Arc::from(libre_url),
            client,
        }
    }

    pub fn libre_url(&self) -> &str {
        &self.libre_url
    }

    async fn libre_translate(&self, text: &str, target: &str) -> Result<String, LibreError> {
        let body = LibreRequest {
            q: text,
            source: "auto",
            target,
            format: "text",
        };
        let resp = self.client.post(&*self.libre_url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(LibreError::Status(resp.status().as_u16()));
        }
        let json: Value = resp.json().await?;
        ["translatedText", "translation"]
            .iter()
            .filter_map(|key| json[*key].as_str())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(LibreError::NoTranslation)
    }
}

#[derive(Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize, Default)]
struct TranslateBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

/// Text returned when LibreTranslate is unavailable.
pub fn fallback_text(target: &str, text: &str) -> String {
    format!("[local fallback -> {target}] {text}")
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/translate", post(translate))
        .with_state(state)
}

async fn translate(
    State(state): State<ServerState>,
    body: Result<Json<TranslateBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let Some(text) = body.text.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No text" })));
    };
    let target = body
        .target
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());

    let out = match state.libre_translate(&text, &target).await {
        Ok(translated) => translated,
        Err(e) => {
            debug!("LibreTranslate unavailable ({e}), using fallback");
            fallback_text(&target, &text)
        }
    };
    (StatusCode::OK, Json(json!({ "text": out })))
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(listener: TcpListener, state: ServerState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("local translate server listening on http://{}/translate", listener.local_addr()?);
    info!("will try LibreTranslate at {}, otherwise return fallback text", state.libre_url());
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, libre_url: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(listener, ServerState::new(libre_url), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await
}
