//! Action-tagged messages between extension contexts.
//!
//! Every context that receives messages implements [`MessageHandler`]: a handled action
//! yields exactly one [`Response`], an unhandled one yields `None`. Messages cross the
//! context boundary as JSON, so [`LocalTab`] round-trips them through `serde_json` the
//! same way the browser would structured-clone them.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::requester::{CaptionSource, OverlaySink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Message {
    Ping,
    GetCurrentCaption,
    OverlayTranslation { text: String },
    ClearOverlay,
    StartAutoTranslate { target: String },
    StopAutoTranslate,
    /// One-shot: read, translate and overlay the current caption.
    TranslateCaptions { target: String },
    /// Handled by the background context.
    TranslateRequest { text: String, target: String },
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetCurrentCaption => "get_current_caption",
            Self::OverlayTranslation { .. } => "overlay_translation",
            Self::ClearOverlay => "clear_overlay",
            Self::StartAutoTranslate { .. } => "start_auto_translate",
            Self::StopAutoTranslate => "stop_auto_translate",
            Self::TranslateCaptions { .. } => "translate_captions",
            Self::TranslateRequest { .. } => "translate_request",
        }
    }
}

/// Response shapes. Variant order matters for untagged decoding: the widest shape first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Pong { ok: bool },
    StatusText { status: String, text: String },
    Status { status: String },
    Text { text: String },
}

impl Response {
    pub fn status(status: impl Into<String>) -> Self {
        Self::Status {
            status: status.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error("Content script not loaded.")]
    NotLoaded,
    #[error("No response to {0}.")]
    NoResponse(&'static str),
    #[error("Unexpected response to {0}.")]
    Unexpected(&'static str),
    #[error("Could not inject content script: {0}")]
    Injection(String),
    #[error("Message could not be encoded: {0}")]
    Codec(String),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Option<Response>;
}

/// A channel to the content script of one tab.
#[async_trait]
pub trait TabChannel: Send + Sync {
    async fn send(&self, message: Message) -> Result<Option<Response>, MessagingError>;
    /// Load the content script into the tab if it is not there yet.
    async fn inject(&self) -> Result<(), MessagingError>;
}

type HandlerFactory = Box<dyn Fn() -> Arc<dyn MessageHandler> + Send + Sync>;

/// In-process tab. Holds no handler until injected.
pub struct LocalTab {
    factory: HandlerFactory,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    injectable: Mutex<bool>,
}

impl LocalTab {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn MessageHandler> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            handler: Mutex::new(None),
            injectable: Mutex::new(true),
        }
    }

    /// Tab whose content script is already running.
    pub fn loaded<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn MessageHandler> + Send + Sync + 'static,
    {
        let tab = Self::new(factory);
        let handler = (tab.factory)();
        *tab.handler.lock() = Some(handler);
        tab
    }

    /// Pages that refuse injection (e.g. browser-internal pages).
    pub fn set_injectable(&self, injectable: bool) {
        *self.injectable.lock() = injectable;
    }

    /// Simulate navigation: the content script is gone until injected again.
    pub fn unload(&self) {
        self.handler.lock().take();
    }

    pub fn is_loaded(&self) -> bool {
        self.handler.lock().is_some()
    }
}

fn wire_roundtrip<T: Serialize + for<'de> Deserialize<'de>>(value: &T) -> Result<T, MessagingError> {
    let json = serde_json::to_value(value).map_err(|e| MessagingError::Codec(e.to_string()))?;
    serde_json::from_value(json).map_err(|e| MessagingError::Codec(e.to_string()))
}

#[async_trait]
impl TabChannel for LocalTab {
    async fn send(&self, message: Message) -> Result<Option<Response>, MessagingError> {
        let handler = self.handler.lock().clone().ok_or(MessagingError::NotLoaded)?;
        let message = wire_roundtrip(&message)?;
        match handler.handle(message).await {
            Some(response) => Ok(Some(wire_roundtrip(&response)?)),
            None => Ok(None),
        }
    }

    async fn inject(&self) -> Result<(), MessagingError> {
        if !*self.injectable.lock() {
            return Err(MessagingError::Injection("page does not allow scripts".into()));
        }
        let mut handler = self.handler.lock();
        if handler.is_none() {
            info!("injecting content script");
            *handler = Some((self.factory)());
        }
        Ok(())
    }
}

/// Caption source and overlay sink in another context, reached through a [`TabChannel`].
/// A failed send injects the content script and retries exactly once.
pub struct RemotePage {
    channel: Arc<dyn TabChannel>,
}

impl RemotePage {
    pub fn new(channel: Arc<dyn TabChannel>) -> Self {
        Self { channel }
    }

    /// Ping the tab, injecting the content script once if it does not answer.
    pub async fn ensure_loaded(&self) -> Result<(), MessagingError> {
        if matches!(self.channel.send(Message::Ping).await, Ok(Some(Response::Pong { ok: true }))) {
            return Ok(());
        }
        self.channel.inject().await?;
        match self.channel.send(Message::Ping).await? {
            Some(Response::Pong { ok: true }) => Ok(()),
            Some(_) => Err(MessagingError::Unexpected("ping")),
            None => Err(MessagingError::NoResponse("ping")),
        }
    }

    pub async fn request(&self, message: Message) -> Result<Response, MessagingError> {
        let action = message.action();
        match self.channel.send(message.clone()).await {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => debug!("{action}: no response, injecting and retrying"),
            Err(e) => debug!("{action}: {e}, injecting and retrying"),
        }
        self.channel.inject().await?;
        self.channel
            .send(message)
            .await?
            .ok_or(MessagingError::NoResponse(action))
    }
}

#[async_trait]
impl CaptionSource for RemotePage {
    async fn current_caption(&self) -> Result<String, MessagingError> {
        match self.request(Message::GetCurrentCaption).await? {
            Response::Text { text } | Response::StatusText { text, .. } => Ok(text),
            _ => Err(MessagingError::Unexpected("get_current_caption")),
        }
    }
}

#[async_trait]
impl OverlaySink for RemotePage {
    async fn display(&self, text: &str) -> Result<(), MessagingError> {
        let message = if text.is_empty() {
            Message::ClearOverlay
        } else {
            Message::OverlayTranslation {
                text: text.to_string(),
            }
        };
        self.request(message).await.map(|_| ())
    }
}
