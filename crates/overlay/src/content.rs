//! Message handlers for the page (content script) and background contexts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::language;
use crate::messaging::{Message, MessageHandler, Response};
use crate::page::PageAdapter;
use crate::reader::CaptionReader;
use crate::render::{OverlayHost, OverlayRenderer};
use crate::requester::{PageContext, Requester, RequesterHandle};
use crate::translation::{RetryPolicy, TranslateError, TranslationProvider, TranslationRequest};

pub const STATUS_OK: &str = "ok";
pub const STATUS_OVERLAY_CLEARED: &str = "overlay_cleared";
pub const STATUS_AUTO_STARTED: &str = "auto_translate_started";
pub const STATUS_AUTO_STOPPED: &str = "auto_translate_stopped";
pub const STATUS_NO_CAPTIONS: &str = "No captions found on this page";
pub const STATUS_COMPLETE: &str = "Translation complete";

/// Page-context half of the extension: owns the caption reader, the overlay and,
/// while auto-translate is on, a page-level requester loop.
pub struct ContentScript {
    context: PageContext,
    provider: Arc<dyn TranslationProvider>,
    config: Config,
    lifetime: CancellationToken,
    watching: AtomicBool,
    auto: Mutex<Option<RequesterHandle>>,
}

impl ContentScript {
    /// Until [`spawn_watcher`](Self::spawn_watcher) runs, captions are scanned on demand
    /// for each request. Starting auto-translate starts the watcher.
    pub fn new(
        page: Arc<dyn PageAdapter>,
        host: Arc<dyn OverlayHost>,
        provider: Arc<dyn TranslationProvider>,
        config: Config,
    ) -> Self {
        let context = PageContext {
            reader: Arc::new(CaptionReader::new(page)),
            renderer: Arc::new(OverlayRenderer::new(host, config.overlay.clone())),
        };
        Self {
            context,
            provider,
            config,
            lifetime: CancellationToken::new(),
            watching: AtomicBool::new(false),
            auto: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    /// Start keeping the caption snapshot fresh. Stops when the script is dropped.
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        self.watching.store(true, Ordering::SeqCst);
        let reader = self.context.reader.clone();
        let interval = self.config.reader.rescan_interval();
        let cancel = self.lifetime.child_token();
        tokio::spawn(async move { reader.watch(interval, cancel).await })
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    fn fresh_caption(&self) -> String {
        if !self.is_watching() {
            self.context.reader.rescan();
        }
        self.context.reader.current_caption()
    }

    pub fn is_auto_running(&self) -> bool {
        self.auto.lock().as_ref().is_some_and(|h| !h.is_stopped())
    }

    fn start_auto(&self, target: &str) {
        if !self.is_watching() {
            let _ = self.spawn_watcher();
        }
        let requester = Requester::new(
            Arc::new(self.context.clone()),
            Arc::new(self.context.clone()),
            self.provider.clone(),
            target,
        )
        .with_policy(RetryPolicy::from(&self.config.provider))
        .with_settings(self.config.requester.clone());

        let handle = requester.spawn(self.lifetime.child_token(), None);
        if let Some(previous) = self.auto.lock().replace(handle) {
            previous.stop();
        }
    }

    fn stop_auto(&self) {
        if let Some(handle) = self.auto.lock().take() {
            handle.stop();
        }
    }

    async fn translate_once(&self, target: &str) -> Response {
        let mut caption = self.context.reader.rescan();
        if caption.is_empty() {
            caption = self.context.reader.current_caption();
        }
        if caption.is_empty() {
            return Response::status(STATUS_NO_CAPTIONS);
        }

        let renderer = &self.context.renderer;
        renderer.display(&self.config.requester.placeholder);
        let request = TranslationRequest::new(&caption, target, self.config.requester.max_chars);
        let policy = RetryPolicy::from(&self.config.provider);
        match policy.run(self.provider.as_ref(), &request).await {
            Ok(text) => {
                renderer.display(&text);
                Response::StatusText {
                    status: STATUS_COMPLETE.into(),
                    text,
                }
            }
            Err(e) => {
                let message = e.to_display();
                renderer.display(&message);
                Response::status(message)
            }
        }
    }
}

impl Drop for ContentScript {
    fn drop(&mut self) {
        self.lifetime.cancel();
        self.context.renderer.clear();
    }
}

#[async_trait]
impl MessageHandler for ContentScript {
    async fn handle(&self, message: Message) -> Option<Response> {
        match message {
            Message::Ping => Some(Response::Pong { ok: true }),
            Message::GetCurrentCaption => Some(Response::text(self.fresh_caption())),
            Message::OverlayTranslation { text } => {
                self.context.renderer.display(&text);
                Some(Response::status(STATUS_OK))
            }
            Message::ClearOverlay => {
                self.context.renderer.clear();
                Some(Response::status(STATUS_OVERLAY_CLEARED))
            }
            Message::StartAutoTranslate { target } | Message::TranslateCaptions { target }
                if !language::is_supported(&target) =>
            {
                Some(Response::status(TranslateError::UnsupportedLanguage(target).to_display()))
            }
            Message::StartAutoTranslate { target } => {
                info!("page-level auto-translate requested ({target})");
                self.start_auto(&target);
                Some(Response::status(STATUS_AUTO_STARTED))
            }
            Message::StopAutoTranslate => {
                self.stop_auto();
                Some(Response::status(STATUS_AUTO_STOPPED))
            }
            Message::TranslateCaptions { target } => Some(self.translate_once(&target).await),
            Message::TranslateRequest { .. } => None,
        }
    }
}

/// Background context: answers translation requests on behalf of other contexts.
pub struct Background {
    provider: Arc<dyn TranslationProvider>,
    policy: RetryPolicy,
    max_chars: usize,
}

impl Background {
    pub fn new(provider: Arc<dyn TranslationProvider>, config: &Config) -> Self {
        Self {
            provider,
            policy: RetryPolicy::from(&config.provider),
            max_chars: config.requester.max_chars,
        }
    }
}

#[async_trait]
impl MessageHandler for Background {
    async fn handle(&self, message: Message) -> Option<Response> {
        match message {
            Message::Ping => Some(Response::Pong { ok: true }),
            Message::TranslateRequest { target, .. } if !language::is_supported(&target) => {
                Some(Response::text(TranslateError::UnsupportedLanguage(target).to_display()))
            }
            Message::TranslateRequest { text, target } => {
                let request = TranslationRequest::new(&text, &target, self.max_chars);
                let text = match self.policy.run(self.provider.as_ref(), &request).await {
                    Ok(text) => text,
                    Err(e) => e.to_display(),
                };
                Some(Response::text(text))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::page::MemoryPage;
    use crate::translation::EchoProvider;

    fn script() -> (Arc<MemoryPage>, ContentScript) {
        let page = Arc::new(MemoryPage::new());
        let mut config = Config::default();
        config.requester.poll_interval_ms = 10;
        let script = ContentScript::new(page.clone(), page.clone(), Arc::new(EchoProvider), config);
        (page, script)
    }

    #[tokio::test]
    async fn ping_answers_immediately() {
        let (_page, script) = script();
        assert_eq!(script.handle(Message::Ping).await, Some(Response::Pong { ok: true }));
    }

    #[tokio::test]
    async fn overlay_messages_drive_the_renderer() {
        let (page, script) = script();
        let reply = script
            .handle(Message::OverlayTranslation { text: "Bawo ni aye".into() })
            .await;
        assert_eq!(reply, Some(Response::status(STATUS_OK)));
        assert_eq!(page.overlay_text().as_deref(), Some("Bawo ni aye"));

        let reply = script.handle(Message::ClearOverlay).await;
        assert_eq!(reply, Some(Response::status(STATUS_OVERLAY_CLEARED)));
        assert_eq!(page.overlay_count(), 0);
        assert!(script.handle(Message::ClearOverlay).await.is_some());
    }

    #[tokio::test]
    async fn current_caption_comes_from_the_watched_snapshot() {
        let (page, script) = script();
        page.set_caption_segments(&["Hello", "world"]);
        let watcher = script.spawn_watcher();
        for _ in 0..50 {
            if script.context().reader.current_caption() == "Hello world" {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            script.handle(Message::GetCurrentCaption).await,
            Some(Response::text("Hello world"))
        );
        drop(script);
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn translate_captions_reports_missing_captions() {
        let (page, script) = script();
        let reply = script.handle(Message::TranslateCaptions { target: "yo".into() }).await;
        assert_eq!(reply, Some(Response::status(STATUS_NO_CAPTIONS)));
        assert_eq!(page.overlay_count(), 0);
    }

    #[tokio::test]
    async fn translate_captions_overlays_the_result() {
        let (page, script) = script();
        page.set_caption_segments(&["Good evening"]);
        let reply = script.handle(Message::TranslateCaptions { target: "ig".into() }).await;
        assert_eq!(
            reply,
            Some(Response::StatusText {
                status: STATUS_COMPLETE.into(),
                text: "[ig] Good evening".into()
            })
        );
        assert_eq!(page.overlay_text().as_deref(), Some("[ig] Good evening"));
    }

    #[tokio::test]
    async fn page_level_auto_translate_starts_and_stops() {
        let (page, script) = script();
        page.set_caption_segments(&["Auto line"]);
        script.context().reader.rescan();

        let reply = script.handle(Message::StartAutoTranslate { target: "ha".into() }).await;
        assert_eq!(reply, Some(Response::status(STATUS_AUTO_STARTED)));
        assert!(script.is_auto_running());

        for _ in 0..100 {
            if page.overlay_text().as_deref() == Some("[ha] Auto line") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(page.overlay_text().as_deref(), Some("[ha] Auto line"));

        let reply = script.handle(Message::StopAutoTranslate).await;
        assert_eq!(reply, Some(Response::status(STATUS_AUTO_STOPPED)));
        assert!(!script.is_auto_running());
    }

    #[tokio::test]
    async fn background_translates_and_ignores_page_actions() {
        let background = Background::new(Arc::new(EchoProvider), &Config::default());
        let reply = background
            .handle(Message::TranslateRequest { text: "a\nb".into(), target: "yo".into() })
            .await;
        assert_eq!(reply, Some(Response::text("[yo] a\n[yo] b")));
        assert_eq!(background.handle(Message::GetCurrentCaption).await, None);
    }

    #[tokio::test]
    async fn captions_are_scanned_on_demand_without_a_watcher() {
        let (page, script) = script();
        page.set_caption_segments(&["First"]);
        assert_eq!(script.handle(Message::GetCurrentCaption).await, Some(Response::text("First")));
        page.set_caption_segments(&["Second"]);
        assert_eq!(script.handle(Message::GetCurrentCaption).await, Some(Response::text("Second")));
        assert!(!script.is_watching());
    }

    #[tokio::test]
    async fn auto_translate_starts_the_watcher_itself() {
        let (page, script) = script();
        page.set_caption_segments(&["Fresh line"]);
        script.handle(Message::StartAutoTranslate { target: "yo".into() }).await;
        assert!(script.is_watching());

        for _ in 0..100 {
            if page.overlay_text().as_deref() == Some("[yo] Fresh line") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(page.overlay_text().as_deref(), Some("[yo] Fresh line"));
        script.handle(Message::StopAutoTranslate).await;
    }

    #[tokio::test]
    async fn unsupported_targets_are_refused() {
        let (page, script) = script();
        page.set_caption_segments(&["Hello"]);

        let reply = script.handle(Message::StartAutoTranslate { target: "xx".into() }).await;
        assert!(matches!(reply, Some(Response::Status { status }) if status.contains("Unsupported language 'xx'")));
        assert!(!script.is_auto_running());

        let reply = script.handle(Message::TranslateCaptions { target: "fr".into() }).await;
        assert!(matches!(reply, Some(Response::Status { status }) if status.contains("'fr'")));
        assert_eq!(page.overlay_count(), 0);

        let background = Background::new(Arc::new(EchoProvider), &Config::default());
        let reply = background
            .handle(Message::TranslateRequest { text: "Hello".into(), target: "de".into() })
            .await;
        assert!(matches!(reply, Some(Response::Text { text }) if text.contains("'de'")));
    }
}
