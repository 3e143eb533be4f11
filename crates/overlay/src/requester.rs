use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RequesterConfig;
use crate::language;
use crate::logging::SessionLog;
use crate::messaging::MessagingError;
use crate::reader::CaptionReader;
use crate::render::OverlayRenderer;
use crate::state::{LoopState, TickOutcome, TickReport};
use crate::translation::{RetryPolicy, TranslateError, TranslationProvider, TranslationRequest};

/// Where the requester gets captions from.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn current_caption(&self) -> Result<String, MessagingError>;
}

/// Where the requester sends text to be shown. Empty text clears.
#[async_trait]
pub trait OverlaySink: Send + Sync {
    async fn display(&self, text: &str) -> Result<(), MessagingError>;
}

/// Reader and renderer living in the same context as the requester.
#[derive(Clone)]
pub struct PageContext {
    pub reader: Arc<CaptionReader>,
    pub renderer: Arc<OverlayRenderer>,
}

#[async_trait]
impl CaptionSource for PageContext {
    async fn current_caption(&self) -> Result<String, MessagingError> {
        Ok(self.reader.current_caption())
    }
}

#[async_trait]
impl OverlaySink for PageContext {
    async fn display(&self, text: &str) -> Result<(), MessagingError> {
        self.renderer.display(text);
        Ok(())
    }
}

enum Command {
    SetTarget(String),
}

enum Event {
    Stop,
    Command(Command),
    Preference(Option<String>),
    Tick,
}

/// Polls a caption source, translates changed captions and pushes results to a sink.
pub struct Requester {
    source: Arc<dyn CaptionSource>,
    sink: Arc<dyn OverlaySink>,
    provider: Arc<dyn TranslationProvider>,
    policy: RetryPolicy,
    settings: RequesterConfig,
    transcript: Option<Arc<SessionLog>>,
    state: LoopState,
}

impl Requester {
    pub fn new(
        source: Arc<dyn CaptionSource>,
        sink: Arc<dyn OverlaySink>,
        provider: Arc<dyn TranslationProvider>,
        target: &str,
    ) -> Self {
        Self {
            source,
            sink,
            provider,
            policy: RetryPolicy::default(),
            settings: RequesterConfig::default(),
            transcript: None,
            state: LoopState::new(target),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: RequesterConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<SessionLog>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn target(&self) -> &str {
        &self.state.target
    }

    pub fn last_translated(&self) -> &str {
        &self.state.last_translated
    }

    /// Switch target language and forget the last translation. Unsupported codes are
    /// ignored and leave the current target in place.
    pub fn set_target(&mut self, target: &str) -> bool {
        if !language::is_supported(target) {
            warn!("ignoring unsupported target language '{target}'");
            return false;
        }
        info!("target language -> {target}");
        self.state.retarget(target);
        true
    }

    async fn show(&self, text: &str) {
        if let Err(e) = self.sink.display(text).await {
            warn!("overlay update failed: {e}");
        }
    }

    /// One poll: read, compare, translate, display.
    pub async fn tick(&mut self) -> TickOutcome {
        self.state.ticks += 1;

        let caption = match self.source.current_caption().await {
            Ok(caption) => caption,
            Err(e) => {
                warn!("caption source unavailable: {e}");
                return TickOutcome::SourceUnavailable(e.to_string());
            }
        };

        if caption.is_empty() {
            return TickOutcome::NoCaption;
        }
        if caption == self.state.last_translated {
            return TickOutcome::Unchanged;
        }
        if !language::is_supported(&self.state.target) {
            let message = TranslateError::UnsupportedLanguage(self.state.target.clone()).to_display();
            warn!("{message}");
            return TickOutcome::Failed(message);
        }

        let request = TranslationRequest::new(&caption, &self.state.target, self.settings.max_chars);
        if request.text.is_empty() {
            return TickOutcome::NoCaption;
        }

        self.state.last_translated = caption.clone();
        self.show(&self.settings.placeholder).await;
        debug!(lang = %request.target, chars = request.text.chars().count(), "requesting translation");

        match self.policy.run(self.provider.as_ref(), &request).await {
            Ok(text) => {
                self.show(&text).await;
                if let Some(log) = &self.transcript {
                    log.log_exchange(&caption, &text);
                }
                TickOutcome::Translated(text)
            }
            Err(e) => {
                let message = e.to_display();
                warn!("translation failed: {e}");
                self.show(&message).await;
                TickOutcome::Failed(message)
            }
        }
    }

    /// Run on a fixed period until `cancel` fires. `prefs`, when given, retargets the
    /// loop whenever the stored language changes.
    pub fn spawn(
        self,
        cancel: CancellationToken,
        prefs: Option<watch::Receiver<String>>,
    ) -> RequesterHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = watch::channel(None);
        let task = tokio::spawn(self.run(commands_rx, cancel.clone(), prefs, reports_tx));
        RequesterHandle {
            commands: commands_tx,
            cancel,
            reports: reports_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
        mut prefs: Option<watch::Receiver<String>>,
        reports: watch::Sender<Option<TickReport>>,
    ) {
        info!(
            "auto-translate started (target {}, every {}ms)",
            self.state.target, self.settings.poll_interval_ms
        );
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => Event::Stop,
                Some(command) = commands.recv() => Event::Command(command),
                pref = next_preference(&mut prefs) => Event::Preference(pref),
                _ = ticker.tick() => Event::Tick,
            };

            match event {
                Event::Stop => break,
                Event::Command(Command::SetTarget(target)) => {
                    self.set_target(&target);
                }
                Event::Preference(Some(target)) => {
                    self.set_target(&target);
                }
                Event::Preference(None) => prefs = None,
                Event::Tick => {
                    // Awaited inline: a slow request delays the next tick instead of
                    // overlapping with it.
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        outcome = self.tick() => Some(outcome),
                    };
                    let Some(outcome) = outcome else { break };
                    reports.send_replace(Some(TickReport {
                        seq: self.state.ticks,
                        outcome,
                    }));
                }
            }
        }
        info!("auto-translate stopped");
    }
}

async fn next_preference(prefs: &mut Option<watch::Receiver<String>>) -> Option<String> {
    let Some(rx) = prefs.as_mut() else {
        return std::future::pending().await;
    };
    match rx.changed().await {
        Ok(()) => Some(rx.borrow_and_update().clone()),
        Err(_) => None,
    }
}

/// Control surface of a spawned requester loop.
pub struct RequesterHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    reports: watch::Receiver<Option<TickReport>>,
    task: JoinHandle<()>,
}

impl RequesterHandle {
    /// Takes effect before the next tick. Returns false for an unsupported code, which
    /// is never queued.
    pub fn set_target(&self, target: &str) -> bool {
        if !language::is_supported(target) {
            return false;
        }
        self.commands.send(Command::SetTarget(target.to_string())).is_ok()
    }

    /// Stop the loop. An in-flight request is abandoned and never reaches the overlay.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }

    pub fn reports(&self) -> watch::Receiver<Option<TickReport>> {
        self.reports.clone()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("requester task ended abnormally: {e}");
        }
    }
}
