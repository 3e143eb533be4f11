use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::messaging::{Message, RemotePage, Response, TabChannel};
use crate::prefs::PreferenceStore;
use crate::requester::{Requester, RequesterHandle};
use crate::state::{TickOutcome, TickReport};
use crate::translation::{RetryPolicy, TranslationProvider};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_WORKING: &str = "Requesting captions and translating…";
pub const STATUS_NO_CAPTIONS: &str = "No captions found on this page";
pub const STATUS_COMPLETE: &str = "Translation complete";
pub const STATUS_NOT_LOADED: &str = "Content script not loaded. Please open a video page.";
pub const STATUS_CLEARED: &str = "Overlay cleared";
pub const STATUS_AUTO_ON: &str = "Auto-translate on";
pub const STATUS_AUTO_OFF: &str = "Auto-translate off";

/// Popup controller for the active tab. Runs the shared requester from the popup
/// context, reaching the page through messages.
pub struct Popup {
    page: Arc<RemotePage>,
    channel: Arc<dyn TabChannel>,
    prefs: Arc<dyn PreferenceStore>,
    provider: Arc<dyn TranslationProvider>,
    config: Config,
    status: Arc<Mutex<String>>,
    auto: Mutex<Option<RequesterHandle>>,
}

impl Popup {
    pub fn new(
        channel: Arc<dyn TabChannel>,
        prefs: Arc<dyn PreferenceStore>,
        provider: Arc<dyn TranslationProvider>,
        config: Config,
    ) -> Self {
        Self {
            page: Arc::new(RemotePage::new(channel.clone())),
            channel,
            prefs,
            provider,
            config,
            status: Arc::new(Mutex::new(STATUS_READY.into())),
            auto: Mutex::new(None),
        }
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    fn set_status(&self, text: &str) {
        *self.status.lock() = text.to_string();
    }

    /// Language shown selected when the popup opens.
    pub fn selected_language(&self) -> String {
        self.prefs.preferred_lang()
    }

    fn requester(&self, target: &str) -> Requester {
        Requester::new(self.page.clone(), self.page.clone(), self.provider.clone(), target)
            .with_policy(RetryPolicy::from(&self.config.provider))
            .with_settings(self.config.requester.clone())
    }

    /// Store `target` as the preferred language. Unsupported codes are refused and the
    /// reason goes to the status line.
    fn remember(&self, target: &str) -> Result<(), String> {
        self.prefs.set_preferred_lang(target).map_err(|e| {
            warn!("not using language '{target}': {e}");
            let message = e.to_string();
            self.set_status(&message);
            message
        })
    }

    /// Translate whatever caption is on screen right now.
    pub async fn translate_now(&self, target: &str) -> TickOutcome {
        if let Err(message) = self.remember(target) {
            return TickOutcome::Failed(message);
        }
        self.set_status(STATUS_WORKING);

        if let Err(e) = self.page.ensure_loaded().await {
            warn!("content script unavailable: {e}");
            self.set_status(STATUS_NOT_LOADED);
            return TickOutcome::SourceUnavailable(e.to_string());
        }

        let outcome = self.requester(target).tick().await;
        match &outcome {
            TickOutcome::NoCaption => self.set_status(STATUS_NO_CAPTIONS),
            TickOutcome::Translated(_) | TickOutcome::Unchanged => self.set_status(STATUS_COMPLETE),
            TickOutcome::Failed(message) => self.set_status(message),
            TickOutcome::SourceUnavailable(_) => self.set_status(STATUS_NOT_LOADED),
        }
        outcome
    }

    pub async fn clear(&self) {
        match self.channel.send(Message::ClearOverlay).await {
            Ok(Some(Response::Status { status })) => self.set_status(&status),
            Ok(_) => self.set_status(STATUS_CLEARED),
            Err(_) => self.set_status(STATUS_NOT_LOADED),
        }
    }

    /// Start the popup-level loop. Replaces any loop already running.
    pub async fn start_auto(&self, target: &str) -> bool {
        if self.remember(target).is_err() {
            return false;
        }
        if let Err(e) = self.page.ensure_loaded().await {
            warn!("content script unavailable: {e}");
            self.set_status(STATUS_NOT_LOADED);
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = self
            .requester(target)
            .spawn(cancel.clone(), Some(self.prefs.subscribe()));
        let reports = handle.reports();
        if let Some(previous) = self.auto.lock().replace(handle) {
            previous.stop();
        }
        info!("popup auto-translate on ({target})");
        self.set_status(STATUS_AUTO_ON);
        tokio::spawn(follow_reports(reports, self.status.clone(), cancel));
        true
    }

    pub fn stop_auto(&self) {
        if let Some(handle) = self.auto.lock().take() {
            handle.stop();
        }
        self.set_status(STATUS_AUTO_OFF);
    }

    pub fn is_auto_running(&self) -> bool {
        self.auto.lock().as_ref().is_some_and(|h| !h.is_stopped())
    }

    /// Persist a new target. A running loop picks it up through the preference store
    /// and re-translates the current caption on its next tick.
    pub fn set_target(&self, target: &str) -> bool {
        self.remember(target).is_ok()
    }
}

/// Mirror loop errors on the status line until the loop stops. A later success only
/// replaces an error this follower put there.
async fn follow_reports(
    mut reports: watch::Receiver<Option<TickReport>>,
    status: Arc<Mutex<String>>,
    cancel: CancellationToken,
) {
    let mut shown_error: Option<String> = None;
    while reports.changed().await.is_ok() {
        let Some(report) = reports.borrow_and_update().clone() else { continue };
        // Checked under the lock: `stop_auto` cancels before it writes its own status.
        let mut status = status.lock();
        if cancel.is_cancelled() {
            break;
        }
        match report.outcome {
            TickOutcome::Translated(_) => {
                if shown_error.take().is_some_and(|e| *status == e) {
                    *status = STATUS_AUTO_ON.to_string();
                }
            }
            TickOutcome::Failed(message) => {
                *status = message.clone();
                shown_error = Some(message);
            }
            TickOutcome::SourceUnavailable(_) => {
                *status = STATUS_NOT_LOADED.to_string();
                shown_error = Some(STATUS_NOT_LOADED.to_string());
            }
            TickOutcome::NoCaption | TickOutcome::Unchanged => {}
        }
    }
}

impl Drop for Popup {
    fn drop(&mut self) {
        if let Some(handle) = self.auto.lock().take() {
            handle.stop();
        }
    }
}
