use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::page::PageAdapter;

/// Selector groups in priority order. The first group that yields text wins.
/// Segment groups are joined; container groups are read as one block.
const SEGMENT_SELECTORS: &str = ".ytp-caption-segment, .ytp-subtitles-text, .captions-text";
const CONTAINER_SELECTORS: &[&str] = &[".ytp-caption-window-container", ".caption-window"];

/// Trim each segment, drop empty ones and join with a single space.
pub fn normalize_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .filter_map(|s| {
            let t = s.as_ref().trim();
            (!t.is_empty()).then(|| t.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scan `page` once. Returns an empty string when no caption region has text.
pub fn scan(page: &dyn PageAdapter) -> String {
    let text = normalize_segments(page.select_text(SEGMENT_SELECTORS));
    if !text.is_empty() {
        return text;
    }
    for selector in CONTAINER_SELECTORS {
        let text = normalize_segments(page.select_text(selector));
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Keeps the latest visible caption of a page.
pub struct CaptionReader {
    page: Arc<dyn PageAdapter>,
    snapshot: Mutex<String>,
}

impl CaptionReader {
    pub fn new(page: Arc<dyn PageAdapter>) -> Self {
        Self {
            page,
            snapshot: Mutex::new(String::new()),
        }
    }

    /// Most recent non-empty scan, or "" if nothing was ever seen.
    pub fn current_caption(&self) -> String {
        self.snapshot.lock().clone()
    }

    /// Scan now. An empty result keeps the previous snapshot.
    pub fn rescan(&self) -> String {
        let text = scan(self.page.as_ref());
        if !text.is_empty() {
            let mut snapshot = self.snapshot.lock();
            if *snapshot != text {
                debug!(chars = text.chars().count(), "caption changed");
                *snapshot = text.clone();
            }
        }
        text
    }

    /// Keep the snapshot fresh until `cancel` fires. Rescans on page mutations when the
    /// adapter reports them, otherwise every `fallback_interval`.
    pub async fn watch(&self, fallback_interval: Duration, cancel: CancellationToken) {
        self.rescan();
        match self.page.mutations() {
            Some(mut rx) => {
                info!("caption reader following page mutations");
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            self.rescan();
                        }
                    }
                }
            }
            None => {
                info!("caption reader polling every {}ms", fallback_interval.as_millis());
                let mut ticker = tokio::time::interval(fallback_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            self.rescan();
                        }
                    }
                }
            }
        }
        debug!("caption reader stopped");
    }
}
