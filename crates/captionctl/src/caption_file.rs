use std::path::{Path, PathBuf};
use std::time::Duration;

use caption_overlay::page::PageAdapter;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SEGMENT_CLASS: &str = "ytp-caption-segment";

/// A text file seen as a caption window: the last `window` non-empty lines are the
/// visible caption segments. Something else (a speech-to-text tool, a subtitle player)
/// keeps writing the file; `poll` picks up its changes.
pub struct CaptionFile {
    path: PathBuf,
    window: usize,
    lines: Mutex<Vec<String>>,
    mutations: watch::Sender<u64>,
}

impl CaptionFile {
    /// A missing file is not an error; it reads as an empty page until it appears.
    pub fn open(path: impl AsRef<Path>, window: usize) -> Self {
        let (mutations, _) = watch::channel(0);
        let file = Self {
            path: path.as_ref().to_path_buf(),
            window: window.max(1),
            lines: Mutex::new(Vec::new()),
            mutations,
        };
        file.refresh();
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. Returns true when the visible lines changed.
    pub fn refresh(&self) -> bool {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!("cannot read {}: {e}", self.path.display());
                String::new()
            }
        };
        let all: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let visible: Vec<String> = all[all.len().saturating_sub(self.window)..]
            .iter()
            .map(|l| l.to_string())
            .collect();

        {
            let mut lines = self.lines.lock();
            if *lines == visible {
                return false;
            }
            *lines = visible;
        }
        self.mutations.send_modify(|n| *n += 1);
        true
    }

    /// Re-read every `interval` until `cancel` fires.
    pub async fn poll(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh();
                }
            }
        }
    }
}

impl PageAdapter for CaptionFile {
    fn select_text(&self, selector: &str) -> Vec<String> {
        let matches = selector
            .split(',')
            .any(|s| s.trim().trim_start_matches('.') == SEGMENT_CLASS);
        if matches {
            self.lines.lock().clone()
        } else {
            Vec::new()
        }
    }

    fn mutations(&self) -> Option<watch::Receiver<u64>> {
        Some(self.mutations.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use caption_overlay::reader;

    use super::*;

    #[test]
    fn last_lines_form_the_caption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.txt");
        fs::write(&path, "first\n\n  second  \nthird\n").unwrap();

        let file = CaptionFile::open(&path, 2);
        assert_eq!(reader::scan(&file), "second third");
        assert!(file.select_text(".caption-window").is_empty());
    }

    #[test]
    fn refresh_reports_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.txt");
        let file = CaptionFile::open(&path, 2);
        assert_eq!(reader::scan(&file), "");

        let mut rx = file.mutations().unwrap();
        fs::write(&path, "Hello\nworld\n").unwrap();
        assert!(file.refresh());
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        assert!(!file.refresh());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(reader::scan(&file), "Hello world");
    }
}
