use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::LoggingConfig;

/// Set up tracing-subscriber. With file logging enabled, writes `caption-overlay.log` in
/// `log_dir`; otherwise logs go to stderr. Later calls are ignored.
pub fn init_tracing(config: &LoggingConfig, log_dir: &Path) {
    let builder = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(tracing::Level::INFO);

    if config.enabled && fs::create_dir_all(log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(log_dir, "caption-overlay.log");
        let subscriber = builder.with_writer(file_appender).with_ansi(false).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Per-session transcript of caption/translation pairs.
/// Write failures are swallowed: a broken transcript must never stop translation.
pub struct SessionLog {
    path: Option<PathBuf>,
}

impl SessionLog {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Create `<slug>_<timestamp>.txt` in `dir` and write its header.
    pub fn create(dir: &Path, source_name: Option<&str>, target: &str) -> Self {
        Self {
            path: Self::create_file(dir, source_name, target),
        }
    }

    fn create_file(dir: &Path, source_name: Option<&str>, target: &str) -> Option<PathBuf> {
        fs::create_dir_all(dir).ok()?;

        let slug = source_name
            .unwrap_or("Unknown")
            .replace(' ', "-")
            .replace(|c: char| !c.is_alphanumeric() && c != '-', "");

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("{slug}_{timestamp}.txt"));

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .ok()?;

        let header = format!(
            "=== Caption Overlay - Session Transcript ===\nSource: {}\nTarget: {}\nDate: {}\n============================================\n\n",
            source_name.unwrap_or("Unknown"),
            target,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        file.write_all(header.as_bytes()).ok()?;

        Some(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a caption and its translation.
    pub fn log_exchange(&self, caption: &str, translation: &str) {
        let Some(path) = &self.path else { return };

        let Ok(mut file) = OpenOptions::new().append(true).open(path) else {
            return;
        };

        let now = Local::now().format("%H:%M:%S");
        let entry = format!("[{now}] Caption:\n{caption}\n\n[{now}] Translation:\n{translation}\n\n");
        let _ = file.write_all(entry.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_has_header_and_exchanges() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(dir.path(), Some("My Video: part 1"), "yo");
        let path = log.path().unwrap().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("My-Video-part-1_"));
        assert!(name.ends_with(".txt"));

        log.log_exchange("Hello world", "Bawo ni aye");
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("=== Caption Overlay - Session Transcript ==="));
        assert!(contents.contains("Target: yo"));
        assert!(contents.contains("Caption:\nHello world"));
        assert!(contents.contains("Translation:\nBawo ni aye"));
    }

    #[test]
    fn disabled_transcript_is_silent() {
        let log = SessionLog::disabled();
        log.log_exchange("a", "b");
        assert!(log.path().is_none());
    }
}
