use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::language::{self, DEFAULT_LANG};

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("unsupported language code '{0}'")]
    Unsupported(String),
    #[error("could not write preferences to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key-value store for the user's preferred target language.
pub trait PreferenceStore: Send + Sync {
    /// Stored language, or the default when nothing was stored.
    fn preferred_lang(&self) -> String;
    /// Validate, persist and notify subscribers.
    fn set_preferred_lang(&self, code: &str) -> Result<(), PreferenceError>;
    /// Receives every accepted change.
    fn subscribe(&self) -> watch::Receiver<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredPreferences {
    #[serde(rename = "preferredLang", default, skip_serializing_if = "Option::is_none")]
    preferred_lang: Option<String>,
}

fn validate(code: &str) -> Result<(), PreferenceError> {
    if language::is_supported(code) {
        Ok(())
    } else {
        Err(PreferenceError::Unsupported(code.to_string()))
    }
}

/// In-process store; forgets everything on drop.
pub struct MemoryPreferences {
    tx: watch::Sender<String>,
}

impl Default for MemoryPreferences {
    fn default() -> Self {
        Self::new(DEFAULT_LANG)
    }
}

impl MemoryPreferences {
    pub fn new(initial: &str) -> Self {
        let (tx, _) = watch::channel(initial.to_string());
        Self { tx }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn preferred_lang(&self) -> String {
        self.tx.borrow().clone()
    }

    fn set_preferred_lang(&self, code: &str) -> Result<(), PreferenceError> {
        validate(code)?;
        self.tx.send_replace(code.to_string());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

/// JSON file store, e.g. `{"preferredLang": "ha"}`. The whole file is rewritten on set.
pub struct FilePreferences {
    path: PathBuf,
    stored: Mutex<StoredPreferences>,
    tx: watch::Sender<String>,
}

impl FilePreferences {
    /// Open `path`. A missing or unreadable file starts empty; it is created on first set.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let stored = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("ignoring malformed preferences at {}: {e}", path.display());
                StoredPreferences::default()
            }),
            Err(_) => StoredPreferences::default(),
        };
        let current = stored
            .preferred_lang
            .clone()
            .filter(|code| language::is_supported(code))
            .unwrap_or_else(|| DEFAULT_LANG.to_string());
        let (tx, _) = watch::channel(current);
        Self {
            path,
            stored: Mutex::new(stored),
            tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, stored: &StoredPreferences) -> Result<(), PreferenceError> {
        let json = serde_json::to_string_pretty(stored)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PreferenceError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        fs::write(&self.path, json).map_err(|source| PreferenceError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl PreferenceStore for FilePreferences {
    fn preferred_lang(&self) -> String {
        self.tx.borrow().clone()
    }

    fn set_preferred_lang(&self, code: &str) -> Result<(), PreferenceError> {
        validate(code)?;
        let mut stored = self.stored.lock();
        let mut next = stored.clone();
        next.preferred_lang = Some(code.to_string());
        self.persist(&next)?;
        *stored = next;
        drop(stored);

        info!("preferred language saved: {code}");
        self.tx.send_replace(code.to_string());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}
