use crate::language::DEFAULT_LANG;

/// What a single requester tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Caption source had nothing; no request sent.
    NoCaption,
    /// Caption equals the last translated one; no request sent.
    Unchanged,
    Translated(String),
    /// Provider failed; the string is what the overlay now shows.
    Failed(String),
    /// The caption source could not be reached.
    SourceUnavailable(String),
}

/// Published after every completed tick of a running loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub seq: u64,
    pub outcome: TickOutcome,
}

/// State owned by one requester loop.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub target: String,
    /// Empty until the first translation is requested, and after a target switch.
    pub last_translated: String,
    pub ticks: u64,
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new(DEFAULT_LANG)
    }
}

impl LoopState {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            last_translated: String::new(),
            ticks: 0,
        }
    }

    /// Switch target; the next tick re-translates whatever is on screen.
    pub fn retarget(&mut self, target: &str) {
        self.target = target.to_string();
        self.last_translated.clear();
    }
}
