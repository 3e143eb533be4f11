//! Page adapters: the seam between the caption loop and whatever hosts the video.
//!
//! Adapters are best-effort. Caption markup belongs to the host page and can change
//! without notice; an adapter that finds nothing simply reports no text.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::render::{OverlayHost, OverlayId, OverlayStyle};

/// Read-only view of a page's caption regions.
pub trait PageAdapter: Send + Sync {
    /// Text of every element matching `selector`, in document order.
    /// `selector` may be a comma-separated list of simple class selectors.
    fn select_text(&self, selector: &str) -> Vec<String>;

    /// Signal bumped whenever the observed subtree changes. `None` means the reader has
    /// to fall back to polling.
    fn mutations(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

#[derive(Debug, Clone)]
struct Element {
    class: String,
    text: String,
}

#[derive(Debug, Clone)]
pub struct OverlayNode {
    pub css: String,
    pub text: String,
}

#[derive(Default)]
struct PageInner {
    elements: Vec<Element>,
    overlays: BTreeMap<OverlayId, OverlayNode>,
    next_overlay: u64,
}

/// In-process page model: a flat list of classed text elements plus overlay nodes.
pub struct MemoryPage {
    inner: Mutex<PageInner>,
    mutations: watch::Sender<u64>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        let (mutations, _) = watch::channel(0);
        Self {
            inner: Mutex::new(PageInner::default()),
            mutations,
        }
    }

    /// Append an element with class `class` (with or without the leading dot).
    pub fn push_element(&self, class: &str, text: &str) {
        self.inner.lock().elements.push(Element {
            class: class.trim_start_matches('.').to_string(),
            text: text.to_string(),
        });
        self.bump();
    }

    /// Replace all caption segments with `segments`, as the player does per cue.
    pub fn set_caption_segments(&self, segments: &[&str]) {
        {
            let mut inner = self.inner.lock();
            inner.elements.retain(|e| e.class != "ytp-caption-segment");
            inner.elements.extend(segments.iter().map(|s| Element {
                class: "ytp-caption-segment".into(),
                text: (*s).to_string(),
            }));
        }
        self.bump();
    }

    pub fn clear_elements(&self) {
        self.inner.lock().elements.clear();
        self.bump();
    }

    pub fn overlay_count(&self) -> usize {
        self.inner.lock().overlays.len()
    }

    /// Text of the single overlay, if one is mounted.
    pub fn overlay_text(&self) -> Option<String> {
        self.inner.lock().overlays.values().next().map(|n| n.text.clone())
    }

    pub fn overlay_nodes(&self) -> Vec<OverlayNode> {
        self.inner.lock().overlays.values().cloned().collect()
    }

    fn bump(&self) {
        self.mutations.send_modify(|n| *n += 1);
    }
}

fn selector_classes(selector: &str) -> Vec<&str> {
    selector
        .split(',')
        .map(|s| s.trim().trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .collect()
}

impl PageAdapter for MemoryPage {
    fn select_text(&self, selector: &str) -> Vec<String> {
        let classes = selector_classes(selector);
        self.inner
            .lock()
            .elements
            .iter()
            .filter(|e| classes.contains(&e.class.as_str()))
            .map(|e| e.text.clone())
            .collect()
    }

    fn mutations(&self) -> Option<watch::Receiver<u64>> {
        Some(self.mutations.subscribe())
    }
}

impl OverlayHost for MemoryPage {
    fn create_overlay(&self, style: &OverlayStyle) -> OverlayId {
        let mut inner = self.inner.lock();
        inner.next_overlay += 1;
        let id = OverlayId(inner.next_overlay);
        inner.overlays.insert(
            id,
            OverlayNode {
                css: style.to_css(),
                text: String::new(),
            },
        );
        id
    }

    fn set_text(&self, id: OverlayId, text: &str) {
        if let Some(node) = self.inner.lock().overlays.get_mut(&id) {
            node.text = text.to_string();
        }
    }

    fn remove(&self, id: OverlayId) {
        self.inner.lock().overlays.remove(&id);
    }
}
