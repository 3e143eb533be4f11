use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayId(pub u64);

/// Something that can mount a floating text element over the video.
/// All calls are synchronous; hosts must not block on I/O.
pub trait OverlayHost: Send + Sync {
    fn create_overlay(&self, style: &OverlayStyle) -> OverlayId;
    fn set_text(&self, id: OverlayId, text: &str);
    fn remove(&self, id: OverlayId);
}

/// Visual layout of the overlay. Anchored bottom-center of the viewport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverlayStyle {
    #[serde(default = "default_element_id")]
    pub element_id: String,
    #[serde(default = "default_bottom")]
    pub bottom: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_font_size")]
    pub font_size: String,
    #[serde(default = "default_max_width")]
    pub max_width: String,
    #[serde(default = "default_z_index")]
    pub z_index: u32,
}

fn default_element_id() -> String { "caption-translate-overlay".into() }
fn default_bottom() -> String { "12%".into() }
fn default_background() -> String { "rgba(0,0,0,0.7)".into() }
fn default_color() -> String { "#fff".into() }
fn default_font_size() -> String { "1.5em".into() }
fn default_max_width() -> String { "80vw".into() }
fn default_z_index() -> u32 { 9_999_999 }

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            element_id: default_element_id(),
            bottom: default_bottom(),
            background: default_background(),
            color: default_color(),
            font_size: default_font_size(),
            max_width: default_max_width(),
            z_index: default_z_index(),
        }
    }
}

impl OverlayStyle {
    /// Inline CSS declarations for the overlay element.
    pub fn to_css(&self) -> String {
        format!(
            "position: fixed; bottom: {}; left: 50%; transform: translateX(-50%); \
             background: {}; color: {}; padding: 12px 24px; border-radius: 8px; \
             font-size: {}; max-width: {}; text-align: center; pointer-events: none; \
             z-index: {};",
            self.bottom, self.background, self.color, self.font_size, self.max_width, self.z_index
        )
    }
}

/// Owns the page's single overlay element.
pub struct OverlayRenderer {
    host: Arc<dyn OverlayHost>,
    style: OverlayStyle,
    current: Mutex<Option<OverlayId>>,
}

impl OverlayRenderer {
    pub fn new(host: Arc<dyn OverlayHost>, style: OverlayStyle) -> Self {
        Self {
            host,
            style,
            current: Mutex::new(None),
        }
    }

    /// Show `text`, creating the overlay on first use. Empty text removes it.
    pub fn display(&self, text: &str) {
        let mut current = self.current.lock();
        if text.is_empty() {
            if let Some(id) = current.take() {
                debug!("removing overlay {id:?}");
                self.host.remove(id);
            }
            return;
        }
        let id = *current.get_or_insert_with(|| {
            let id = self.host.create_overlay(&self.style);
            debug!("created overlay {id:?}");
            id
        });
        self.host.set_text(id, text);
    }

    /// User-triggered clear.
    pub fn clear(&self) {
        self.display("");
    }

    pub fn is_visible(&self) -> bool {
        self.current.lock().is_some()
    }
}
