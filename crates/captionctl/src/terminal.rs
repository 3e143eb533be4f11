use std::io::Write;

use caption_overlay::render::{OverlayHost, OverlayId, OverlayStyle};
use parking_lot::Mutex;

fn timestamp() -> String {
    chrono::Local::now().format("[%H:%M:%S]").to_string()
}

/// Overlay host that prints each overlay update as a timestamped line.
pub struct TerminalOverlay<W: Write + Send> {
    out: Mutex<W>,
    next_id: Mutex<u64>,
}

impl TerminalOverlay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalOverlay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: Mutex::new(0),
        }
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{} {text}", timestamp());
        let _ = out.flush();
    }
}

impl<W: Write + Send> OverlayHost for TerminalOverlay<W> {
    fn create_overlay(&self, _style: &OverlayStyle) -> OverlayId {
        let mut next = self.next_id.lock();
        *next += 1;
        OverlayId(*next)
    }

    fn set_text(&self, _id: OverlayId, text: &str) {
        self.line(text);
    }

    fn remove(&self, _id: OverlayId) {
        self.line("(overlay cleared)");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use caption_overlay::render::OverlayRenderer;

    use super::*;

    #[test]
    fn each_update_is_one_line() {
        let host = Arc::new(TerminalOverlay::new(Vec::new()));
        let renderer = OverlayRenderer::new(host.clone(), OverlayStyle::default());
        renderer.display("Bawo ni aye");
        renderer.display("Sannu");
        renderer.clear();
        renderer.clear();

        let out = String::from_utf8(host.out.lock().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] Bawo ni aye"));
        assert!(lines[1].ends_with("] Sannu"));
        assert!(lines[2].ends_with("(overlay cleared)"));
    }
}
