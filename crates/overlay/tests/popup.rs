use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caption_overlay::content::ContentScript;
use caption_overlay::messaging::{LocalTab, MessageHandler, TabChannel};
use caption_overlay::page::MemoryPage;
use caption_overlay::popup::{self, Popup};
use caption_overlay::prefs::{MemoryPreferences, PreferenceStore};
use caption_overlay::translation::EchoProvider;
use caption_overlay::{Config, TickOutcome, TranslateError, TranslationProvider, TranslationRequest};

fn test_config() -> Config {
    let mut config = Config::default();
    config.requester.poll_interval_ms = 10;
    config.reader.rescan_interval_ms = 10;
    config
}

/// A tab showing `page` whose content script is injected on demand.
fn tab_for(page: Arc<MemoryPage>) -> Arc<LocalTab> {
    let config = test_config();
    Arc::new(LocalTab::new(move || {
        let script = Arc::new(ContentScript::new(
            page.clone(),
            page.clone(),
            Arc::new(EchoProvider),
            config.clone(),
        ));
        script.context().reader.rescan();
        let _ = script.spawn_watcher();
        script as Arc<dyn MessageHandler>
    }))
}

/// A translation server that always answers 503.
struct Unavailable;

#[async_trait]
impl TranslationProvider for Unavailable {
    async fn translate(&self, _request: &TranslationRequest) -> Result<String, TranslateError> {
        Err(TranslateError::Status(503))
    }
}

fn popup_for(tab: Arc<LocalTab>, prefs: Arc<MemoryPreferences>) -> Popup {
    Popup::new(tab, prefs, Arc::new(EchoProvider), test_config())
}

async fn wait_for_overlay(page: &MemoryPage, expected: &str) {
    for _ in 0..200 {
        if page.overlay_text().as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("overlay never showed {expected:?}, last: {:?}", page.overlay_text());
}

#[tokio::test]
async fn translate_now_injects_the_content_script_on_demand() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["Hello", "world"]);
    let tab = tab_for(page.clone());
    let prefs = Arc::new(MemoryPreferences::default());
    let popup = popup_for(tab.clone(), prefs.clone());

    assert_eq!(popup.status(), popup::STATUS_READY);
    assert!(!tab.is_loaded());

    let outcome = popup.translate_now("yo").await;
    assert_eq!(outcome, TickOutcome::Translated("[yo] Hello world".into()));
    assert!(tab.is_loaded());
    assert_eq!(popup.status(), popup::STATUS_COMPLETE);
    assert_eq!(page.overlay_text().as_deref(), Some("[yo] Hello world"));
    assert_eq!(prefs.preferred_lang(), "yo");
}

#[tokio::test]
async fn page_without_scripts_reports_content_not_available() {
    let page = Arc::new(MemoryPage::new());
    let tab = tab_for(page.clone());
    tab.set_injectable(false);
    let popup = popup_for(tab, Arc::new(MemoryPreferences::default()));

    assert!(matches!(popup.translate_now("ha").await, TickOutcome::SourceUnavailable(_)));
    assert_eq!(popup.status(), popup::STATUS_NOT_LOADED);
    assert_eq!(page.overlay_count(), 0);
}

#[tokio::test]
async fn empty_page_sends_nothing() {
    let page = Arc::new(MemoryPage::new());
    let tab = tab_for(page.clone());
    let popup = popup_for(tab, Arc::new(MemoryPreferences::default()));

    assert_eq!(popup.translate_now("ig").await, TickOutcome::NoCaption);
    assert_eq!(popup.status(), popup::STATUS_NO_CAPTIONS);
    assert_eq!(page.overlay_count(), 0);
}

#[tokio::test]
async fn clear_removes_the_overlay() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["Bye"]);
    let tab = tab_for(page.clone());
    let popup = popup_for(tab, Arc::new(MemoryPreferences::default()));

    popup.translate_now("en").await;
    assert_eq!(page.overlay_count(), 1);
    popup.clear().await;
    assert_eq!(page.overlay_count(), 0);
    assert_eq!(popup.status(), "overlay_cleared");
}

#[tokio::test]
async fn auto_loop_follows_captions_and_language_changes() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["First line"]);
    let tab = tab_for(page.clone());
    let prefs = Arc::new(MemoryPreferences::default());
    let popup = popup_for(tab.clone(), prefs.clone());

    assert!(popup.start_auto("yo").await);
    assert!(popup.is_auto_running());
    assert_eq!(popup.status(), popup::STATUS_AUTO_ON);
    wait_for_overlay(&page, "[yo] First line").await;

    page.set_caption_segments(&["Second line"]);
    wait_for_overlay(&page, "[yo] Second line").await;

    // Same caption, new language: re-translated without waiting for a new cue.
    assert!(popup.set_target("ha"));
    wait_for_overlay(&page, "[ha] Second line").await;

    assert!(!popup.set_target("xx"));
    assert!(popup.status().contains("unsupported"));

    popup.stop_auto();
    assert!(!popup.is_auto_running());
    assert_eq!(popup.status(), popup::STATUS_AUTO_OFF);

    page.set_caption_segments(&["After stop"]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(page.overlay_text().as_deref(), Some("[ha] Second line"));
}

#[tokio::test]
async fn reloaded_tab_is_reinjected_by_the_running_loop() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["Before reload"]);
    let tab = tab_for(page.clone());
    let popup = popup_for(tab.clone(), Arc::new(MemoryPreferences::default()));

    assert!(popup.start_auto("pcm").await);
    wait_for_overlay(&page, "[pcm] Before reload").await;

    tab.unload();
    page.set_caption_segments(&["After reload"]);
    wait_for_overlay(&page, "[pcm] After reload").await;
    assert!(tab.send(caption_overlay::Message::Ping).await.is_ok());
    popup.stop_auto();
}

#[tokio::test]
async fn unsupported_language_is_refused_before_touching_the_page() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["Hello"]);
    let tab = tab_for(page.clone());
    let prefs = Arc::new(MemoryPreferences::default());
    let popup = popup_for(tab.clone(), prefs.clone());

    assert!(matches!(popup.translate_now("xx").await, TickOutcome::Failed(m) if m.contains("'xx'")));
    assert!(popup.status().contains("unsupported"));
    assert!(!popup.start_auto("fr").await);
    assert!(!popup.is_auto_running());
    assert!(!tab.is_loaded());
    assert_eq!(page.overlay_count(), 0);
    assert_eq!(prefs.preferred_lang(), "en");
}

#[tokio::test]
async fn auto_loop_errors_reach_the_status_line() {
    let page = Arc::new(MemoryPage::new());
    page.set_caption_segments(&["Hello"]);
    let tab = tab_for(page.clone());
    let popup = Popup::new(tab, Arc::new(MemoryPreferences::default()), Arc::new(Unavailable), test_config());

    assert!(popup.start_auto("yo").await);
    for _ in 0..200 {
        if popup.status().contains("HTTP 503") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(popup.status().contains("HTTP 503"));
    assert!(page.overlay_text().is_some_and(|t| t.contains("HTTP 503")));

    popup.stop_auto();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(popup.status(), popup::STATUS_AUTO_OFF);
}
