//! Machine-translated caption overlay.
//!
//! A [`reader::CaptionReader`] scrapes captions from a page, a [`requester::Requester`]
//! polls it and sends changed captions to a [`translation::TranslationProvider`], and an
//! [`render::OverlayRenderer`] shows the result over the video. The same requester runs in
//! the page context ([`content::ContentScript`]) or the popup context ([`popup::Popup`]);
//! only its caption source and overlay sink differ.

pub mod api;
pub mod config;
pub mod content;
pub mod language;
pub mod logging;
pub mod messaging;
pub mod page;
pub mod popup;
pub mod prefs;
pub mod reader;
pub mod render;
pub mod requester;
pub mod state;
pub mod translation;

pub use config::Config;
pub use messaging::{Message, Response};
pub use requester::{Requester, RequesterHandle};
pub use state::TickOutcome;
pub use translation::{TranslateError, TranslationProvider, TranslationRequest};
