//! Collaborators the controller drives but does not own the behavior of.
//!
//! Only [`UiRenderer`] and [`ImageLoader`] are mandatory. Media playback,
//! haptics and the flip engine are optional; a controller built without
//! them simply skips the corresponding feature.

use std::time::Duration;

use thiserror::Error;

use super::state::PresentationMode;

/// Celebratory burst shown on the first and last slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Floats up from the bottom edge; shown when returning to the cover.
    Hearts,
    /// Falls from the top edge; shown on the final slide.
    Confetti,
}

impl EffectKind {
    pub fn glyphs(self) -> &'static [&'static str] {
        match self {
            EffectKind::Hearts => &["💖", "💕", "💗", "💓", "💝"],
            EffectKind::Confetti => &["✨", "⭐", "💫", "🌟", "💖"],
        }
    }

    /// Number of floating items in one burst.
    pub fn burst_len(self) -> usize {
        match self {
            EffectKind::Hearts => 5,
            EffectKind::Confetti => 20,
        }
    }

    /// Delay between consecutive items of a burst.
    pub fn stagger(self) -> Duration {
        match self {
            EffectKind::Hearts => Duration::from_millis(200),
            EffectKind::Confetti => Duration::from_millis(100),
        }
    }
}

pub trait UiRenderer {
    fn set_page_indicator(&mut self, page: usize);
    fn set_progress(&mut self, fraction: f64);
    fn scroll_to_slide(&mut self, index: usize, animated: bool);
    fn apply_zoom_style(&mut self, level: f64);
    fn set_mode(&mut self, mode: PresentationMode);
    fn show_floating_effect(&mut self, kind: EffectKind, count: usize);
    /// Brief scale-up of the page indicator after it changes.
    fn set_indicator_emphasis(&mut self, _on: bool) {}
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The platform refused to start audio without a user gesture.
    #[error("playback rejected: {0}")]
    Rejected(String),
    #[error("audio source unavailable: {0}")]
    Unavailable(String),
}

pub trait MediaPlayer {
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
}

pub trait Haptics {
    fn pulse(&mut self, duration: Duration);
}

/// Starts fetching a slide image without blocking. Completion is reported
/// back through `Controller::mark_loaded`.
pub trait ImageLoader {
    fn begin_load(&mut self, index: usize, uri: &str);
}

#[derive(Debug, Error)]
pub enum FlipError {
    #[error("flip engine failed to open: {0}")]
    Open(String),
    #[error("flip engine failed to tear down: {0}")]
    Destroy(String),
}

/// The external page-flip library.
///
/// Page turns it performs on its own are reported to the controller via
/// `Controller::on_page_turned`.
pub trait FlipEngine {
    fn open(&mut self, page_count: usize, start: usize) -> Result<(), FlipError>;
    fn destroy(&mut self) -> Result<(), FlipError>;
}
