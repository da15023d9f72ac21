//! Navigation state: current slide, transition guard, zoom, presentation mode.

use std::fmt;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 5.0;

pub fn clamp_zoom(level: f64) -> f64 {
    if level.is_nan() {
        return MIN_ZOOM;
    }
    level.clamp(MIN_ZOOM, MAX_ZOOM)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    #[default]
    Paged,
    FlipBook,
}

impl fmt::Display for PresentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresentationMode::Paged => write!(f, "paged"),
            PresentationMode::FlipBook => write!(f, "flip-book"),
        }
    }
}

/// One page of the album as the controller sees it.
#[derive(Debug, Clone)]
pub struct SlideState {
    pub uri: String,
    loaded: bool,
    requested: bool,
}

impl SlideState {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            loaded: false,
            requested: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// A load has been started (or finished) for this slide.
    pub fn is_requested(&self) -> bool {
        self.requested || self.loaded
    }

    pub(super) fn mark_requested(&mut self) {
        self.requested = true;
    }

    /// Returns true on the first call only; the flag never reverts.
    pub(super) fn mark_loaded(&mut self) -> bool {
        let first = !self.loaded;
        self.loaded = true;
        first
    }
}

#[derive(Debug)]
pub struct NavigationState {
    pub current: usize,
    pub transitioning: bool,
    pub zoom: f64,
    pub mode: PresentationMode,
    pub music_playing: bool,
    /// A play attempt was rejected; retry on the next user interaction.
    pub autoplay_pending: bool,
    pub hidden: bool,
    pub slides: Vec<SlideState>,
}

impl NavigationState {
    pub fn new(slides: Vec<SlideState>) -> Self {
        Self {
            current: 0,
            transitioning: false,
            zoom: MIN_ZOOM,
            mode: PresentationMode::Paged,
            music_playing: false,
            autoplay_pending: true,
            hidden: false,
            slides,
        }
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    pub fn last_index(&self) -> usize {
        self.slides.len().saturating_sub(1)
    }

    pub fn progress(&self) -> f64 {
        if self.slides.is_empty() {
            return 0.0;
        }
        (self.current + 1) as f64 / self.slides.len() as f64
    }

    pub fn page_number(&self) -> usize {
        self.current + 1
    }
}
