//! The navigation controller: owns [`NavigationState`] and turns commands
//! into collaborator calls and delayed tasks.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::collab::{EffectKind, FlipEngine, Haptics, ImageLoader, MediaPlayer, UiRenderer};
use super::input::{Command, Dispatch, GestureSettings, GestureTracker, InputEvent, toggled_zoom};
use super::pager::{FlipPager, Pager, ScrollPager};
use super::state::{MIN_ZOOM, NavigationState, PresentationMode, SlideState, clamp_zoom};
use super::timer::TimerQueue;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Transition guard hold time; matches the scroll animation.
    pub settle_delay: Duration,
    pub indicator_pulse: Duration,
    pub haptic_pulse: Duration,
    pub realign_delay: Duration,
    /// Lazy-load proximity margin around the viewport, in logical pixels.
    pub lazy_margin: f64,
    /// Slides requested eagerly at start-up.
    pub eager_count: usize,
    pub gestures: GestureSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(600),
            indicator_pulse: Duration::from_millis(200),
            haptic_pulse: Duration::from_millis(10),
            realign_delay: Duration::from_millis(100),
            lazy_margin: 200.0,
            eager_count: 3,
            gestures: GestureSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    ReleaseTransition,
    IndicatorReset,
    Floating(EffectKind),
    Realign,
}

pub struct Controller<U: UiRenderer> {
    state: NavigationState,
    settings: Settings,
    gestures: GestureTracker,
    timers: TimerQueue<Task>,
    ui: U,
    loader: Box<dyn ImageLoader>,
    player: Option<Box<dyn MediaPlayer>>,
    haptics: Option<Box<dyn Haptics>>,
    scroll: ScrollPager,
    flip: Option<FlipPager>,
}

impl<U: UiRenderer> Controller<U> {
    pub fn new(slides: Vec<SlideState>, ui: U, loader: Box<dyn ImageLoader>, settings: Settings) -> Self {
        Self {
            state: NavigationState::new(slides),
            gestures: GestureTracker::new(settings.gestures),
            settings,
            timers: TimerQueue::new(),
            ui,
            loader,
            player: None,
            haptics: None,
            scroll: ScrollPager,
            flip: None,
        }
    }

    pub fn with_player(mut self, player: Box<dyn MediaPlayer>) -> Self {
        self.player = Some(player);
        self
    }

    pub fn with_haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    pub fn with_flip_engine(mut self, engine: Box<dyn FlipEngine>) -> Self {
        self.flip = Some(FlipPager::new(engine));
        self
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn current(&self) -> usize {
        self.state.current
    }

    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    pub fn mode(&self) -> PresentationMode {
        self.state.mode
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.transitioning
    }

    pub fn has_flip_engine(&self) -> bool {
        self.flip.is_some()
    }

    /// Initial paint plus eager loading of the first slides.
    pub fn start(&mut self) {
        self.ui.set_mode(self.state.mode);
        self.ui.apply_zoom_style(self.state.zoom);
        self.ui.set_page_indicator(self.state.page_number());
        self.ui.set_progress(self.state.progress());
        let eager = self.settings.eager_count.min(self.state.slide_count());
        for i in 0..eager {
            self.request(i);
        }
        info!(
            "controller: started with {} slides (eager={eager})",
            self.state.slide_count()
        );
    }

    // -----------------------------------------------------------------------
    // Input dispatch
    // -----------------------------------------------------------------------

    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> Dispatch {
        let dispatch = self.gestures.map_event(event, self.state.zoom, now);
        if dispatch.interaction && dispatch.command != Some(Command::ToggleMusic) {
            self.retry_autoplay();
        }
        if let Some(command) = dispatch.command {
            self.execute(command, now);
        }
        dispatch
    }

    /// Apply a command. Returns whether it changed anything.
    pub fn execute(&mut self, command: Command, now: Instant) -> bool {
        debug!("controller: {command:?} (current={})", self.state.current);
        match command {
            Command::Next => self.next_slide(now),
            Command::Prev => self.prev_slide(now),
            Command::First => self.first_slide(now),
            Command::Last => self.last_slide(now),
            Command::SetZoom(level) => self.set_zoom(level),
            Command::ZoomBy(delta) => self.set_zoom(self.state.zoom + delta),
            Command::ToggleZoom => self.set_zoom(toggled_zoom(self.state.zoom)),
            Command::ToggleMusic => self.toggle_music(),
            Command::ToggleMode => {
                let target = match self.state.mode {
                    PresentationMode::Paged => PresentationMode::FlipBook,
                    PresentationMode::FlipBook => PresentationMode::Paged,
                };
                self.switch_mode(target)
            }
            Command::Realign => {
                self.timers.cancel_where(|t| *t == Task::Realign);
                self.timers.schedule(now, self.settings.realign_delay, Task::Realign);
                true
            }
            Command::Visibility { hidden } => self.set_hidden(hidden),
        }
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn go_to_slide(&mut self, index: usize, now: Instant) -> bool {
        if !self.active_pager_accepts_navigation() {
            debug!("go_to_slide({index}): rejected, {} mode pages itself", self.state.mode);
            return false;
        }
        if self.state.transitioning {
            debug!("go_to_slide({index}): rejected, transition in progress");
            return false;
        }
        if index >= self.state.slide_count() {
            debug!(
                "go_to_slide({index}): out of range (count={})",
                self.state.slide_count()
            );
            return false;
        }

        self.state.transitioning = true;
        let from = self.state.current;
        self.state.current = index;
        self.scroll.show(index, &mut self.ui);
        self.set_zoom(MIN_ZOOM);
        self.update_indicator(now);
        self.prefetch_nearby(index);

        if index > 0 && !self.state.music_playing {
            self.play_music();
        }
        if index == 0 {
            self.celebrate(EffectKind::Hearts, now);
        }
        if index == self.state.last_index() {
            self.celebrate(EffectKind::Confetti, now);
        }
        if let Some(haptics) = self.haptics.as_mut() {
            haptics.pulse(self.settings.haptic_pulse);
        }

        self.timers
            .schedule(now, self.settings.settle_delay, Task::ReleaseTransition);
        debug!("go_to_slide: {from} → {index}");
        true
    }

    pub fn next_slide(&mut self, now: Instant) -> bool {
        self.go_to_slide(self.state.current + 1, now)
    }

    pub fn prev_slide(&mut self, now: Instant) -> bool {
        match self.state.current.checked_sub(1) {
            Some(index) => self.go_to_slide(index, now),
            None => false,
        }
    }

    pub fn first_slide(&mut self, now: Instant) -> bool {
        self.go_to_slide(0, now)
    }

    pub fn last_slide(&mut self, now: Instant) -> bool {
        self.go_to_slide(self.state.last_index(), now)
    }

    fn active_pager_accepts_navigation(&self) -> bool {
        match (self.state.mode, self.flip.as_ref()) {
            (PresentationMode::FlipBook, Some(flip)) => flip.accepts_navigation(),
            _ => self.scroll.accepts_navigation(),
        }
    }

    fn update_indicator(&mut self, now: Instant) {
        self.ui.set_page_indicator(self.state.page_number());
        self.ui.set_progress(self.state.progress());
        self.ui.set_indicator_emphasis(true);
        self.timers.cancel_where(|t| *t == Task::IndicatorReset);
        self.timers
            .schedule(now, self.settings.indicator_pulse, Task::IndicatorReset);
    }

    fn celebrate(&mut self, kind: EffectKind, now: Instant) {
        for i in 0..kind.burst_len() {
            self.timers
                .schedule(now, kind.stagger() * i as u32, Task::Floating(kind));
        }
    }

    // -----------------------------------------------------------------------
    // Zoom
    // -----------------------------------------------------------------------

    pub fn set_zoom(&mut self, level: f64) -> bool {
        let level = clamp_zoom(level);
        let changed = level != self.state.zoom;
        self.state.zoom = level;
        self.ui.apply_zoom_style(level);
        changed
    }

    // -----------------------------------------------------------------------
    // Music
    // -----------------------------------------------------------------------

    fn play_music(&mut self) -> bool {
        let Some(player) = self.player.as_mut() else {
            return false;
        };
        match player.play() {
            Ok(()) => {
                self.state.music_playing = true;
                self.state.autoplay_pending = false;
                info!("music: playing");
                true
            }
            Err(e) => {
                debug!("music: {e}; will retry on next interaction");
                self.state.autoplay_pending = true;
                false
            }
        }
    }

    fn retry_autoplay(&mut self) {
        if self.state.autoplay_pending && !self.state.music_playing && self.player.is_some() {
            self.state.autoplay_pending = false;
            self.play_music();
        }
    }

    pub fn toggle_music(&mut self) -> bool {
        if self.state.music_playing {
            if let Some(player) = self.player.as_mut() {
                player.pause();
            }
            self.state.music_playing = false;
            info!("music: paused");
            true
        } else {
            self.play_music()
        }
    }

    fn set_hidden(&mut self, hidden: bool) -> bool {
        if self.state.hidden == hidden {
            return false;
        }
        self.state.hidden = hidden;
        if !self.state.music_playing {
            return true;
        }
        // The playing flag survives a hide so playback resumes on return.
        if let Some(player) = self.player.as_mut() {
            if hidden {
                player.pause();
            } else if let Err(e) = player.play() {
                debug!("music: resume failed: {e}");
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Presentation mode
    // -----------------------------------------------------------------------

    pub fn switch_mode(&mut self, target: PresentationMode) -> bool {
        if target == self.state.mode {
            return false;
        }
        let count = self.state.slide_count();
        let current = self.state.current;
        match target {
            PresentationMode::FlipBook => {
                let Some(flip) = self.flip.as_mut() else {
                    debug!("mode: flip-book unavailable, staying paged");
                    return false;
                };
                if let Err(e) = flip.attach(count, current, &mut self.ui) {
                    warn!("mode: {e}; staying in paged mode");
                    return false;
                }
            }
            PresentationMode::Paged => {
                if let Some(flip) = self.flip.as_mut()
                    && let Err(e) = flip.detach()
                {
                    warn!("mode: {e}; continuing with paged mode");
                }
                // Scroll attach cannot fail.
                let _ = self.scroll.attach(count, current, &mut self.ui);
            }
        }
        self.state.mode = target;
        self.ui.set_mode(target);
        info!("mode: switched to {target}");
        true
    }

    /// Page-turn notification from the flip engine.
    pub fn on_page_turned(&mut self, index: usize, now: Instant) -> bool {
        if self.state.mode != PresentationMode::FlipBook {
            debug!("page turned to {index} outside flip-book mode, ignored");
            return false;
        }
        if index >= self.state.slide_count() {
            return false;
        }
        self.state.current = index;
        self.update_indicator(now);
        self.prefetch_nearby(index);
        if index > 0 && !self.state.music_playing {
            self.play_music();
        }
        true
    }

    // -----------------------------------------------------------------------
    // Prefetch / lazy loading
    // -----------------------------------------------------------------------

    fn request(&mut self, index: usize) {
        let Some(slide) = self.state.slides.get_mut(index) else {
            return;
        };
        if slide.is_requested() {
            return;
        }
        slide.mark_requested();
        debug!("prefetch: requesting slide {index} ({})", slide.uri);
        self.loader.begin_load(index, &slide.uri);
    }

    fn prefetch_nearby(&mut self, index: usize) {
        for i in [index.wrapping_sub(1), index, index + 1] {
            if i < self.state.slide_count() {
                self.request(i);
            }
        }
    }

    /// Request every slide within the lazy margin of the visible range.
    pub fn on_viewport(&mut self, scroll_x: f64, viewport_width: f64) {
        if viewport_width <= 0.0 {
            return;
        }
        let lo = scroll_x - self.settings.lazy_margin;
        let hi = scroll_x + viewport_width + self.settings.lazy_margin;
        for i in 0..self.state.slide_count() {
            let left = i as f64 * viewport_width;
            let right = left + viewport_width;
            if right > lo && left < hi {
                self.request(i);
            }
        }
    }

    /// Returns true the first time a slide finishes loading.
    pub fn mark_loaded(&mut self, index: usize) -> bool {
        match self.state.slides.get_mut(index) {
            Some(slide) => slide.mark_loaded(),
            None => false,
        }
    }

    /// Forget a failed request so the slide can be requested again.
    pub fn mark_load_failed(&mut self, index: usize) {
        if let Some(slide) = self.state.slides.get_mut(index)
            && !slide.is_loaded()
        {
            *slide = SlideState::new(std::mem::take(&mut slide.uri));
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Run every delayed task due at `now`.
    pub fn tick(&mut self, now: Instant) {
        for task in self.timers.take_due(now) {
            match task {
                Task::ReleaseTransition => {
                    self.state.transitioning = false;
                }
                Task::IndicatorReset => self.ui.set_indicator_emphasis(false),
                Task::Floating(kind) => self.ui.show_floating_effect(kind, 1),
                Task::Realign => {
                    if self.state.mode == PresentationMode::Paged {
                        self.ui.scroll_to_slide(self.state.current, false);
                    }
                }
            }
        }
    }
}
