//! Decode fuzzer bytes into a timed input script and replay it against a
//! controller, checking state invariants after every step.

use std::time::{Duration, Instant};

use folio::nav::{
    Button, Controller, EffectKind, FlipEngine, FlipError, ImageLoader, InputEvent, Key,
    MAX_ZOOM, MIN_ZOOM, MediaPlayer, PlaybackError, Point, PresentationMode, Settings,
    SlideState, UiRenderer,
};

pub struct Step {
    pub advance: Duration,
    pub event: InputEvent,
}

fn point(a: u8, b: u8) -> Point {
    Point::new(f64::from(a) * 4.0, f64::from(b) * 4.0)
}

/// First byte: slide count (1..=32). Then 4 bytes per step.
pub fn decode(data: &[u8]) -> Option<(usize, Vec<Step>)> {
    let (&first, rest) = data.split_first()?;
    let count = usize::from(first % 32) + 1;
    let steps = rest
        .chunks_exact(4)
        .map(|c| {
            let event = match c[0] % 12 {
                0 => InputEvent::TouchStart {
                    touches: vec![point(c[1], c[2])],
                },
                1 => InputEvent::TouchStart {
                    touches: vec![point(c[1], 0), point(c[2], 0)],
                },
                2 => InputEvent::TouchMove {
                    touches: vec![point(c[1], c[2])],
                },
                3 => InputEvent::TouchMove {
                    touches: vec![point(c[1], 0), point(c[2], 0)],
                },
                4 => InputEvent::TouchEnd {
                    point: point(c[1], c[2]),
                    remaining: usize::from(c[3] % 3),
                },
                5 => InputEvent::Key(match c[1] % 8 {
                    0 => Key::Left,
                    1 => Key::Right,
                    2 => Key::Up,
                    3 => Key::Down,
                    4 => Key::Space,
                    5 => Key::Home,
                    6 => Key::End,
                    _ => Key::Other,
                }),
                6 => InputEvent::Wheel {
                    delta_y: f64::from(c[1] as i8),
                },
                7 => InputEvent::Click {
                    target: match c[1] % 6 {
                        0 => Some(Button::Restart),
                        1 => Some(Button::MusicToggle),
                        2 => Some(Button::ZoomIn),
                        3 => Some(Button::ZoomOut),
                        4 => Some(Button::ModeToggle),
                        _ => None,
                    },
                },
                8 => InputEvent::Resize,
                9 => InputEvent::Visibility {
                    hidden: c[1] % 2 == 0,
                },
                // Flip-engine page turns are replayed through on_page_turned.
                _ => InputEvent::Key(Key::Other),
            };
            Step {
                advance: Duration::from_millis(u64::from(c[3]) * 8),
                event,
            }
        })
        .collect();
    Some((count, steps))
}

pub struct NullUi;

impl UiRenderer for NullUi {
    fn set_page_indicator(&mut self, _page: usize) {}
    fn set_progress(&mut self, fraction: f64) {
        assert!((0.0..=1.0).contains(&fraction), "progress {fraction}");
    }
    fn scroll_to_slide(&mut self, _index: usize, _animated: bool) {}
    fn apply_zoom_style(&mut self, level: f64) {
        assert!((MIN_ZOOM..=MAX_ZOOM).contains(&level), "zoom {level}");
    }
    fn set_mode(&mut self, _mode: PresentationMode) {}
    fn show_floating_effect(&mut self, _kind: EffectKind, _count: usize) {}
}

struct NullLoader;

impl ImageLoader for NullLoader {
    fn begin_load(&mut self, _index: usize, _uri: &str) {}
}

/// Rejects the first play, like a browser before any user gesture.
#[derive(Default)]
struct ShyPlayer {
    attempts: usize,
    playing: bool,
}

impl MediaPlayer for ShyPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        self.attempts += 1;
        if self.attempts == 1 {
            return Err(PlaybackError::Rejected("no gesture yet".into()));
        }
        self.playing = true;
        Ok(())
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
}

struct NullFlip;

impl FlipEngine for NullFlip {
    fn open(&mut self, _page_count: usize, _start: usize) -> Result<(), FlipError> {
        Ok(())
    }
    fn destroy(&mut self) -> Result<(), FlipError> {
        Ok(())
    }
}

pub fn replay(count: usize, steps: &[Step], raw: &[u8]) -> Controller<NullUi> {
    let slides = (0..count)
        .map(|i| SlideState::new(format!("https://fuzz.invalid/{i}.png")))
        .collect();
    let mut c = Controller::new(slides, NullUi, Box::new(NullLoader), Settings::default())
        .with_player(Box::new(ShyPlayer::default()))
        .with_flip_engine(Box::new(NullFlip));
    c.start();

    let mut now = Instant::now();
    for (i, step) in steps.iter().enumerate() {
        now += step.advance;
        c.tick(now);
        // Bytes that decode to Key::Other double as flip-engine page turns.
        if let InputEvent::Key(Key::Other) = step.event {
            let page = raw.get(1 + i * 4 + 1).copied().unwrap_or(0);
            c.on_page_turned(usize::from(page) % (count + 1), now);
        } else {
            c.handle_input(&step.event, now);
        }
        check(&c);
    }
    now += Duration::from_secs(10);
    c.tick(now);
    assert!(!c.is_transitioning(), "transition never released");
    assert_eq!(c.pending_timers(), 0, "timers left after settling");
    c
}

fn check(c: &Controller<NullUi>) {
    let state = c.state();
    assert!(state.current < state.slide_count());
    assert!((MIN_ZOOM..=MAX_ZOOM).contains(&state.zoom));
    let expected = (state.current + 1) as f64 / state.slide_count() as f64;
    assert!((state.progress() - expected).abs() < 1e-9);
    for slide in &state.slides {
        assert!(!slide.is_loaded() || slide.is_requested());
    }
}
