//! Input processing layer: raw gestures, keys and wheel deltas → `Command`.
//!
//! Pure logic, no I/O. The only state kept here is what a gesture needs
//! across events (touch start, active pinch, last tap time).

use std::time::{Duration, Instant};

use log::debug;

use super::state::{MAX_ZOOM, MIN_ZOOM, clamp_zoom};

/// A touch point in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Space,
    Home,
    End,
    Other,
}

/// On-page controls. Each one is optional; a page without a given button
/// simply never produces its click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Restart,
    MusicToggle,
    ZoomIn,
    ZoomOut,
    ModeToggle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    TouchStart { touches: Vec<Point> },
    TouchMove { touches: Vec<Point> },
    /// `remaining` is the number of fingers still down after this one lifted.
    TouchEnd { point: Point, remaining: usize },
    Key(Key),
    Wheel { delta_y: f64 },
    /// A click anywhere on the page; `target` is set when it hit a control.
    Click { target: Option<Button> },
    Resize,
    Visibility { hidden: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Next,
    Prev,
    First,
    Last,
    SetZoom(f64),
    ZoomBy(f64),
    ToggleZoom,
    ToggleMusic,
    ToggleMode,
    Realign,
    Visibility { hidden: bool },
}

/// Result of feeding one event through the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dispatch {
    pub command: Option<Command>,
    /// The host should suppress its default handling (native scroll, browser zoom).
    pub prevent_default: bool,
    /// The event came from the user (counts for the autoplay retry).
    pub interaction: bool,
}

impl Dispatch {
    fn none() -> Self {
        Self::default()
    }

    fn command(command: Command) -> Self {
        Self {
            command: Some(command),
            prevent_default: true,
            interaction: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GestureSettings {
    /// Minimum horizontal travel for a swipe (exclusive).
    pub swipe_threshold: f64,
    /// Zoom change per pixel of pinch distance change.
    pub pinch_scale: f64,
    pub double_tap_window: Duration,
    /// A touch that travels less than this counts as a tap.
    pub tap_slop: f64,
    pub zoom_step: f64,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            swipe_threshold: 50.0,
            pinch_scale: 0.01,
            double_tap_window: Duration::from_millis(300),
            tap_slop: 10.0,
            zoom_step: 0.5,
        }
    }
}

struct Pinch {
    start_distance: f64,
    base_zoom: f64,
}

pub struct GestureTracker {
    settings: GestureSettings,
    start: Option<Point>,
    pinch: Option<Pinch>,
    /// Set from pinch start until every finger has lifted; swipes are
    /// suppressed meanwhile.
    pinch_latched: bool,
    last_tap: Option<Instant>,
}

impl GestureTracker {
    pub fn new(settings: GestureSettings) -> Self {
        Self {
            settings,
            start: None,
            pinch: None,
            pinch_latched: false,
            last_tap: None,
        }
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    /// Map an input event to a dispatch decision.
    ///
    /// `zoom` is the controller's current zoom level, used as the base of a
    /// new pinch.
    pub fn map_event(&mut self, event: &InputEvent, zoom: f64, now: Instant) -> Dispatch {
        match event {
            InputEvent::TouchStart { touches } => {
                match touches.as_slice() {
                    [] => {}
                    [p] => {
                        if !self.pinch_latched {
                            self.start = Some(*p);
                        }
                    }
                    [a, b, ..] => {
                        debug!("gesture: pinch start zoom={zoom:.2}");
                        self.pinch = Some(Pinch {
                            start_distance: a.distance(*b),
                            base_zoom: zoom,
                        });
                        self.pinch_latched = true;
                        self.start = None;
                    }
                }
                Dispatch::none()
            }

            InputEvent::TouchMove { touches } => match (touches.as_slice(), &self.pinch) {
                ([a, b, ..], Some(pinch)) => {
                    let delta = a.distance(*b) - pinch.start_distance;
                    let level = clamp_zoom(pinch.base_zoom + delta * self.settings.pinch_scale);
                    Dispatch {
                        command: Some(Command::SetZoom(level)),
                        prevent_default: true,
                        interaction: false,
                    }
                }
                ([p], None) => {
                    // Horizontal drags must not scroll the page natively.
                    let prevent = self.start.is_some_and(|s| {
                        (p.x - s.x).abs() > (p.y - s.y).abs()
                    });
                    Dispatch {
                        command: None,
                        prevent_default: prevent,
                        interaction: false,
                    }
                }
                _ => Dispatch::none(),
            },

            InputEvent::TouchEnd { point, remaining } => {
                if self.pinch_latched {
                    if *remaining < 2 {
                        self.pinch = None;
                    }
                    if *remaining == 0 {
                        debug!("gesture: pinch released");
                        self.pinch_latched = false;
                    }
                    self.start = None;
                    return Dispatch::none();
                }
                let Some(start) = self.start.take() else {
                    return Dispatch::none();
                };
                self.touch_end(start, *point, now)
            }

            InputEvent::Key(key) => match key {
                Key::Left | Key::Up => Dispatch::command(Command::Prev),
                Key::Right | Key::Down | Key::Space => Dispatch::command(Command::Next),
                Key::Home => Dispatch::command(Command::First),
                Key::End => Dispatch::command(Command::Last),
                Key::Other => Dispatch {
                    command: None,
                    prevent_default: false,
                    interaction: true,
                },
            },

            InputEvent::Wheel { delta_y } => {
                if *delta_y < 0.0 {
                    Dispatch::command(Command::Prev)
                } else if *delta_y > 0.0 {
                    Dispatch::command(Command::Next)
                } else {
                    Dispatch::none()
                }
            }

            InputEvent::Click { target } => {
                let command = target.map(|button| match button {
                    Button::Restart => Command::First,
                    Button::MusicToggle => Command::ToggleMusic,
                    Button::ZoomIn => Command::ZoomBy(self.settings.zoom_step),
                    Button::ZoomOut => Command::ZoomBy(-self.settings.zoom_step),
                    Button::ModeToggle => Command::ToggleMode,
                });
                Dispatch {
                    command,
                    prevent_default: false,
                    interaction: true,
                }
            }

            InputEvent::Resize => Dispatch {
                command: Some(Command::Realign),
                prevent_default: false,
                interaction: false,
            },

            InputEvent::Visibility { hidden } => Dispatch {
                command: Some(Command::Visibility { hidden: *hidden }),
                prevent_default: false,
                interaction: false,
            },
        }
    }

    fn touch_end(&mut self, start: Point, end: Point, now: Instant) -> Dispatch {
        let dx = start.x - end.x;
        let dy = (start.y - end.y).abs();

        if dx.abs() > self.settings.swipe_threshold && dx.abs() > dy {
            self.last_tap = None;
            let command = if dx > 0.0 { Command::Next } else { Command::Prev };
            debug!("gesture: swipe dx={dx:.0} dy={dy:.0} → {command:?}");
            return Dispatch {
                command: Some(command),
                prevent_default: false,
                interaction: true,
            };
        }

        if dx.abs() > self.settings.tap_slop || dy > self.settings.tap_slop {
            // A short drag: neither a swipe nor a tap.
            return Dispatch {
                command: None,
                prevent_default: false,
                interaction: true,
            };
        }

        match self.last_tap {
            Some(prev) if now.saturating_duration_since(prev) <= self.settings.double_tap_window => {
                self.last_tap = None;
                debug!("gesture: double tap");
                Dispatch::command(Command::ToggleZoom)
            }
            _ => {
                self.last_tap = Some(now);
                Dispatch {
                    command: None,
                    prevent_default: false,
                    interaction: true,
                }
            }
        }
    }
}

/// Zoom level after a double tap.
pub fn toggled_zoom(level: f64) -> f64 {
    if level > MIN_ZOOM { MIN_ZOOM } else { 2.0f64.min(MAX_ZOOM) }
}
