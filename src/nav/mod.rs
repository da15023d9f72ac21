//! Slide navigation.
//!
//! Event flow:
//!   host event → [`GestureTracker`] → [`Command`] → [`Controller::execute`]
//!     → collaborator calls ([`UiRenderer`], [`MediaPlayer`], [`Haptics`],
//!       [`ImageLoader`]) + delayed tasks in the controller's timer queue.
//!
//! The controller is single-threaded and owns all navigation state. Time is
//! passed in explicitly; the host drives delayed tasks by calling
//! [`Controller::tick`] no later than [`Controller::next_deadline`].

mod collab;
mod controller;
mod input;
mod pager;
mod state;
mod timer;

pub use collab::{
    EffectKind, FlipEngine, FlipError, Haptics, ImageLoader, MediaPlayer, PlaybackError,
    UiRenderer,
};
pub use controller::{Controller, Settings};
pub use input::{
    Button, Command, Dispatch, GestureSettings, GestureTracker, InputEvent, Key, Point,
    toggled_zoom,
};
pub use pager::{FlipPager, Pager, ScrollPager};
pub use state::{
    MAX_ZOOM, MIN_ZOOM, NavigationState, PresentationMode, SlideState, clamp_zoom,
};
pub use timer::TimerQueue;
