//! Input processing layer: crossterm events → navigation input.
//!
//! Pure logic, no I/O. The mouse stands in for a single finger: press,
//! drag and release become touch start / move / end, so click-drag swipes
//! and double-clicks toggle zoom through the same gesture tracker.

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::nav::{Button, Command, InputEvent, Key, Point};

use super::ui::Layout;

/// Actions produced by terminal input processing.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Action {
    Quit,
    /// Feed through the controller's gesture tracker.
    Input(InputEvent),
    /// Bypass gesture interpretation.
    Command(Command),
}

pub(super) fn map_event(event: &Event, layout: &Layout) -> Option<Action> {
    match event {
        Event::Key(key) => map_key_event(*key),
        Event::Mouse(mouse) => map_mouse_event(*mouse, layout),
        Event::Resize(..) => Some(Action::Input(InputEvent::Resize)),
        Event::FocusLost => Some(Action::Input(InputEvent::Visibility { hidden: true })),
        Event::FocusGained => Some(Action::Input(InputEvent::Visibility { hidden: false })),
        _ => None,
    }
}

/// Returns `None` for unbound keys.
pub(super) fn map_key_event(key: KeyEvent) -> Option<Action> {
    let KeyEvent {
        code,
        modifiers,
        kind,
        ..
    } = key;
    if kind == KeyEventKind::Release {
        return None;
    }
    let nav = |k| Some(Action::Input(InputEvent::Key(k)));
    let button = |b| Some(Action::Input(InputEvent::Click { target: Some(b) }));

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Action::Quit),

        (KeyCode::Left, _) | (KeyCode::Char('h'), _) | (KeyCode::PageUp, _) => nav(Key::Left),
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => nav(Key::Up),
        (KeyCode::Right, _) | (KeyCode::Char('l'), _) | (KeyCode::PageDown, _) => nav(Key::Right),
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => nav(Key::Down),
        (KeyCode::Char(' '), _) => nav(Key::Space),
        (KeyCode::Home, _) | (KeyCode::Char('g'), _) => nav(Key::Home),
        (KeyCode::End, _) | (KeyCode::Char('G'), _) => nav(Key::End),

        (KeyCode::Char('r'), _) => button(Button::Restart),
        (KeyCode::Char('m'), _) => button(Button::MusicToggle),
        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => button(Button::ZoomIn),
        (KeyCode::Char('-'), _) => button(Button::ZoomOut),
        (KeyCode::Char('f'), _) => button(Button::ModeToggle),
        (KeyCode::Char('z'), _) => Some(Action::Command(Command::ToggleZoom)),
        (KeyCode::Char('0'), _) => Some(Action::Command(Command::SetZoom(1.0))),

        _ => None,
    }
}

fn cell_center(layout: &Layout, column: u16, row: u16) -> Point {
    Point::new(
        (f64::from(column) + 0.5) * f64::from(layout.cell_w),
        (f64::from(row) + 0.5) * f64::from(layout.cell_h),
    )
}

pub(super) fn map_mouse_event(mouse: MouseEvent, layout: &Layout) -> Option<Action> {
    let point = cell_center(layout, mouse.column, mouse.row);
    let event = match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => InputEvent::TouchStart {
            touches: vec![point],
        },
        MouseEventKind::Drag(MouseButton::Left) => InputEvent::TouchMove {
            touches: vec![point],
        },
        MouseEventKind::Up(MouseButton::Left) => InputEvent::TouchEnd {
            point,
            remaining: 0,
        },
        MouseEventKind::ScrollDown | MouseEventKind::ScrollRight => {
            InputEvent::Wheel { delta_y: 1.0 }
        }
        MouseEventKind::ScrollUp | MouseEventKind::ScrollLeft => {
            InputEvent::Wheel { delta_y: -1.0 }
        }
        _ => return None,
    };
    Some(Action::Input(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::ui::compute_layout;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(map_key_event(key(KeyCode::Char('q'))), Some(Action::Quit));
        let ctrl_c = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('c'))
        };
        assert_eq!(map_key_event(ctrl_c), Some(Action::Quit));
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(
            map_key_event(key(KeyCode::Right)),
            Some(Action::Input(InputEvent::Key(Key::Right)))
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char(' '))),
            Some(Action::Input(InputEvent::Key(Key::Space)))
        );
        assert_eq!(
            map_key_event(key(KeyCode::End)),
            Some(Action::Input(InputEvent::Key(Key::End)))
        );
    }

    #[test]
    fn test_button_keys() {
        assert_eq!(
            map_key_event(key(KeyCode::Char('m'))),
            Some(Action::Input(InputEvent::Click {
                target: Some(Button::MusicToggle)
            }))
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('z'))),
            Some(Action::Command(Command::ToggleZoom))
        );
    }

    #[test]
    fn test_release_and_unbound_ignored() {
        let release = KeyEvent {
            kind: KeyEventKind::Release,
            ..key(KeyCode::Right)
        };
        assert_eq!(map_key_event(release), None);
        assert_eq!(map_key_event(key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_mouse_as_touch() {
        let layout = compute_layout(80, 24, 800, 480);
        match map_mouse_event(mouse(MouseEventKind::Down(MouseButton::Left), 10, 5), &layout) {
            Some(Action::Input(InputEvent::TouchStart { touches })) => {
                assert_eq!(touches, vec![Point::new(105.0, 110.0)]);
            }
            other => panic!("expected TouchStart, got {other:?}"),
        }
        assert!(matches!(
            map_mouse_event(mouse(MouseEventKind::Up(MouseButton::Left), 0, 0), &layout),
            Some(Action::Input(InputEvent::TouchEnd { remaining: 0, .. }))
        ));
        assert_eq!(
            map_mouse_event(mouse(MouseEventKind::ScrollDown, 0, 0), &layout),
            Some(Action::Input(InputEvent::Wheel { delta_y: 1.0 }))
        );
        assert_eq!(map_mouse_event(mouse(MouseEventKind::Moved, 0, 0), &layout), None);
    }
}
