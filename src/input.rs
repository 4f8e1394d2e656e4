//! Translates keyboard events into the joypad state of the device.

use m8_oxide_service::Keys;
use sdl2::event::Event;
use sdl2::keyboard::{Keycode, Mod};

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleFullscreen,
    /// The set of held keys changed.
    Controller(Keys),
}

fn key_for(keycode: Keycode) -> Option<Keys> {
    let key = match keycode {
        Keycode::Right | Keycode::Kp6 => Keys::RIGHT,
        Keycode::Left | Keycode::Kp4 => Keys::LEFT,
        Keycode::Up | Keycode::Kp8 => Keys::UP,
        Keycode::Down | Keycode::Kp2 => Keys::DOWN,
        Keycode::X | Keycode::M => Keys::EDIT,
        Keycode::Z | Keycode::N => Keys::OPT,
        Keycode::Space => Keys::START,
        Keycode::LShift | Keycode::RShift => Keys::SELECT,
        _ => return None,
    };
    Some(key)
}

pub struct Input {
    held: Keys,
}

impl Input {
    pub fn new() -> Self {
        Self {
            held: Keys::empty(),
        }
    }

    pub fn handle(&mut self, event: &Event) -> Option<Action> {
        match *event {
            Event::Quit { .. } => Some(Action::Quit),
            Event::KeyUp {
                keycode: Some(Keycode::Return),
                keymod,
                ..
            } if keymod.intersects(Mod::LALTMOD | Mod::RALTMOD) => Some(Action::ToggleFullscreen),
            Event::KeyUp {
                keycode: Some(Keycode::Q),
                ..
            } => Some(Action::Quit),
            Event::KeyDown {
                keycode: Some(keycode),
                repeat: false,
                ..
            } => self.update(keycode, true),
            Event::KeyUp {
                keycode: Some(keycode),
                ..
            } => self.update(keycode, false),
            _ => None,
        }
    }

    fn update(&mut self, keycode: Keycode, pressed: bool) -> Option<Action> {
        let key = key_for(keycode)?;
        let held = if pressed {
            self.held | key
        } else {
            self.held - key
        };
        if held == self.held {
            return None;
        }
        self.held = held;
        Some(Action::Controller(held))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_down(keycode: Keycode) -> Event {
        Event::KeyDown {
            timestamp: 0,
            window_id: 0,
            keycode: Some(keycode),
            scancode: None,
            keymod: Mod::empty(),
            repeat: false,
        }
    }

    fn key_up(keycode: Keycode, keymod: Mod) -> Event {
        Event::KeyUp {
            timestamp: 0,
            window_id: 0,
            keycode: Some(keycode),
            scancode: None,
            keymod,
            repeat: false,
        }
    }

    #[test]
    fn held_keys_accumulate() {
        let mut input = Input::new();
        assert_eq!(
            input.handle(&key_down(Keycode::Left)),
            Some(Action::Controller(Keys::LEFT))
        );
        assert_eq!(
            input.handle(&key_down(Keycode::X)),
            Some(Action::Controller(Keys::LEFT | Keys::EDIT))
        );
        assert_eq!(
            input.handle(&key_up(Keycode::Left, Mod::empty())),
            Some(Action::Controller(Keys::EDIT))
        );
    }

    #[test]
    fn unchanged_state_is_not_sent() {
        let mut input = Input::new();
        assert_eq!(input.handle(&key_up(Keycode::Space, Mod::empty())), None);
        assert_eq!(input.handle(&key_down(Keycode::F1)), None);
        input.handle(&key_down(Keycode::Kp8));
        assert_eq!(input.handle(&key_down(Keycode::Up)), None);
    }

    #[test]
    fn window_actions() {
        let mut input = Input::new();
        assert_eq!(
            input.handle(&key_up(Keycode::Return, Mod::LALTMOD)),
            Some(Action::ToggleFullscreen)
        );
        assert_eq!(
            input.handle(&key_up(Keycode::Q, Mod::empty())),
            Some(Action::Quit)
        );
        assert_eq!(input.handle(&Event::Quit { timestamp: 0 }), Some(Action::Quit));
    }
}
