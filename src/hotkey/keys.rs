//! Key names and press latching for the `rdev` listener.

use super::HotkeyEvent;

// ---------------------------------------------------------------------------
// KeyLatch
// ---------------------------------------------------------------------------

/// One event per physical press of `key`.
#[derive(Debug)]
pub struct KeyLatch {
    key: rdev::Key,
    held: bool,
}

impl KeyLatch {
    pub fn new(key: rdev::Key) -> Self {
        Self { key, held: false }
    }

    pub fn on_event(&mut self, event: &rdev::EventType) -> Option<HotkeyEvent> {
        match event {
            rdev::EventType::KeyPress(k) if *k == self.key => {
                if self.held {
                    return None;
                }
                self.held = true;
                Some(HotkeyEvent::ToggleStreaming)
            }
            rdev::EventType::KeyRelease(k) if *k == self.key => {
                self.held = false;
                None
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Map a key name from the config file to an [`rdev::Key`].
///
/// Names are case-insensitive: `F1`–`F12`, common named keys, ASCII letters
/// and digits.  Unknown names yield `None`.
///
/// ```
/// use webchat_client::hotkey::parse_key;
///
/// assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
/// assert_eq!(parse_key("esc"), Some(rdev::Key::Escape));
/// assert_eq!(parse_key("s"), Some(rdev::Key::KeyS));
/// assert_eq!(parse_key("Ctrl+S"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key::*;

    let key = match name.trim().to_ascii_lowercase().as_str() {
        "f1" => F1,
        "f2" => F2,
        "f3" => F3,
        "f4" => F4,
        "f5" => F5,
        "f6" => F6,
        "f7" => F7,
        "f8" => F8,
        "f9" => F9,
        "f10" => F10,
        "f11" => F11,
        "f12" => F12,

        "escape" | "esc" => Escape,
        "space" => Space,
        "return" | "enter" => Return,
        "tab" => Tab,
        "backspace" => Backspace,
        "delete" | "del" => Delete,
        "insert" | "ins" => Insert,
        "home" => Home,
        "end" => End,
        "pageup" => PageUp,
        "pagedown" => PageDown,
        "up" | "uparrow" => UpArrow,
        "down" | "downarrow" => DownArrow,
        "left" | "leftarrow" => LeftArrow,
        "right" | "rightarrow" => RightArrow,
        "capslock" => CapsLock,
        "scrolllock" => ScrollLock,
        "pause" => Pause,
        "printscreen" => PrintScreen,

        "0" => Num0,
        "1" => Num1,
        "2" => Num2,
        "3" => Num3,
        "4" => Num4,
        "5" => Num5,
        "6" => Num6,
        "7" => Num7,
        "8" => Num8,
        "9" => Num9,

        "a" => KeyA,
        "b" => KeyB,
        "c" => KeyC,
        "d" => KeyD,
        "e" => KeyE,
        "f" => KeyF,
        "g" => KeyG,
        "h" => KeyH,
        "i" => KeyI,
        "j" => KeyJ,
        "k" => KeyK,
        "l" => KeyL,
        "m" => KeyM,
        "n" => KeyN,
        "o" => KeyO,
        "p" => KeyP,
        "q" => KeyQ,
        "r" => KeyR,
        "s" => KeyS,
        "t" => KeyT,
        "u" => KeyU,
        "v" => KeyV,
        "w" => KeyW,
        "x" => KeyX,
        "y" => KeyY,
        "z" => KeyZ,

        _ => return None,
    };
    Some(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::EventType::{KeyPress, KeyRelease};
    use rdev::Key;

    #[test]
    fn function_keys_any_case() {
        assert_eq!(parse_key("F9"), Some(Key::F9));
        assert_eq!(parse_key("f1"), Some(Key::F1));
        assert_eq!(parse_key(" F12 "), Some(Key::F12));
    }

    #[test]
    fn named_keys_and_aliases() {
        assert_eq!(parse_key("Escape"), Some(Key::Escape));
        assert_eq!(parse_key("Esc"), Some(Key::Escape));
        assert_eq!(parse_key("Enter"), Some(Key::Return));
        assert_eq!(parse_key("PageDown"), Some(Key::PageDown));
    }

    #[test]
    fn letters_and_digits() {
        assert_eq!(parse_key("A"), Some(Key::KeyA));
        assert_eq!(parse_key("z"), Some(Key::KeyZ));
        assert_eq!(parse_key("7"), Some(Key::Num7));
    }

    #[test]
    fn unknown_names() {
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("xyz"), None);
        assert_eq!(parse_key("Ctrl+V"), None);
    }

    #[test]
    fn latch_fires_once_per_press() {
        let mut latch = KeyLatch::new(Key::F9);

        assert_eq!(latch.on_event(&KeyPress(Key::F9)), Some(HotkeyEvent::ToggleStreaming));
        // auto-repeat
        assert_eq!(latch.on_event(&KeyPress(Key::F9)), None);
        assert_eq!(latch.on_event(&KeyPress(Key::F9)), None);
        assert_eq!(latch.on_event(&KeyRelease(Key::F9)), None);

        assert_eq!(latch.on_event(&KeyPress(Key::F9)), Some(HotkeyEvent::ToggleStreaming));
    }

    #[test]
    fn latch_ignores_other_keys() {
        let mut latch = KeyLatch::new(Key::F9);
        assert_eq!(latch.on_event(&KeyPress(Key::F8)), None);
        assert_eq!(latch.on_event(&KeyRelease(Key::F8)), None);
        assert_eq!(latch.on_event(&rdev::EventType::MouseMove { x: 1.0, y: 2.0 }), None);
    }
}
