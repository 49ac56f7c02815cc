// Capsesc Key Type
// Key codes from Linux input-event-codes.h

use std::fmt;

/// Represents a single keyboard key code.
///
/// This is a newtype wrapper around u16 for type safety.
/// The numeric values match Linux input-event-codes.h definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Key(pub u16);

impl Key {
    pub const ESC: Key = Key(1);
    pub const A: Key = Key(30);
    pub const LEFT_SHIFT: Key = Key(42);
    pub const CAPSLOCK: Key = Key(58);

    /// Get the raw numeric code value
    pub fn code(self) -> u16 {
        self.0
    }

    /// Get the name of this key, if it is one the daemon cares about
    pub fn name(self) -> Option<&'static str> {
        match self {
            Key::ESC => Some("ESC"),
            Key::A => Some("A"),
            Key::LEFT_SHIFT => Some("LEFT_SHIFT"),
            Key::CAPSLOCK => Some("CAPSLOCK"),
            _ => None,
        }
    }
}

impl From<u16> for Key {
    fn from(code: u16) -> Self {
        Key(code)
    }
}

impl From<Key> for u16 {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "KEY({})", self.0),
        }
    }
}
