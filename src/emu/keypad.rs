use crate::u4;

/// Edge-triggered state of the 16-key hex keypad.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keypad {
    keys: [bool; 16],
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as held. Ids outside 0x0-0xF are ignored.
    pub fn press(&mut self, key: u8) {
        if let Ok(key) = u4::try_from(key) {
            self.keys[key] = true;
        }
    }

    /// Marks `key` as released.
    ///
    /// Returns the key index only on a real release edge, i.e. the key was held before.
    pub fn lift(&mut self, key: u8) -> Option<u4> {
        let key = u4::try_from(key).ok()?;
        let was_pressed = std::mem::replace(&mut self.keys[key], false);
        was_pressed.then_some(key)
    }

    /// Index-based lookup; values above 0xF never match a key.
    pub fn is_pressed(&self, key: u8) -> bool {
        u4::try_from(key).is_ok_and(|key| self.keys[key])
    }

    pub fn keys(&self) -> &[bool; 16] {
        &self.keys
    }
}
