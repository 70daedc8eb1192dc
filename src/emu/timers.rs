/// Delay and sound countdowns, decremented by the host's 60 Hz tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    pub delay: u8,
    pub sound: u8,
}

impl Timers {
    pub fn tick(&mut self) {
        self.delay = self.delay.saturating_sub(1);
        self.sound = self.sound.saturating_sub(1);
    }

    /// The host should sound a tone while this is true.
    pub fn is_sounding(&self) -> bool {
        self.sound > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_decrements_both_and_floors_at_zero() {
        let mut timers = Timers { delay: 2, sound: 1 };

        timers.tick();
        assert_eq!(timers, Timers { delay: 1, sound: 0 });
        assert!(!timers.is_sounding());

        timers.tick();
        timers.tick();
        assert_eq!(timers, Timers::default());
    }
}
