use super::{Chip8, Chip8Error, Chip8Result, FrameBuffer};
use crate::u4;

pub const DEFAULT_CPU_HZ: f32 = 700.0;
pub const TIMER_HZ: f32 = 60.0;

/// Tick rates used by [`Chip8Runner`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Instructions per second.
    pub cpu_hz: f32,
    /// Timer decrements per second.
    pub timer_hz: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cpu_hz: DEFAULT_CPU_HZ,
            timer_hz: TIMER_HZ,
        }
    }
}

/// What happened during a [`Chip8Runner::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8RunnerResult {
    Ok,
    /// The program is blocked on FX0A.
    WaitingForKey,
    /// The machine is halted and needs a reset.
    Halted,
}

/// High-level emulator runner that manages timing internally.
pub struct Chip8Runner {
    chip8: Chip8,
    config: RunnerConfig,
    rom: Vec<u8>,
    cpu_dt_accumulator: f32,
    timer_dt_accumulator: f32,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8, config: RunnerConfig) -> Self {
        Self {
            chip8,
            config,
            rom: Vec::new(),
            cpu_dt_accumulator: 0.0,
            timer_dt_accumulator: 0.0,
        }
    }

    /// Loads a program and remembers it so that [`Chip8Runner::restart`] can reload it.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.chip8.load(rom)?;
        self.rom = rom.to_vec();
        Ok(())
    }

    /// Resets the machine and reloads the last program.
    pub fn restart(&mut self) -> Result<(), Chip8Error> {
        self.chip8.reset();
        self.cpu_dt_accumulator = 0.0;
        self.timer_dt_accumulator = 0.0;
        self.chip8.load(&self.rom)
    }

    /// Update emulator by delta time, handles both CPU and timer cycles.
    ///
    /// Runs as many CPU cycles and timer updates as needed based on the elapsed time `dt`.
    /// Returns early if a frame has to be rendered before the next CPU cycle.
    /// A fault is returned once, after which the runner reports [`Chip8RunnerResult::Halted`].
    pub fn update(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        let cpu_time_step = 1.0 / self.config.cpu_hz;
        let timer_time_step = 1.0 / self.config.timer_hz;

        self.cpu_dt_accumulator += dt;
        self.timer_dt_accumulator += dt;

        while self.timer_dt_accumulator >= timer_time_step {
            self.timer_dt_accumulator -= timer_time_step;
            self.chip8.timers_cycle();
        }

        while self.cpu_dt_accumulator >= cpu_time_step {
            self.cpu_dt_accumulator -= cpu_time_step;

            match self.chip8.cpu_cycle()? {
                Chip8Result::WaitForNextFrame => {
                    // If we need to wait for the next frame we stop executing cycles.
                    // We clear the accumulator to avoid "catching up" in the next frame.
                    self.cpu_dt_accumulator = 0.0;
                    break;
                }
                Chip8Result::Waiting | Chip8Result::Halted => {
                    self.cpu_dt_accumulator = 0.0;
                    break;
                }
                Chip8Result::Continue => {}
            }
        }

        Ok(if self.chip8.is_halted() {
            Chip8RunnerResult::Halted
        } else if self.chip8.is_waiting() {
            Chip8RunnerResult::WaitingForKey
        } else {
            Chip8RunnerResult::Ok
        })
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    pub fn display(&self) -> &FrameBuffer {
        self.chip8.display()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::Chip8Config;

    fn runner(program: &[u8], cpu_hz: f32) -> Chip8Runner {
        let chip8 = Chip8::with_config(Chip8Config {
            seed: Some(3),
            builtin_font: true,
        });
        let mut runner = Chip8Runner::new(
            chip8,
            RunnerConfig {
                cpu_hz,
                timer_hz: TIMER_HZ,
            },
        );
        runner.load(program).unwrap();
        runner
    }

    #[test]
    fn runs_instructions_at_configured_rate() {
        // 7001 in a loop: V0 += 1; jump back
        let mut runner = runner(&[0x70, 0x01, 0x12, 0x00], 100.0);

        // 0.1s at 100Hz is 10 instructions, 5 of them adds
        runner.update(0.105).unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 5);
    }

    #[test]
    fn ticks_timers_at_60hz() {
        let mut runner = runner(&[0x12, 0x00], 10.0);
        runner.chip8_mut().timers.delay = 100;

        for _ in 0..10 {
            runner.update(0.1).unwrap();
        }
        assert!((39..=41).contains(&runner.chip8_ref().delay_timer()));
    }

    #[test]
    fn draw_ends_the_batch() {
        // Draw, then an add that should wait for the next update
        let mut runner = runner(&[0xD0, 0x01, 0x71, 0x01], 1000.0);

        runner.update(0.01).unwrap();
        assert_eq!(runner.chip8_ref().v()[1], 0);
        assert_eq!(runner.chip8_ref().pc(), 0x202);
    }

    #[test]
    fn fault_is_reported_once_then_halted() {
        let mut runner = runner(&[0x00, 0xEE], 100.0);

        assert!(matches!(
            runner.update(0.05),
            Err(Chip8Error::StackUnderflow { pc: 0x200 })
        ));
        assert_eq!(runner.update(0.05), Ok(Chip8RunnerResult::Halted));
    }

    #[test]
    fn waiting_for_key_then_resume() {
        let mut runner = runner(&[0xF2, 0x0A, 0x12, 0x02], 100.0);

        assert_eq!(runner.update(0.05), Ok(Chip8RunnerResult::WaitingForKey));
        runner.set_key(u4::new(0xE), true);
        runner.set_key(u4::new(0xE), false);

        assert_eq!(runner.update(0.05), Ok(Chip8RunnerResult::Ok));
        assert_eq!(runner.chip8_ref().v()[2], 0xE);
    }

    #[test]
    fn restart_reloads_program() {
        let mut runner = runner(&[0x65, 0x07, 0x12, 0x02], 100.0);
        runner.update(0.05).unwrap();
        runner.chip8_mut().memory[0x200] = 0x00;

        runner.restart().unwrap();
        assert_eq!(runner.chip8_ref().pc(), 0x200);
        assert_eq!(runner.chip8_ref().v()[5], 0);
        assert_eq!(runner.chip8_ref().memory()[0x200], 0x65);
    }
}
