use std::path::PathBuf;

use clap::Args;
use clap_num::{maybe_hex, number_range};

use crate::emu::{Chip8, Chip8Config, Chip8Error, Chip8Runner, RunnerConfig, TIMER_HZ};
use crate::u4;

/// The hex keypad as it is laid out on the original hardware.
pub const KEYPAD_ROWS: [[u4; 4]; 4] = [
    [u4::new(0x1), u4::new(0x2), u4::new(0x3), u4::new(0xC)],
    [u4::new(0x4), u4::new(0x5), u4::new(0x6), u4::new(0xD)],
    [u4::new(0x7), u4::new(0x8), u4::new(0x9), u4::new(0xE)],
    [u4::new(0xA), u4::new(0x0), u4::new(0xB), u4::new(0xF)],
];

/// Keyboard block that stands in for the keypad, row by row.
pub const KEYBOARD_ROWS: [[char; 4]; 4] = [
    ['1', '2', '3', '4'],
    ['q', 'w', 'e', 'r'],
    ['a', 's', 'd', 'f'],
    ['z', 'x', 'c', 'v'],
];

/// Maps a keyboard character to the keypad key in the same grid position.
pub fn keypad_key_for_char(c: char) -> Option<u4> {
    let c = c.to_ascii_lowercase();
    KEYBOARD_ROWS.iter().zip(&KEYPAD_ROWS).find_map(|(chars, keys)| {
        chars.iter().position(|&k| k == c).map(|col| keys[col])
    })
}

/// One-line status for a machine error, telling a halt apart from a rejected load.
pub fn describe_error(e: &Chip8Error) -> String {
    if e.is_fatal() {
        format!("halted: {e}")
    } else {
        e.to_string()
    }
}

/// Options shared by the front-ends.
#[derive(Args, Debug, Clone)]
pub struct MachineArgs {
    /// Path to the CHIP-8 ROM file
    pub rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value = "700", value_parser = parse_cpu_hz)]
    pub cpu_hz: u32,

    /// Seed for the random number generator (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = maybe_hex::<u64>)]
    pub seed: Option<u64>,

    /// Don't store the built-in hex digit font below 0x200
    #[arg(long)]
    pub no_font: bool,
}

fn parse_cpu_hz(s: &str) -> Result<u32, String> {
    number_range(s, 1, 100_000)
}

impl MachineArgs {
    pub fn chip8_config(&self) -> Chip8Config {
        Chip8Config {
            seed: self.seed,
            builtin_font: !self.no_font,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            cpu_hz: self.cpu_hz as f32,
            timer_hz: TIMER_HZ,
        }
    }

    /// Builds a runner with `rom` loaded.
    pub fn build_runner(&self, rom: &[u8]) -> Result<Chip8Runner, Chip8Error> {
        let mut runner = Chip8Runner::new(
            Chip8::with_config(self.chip8_config()),
            self.runner_config(),
        );
        runner.load(rom)?;
        Ok(runner)
    }
}
