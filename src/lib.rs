//! A CHIP-8 interpreter core.
//!
//! [`emu::Chip8`] holds the whole machine and is driven from outside: the host calls
//! [`emu::Chip8::cpu_cycle`] at the instruction rate, [`emu::Chip8::timers_cycle`] at
//! 60Hz, pushes key edges, and reads the framebuffer back after stepping.
//! [`emu::Chip8Runner`] does the pacing for hosts that only have a frame delta.

pub mod cli;
pub mod emu;
mod nibble;

pub use nibble::u4;
