/// Result type for CHIP-8 CPU cycle execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions in the current frame.
    Continue,
    /// Wait for the next frame before continuing
    /// (e.g., after a draw instruction to limit the display update rate to the frame rate).
    WaitForNextFrame,
    /// Nothing was executed: the machine is suspended until a key is released.
    Waiting,
    /// Nothing was executed: the machine hit a fault and needs a reset.
    Halted,
}

/// Error types that can occur during CHIP-8 emulation.
///
/// Everything except [`Chip8Error::ProgramTooLarge`] is fatal and halts the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("Program is too large ({size} bytes), max size is {max_size} bytes")]
    ProgramTooLarge { size: usize, max_size: usize },

    #[error("Instruction fetch out of bounds at address {pc:#06X}")]
    OutOfBoundsFetch { pc: u16 },

    #[error("Stack overflow: call at {pc:#06X} exceeds the maximum call depth")]
    StackOverflow { pc: u16 },

    #[error("Stack underflow: return at {pc:#06X} with empty call stack")]
    StackUnderflow { pc: u16 },

    #[error("Illegal instruction {opcode:#06X} at address {pc:#06X}")]
    IllegalInstruction { opcode: u16, pc: u16 },

    #[error("Opcode {opcode:#06X} accesses memory out of bounds (I = {index:#06X})")]
    IndexOutOfBounds { opcode: u16, index: u16 },
}

impl Chip8Error {
    /// Returns true if this error stops the machine until it is reset.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Chip8Error::ProgramTooLarge { .. })
    }
}

/// Execution state of the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Running,
    /// FX0A is pending; the released key's index goes into Vx.
    Waiting { x: crate::u4 },
    Halted,
}

/// Machine construction options, preserved across `reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chip8Config {
    /// Seed for the CXNN random source; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Store the hex digit glyphs at the bottom of memory on power-on.
    pub builtin_font: bool,
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];
