use log::{debug, trace, warn};
use rand::{SeedableRng, rngs::StdRng};

use super::{
    Chip8Config, Chip8Error, Chip8Result, ExecState, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS,
    FrameBuffer, Keypad, Opcode, Timers,
};
use crate::u4;

// Fixed by the CHIP-8 memory layout
pub(crate) const ROM_START_ADDRESS: usize = 0x200;
pub(crate) const MEMORY_SIZE: usize = 4096;
pub(crate) const STACK_DEPTH: usize = 16;
/// Largest program that fits between the ROM start address and the end of memory.
pub const MAX_PROGRAM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: FrameBuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns, at most `STACK_DEPTH` entries
    pub(crate) stack: Vec<u16>,

    pub(crate) timers: Timers,
    pub(crate) keypad: Keypad,

    pub(crate) state: ExecState,
    /// The fault that halted the machine, kept until reset
    pub(crate) fault: Option<Chip8Error>,

    pub(crate) rng: StdRng,
    config: Chip8Config,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_config(Chip8Config::default())
    }

    pub fn with_config(config: Chip8Config) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            display: FrameBuffer::new(),
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: Vec::with_capacity(STACK_DEPTH),
            timers: Timers::default(),
            keypad: Keypad::new(),
            state: ExecState::Running,
            fault: None,
            rng: Self::make_rng(config.seed),
            config,
        };

        if config.builtin_font {
            chip8.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        }

        chip8
    }

    fn make_rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Loads a program into memory at 0x200 and points the program counter at it.
    ///
    /// Everything else is left as is; call [`Chip8::reset`] first for a clean machine.
    /// A program that doesn't fit is rejected without touching any state.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::ProgramTooLarge {
                size: rom.len(),
                max_size: MAX_PROGRAM_SIZE,
            })?
            .copy_from_slice(rom);

        // Set program counter to start of ROM
        self.pc = ROM_START_ADDRESS as u16;
        self.state = ExecState::Running;
        self.fault = None;

        debug!("Loaded {} byte program at {:#05X}", rom.len(), ROM_START_ADDRESS);
        Ok(())
    }

    /// Returns the machine to its power-on state, aborting any pending wait or halt.
    pub fn reset(&mut self) {
        *self = Self::with_config(self.config);
        debug!("Machine reset");
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    ///
    /// Does nothing while waiting for a key or after a fault. A fault halts the
    /// machine and is returned once; later cycles report [`Chip8Result::Halted`].
    pub fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        match self.state {
            ExecState::Halted => return Ok(Chip8Result::Halted),
            ExecState::Waiting { .. } => return Ok(Chip8Result::Waiting),
            ExecState::Running => {}
        }

        let result = match self.fetch() {
            Ok(raw) => {
                let opcode = Opcode::decode(raw);
                trace!("{:#05X}: {raw:04X} {opcode:?}", self.pc);
                self.execute(raw, opcode)
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.halt(e.clone());
        }
        result
    }

    /// Updates the delay and sound timers. Should be called at 60Hz.
    pub fn timers_cycle(&mut self) {
        self.timers.tick();
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.timers.is_sounding()
    }

    /// Host key-down edge. Ids outside 0x0-0xF are ignored.
    pub fn press_key(&mut self, key: u8) {
        self.keypad.press(key);
    }

    /// Host key-up edge. Resolves a pending FX0A wait with the released key.
    pub fn lift_key(&mut self, key: u8) {
        if let Some(key) = self.keypad.lift(key)
            && let ExecState::Waiting { x } = self.state
        {
            self.v[x] = key.get();
            self.state = ExecState::Running;
            debug!("Key {key:X} released, V{x:X} = {key:X}");
        }
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        if pressed {
            self.press_key(key.get());
        } else {
            self.lift_key(key.get());
        }
    }

    pub fn display(&self) -> &FrameBuffer {
        &self.display
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == ExecState::Halted
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, ExecState::Waiting { .. })
    }

    pub fn fault(&self) -> Option<&Chip8Error> {
        self.fault.as_ref()
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack.len()
    }

    pub fn delay_timer(&self) -> u8 {
        self.timers.delay
    }

    pub fn sound_timer(&self) -> u8 {
        self.timers.sound
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn keypad(&self) -> &[bool; 16] {
        self.keypad.keys()
    }

    pub fn config(&self) -> &Chip8Config {
        &self.config
    }

    /// Fetches the 16-bit opcode at the program counter.
    fn fetch(&self) -> Result<u16, Chip8Error> {
        let pc = usize::from(self.pc);
        match self.memory.get(pc..pc + 2) {
            Some(&[high, low]) => Ok(u16::from_be_bytes([high, low])),
            _ => Err(Chip8Error::OutOfBoundsFetch { pc: self.pc }),
        }
    }

    fn halt(&mut self, fault: Chip8Error) {
        warn!("Machine halted: {fault}");
        self.state = ExecState::Halted;
        self.fault = Some(fault);
    }

    /// Bounds-checked view of `len` bytes of memory starting at I.
    pub(crate) fn mem_at_i(&mut self, len: usize, opcode: u16) -> Result<&mut [u8], Chip8Error> {
        let start = usize::from(self.i);
        self.memory
            .get_mut(start..start + len)
            .ok_or(Chip8Error::IndexOutOfBounds {
                opcode,
                index: self.i,
            })
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}
