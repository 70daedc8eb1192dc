use rand::Rng;

use super::{
    Chip8, Chip8Error, Chip8Result, ExecState, FONT_GLYPH_SIZE, FONT_START_ADDRESS, Opcode,
    OpcodeALU, chip8::STACK_DEPTH,
};
use crate::u4;

impl Chip8 {
    /// Applies a decoded instruction. `raw` is the undecoded word, used in fault reports.
    pub(crate) fn execute(&mut self, raw: u16, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        let pc = self.pc;
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::ClearDisplay => {
                self.display.clear();
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } | Opcode::LegacyCall { nnn } => {
                if self.stack.len() >= STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow { pc });
                }
                self.stack.push(self.pc);
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.stack.pop().ok_or(Chip8Error::StackUnderflow { pc })?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.skip();
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.skip();
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(raw, x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                if self.keypad.is_pressed(self.v[x]) {
                    self.skip();
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.keypad.is_pressed(self.v[x]) {
                    self.skip();
                }
            }
            Opcode::WaitForKey { x } => {
                // Resolved by the next key release, see `Chip8::lift_key`
                self.state = ExecState::Waiting { x };
                return Ok(Chip8Result::Waiting);
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.timers.delay;
            }
            Opcode::SetDelayTimer { x } => {
                self.timers.delay = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.timers.sound = self.v[x];
            }
            Opcode::FontChar { x } => {
                self.i = FONT_START_ADDRESS as u16 + u16::from(self.v[x]) * FONT_GLYPH_SIZE as u16;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                self.mem_at_i(3, raw)?
                    .copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
            }
            Opcode::StoreRegs { x } => {
                let len = usize::from(x) + 1;
                let regs = self.v;
                self.mem_at_i(len, raw)?.copy_from_slice(&regs[..len]);
                self.i = self.i.wrapping_add(len as u16);
            }
            Opcode::LoadRegs { x } => {
                let len = usize::from(x) + 1;
                let mut buf = [0; 16];
                buf[..len].copy_from_slice(self.mem_at_i(len, raw)?);
                self.v[..len].copy_from_slice(&buf[..len]);
                self.i = self.i.wrapping_add(len as u16);
            }
            Opcode::Unknown(opcode) => {
                return Err(Chip8Error::IllegalInstruction { opcode, pc });
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    /// Operands are read up front; VF is written after Vx, so for X = F the flag wins.
    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let (vx, vy) = (self.v[x], self.v[y]);

        let (result, flag) = match op {
            OpcodeALU::Set => (vy, None),
            OpcodeALU::Or => (vx | vy, None),
            OpcodeALU::And => (vx & vy, None),
            OpcodeALU::Xor => (vx ^ vy, None),
            OpcodeALU::Add => {
                let (res, overflow) = vx.overflowing_add(vy);
                (res, Some(overflow as u8))
            }
            OpcodeALU::Sub => {
                let (res, borrow) = vx.overflowing_sub(vy);
                (res, Some(!borrow as u8)) // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = vy.overflowing_sub(vx);
                (res, Some(!borrow as u8))
            }
            OpcodeALU::ShiftRight => (vx >> 1, Some(vx & 1)),
            OpcodeALU::ShiftLeft => (vx << 1, Some(vx >> 7)),
        };

        self.v[x] = result;
        if let Some(flag) = flag {
            self.v[0xF] = flag;
        }
    }

    fn execute_draw(&mut self, raw: u16, x: u4, y: u4, n: u4) -> Result<Chip8Result, Chip8Error> {
        let rows = usize::from(n);
        let mut sprite = [0; 16];
        sprite[..rows].copy_from_slice(self.mem_at_i(rows, raw)?);

        let erased = self.display.draw_sprite(
            usize::from(self.v[x]),
            usize::from(self.v[y]),
            &sprite[..rows],
        );

        self.v[0xF] = erased as u8;
        Ok(Chip8Result::WaitForNextFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::Chip8Config;

    fn chip8_with(program: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::with_config(Chip8Config {
            seed: Some(0x5EED),
            builtin_font: true,
        });
        chip8.load(program).unwrap();
        chip8
    }

    #[test]
    fn op_00e0_clears_display() {
        let mut chip8 = chip8_with(&[0x00, 0xE0]);
        chip8.display.draw_sprite(0, 0, &[0xFF]);

        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
        assert_eq!(chip8.display().lit_count(), 0);
        assert_eq!(chip8.pc(), 0x202);
    }

    #[test]
    fn op_0nnn_is_a_call() {
        let mut chip8 = chip8_with(&[0x03, 0x00]);
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.pc(), 0x300);
        assert_eq!(chip8.stack(), &[0x202]);
    }

    #[test]
    fn op_00ee_with_empty_stack_underflows() {
        let mut chip8 = chip8_with(&[0x00, 0xEE]);

        assert_eq!(
            chip8.cpu_cycle(),
            Err(Chip8Error::StackUnderflow { pc: 0x200 })
        );
        assert!(chip8.is_halted());
    }

    #[test]
    fn op_1nnn_jumps() {
        let mut chip8 = chip8_with(&[0x1A, 0x5F]);
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x0A5F);
    }

    #[test]
    fn op_3xnn_4xnn_skip() {
        let mut chip8 = chip8_with(&[0x61, 0x42, 0x31, 0x42, 0x00, 0x00, 0x41, 0x42]);
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x206);

        // 4142 doesn't skip since V1 == 0x42
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x208);
    }

    #[test]
    fn op_5xy0_9xy0_compare_registers() {
        let mut chip8 = chip8_with(&[0x51, 0x20, 0x00, 0x00, 0x91, 0x20]);
        chip8.v[1] = 3;
        chip8.v[2] = 3;
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x204);

        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x206);
    }

    #[test]
    fn op_7xnn_wraps_without_flag() {
        let mut chip8 = chip8_with(&[0x73, 0x02]);
        chip8.v[3] = 0xFF;
        chip8.v[0xF] = 0xAA;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[3], 0x01);
        assert_eq!(chip8.v()[0xF], 0xAA);
    }

    #[test]
    fn op_8xy1_to_3_leave_flag_alone() {
        let mut chip8 = chip8_with(&[0x80, 0x11, 0x82, 0x12, 0x83, 0x13]);
        chip8.v = [0x0C, 0x0A, 0x0C, 0x0C, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x77];
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[0], 0x0E);
        assert_eq!(chip8.v()[2], 0x08);
        assert_eq!(chip8.v()[3], 0x06);
        assert_eq!(chip8.v()[0xF], 0x77);
    }

    #[test]
    fn op_8xy6_shifts_vx() {
        let mut chip8 = chip8_with(&[0x81, 0x26]);
        chip8.v[1] = 0b0000_0101;
        chip8.v[2] = 0xF0;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[1], 0b0000_0010);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn op_8xye_shifts_vx() {
        let mut chip8 = chip8_with(&[0x81, 0x2E]);
        chip8.v[1] = 0b1100_0001;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[1], 0b1000_0010);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn op_8xy7_reverse_subtract() {
        let mut chip8 = chip8_with(&[0x81, 0x27]);
        chip8.v[1] = 0x10;
        chip8.v[2] = 0x30;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[1], 0x20);
        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn alu_flag_wins_over_result_for_vf() {
        let mut chip8 = chip8_with(&[0x8F, 0x14]);
        chip8.v[0xF] = 0xFF;
        chip8.v[1] = 0x03;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn shift_into_vf_keeps_shifted_out_bit() {
        let mut chip8 = chip8_with(&[0x8F, 0x0E]);
        chip8.v[0xF] = 0x81;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[0xF], 1);
    }

    #[test]
    fn logic_op_into_vf_keeps_result() {
        let mut chip8 = chip8_with(&[0x8F, 0x12]);
        chip8.v[0xF] = 0x0F;
        chip8.v[1] = 0x3C;
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[0xF], 0x0C);
    }

    #[test]
    fn op_bnnn_jumps_with_v0() {
        let mut chip8 = chip8_with(&[0xB3, 0x00]);
        chip8.v[0] = 0x22;
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x322);
    }

    #[test]
    fn op_cxnn_masks_random_byte() {
        let mut chip8 = chip8_with(&[0xC4, 0x00, 0xC5, 0x0F]);
        chip8.v[4] = 0xFF;
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.v()[4], 0);
        assert_eq!(chip8.v()[5] & 0xF0, 0);
    }

    #[test]
    fn op_cxnn_is_deterministic_for_a_seed() {
        let program = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];
        let mut a = chip8_with(&program);
        let mut b = chip8_with(&program);
        for _ in 0..3 {
            a.cpu_cycle().unwrap();
            b.cpu_cycle().unwrap();
        }
        assert_eq!(a.v(), b.v());
    }

    #[test]
    fn op_dxyn_sets_collision_flag() {
        // I = 0 (glyph "0"), draw at (V0, V1) twice
        let mut chip8 = chip8_with(&[0xA0, 0x00, 0xD0, 0x15, 0xD0, 0x15]);
        chip8.cpu_cycle().unwrap();

        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitForNextFrame));
        assert_eq!(chip8.v()[0xF], 0);
        assert_eq!(chip8.display().lit_count(), 14);

        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.v()[0xF], 1);
        assert_eq!(chip8.display().lit_count(), 0);
    }

    #[test]
    fn op_dxyn_reading_past_memory_faults() {
        let mut chip8 = chip8_with(&[0xAF, 0xFE, 0xD0, 0x03]);
        chip8.cpu_cycle().unwrap();

        assert_eq!(
            chip8.cpu_cycle(),
            Err(Chip8Error::IndexOutOfBounds {
                opcode: 0xD003,
                index: 0x0FFE
            })
        );
    }

    #[test]
    fn op_ex9e_exa1_check_keypad() {
        let mut chip8 = chip8_with(&[0xE1, 0x9E, 0x00, 0x00, 0xE1, 0xA1]);
        chip8.v[1] = 0xB;
        chip8.press_key(0xB);
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x204);

        chip8.lift_key(0xB);
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x208);
    }

    #[test]
    fn op_ex9e_with_out_of_range_key_never_matches() {
        let mut chip8 = chip8_with(&[0xE1, 0x9E]);
        chip8.v[1] = 0x1B;
        chip8.press_key(0xB);
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x202);
    }

    #[test]
    fn op_fx0a_suspends_until_release() {
        let mut chip8 = chip8_with(&[0xF3, 0x0A, 0x64, 0x01]);

        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Waiting));
        assert_eq!(chip8.state(), ExecState::Waiting { x: u4::new(3) });

        chip8.press_key(0x9);
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Waiting));
        assert_eq!(chip8.pc(), 0x202);

        chip8.lift_key(0x9);
        assert_eq!(chip8.v()[3], 0x9);
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
        assert_eq!(chip8.v()[4], 0x01);
    }

    #[test]
    fn op_fx07_fx15_fx18_timers() {
        let mut chip8 = chip8_with(&[0xF1, 0x15, 0xF2, 0x18, 0xF3, 0x07]);
        chip8.v[1] = 30;
        chip8.v[2] = 4;
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();
        assert!(chip8.should_beep());

        chip8.timers_cycle();
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.v()[3], 29);
        assert_eq!(chip8.sound_timer(), 3);
    }

    #[test]
    fn op_fx1e_fx29_index() {
        let mut chip8 = chip8_with(&[0xA1, 0x00, 0xF1, 0x1E, 0xF2, 0x29]);
        chip8.v[1] = 0x20;
        chip8.v[2] = 0xA;
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.i(), 0x120);

        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.i(), 50);
        assert_eq!(&chip8.memory()[50..55], &[0xF0, 0x90, 0xF0, 0x90, 0x90]);
    }

    #[test]
    fn op_fx33_near_end_of_memory_faults() {
        let mut chip8 = chip8_with(&[0xAF, 0xFE, 0xF0, 0x33]);
        chip8.v[0] = 255;
        chip8.cpu_cycle().unwrap();

        assert_eq!(
            chip8.cpu_cycle(),
            Err(Chip8Error::IndexOutOfBounds {
                opcode: 0xF033,
                index: 0x0FFE
            })
        );
        assert!(chip8.memory()[0xFFE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn op_fx55_bound_check_writes_nothing() {
        let mut chip8 = chip8_with(&[0xAF, 0xFC, 0xF4, 0x55]);
        chip8.v = [1; 16];
        chip8.cpu_cycle().unwrap();

        assert!(chip8.cpu_cycle().is_err());
        assert!(chip8.memory()[0xFFC..].iter().all(|b| *b == 0));
        assert_eq!(chip8.i(), 0x0FFC);
    }

    #[test]
    fn op_fx65_loads_up_to_last_byte() {
        let mut chip8 = chip8_with(&[0xAF, 0xFE, 0xF1, 0x65]);
        chip8.memory[0xFFE] = 0x11;
        chip8.memory[0xFFF] = 0x22;
        chip8.cpu_cycle().unwrap();
        chip8.cpu_cycle().unwrap();

        assert_eq!(&chip8.v()[..3], &[0x11, 0x22, 0x00]);
        assert_eq!(chip8.i(), 0x1000);
    }

    #[test]
    fn unknown_opcode_is_illegal() {
        let mut chip8 = chip8_with(&[0x60, 0x01, 0xFF, 0xFF]);
        chip8.cpu_cycle().unwrap();

        assert_eq!(
            chip8.cpu_cycle(),
            Err(Chip8Error::IllegalInstruction {
                opcode: 0xFFFF,
                pc: 0x202
            })
        );
        assert!(chip8.is_halted());
    }
}
