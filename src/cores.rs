use std::cell::RefCell;
use std::rc::Rc;

use bitvec::prelude::*;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::memory::{DataMemory, MemoryMapped, ProgramMemory};

mod decode;
mod instruction;
mod registers;

pub use decode::{decode, displacement};
pub use instruction::{Instruction, Mode, Operation};
pub use registers::{Pointer, RegisterFile, REGISTER_COUNT};

/// Stack pointer after reset: the top of data space.
pub const SP_RESET: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSREG {
    C = 0,
    Z = 1,
    N = 2,
    V = 3,
    S = 4,
    H = 5,
    T = 6,
    I = 7,
}

pub struct Core {
    pc: u16,
    sp: u16,
    sreg: u8,
    cycles: u64,
    regs: RegisterFile,
    pub ds: Rc<RefCell<DataMemory>>,
    pub progmem: Rc<RefCell<ProgramMemory>>,
}

impl Core {
    pub fn new(ds: Rc<RefCell<DataMemory>>, progmem: Rc<RefCell<ProgramMemory>>) -> Result<Self> {
        let regs = RegisterFile::new(Rc::clone(&ds))?;
        let mut core = Core {
            pc: 0,
            sp: SP_RESET,
            sreg: 0,
            cycles: 0,
            regs,
            ds,
            progmem,
        };
        core.reset()?;
        Ok(core)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.pc = 0;
        self.sp = SP_RESET;
        self.sreg = 0;
        self.cycles = 0;
        self.regs.clear()
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.sp = sp;
    }

    /// Cycles consumed since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn sreg(&self) -> u8 {
        self.sreg
    }

    pub fn set_sreg(&mut self, sreg: u8) {
        self.sreg = sreg;
    }

    pub fn get_sreg_bit(&self, bit: BitSREG) -> bool {
        self.sreg.view_bits::<Lsb0>()[bit as usize]
    }

    pub fn set_sreg_bit(&mut self, bit: BitSREG, set: bool) {
        self.sreg.view_bits_mut::<Lsb0>().set(bit as usize, set);
    }

    pub fn get_r(&self, r: u8) -> Result<u8> {
        self.regs.get_r(r)
    }

    pub fn set_r(&mut self, r: u8, val: u8) -> Result<()> {
        self.regs.set_r(r, val)
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Reads the word at PC and steps PC past it.
    pub fn fetch(&mut self) -> Result<u16> {
        let opcode = self.progmem.borrow().read(usize::from(self.pc))?;
        self.pc = self.pc.wrapping_add(1);
        Ok(opcode)
    }

    pub fn decode(&self, opcode: u16) -> Result<Instruction> {
        decode(opcode)
    }

    /// Runs one instruction. Returns the number of cycles it took.
    pub fn tick(&mut self) -> Result<u8> {
        let pc = self.pc;
        let opcode = self.fetch()?;
        let instruction = self.decode(opcode)?;

        debug!("[0x{:04X}] {}", pc, self.trace_text(&instruction));

        let cycles = self.execute(&instruction)?;
        self.cycles += u64::from(cycles);
        Ok(cycles)
    }

    /// Trace form of an instruction whose opcode word has just been fetched.
    /// Two-word instructions show the address word that follows.
    fn trace_text(&self, instruction: &Instruction) -> String {
        if instruction.words == 2 {
            if let Ok(k) = self.progmem.borrow().read(usize::from(self.pc)) {
                return instruction.with_address(k);
            }
        }
        instruction.mnemonic.clone()
    }

    /// Applies a decoded instruction. PC is expected to already point past the
    /// opcode word.
    #[allow(non_snake_case)]
    pub fn execute(&mut self, instruction: &Instruction) -> Result<u8> {
        use Operation::*;

        match instruction.op {
            NOP => {}
            MOVW { Rd, Rr } => self.movw(Rd, Rr)?,
            MOV { Rd, Rr } => self.mov(Rd, Rr)?,
            MULS { Rd, Rr } => self.muls(Rd, Rr)?,
            LD { Rd, ptr, mode } => self.ld(instruction, Rd, ptr, mode)?,
            LDS { Rd } => self.lds(Rd)?,
            ST { Rr, ptr, mode } => self.st(instruction, Rr, ptr, mode)?,
            STS { Rr } => self.sts(Rr)?,
            LPM { Rd, inc } => self.lpm(instruction, Rd, inc)?,
            POP { Rd } => self.pop(Rd)?,
            PUSH { Rr } => self.push(Rr)?,
            LDI { Rd, val } => self.set_r(Rd, val)?,
            RJMP { offset } => self.rjmp(offset),
        }

        Ok(instruction.cycles)
    }

    #[allow(non_snake_case)]
    fn movw(&mut self, Rd: u8, Rr: u8) -> Result<()> {
        let val = self.regs.get_rw(Rr)?;
        self.regs.set_rw(Rd, val)
    }

    #[allow(non_snake_case)]
    fn mov(&mut self, Rd: u8, Rr: u8) -> Result<()> {
        let val = self.get_r(Rr)?;
        self.set_r(Rd, val)
    }

    /// Signed 8x8 multiply into r1:r0.
    #[allow(non_snake_case)]
    fn muls(&mut self, Rd: u8, Rr: u8) -> Result<()> {
        let rd = i32::from(self.get_r(Rd)? as i8);
        let rr = i32::from(self.get_r(Rr)? as i8);
        let result = rd * rr;

        self.regs.set_rw(0, result as u16)?;

        self.set_sreg_bit(BitSREG::Z, result == 0);
        self.set_sreg_bit(BitSREG::C, result > i32::from(i16::MAX) || result < i32::from(i16::MIN));
        Ok(())
    }

    /// Data address of an indirect access, and the pointer value to store back
    /// once the access has completed.
    fn resolve(
        &self,
        instruction: &Instruction,
        r: u8,
        ptr: Pointer,
        mode: Mode,
    ) -> Result<(usize, Option<u16>)> {
        if mode.writes_back() && ptr.aliases(r) {
            return Err(Error::UndefinedBehavior {
                opcode: instruction.opcode,
                instruction: instruction.mnemonic.clone(),
            });
        }

        let base = self.regs.get_ptr(ptr)?;
        Ok(match mode {
            Mode::Plain => (usize::from(base), None),
            Mode::PostInc => (usize::from(base), Some(base.wrapping_add(1))),
            Mode::PreDec => {
                let p = base.wrapping_sub(1);
                (usize::from(p), Some(p))
            }
            // not wrapped: Y+q past the end of data space is an error
            Mode::Displacement(q) => (usize::from(base) + usize::from(q), None),
        })
    }

    #[allow(non_snake_case)]
    fn ld(&mut self, instruction: &Instruction, Rd: u8, ptr: Pointer, mode: Mode) -> Result<()> {
        let (address, writeback) = self.resolve(instruction, Rd, ptr, mode)?;
        let val = self.ds.borrow().read(address)?;
        self.set_r(Rd, val)?;
        if let Some(p) = writeback {
            self.regs.set_ptr(ptr, p)?;
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    fn st(&mut self, instruction: &Instruction, Rr: u8, ptr: Pointer, mode: Mode) -> Result<()> {
        let (address, writeback) = self.resolve(instruction, Rr, ptr, mode)?;
        let val = self.get_r(Rr)?;
        self.ds.borrow_mut().write(address, val)?;
        if let Some(p) = writeback {
            self.regs.set_ptr(ptr, p)?;
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    fn lds(&mut self, Rd: u8) -> Result<()> {
        let k = self.fetch()?;
        let val = self.ds.borrow().read(usize::from(k))?;
        self.set_r(Rd, val)
    }

    #[allow(non_snake_case)]
    fn sts(&mut self, Rr: u8) -> Result<()> {
        let k = self.fetch()?;
        let val = self.get_r(Rr)?;
        self.ds.borrow_mut().write(usize::from(k), val)
    }

    /// Z addresses flash bytewise: bit 0 picks the low or high byte of word Z >> 1.
    #[allow(non_snake_case)]
    fn lpm(&mut self, instruction: &Instruction, Rd: u8, inc: bool) -> Result<()> {
        if inc && Pointer::Z.aliases(Rd) {
            return Err(Error::UndefinedBehavior {
                opcode: instruction.opcode,
                instruction: instruction.mnemonic.clone(),
            });
        }

        let z = self.regs.get_ptr(Pointer::Z)?;
        let word = self.progmem.borrow().read(usize::from(z >> 1))?;
        let val = word.to_le_bytes()[usize::from(z & 1)];
        self.set_r(Rd, val)?;

        if inc {
            self.regs.set_ptr(Pointer::Z, z.wrapping_add(1))?;
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    fn pop(&mut self, Rd: u8) -> Result<()> {
        let sp = self.sp.wrapping_add(1);
        let val = self.ds.borrow().read(usize::from(sp))?;
        self.set_r(Rd, val)?;
        self.sp = sp;
        Ok(())
    }

    #[allow(non_snake_case)]
    fn push(&mut self, Rr: u8) -> Result<()> {
        let val = self.get_r(Rr)?;
        self.ds.borrow_mut().write(usize::from(self.sp), val)?;
        self.sp = self.sp.wrapping_sub(1);
        Ok(())
    }

    fn rjmp(&mut self, offset: i16) {
        self.pc = self.pc.wrapping_add_signed(offset);
    }
}
