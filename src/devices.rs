use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use ihex::{Reader, Record};
use tracing::{info, warn};

use crate::cores::{Core, REGISTER_COUNT};
use crate::errors::{Error, Result};
use crate::memory::{DataMemory, MemoryMapped, ProgramMemory, DATA_SIZE, PROGRAM_SIZE};

/// Fuse word reported by the simulated part.
pub const HARDWARE_FUSES: u16 = 0x99E1;
/// Cycle budget for `power_up`.
pub const POWER_UP_CYCLES: u64 = 1000;

pub struct Device {
    pub core: Core,
    pub flash: Rc<RefCell<ProgramMemory>>,
    pub sram: Rc<RefCell<DataMemory>>,
    pub fuses: u16,
}

impl Device {
    pub fn new() -> Result<Self> {
        let flash = Rc::new(RefCell::new(ProgramMemory::new(PROGRAM_SIZE)));
        let sram = Rc::new(RefCell::new(DataMemory::new(DATA_SIZE)));

        Ok(Device {
            core: Core::new(Rc::clone(&sram), Rc::clone(&flash))?,
            flash,
            sram,
            fuses: HARDWARE_FUSES,
        })
    }

    pub fn from_hex(path: &Path) -> Result<Self> {
        let mut device = Device::new()?;
        device.load_hex(path)?;
        Ok(device)
    }

    pub fn load_hex(&mut self, path: &Path) -> Result<()> {
        info!("[HEX] Loading {}.", path.display());
        let s = fs::read_to_string(path)?;
        self.load_hex_str(&s)
    }

    /// Programs flash from Intel HEX text. Addresses in the records are byte
    /// addresses; flash is written a word at a time.
    pub fn load_hex_str(&mut self, s: &str) -> Result<()> {
        let mut base = 0usize;

        for record in Reader::new(s) {
            match record? {
                Record::Data { offset, value } => {
                    let address = base + usize::from(offset);
                    info!("[HEX] 0x{:04X} Writing {} bytes.", address, value.len());
                    self.program(address, &value)?;
                }
                Record::ExtendedSegmentAddress(segment) => base = usize::from(segment) << 4,
                Record::ExtendedLinearAddress(upper) => base = usize::from(upper) << 16,
                Record::EndOfFile => break,
                other => warn!("[HEX] Ignoring {:?}.", other),
            }
        }
        Ok(())
    }

    fn program(&mut self, address: usize, bytes: &[u8]) -> Result<()> {
        if address % 2 != 0 {
            return Err(Error::UnsupportedRecord(format!(
                "data at odd byte address 0x{:04X}",
                address
            )));
        }

        let start = address / 2;
        let mut flash = self.flash.borrow_mut();
        let chunks = bytes.chunks_exact(2);
        let tail = chunks.remainder();
        let mut words: Vec<u16> = chunks.map(|b| u16::from_le_bytes([b[0], b[1]])).collect();

        if let [last] = tail {
            // keep the high byte already in flash
            let existing = flash.read(start + words.len())?;
            words.push((existing & 0xFF00) | u16::from(*last));
        }

        flash.load(start, &words)
    }

    /// Clears data space and CPU state. Flash keeps its contents.
    pub fn reset(&mut self) -> Result<()> {
        self.sram.borrow_mut().reset();
        self.core.reset()
    }

    pub fn tick(&mut self) -> Result<u8> {
        self.core.tick()
    }

    /// Runs until at least `cycle_limit` cycles have elapsed. Returns the
    /// cycles actually consumed.
    pub fn run(&mut self, cycle_limit: u64) -> Result<u64> {
        let mut cycles = 0u64;
        while cycles < cycle_limit {
            cycles += u64::from(self.tick()?);
        }
        Ok(cycles)
    }

    pub fn power_up(&mut self) -> Result<u64> {
        self.reset()?;
        self.run(POWER_UP_CYCLES)
    }

    pub fn power_down(&mut self) -> Result<()> {
        Err(Error::Unimplemented("power down"))
    }

    pub fn dump_regs(&self) -> Result<()> {
        for i in 0..REGISTER_COUNT as u8 {
            println!("r{:02} = 0x{:02X}", i, self.core.get_r(i)?);
        }
        println!("PC = 0x{:04X}", self.core.pc());
        println!("SP = 0x{:04X}", self.core.sp());
        println!("SREG = 0b{:08b}", self.core.sreg());
        Ok(())
    }

    pub fn dump_stack(&self) -> Result<()> {
        let sram = self.sram.borrow();
        for address in usize::from(self.core.sp()) + 1..DATA_SIZE {
            println!("[0x{:04X}] 0x{:02X}", address, sram.read(address)?);
        }
        Ok(())
    }
}
