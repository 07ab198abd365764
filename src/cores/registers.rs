use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::errors::Result;
use crate::memory::{DataMemory, MemoryMapped, MemoryWindow};

pub const REGISTER_COUNT: usize = 32;

/// Indirect address registers, each formed from a pair of working registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    /// Index of the low byte register.
    pub fn low(self) -> u8 {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }

    pub fn aliases(self, r: u8) -> bool {
        r == self.low() || r == self.low() + 1
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::X => f.write_str("X"),
            Pointer::Y => f.write_str("Y"),
            Pointer::Z => f.write_str("Z"),
        }
    }
}

/// r0..r31, mapped onto data space 0x00..0x1F.
pub struct RegisterFile {
    window: MemoryWindow<DataMemory>,
}

impl RegisterFile {
    pub fn new(ds: Rc<RefCell<DataMemory>>) -> Result<Self> {
        Ok(RegisterFile {
            window: MemoryWindow::new(ds, 0, REGISTER_COUNT)?,
        })
    }

    pub fn get_r(&self, r: u8) -> Result<u8> {
        self.window.read(usize::from(r))
    }

    pub fn set_r(&mut self, r: u8, val: u8) -> Result<()> {
        self.window.write(usize::from(r), val)
    }

    /// R[r+1]:R[r]
    pub fn get_rw(&self, r: u8) -> Result<u16> {
        Ok(u16::from_le_bytes([self.get_r(r)?, self.get_r(r + 1)?]))
    }

    pub fn set_rw(&mut self, r: u8, val: u16) -> Result<()> {
        let bytes = val.to_le_bytes();
        self.set_r(r, bytes[0])?;
        self.set_r(r + 1, bytes[1])
    }

    pub fn get_ptr(&self, ptr: Pointer) -> Result<u16> {
        self.get_rw(ptr.low())
    }

    pub fn set_ptr(&mut self, ptr: Pointer, val: u16) -> Result<()> {
        self.set_rw(ptr.low(), val)
    }

    pub fn clear(&mut self) -> Result<()> {
        for r in 0..REGISTER_COUNT {
            self.window.write(r, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::memory::DATA_SIZE;

    use proptest::prelude::*;

    fn setup() -> (Rc<RefCell<DataMemory>>, RegisterFile) {
        let ds = Rc::new(RefCell::new(DataMemory::new(DATA_SIZE)));
        let regs = RegisterFile::new(Rc::clone(&ds)).unwrap();
        (ds, regs)
    }

    proptest! {
        #[test]
        fn register_writes_show_in_data_space(r in 0u8..32, val in any::<u8>()) {
            let (ds, mut regs) = setup();
            regs.set_r(r, val).unwrap();
            prop_assert_eq!(regs.get_r(r).unwrap(), val);
            prop_assert_eq!(ds.borrow().read(usize::from(r)).unwrap(), val);
        }

        #[test]
        fn data_space_writes_show_in_registers(r in 0u8..32, val in any::<u8>()) {
            let (ds, regs) = setup();
            ds.borrow_mut().write(usize::from(r), val).unwrap();
            prop_assert_eq!(regs.get_r(r).unwrap(), val);
        }
    }

    #[test]
    fn register_index_is_bounded() {
        let (ds, mut regs) = setup();
        assert!(matches!(regs.get_r(32), Err(Error::AddressOutOfRange { address: 32, size: 32 })));
        assert!(regs.set_r(32, 1).is_err());
        // the byte after the window belongs to I/O space, not to r31
        assert_eq!(ds.borrow().read(32).unwrap(), 0);
    }

    #[test]
    fn pointers_are_little_endian_pairs() {
        let (ds, mut regs) = setup();
        regs.set_ptr(Pointer::X, 0x1234).unwrap();
        regs.set_ptr(Pointer::Y, 0xABCD).unwrap();
        regs.set_ptr(Pointer::Z, 0x00FF).unwrap();

        assert_eq!(regs.get_r(26).unwrap(), 0x34);
        assert_eq!(regs.get_r(27).unwrap(), 0x12);
        assert_eq!(ds.borrow().read(28).unwrap(), 0xCD);
        assert_eq!(ds.borrow().read(29).unwrap(), 0xAB);
        assert_eq!(regs.get_r(30).unwrap(), 0xFF);
        assert_eq!(regs.get_r(31).unwrap(), 0x00);

        regs.set_r(31, 0x80).unwrap();
        assert_eq!(regs.get_ptr(Pointer::Z).unwrap(), 0x80FF);
    }

    #[test]
    fn pointer_aliasing() {
        assert!(Pointer::X.aliases(26) && Pointer::X.aliases(27));
        assert!(Pointer::Y.aliases(28) && Pointer::Y.aliases(29));
        assert!(Pointer::Z.aliases(30) && Pointer::Z.aliases(31));
        assert!(!Pointer::X.aliases(28));
        assert!(!Pointer::Z.aliases(29));
    }

    #[test]
    fn clear_zeroes_the_window_only() {
        let (ds, mut regs) = setup();
        for r in 0..32u8 {
            regs.set_r(r, r + 1).unwrap();
        }
        ds.borrow_mut().write(32, 0x77).unwrap();
        regs.clear().unwrap();
        assert!((0..32u8).all(|r| regs.get_r(r).unwrap() == 0));
        assert_eq!(ds.borrow().read(32).unwrap(), 0x77);
    }
}
