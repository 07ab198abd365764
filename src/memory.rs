use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::{Error, Result};

pub const DATA_SIZE: usize = 0x10000;
pub const PROGRAM_SIZE: usize = 0x10000;

pub trait MemoryMapped {
    type Cell: Copy;

    fn get_size(&self) -> usize;
    fn read(&self, address: usize) -> Result<Self::Cell>;
    fn write(&mut self, address: usize, value: Self::Cell) -> Result<()>;

    fn check(&self, address: usize) -> Result<()> {
        if address < self.get_size() {
            Ok(())
        } else {
            Err(Error::AddressOutOfRange { address, size: self.get_size() })
        }
    }
}

/// Flat, fixed-size, zero-initialised store.
pub struct Memory<T> {
    mem: Vec<T>,
}

/// Byte-wide data space; the register file lives in its first 32 bytes.
pub type DataMemory = Memory<u8>;
/// Word-addressed flash.
pub type ProgramMemory = Memory<u16>;

impl<T: Copy + Default> Memory<T> {
    pub fn new(size: usize) -> Self {
        Memory {
            mem: vec![T::default(); size],
        }
    }

    /// Writes `values` into consecutive cells starting at `start`. Nothing is
    /// written unless the whole run fits.
    pub fn load(&mut self, start: usize, values: &[T]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.check(start)?;
        self.check(start + values.len() - 1)?;
        self.mem[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }
}

impl DataMemory {
    pub fn reset(&mut self) {
        self.mem.fill(0);
    }
}

impl<T: Copy + Default> MemoryMapped for Memory<T> {
    type Cell = T;

    fn get_size(&self) -> usize {
        self.mem.len()
    }

    fn read(&self, address: usize) -> Result<T> {
        self.check(address)?;
        Ok(self.mem[address])
    }

    fn write(&mut self, address: usize, value: T) -> Result<()> {
        self.check(address)?;
        self.mem[address] = value;
        Ok(())
    }
}

/// A bounds-checked view of `size` cells starting at `offset` of a shared
/// memory. Holds no storage of its own.
pub struct MemoryWindow<M> {
    mem: Rc<RefCell<M>>,
    offset: usize,
    size: usize,
}

impl<M: MemoryMapped> MemoryWindow<M> {
    pub fn new(mem: Rc<RefCell<M>>, offset: usize, size: usize) -> Result<Self> {
        let total = mem.borrow().get_size();
        if offset + size > total {
            return Err(Error::AddressOutOfRange { address: offset + size - 1, size: total });
        }
        Ok(MemoryWindow { mem, offset, size })
    }
}

impl<M: MemoryMapped> MemoryMapped for MemoryWindow<M> {
    type Cell = M::Cell;

    fn get_size(&self) -> usize {
        self.size
    }

    fn read(&self, address: usize) -> Result<M::Cell> {
        self.check(address)?;
        self.mem.borrow().read(self.offset + address)
    }

    fn write(&mut self, address: usize, value: M::Cell) -> Result<()> {
        self.check(address)?;
        self.mem.borrow_mut().write(self.offset + address, value)
    }
}
