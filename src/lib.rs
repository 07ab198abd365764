//! Instruction-set simulator for 8-bit AVR microcontrollers.

pub mod cores;
pub mod devices;
pub mod errors;
pub mod memory;
