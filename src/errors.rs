use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Memory access outside `0..size`.
    #[error("address 0x{address:04X} is outside a memory of {size} cells")]
    AddressOutOfRange { address: usize, size: usize },

    /// A leaf decoder was handed a word from another family. Never reachable
    /// through `decode`.
    #[error("decoder `{handler}` was called with opcode 0x{opcode:04X} it does not own")]
    DecoderMismatch { handler: &'static str, opcode: u16 },

    #[error("opcode 0x{opcode:04X} is a reserved encoding")]
    ReservedOpcode { opcode: u16 },

    #[error("opcode 0x{opcode:04X} ({instruction}) is not supported by this emulator")]
    UnsupportedInstruction { opcode: u16, instruction: String },

    #[error("opcode 0x{opcode:04X} (`{instruction}`) has no architecturally defined behaviour")]
    UndefinedBehavior { opcode: u16, instruction: String },

    #[error("decoding opcode 0x{opcode:04X} fell through every case")]
    UnreachableDecode { opcode: u16 },

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    #[error("couldn't read firmware: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed hex record: {0}")]
    Hex(#[from] ihex::ReaderError),

    #[error("unsupported hex record: {0}")]
    UnsupportedRecord(String),
}
