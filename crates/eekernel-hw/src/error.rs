use crate::trap::TrapError;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("trap error: {0}")]
    Trap(#[from] TrapError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("out of bounds access: {addr:#x} (+{len})")]
    OutOfBounds { addr: u32, len: usize },

    #[error("misaligned access: address {addr:#x}, alignment {alignment}")]
    Misaligned { addr: u32, alignment: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid register number: {0}")]
    InvalidRegister(u8),

    #[error("invalid interrupt cause {cause} for {controller}")]
    InvalidCause { controller: &'static str, cause: u32 },
}
