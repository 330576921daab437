use eekernel_hw::MemoryError;
use thiserror::Error;

/// Failure of a kernel call. Every variant except [`KernelError::NoRunnableThread`]
/// is reported to the guest as a negative code in `v0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid handle")]
    InvalidHandle,

    #[error("resource exhausted")]
    ResourceExhausted,

    #[error("operation not valid in the current state")]
    InvalidState,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("no runnable thread")]
    NoRunnableThread,
}

impl KernelError {
    pub fn code(self) -> i32 {
        match self {
            KernelError::InvalidHandle => -1,
            KernelError::ResourceExhausted => -2,
            KernelError::InvalidState => -3,
            KernelError::InvalidArgument => -4,
            // fatal; the trap layer halts before anything is encoded
            KernelError::NoRunnableThread => -5,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("invalid syscall number: {0}")]
    InvalidSyscallNumber(i32),

    #[error("invalid syscall for {0} module")]
    WrongModule(&'static str),

    #[error("guest memory: {0}")]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl SyscallError {
    /// Value written to `v0` when a call fails.
    pub fn code(&self) -> i32 {
        match self {
            SyscallError::Kernel(e) => e.code(),
            SyscallError::Memory(_) => KernelError::InvalidArgument.code(),
            SyscallError::InvalidSyscallNumber(_) | SyscallError::WrongModule(_) => {
                KernelError::InvalidArgument.code()
            }
        }
    }
}
