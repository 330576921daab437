use crate::cpu::Cpu;
use crate::intc::InterruptLine;
use crate::system_bus::SystemBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// `syscall` instruction; the number is in `v1`.
    Syscall,
    Breakpoint,
    /// An enabled cause is pending on the given controller.
    Interrupt(InterruptLine),
}

/// Trait that the kernel implements to handle traps
pub trait TrapHandler {
    /// Handle a trap. Returns the address to resume execution.
    fn handle_trap(
        &mut self,
        cause: TrapCause,
        cpu: &mut Cpu,
        bus: &mut SystemBus,
    ) -> Result<u32, TrapError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TrapError {
    #[error("unhandled trap: {0:?}")]
    Unhandled(TrapCause),

    #[error("trap handler panicked: {0}")]
    HandlerPanic(String),

    #[error("machine halted")]
    Halt,
}
