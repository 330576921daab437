use super::Position;
use crate::callback::Callback;
use crate::error::SyscallError;
use crate::syscall::{GuestPosition, Syscall, SyscallReturn};
use crate::types::HandlerId;
use crate::Kernel;
use eekernel_hw::{Cpu, InterruptLine, Register, SystemBus};

pub(crate) fn handle_syscall(
    kernel: &mut Kernel,
    syscall: Syscall,
    cpu: &mut Cpu,
    bus: &mut SystemBus,
) -> Result<SyscallReturn, SyscallError> {
    match syscall {
        Syscall::AddHandler {
            line,
            cause,
            entry,
            next,
            arg,
        } => {
            let position = match next {
                GuestPosition::Head => Position::Head,
                GuestPosition::Tail => Position::Tail,
                GuestPosition::After(id) => Position::After(HandlerId::new(id)?),
            };
            let gp = cpu.read_reg(Register::GP);
            let id = kernel.add_handler(line, cause, Callback::Guest { entry }, position, arg, gp)?;
            Ok(SyscallReturn::Handle(id.val()))
        }
        Syscall::RemoveHandler { line, cause, id } => {
            kernel.handlers.remove(line, cause, HandlerId::new(id)?)?;
            Ok(SyscallReturn::Success)
        }
        Syscall::EnableCause { line, cause } => {
            let changed = match line {
                InterruptLine::Intc => kernel.enable_intc(bus, cause)?,
                InterruptLine::Dmac => kernel.enable_dmac(bus, cause)?,
            };
            Ok(SyscallReturn::Value(changed as i32))
        }
        Syscall::DisableCause { line, cause } => {
            let changed = match line {
                InterruptLine::Intc => kernel.disable_intc(bus, cause)?,
                InterruptLine::Dmac => kernel.disable_dmac(bus, cause)?,
            };
            Ok(SyscallReturn::Value(changed as i32))
        }
        Syscall::EnableHandler { line, id } => {
            kernel.handlers.set_enabled(line, HandlerId::new(id)?, true)?;
            Ok(SyscallReturn::Success)
        }
        Syscall::DisableHandler { line, id } => {
            kernel.handlers.set_enabled(line, HandlerId::new(id)?, false)?;
            Ok(SyscallReturn::Success)
        }
        _ => Err(SyscallError::WrongModule("interrupt")),
    }
}
