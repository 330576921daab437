use crate::callback::Callback;
use crate::error::SyscallError;
use crate::syscall::{Syscall, SyscallReturn};
use crate::types::AlarmId;
use crate::Kernel;
use eekernel_hw::{Cpu, Register, SystemBus};

pub(crate) fn handle_syscall(
    kernel: &mut Kernel,
    syscall: Syscall,
    cpu: &mut Cpu,
    bus: &mut SystemBus,
) -> Result<SyscallReturn, SyscallError> {
    match syscall {
        Syscall::SetAlarm { ticks, entry, arg } => {
            let gp = cpu.read_reg(Register::GP);
            let id = kernel.set_alarm_with_gp(bus, ticks, Callback::Guest { entry }, arg, gp)?;
            Ok(SyscallReturn::Handle(id.val()))
        }
        Syscall::ReleaseAlarm { id } => {
            kernel.release_alarm(bus, AlarmId::new(id)?)?;
            Ok(SyscallReturn::Success)
        }
        _ => Err(SyscallError::WrongModule("alarm")),
    }
}
