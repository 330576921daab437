use crate::error::SyscallError;
use crate::syscall::{GuestSemaParam, Syscall, SyscallReturn};
use crate::types::SemaId;
use crate::Kernel;
use eekernel_hw::{read_pod, write_pod, SystemBus};

pub(crate) fn handle_syscall(
    kernel: &mut Kernel,
    syscall: Syscall,
    bus: &mut SystemBus,
) -> Result<SyscallReturn, SyscallError> {
    match syscall {
        Syscall::CreateSema { param } => {
            let p: GuestSemaParam = read_pod(&*bus, param)?;
            let sid = kernel.create_sema(p.init_count, p.max_count, p.attr, p.option)?;
            Ok(SyscallReturn::Handle(sid.val()))
        }
        Syscall::DeleteSema { sid } => {
            let sid = SemaId::new(sid)?;
            kernel.i_delete_sema(sid)?;
            Ok(SyscallReturn::Handle(sid.val()))
        }
        Syscall::SignalSema { sid } => {
            let sid = SemaId::new(sid)?;
            kernel.i_signal_sema(sid)?;
            Ok(SyscallReturn::Handle(sid.val()))
        }
        Syscall::WaitSema { sid } => {
            // a blocked caller gets its result written when it is released
            let sid = SemaId::new(sid)?;
            kernel.try_wait_sema(sid)?;
            Ok(SyscallReturn::Handle(sid.val()))
        }
        Syscall::PollSema { sid } => {
            let sid = SemaId::new(sid)?;
            kernel.poll_sema(sid)?;
            Ok(SyscallReturn::Handle(sid.val()))
        }
        Syscall::ReferSemaStatus { sid, info } => {
            let sid = SemaId::new(sid)?;
            let status = kernel.refer_sema_status(sid)?;
            if info != 0 {
                write_pod(bus, info, &GuestSemaParam::from(&status))?;
            }
            Ok(SyscallReturn::Handle(sid.val()))
        }
        _ => Err(SyscallError::WrongModule("semaphore")),
    }
}
