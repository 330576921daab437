use super::ops::MainThread;
use super::tcb::ThreadParams;
use super::Sleep;
use crate::error::{KernelError, SyscallError};
use crate::syscall::{GuestThreadParam, Syscall, SyscallReturn};
use crate::types::ThreadId;
use crate::Kernel;
use eekernel_hw::{read_pod, write_pod, Cpu, SystemBus};
use log::debug;

/// Bytes left above a loader-placed main stack.
const MAIN_STACK_RESERVE: u32 = 4096;

/// Raw id 0 names the caller.
fn resolve(kernel: &Kernel, raw: u32) -> Result<ThreadId, KernelError> {
    if raw == 0 {
        kernel.threads.caller()
    } else {
        ThreadId::new(raw)
    }
}

/// Runs the table half of a thread call. The caller encodes the result and
/// then performs any pending switch.
pub(crate) fn handle_syscall(
    kernel: &mut Kernel,
    syscall: Syscall,
    cpu: &mut Cpu,
    bus: &mut SystemBus,
) -> Result<SyscallReturn, SyscallError> {
    match syscall {
        Syscall::CreateThread { param } => {
            let p: GuestThreadParam = read_pod(&*bus, param)?;
            let params = ThreadParams {
                entry: p.func,
                stack: p.stack,
                stack_size: p.stack_size,
                gp: p.gp_reg,
                priority: p.initial_priority,
                attr: p.attr,
                option: p.option,
            };
            let tid = kernel.create_thread(&params)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::DeleteThread { tid } => {
            let tid = ThreadId::new(tid)?;
            kernel.delete_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::StartThread { tid, arg } => {
            let tid = ThreadId::new(tid)?;
            kernel.threads.start(tid, arg)?;
            debug!("StartThread: tid={} arg={:#x}", tid.val(), arg);
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::ExitThread => {
            let tid = kernel.threads.exit_current()?;
            debug!("ExitThread: tid={}", tid.val());
            Ok(SyscallReturn::Success)
        }
        Syscall::ExitDeleteThread => {
            kernel.retire_and_delete()?;
            Ok(SyscallReturn::Success)
        }
        Syscall::TerminateThread { tid } => {
            let tid = ThreadId::new(tid)?;
            kernel.i_terminate_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::ChangeThreadPriority { tid, priority } => {
            let tid = resolve(kernel, tid)?;
            let old = kernel.i_change_thread_priority(tid, priority)?;
            Ok(SyscallReturn::Value(old as i32))
        }
        Syscall::RotateThreadReadyQueue { priority } => {
            kernel.i_rotate_thread_ready_queue(priority)?;
            Ok(SyscallReturn::Value(priority as i32))
        }
        Syscall::ReleaseWaitThread { tid } => {
            let tid = ThreadId::new(tid)?;
            kernel.i_release_wait_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::GetThreadId => Ok(SyscallReturn::Handle(kernel.get_thread_id()?.val())),
        Syscall::ReferThreadStatus { tid, info } => {
            let tid = resolve(kernel, tid)?;
            let status = kernel.refer_thread_status(tid)?;
            if info != 0 {
                write_pod(bus, info, &GuestThreadParam::from(&status))?;
            }
            Ok(SyscallReturn::Value(status.status.bits() as i32))
        }
        Syscall::SleepThread => {
            let tid = kernel.threads.caller()?;
            // a blocked sleeper gets its id back from the wakeup
            if kernel.threads.sleep_current()? == Sleep::Blocked {
                debug!("SleepThread: tid={} blocked", tid.val());
            }
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::WakeupThread { tid } => {
            let tid = resolve(kernel, tid)?;
            kernel.i_wakeup_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::CancelWakeupThread { tid } => {
            let tid = resolve(kernel, tid)?;
            let banked = kernel.cancel_wakeup_thread(tid)?;
            Ok(SyscallReturn::Value(banked as i32))
        }
        Syscall::SuspendThread { tid } => {
            let tid = ThreadId::new(tid)?;
            kernel.i_suspend_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::ResumeThread { tid } => {
            let tid = ThreadId::new(tid)?;
            kernel.i_resume_thread(tid)?;
            Ok(SyscallReturn::Handle(tid.val()))
        }
        Syscall::InitializeMainThread {
            gp,
            stack,
            stack_size,
            args,
            root,
        } => {
            // u32::MAX asks for a stack at the top of RAM
            let stack = if stack == u32::MAX {
                (bus.ram.size() as u32)
                    .checked_sub(MAIN_STACK_RESERVE)
                    .and_then(|top| top.checked_sub(stack_size))
                    .ok_or(KernelError::InvalidArgument)?
            } else {
                stack
            };
            let main = MainThread {
                gp,
                stack,
                stack_size,
                args,
                root,
            };
            let stack_top = kernel.initialize_main_thread(cpu, &main)?;
            Ok(SyscallReturn::Handle(stack_top))
        }
        Syscall::InitializeHeapArea { base, size } => {
            Ok(SyscallReturn::Handle(kernel.initialize_heap_area(base, size)?))
        }
        Syscall::EndOfHeap => Ok(SyscallReturn::Handle(kernel.end_of_heap()?)),
        _ => Err(SyscallError::WrongModule("thread")),
    }
}
