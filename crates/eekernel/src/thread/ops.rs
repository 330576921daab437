//! Thread kernel calls.
//!
//! `i_*` calls are safe from interrupt context: they only mark a reschedule.
//! Calls taking a `Cpu` run on behalf of the current thread and perform the
//! switch before returning.

use super::tcb::{ThreadInfo, ThreadParams, ThreadStatus, WaitReason};
use super::Sleep;
use crate::error::KernelError;
use crate::types::ThreadId;
use crate::Kernel;
use eekernel_hw::{Cpu, Register};
use log::{debug, info};

/// Boot parameters for the main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MainThread {
    pub gp: u32,
    pub stack: u32,
    pub stack_size: u32,
    /// Guest pointer to the argument block, passed in `a0`.
    pub args: u32,
    /// Address a thread returns to when its entry function returns.
    pub root: u32,
}

impl Kernel {
    /// Makes the calling context thread 0. Returns its stack top.
    pub fn initialize_main_thread(
        &mut self,
        cpu: &mut Cpu,
        main: &MainThread,
    ) -> Result<u32, KernelError> {
        let tid = self.threads.claim_main(
            cpu.pc,
            main.gp,
            main.stack,
            main.stack_size,
            main.root,
            self.config.main_priority,
        )?;
        let stack_top = self.threads.get(tid)?.stack_top();
        cpu.write_reg(Register::GP, main.gp);
        cpu.write_reg(Register::SP, stack_top);
        cpu.write_reg(Register::FP, stack_top);
        cpu.write_reg(Register::RA, main.root);
        cpu.write_reg(Register::A0, main.args);
        info!("main thread up: stack={:#x}..{:#x} gp={:#x}", main.stack, stack_top, main.gp);
        Ok(stack_top)
    }

    pub fn create_thread(&mut self, params: &ThreadParams) -> Result<ThreadId, KernelError> {
        let tid = self.threads.create(params, self.threads.current_thread)?;
        debug!(
            "CreateThread: tid={} entry={:#x} prio={}",
            tid.val(),
            params.entry,
            params.priority
        );
        Ok(tid)
    }

    pub fn delete_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        self.threads.delete(tid)?;
        debug!("DeleteThread: tid={}", tid.val());
        Ok(())
    }

    pub fn start_thread(&mut self, cpu: &mut Cpu, tid: ThreadId, arg: u32) -> Result<(), KernelError> {
        self.threads.start(tid, arg)?;
        debug!("StartThread: tid={} arg={:#x}", tid.val(), arg);
        self.reschedule(cpu)
    }

    /// Retires the caller; execution continues in whichever thread is next.
    pub fn exit_thread(&mut self, cpu: &mut Cpu) -> Result<ThreadId, KernelError> {
        let tid = self.threads.exit_current()?;
        info!("thread {} exited", tid.val());
        self.reschedule(cpu)?;
        Ok(tid)
    }

    pub fn exit_delete_thread(&mut self, cpu: &mut Cpu) -> Result<ThreadId, KernelError> {
        let tid = self.retire_and_delete()?;
        self.reschedule(cpu)?;
        Ok(tid)
    }

    pub(crate) fn retire_and_delete(&mut self) -> Result<ThreadId, KernelError> {
        let tid = self.threads.exit_current()?;
        self.threads.delete(tid)?;
        info!("thread {} exited and was deleted", tid.val());
        Ok(tid)
    }

    pub fn i_terminate_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        if let Some(WaitReason::Semaphore(sid)) = self.threads.terminate(tid)? {
            self.semas.remove_waiter(sid, tid);
        }
        info!("thread {} terminated", tid.val());
        Ok(())
    }

    pub fn terminate_thread(&mut self, cpu: &mut Cpu, tid: ThreadId) -> Result<(), KernelError> {
        self.i_terminate_thread(tid)?;
        self.reschedule(cpu)
    }

    /// Returns the previous priority.
    pub fn i_change_thread_priority(
        &mut self,
        tid: ThreadId,
        priority: u32,
    ) -> Result<u32, KernelError> {
        let old = self.threads.change_priority(tid, priority)?;
        debug!("ChangeThreadPriority: tid={} {} -> {}", tid.val(), old, priority);
        Ok(old)
    }

    pub fn change_thread_priority(
        &mut self,
        cpu: &mut Cpu,
        tid: ThreadId,
        priority: u32,
    ) -> Result<u32, KernelError> {
        let old = self.i_change_thread_priority(tid, priority)?;
        self.reschedule(cpu)?;
        Ok(old)
    }

    pub fn i_rotate_thread_ready_queue(&mut self, priority: u32) -> Result<(), KernelError> {
        self.threads.rotate(priority)
    }

    pub fn rotate_thread_ready_queue(&mut self, cpu: &mut Cpu, priority: u32) -> Result<(), KernelError> {
        self.i_rotate_thread_ready_queue(priority)?;
        self.reschedule(cpu)
    }

    /// Ends another thread's sleep or semaphore wait early. The blocked call
    /// returns [`KernelError::InvalidHandle`]'s code.
    pub fn i_release_wait_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        let tcb = self.threads.get(tid)?;
        if !tcb.status.contains(ThreadStatus::WAIT) {
            return Err(KernelError::InvalidState);
        }
        if let Some(WaitReason::Semaphore(sid)) = tcb.wait {
            self.semas.remove_waiter(sid, tid);
        }
        self.threads.release(tid, KernelError::InvalidHandle.code() as u32);
        debug!("ReleaseWaitThread: tid={}", tid.val());
        Ok(())
    }

    pub fn release_wait_thread(&mut self, cpu: &mut Cpu, tid: ThreadId) -> Result<(), KernelError> {
        self.i_release_wait_thread(tid)?;
        self.reschedule(cpu)
    }

    pub fn get_thread_id(&self) -> Result<ThreadId, KernelError> {
        self.threads.caller()
    }

    pub fn refer_thread_status(&self, tid: ThreadId) -> Result<ThreadInfo, KernelError> {
        self.threads.refer(tid)
    }

    pub fn sleep_thread(&mut self, cpu: &mut Cpu) -> Result<Sleep, KernelError> {
        let outcome = self.threads.sleep_current()?;
        self.reschedule(cpu)?;
        Ok(outcome)
    }

    pub fn i_wakeup_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        self.threads.wakeup(tid)?;
        debug!("WakeupThread: tid={}", tid.val());
        Ok(())
    }

    pub fn wakeup_thread(&mut self, cpu: &mut Cpu, tid: ThreadId) -> Result<(), KernelError> {
        self.i_wakeup_thread(tid)?;
        self.reschedule(cpu)
    }

    /// Returns the number of wakeups that were banked.
    pub fn cancel_wakeup_thread(&mut self, tid: ThreadId) -> Result<u32, KernelError> {
        self.threads.cancel_wakeup(tid)
    }

    pub fn i_suspend_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        self.threads.suspend(tid)?;
        debug!("SuspendThread: tid={}", tid.val());
        Ok(())
    }

    pub fn suspend_thread(&mut self, cpu: &mut Cpu, tid: ThreadId) -> Result<(), KernelError> {
        self.i_suspend_thread(tid)?;
        self.reschedule(cpu)
    }

    pub fn i_resume_thread(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        self.threads.resume(tid)?;
        debug!("ResumeThread: tid={}", tid.val());
        Ok(())
    }

    pub fn resume_thread(&mut self, cpu: &mut Cpu, tid: ThreadId) -> Result<(), KernelError> {
        self.i_resume_thread(tid)?;
        self.reschedule(cpu)
    }

    /// Sets the caller's heap end. A negative size ends the heap at the
    /// caller's stack base.
    pub fn initialize_heap_area(&mut self, base: u32, size: i32) -> Result<u32, KernelError> {
        let tid = self.threads.caller()?;
        let tcb = self.threads.get_mut(tid)?;
        tcb.heap_end = if size < 0 {
            tcb.stack
        } else {
            base.wrapping_add(size as u32)
        };
        Ok(tcb.heap_end)
    }

    pub fn end_of_heap(&self) -> Result<u32, KernelError> {
        let tid = self.threads.caller()?;
        Ok(self.threads.get(tid)?.heap_end)
    }
}
