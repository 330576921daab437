pub mod ops;
pub mod scheduler;
pub mod syscalls;
pub mod tcb;

use crate::error::KernelError;
use crate::list::FreeList;
use crate::types::{check_priority, ThreadId, MAIN_THREAD, MAX_THREADS};
use crate::IdlePolicy;
use eekernel_hw::Cpu;
use log::{debug, trace};
use scheduler::{ReadyQueue, Scheduler};
use tcb::{ThreadControlBlock, ThreadInfo, ThreadParams, ThreadStatus, WaitReason};

/// Result of SleepThread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    /// A banked wakeup was consumed; the caller keeps running.
    Consumed,
    Blocked,
}

/// Thread table, free pool and ready queue.
///
/// Methods here only mutate tables. Anything that could switch threads sets
/// `reschedule_pending`; the switch itself happens in [`ThreadManager::reschedule`].
pub struct ThreadManager {
    threads: Box<[ThreadControlBlock]>,
    free: FreeList<MAX_THREADS>,
    scheduler: Box<dyn Scheduler>,
    pub current_thread: Option<ThreadId>,
    reschedule_pending: bool,
    yield_requested: bool,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        Self {
            threads: vec![ThreadControlBlock::default(); MAX_THREADS].into_boxed_slice(),
            // slot 0 only ever holds the main thread
            free: FreeList::with_range(1..MAX_THREADS),
            scheduler: Box::new(ReadyQueue::new()),
            current_thread: None,
            reschedule_pending: false,
            yield_requested: false,
        }
    }

    pub fn get(&self, tid: ThreadId) -> Result<&ThreadControlBlock, KernelError> {
        let tcb = &self.threads[tid.index()];
        if tcb.status.is_free() {
            Err(KernelError::InvalidHandle)
        } else {
            Ok(tcb)
        }
    }

    pub fn get_mut(&mut self, tid: ThreadId) -> Result<&mut ThreadControlBlock, KernelError> {
        let tcb = &mut self.threads[tid.index()];
        if tcb.status.is_free() {
            Err(KernelError::InvalidHandle)
        } else {
            Ok(tcb)
        }
    }

    /// The thread making the call; `InvalidState` while the CPU idles.
    pub fn caller(&self) -> Result<ThreadId, KernelError> {
        self.current_thread.ok_or(KernelError::InvalidState)
    }

    pub fn current_tcb(&self) -> Option<&ThreadControlBlock> {
        self.current_thread.map(|tid| &self.threads[tid.index()])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &ThreadControlBlock)> {
        self.threads
            .iter()
            .enumerate()
            .filter(|(_, tcb)| !tcb.status.is_free())
            .map(|(i, tcb)| (ThreadId::from_index(i), tcb))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_queued(&self, tid: ThreadId) -> bool {
        self.scheduler.is_queued(tid)
    }

    /// READY threads at `priority` in dispatch order.
    pub fn ready_bucket(&self, priority: u32) -> impl Iterator<Item = ThreadId> {
        self.scheduler.queued_at(priority).into_iter()
    }

    pub fn is_reschedule_pending(&self) -> bool {
        self.reschedule_pending
    }

    pub fn request_reschedule(&mut self) {
        self.reschedule_pending = true;
    }

    /// Seeds slot 0 as the running thread.
    pub fn claim_main(
        &mut self,
        entry: u32,
        gp: u32,
        stack: u32,
        stack_size: u32,
        root: u32,
        priority: u32,
    ) -> Result<ThreadId, KernelError> {
        check_priority(priority)?;
        if !self.threads[MAIN_THREAD.index()].status.is_free() || self.current_thread.is_some() {
            return Err(KernelError::InvalidState);
        }
        let mut tcb = ThreadControlBlock {
            status: ThreadStatus::RUN,
            entry,
            stack,
            stack_size,
            gp,
            initial_priority: priority,
            priority,
            heap_end: stack,
            return_addr: root,
            ..Default::default()
        };
        tcb.context = tcb.initial_context();
        self.threads[MAIN_THREAD.index()] = tcb;
        self.current_thread = Some(MAIN_THREAD);
        Ok(MAIN_THREAD)
    }

    pub fn create(
        &mut self,
        params: &ThreadParams,
        creator: Option<ThreadId>,
    ) -> Result<ThreadId, KernelError> {
        check_priority(params.priority)?;
        let index = self.free.pop().ok_or(KernelError::ResourceExhausted)?;
        let (heap_end, return_addr) = creator
            .map(|tid| &self.threads[tid.index()])
            .map_or((0, 0), |parent| (parent.heap_end, parent.return_addr));

        let mut tcb = ThreadControlBlock {
            status: ThreadStatus::DORMANT,
            entry: params.entry,
            stack: params.stack,
            stack_size: params.stack_size,
            gp: params.gp,
            initial_priority: params.priority,
            priority: params.priority,
            attr: params.attr,
            option: params.option,
            heap_end,
            return_addr,
            ..Default::default()
        };
        tcb.context = tcb.initial_context();
        self.threads[index] = tcb;
        Ok(ThreadId::from_index(index))
    }

    /// Status check shared by calls that must not target the caller.
    fn other(&mut self, tid: ThreadId) -> Result<&mut ThreadControlBlock, KernelError> {
        if self.current_thread == Some(tid) {
            self.get(tid)?;
            return Err(KernelError::InvalidState);
        }
        self.get_mut(tid)
    }

    pub fn start(&mut self, tid: ThreadId, arg: u32) -> Result<(), KernelError> {
        let tcb = self.other(tid)?;
        if tcb.status != ThreadStatus::DORMANT {
            return Err(KernelError::InvalidState);
        }
        tcb.context.set_arg(arg);
        self.make_ready(tid);
        Ok(())
    }

    fn make_ready(&mut self, tid: ThreadId) {
        let tcb = &mut self.threads[tid.index()];
        tcb.status = ThreadStatus::READY;
        tcb.wait = None;
        let priority = tcb.priority;
        self.scheduler.enqueue(tid, priority);
        self.check_preemption();
    }

    /// Retires the caller to DORMANT.
    pub fn exit_current(&mut self) -> Result<ThreadId, KernelError> {
        let tid = self.caller()?;
        self.threads[tid.index()].reset();
        self.current_thread = None;
        self.reschedule_pending = true;
        Ok(tid)
    }

    pub fn delete(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        let tcb = self.other(tid)?;
        if tcb.status != ThreadStatus::DORMANT {
            return Err(KernelError::InvalidState);
        }
        *tcb = ThreadControlBlock::default();
        // slot 0 goes back to InitializeMainThread, not the pool
        if tid != MAIN_THREAD {
            self.free.push(tid.index());
        }
        Ok(())
    }

    /// Forces another live thread back to DORMANT. Returns what it was
    /// waiting on so the owner of that wait list can unlink it.
    pub fn terminate(&mut self, tid: ThreadId) -> Result<Option<WaitReason>, KernelError> {
        let tcb = self.other(tid)?;
        if tcb.status == ThreadStatus::DORMANT {
            return Err(KernelError::InvalidState);
        }
        let (status, wait, priority) = (tcb.status, tcb.wait, tcb.priority);
        tcb.reset();
        if status == ThreadStatus::READY {
            self.scheduler.dequeue(tid, priority);
        }
        Ok(wait)
    }

    /// Returns the previous priority.
    pub fn change_priority(&mut self, tid: ThreadId, priority: u32) -> Result<u32, KernelError> {
        check_priority(priority)?;
        let tcb = self.get_mut(tid)?;
        let old = tcb.priority;
        tcb.priority = priority;
        let status = tcb.status;
        if status == ThreadStatus::READY {
            // relinked at the tail even when the priority is unchanged
            self.scheduler.dequeue(tid, old);
            self.scheduler.enqueue(tid, priority);
        } else if status == ThreadStatus::RUN && priority > old && !self.scheduler.is_empty() {
            // a demoted caller queues behind threads already at its new level
            self.yield_requested = true;
            self.reschedule_pending = true;
        }
        self.check_preemption();
        Ok(old)
    }

    pub fn rotate(&mut self, priority: u32) -> Result<(), KernelError> {
        check_priority(priority)?;
        if self.running_priority() == Some(priority) {
            if !self.scheduler.is_empty() {
                self.yield_requested = true;
                self.reschedule_pending = true;
            }
        } else {
            self.scheduler.rotate(priority);
        }
        Ok(())
    }

    pub fn suspend(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        let tcb = self.other(tid)?;
        let status = tcb.status;
        if status == ThreadStatus::READY {
            tcb.status = ThreadStatus::SUSPEND;
            let priority = tcb.priority;
            self.scheduler.dequeue(tid, priority);
        } else if status == ThreadStatus::WAIT {
            tcb.status = ThreadStatus::WAIT_SUSPEND;
        } else {
            return Err(KernelError::InvalidState);
        }
        Ok(())
    }

    pub fn resume(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        let tcb = self.other(tid)?;
        if tcb.status == ThreadStatus::SUSPEND {
            self.make_ready(tid);
        } else if tcb.status == ThreadStatus::WAIT_SUSPEND {
            tcb.status = ThreadStatus::WAIT;
        }
        Ok(())
    }

    /// Marks the caller WAIT. It stays current until the next reschedule
    /// saves its context.
    pub fn block_current(&mut self, reason: WaitReason) -> Result<ThreadId, KernelError> {
        let tid = self.caller()?;
        let tcb = &mut self.threads[tid.index()];
        tcb.status = ThreadStatus::WAIT;
        tcb.wait = Some(reason);
        self.reschedule_pending = true;
        Ok(tid)
    }

    /// Ends a WAIT. `result` is what the blocked call returns in `v0`.
    pub fn release(&mut self, tid: ThreadId, result: u32) {
        let tcb = &mut self.threads[tid.index()];
        debug_assert!(tcb.status.contains(ThreadStatus::WAIT));
        tcb.context.set_return(result);
        tcb.wait = None;
        if tcb.status.contains(ThreadStatus::SUSPEND) {
            tcb.status = ThreadStatus::SUSPEND;
        } else {
            self.make_ready(tid);
        }
    }

    pub fn sleep_current(&mut self) -> Result<Sleep, KernelError> {
        let tid = self.caller()?;
        let tcb = &mut self.threads[tid.index()];
        if tcb.wakeup_count > 0 {
            tcb.wakeup_count -= 1;
            return Ok(Sleep::Consumed);
        }
        self.block_current(WaitReason::Sleep)?;
        Ok(Sleep::Blocked)
    }

    pub fn wakeup(&mut self, tid: ThreadId) -> Result<(), KernelError> {
        let tcb = self.other(tid)?;
        if tcb.status == ThreadStatus::DORMANT {
            return Err(KernelError::InvalidState);
        }
        if tcb.wait == Some(WaitReason::Sleep) {
            self.release(tid, tid.val());
        } else {
            tcb.wakeup_count += 1;
        }
        Ok(())
    }

    pub fn cancel_wakeup(&mut self, tid: ThreadId) -> Result<u32, KernelError> {
        let tcb = self.get_mut(tid)?;
        Ok(std::mem::take(&mut tcb.wakeup_count))
    }

    pub fn refer(&self, tid: ThreadId) -> Result<ThreadInfo, KernelError> {
        self.get(tid).map(ThreadInfo::from)
    }

    fn running_priority(&self) -> Option<u32> {
        self.current_tcb()
            .filter(|tcb| tcb.status == ThreadStatus::RUN)
            .map(|tcb| tcb.priority)
    }

    /// Flags a switch when a READY thread outranks whatever runs now.
    pub fn check_preemption(&mut self) {
        let Some(top) = self.scheduler.top_priority() else {
            return;
        };
        let preempt = match self.running_priority() {
            Some(current) => top < current,
            None => true,
        };
        if preempt {
            self.reschedule_pending = true;
        }
    }

    /// Performs a pending switch: saves the outgoing register file, restores
    /// the most urgent READY thread's, or parks the CPU on the idle context.
    pub fn reschedule(
        &mut self,
        cpu: &mut Cpu,
        policy: IdlePolicy,
        idle_entry: u32,
    ) -> Result<(), KernelError> {
        if !std::mem::take(&mut self.reschedule_pending) {
            return Ok(());
        }
        let yielded = std::mem::take(&mut self.yield_requested);
        let top = self.scheduler.top_priority();

        if let Some(current) = self.current_thread {
            let tcb = &mut self.threads[current.index()];
            if tcb.status == ThreadStatus::RUN {
                let switch = top.is_some_and(|top| {
                    top < tcb.priority || (yielded && top == tcb.priority)
                });
                if !switch {
                    return Ok(());
                }
                tcb.context.save_from(cpu);
                tcb.status = ThreadStatus::READY;
                let priority = tcb.priority;
                if yielded {
                    self.scheduler.enqueue(current, priority);
                } else {
                    self.scheduler.enqueue_front(current, priority);
                }
                trace!("thread {} preempted at pc={:#x}", current.val(), cpu.pc);
            } else {
                tcb.context.save_from(cpu);
                trace!("thread {} blocked at pc={:#x}", current.val(), cpu.pc);
            }
            self.current_thread = None;
        }

        match self.scheduler.pick_next() {
            Some(next) => {
                let tcb = &mut self.threads[next.index()];
                tcb.status = ThreadStatus::RUN;
                tcb.context.restore_to(cpu);
                self.current_thread = Some(next);
                trace!("switch to thread {} pc={:#x}", next.val(), cpu.pc);
                Ok(())
            }
            None => match policy {
                IdlePolicy::Idle => {
                    debug!("no READY thread, idling");
                    *cpu = Cpu::new(idle_entry);
                    Ok(())
                }
                IdlePolicy::Halt => Err(KernelError::NoRunnableThread),
            },
        }
    }

    /// Cross-checks ready-queue membership against thread status.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut running = 0;
        for (tid, tcb) in self.iter() {
            let queued = self.scheduler.is_queued(tid);
            if queued != (tcb.status == ThreadStatus::READY) {
                return Err(format!(
                    "thread {} status {:?} queued={}",
                    tid.val(),
                    tcb.status,
                    queued
                ));
            }
            if tcb.status == ThreadStatus::RUN {
                running += 1;
                if self.current_thread != Some(tid) {
                    return Err(format!("thread {} is RUN but not current", tid.val()));
                }
            }
        }
        let ready = self
            .iter()
            .filter(|(_, tcb)| tcb.status == ThreadStatus::READY)
            .count();
        if ready != self.scheduler.len() {
            return Err(format!("{} READY threads, {} queued", ready, self.scheduler.len()));
        }
        if running > 1 {
            return Err(format!("{running} threads in RUN"));
        }
        Ok(())
    }
}
