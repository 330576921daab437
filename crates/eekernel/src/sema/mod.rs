pub mod syscalls;

use crate::error::KernelError;
use crate::list::{FreeList, Links, ListHead};
use crate::thread::tcb::WaitReason;
use crate::types::{SemaId, ThreadId, MAX_SEMAPHORES, MAX_THREADS};
use crate::Kernel;
use eekernel_hw::Cpu;
use log::debug;

/// Result of WaitSema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaWait {
    Acquired,
    /// The caller is queued; SignalSema or DeleteSema will release it.
    Blocked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Semaphore {
    pub count: u32,
    pub max_count: u32,
    pub init_count: u32,
    pub attr: u32,
    pub option: u32,
    wait_threads: u32,
    waiters: ListHead,
    in_use: bool,
}

/// Snapshot returned by ReferSemaStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaInfo {
    pub count: u32,
    pub max_count: u32,
    pub init_count: u32,
    pub wait_threads: u32,
    pub attr: u32,
    pub option: u32,
}

/// Semaphore table. Wait lists are linked through thread slots, so a thread
/// can wait on at most one semaphore.
pub struct SemaManager {
    semas: Box<[Semaphore]>,
    free: FreeList<MAX_SEMAPHORES>,
    wait_links: Links<MAX_THREADS>,
}

impl Default for SemaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SemaManager {
    pub fn new() -> Self {
        Self {
            semas: vec![Semaphore::default(); MAX_SEMAPHORES].into_boxed_slice(),
            free: FreeList::full(),
            wait_links: Links::new(),
        }
    }

    pub fn get(&self, sid: SemaId) -> Result<&Semaphore, KernelError> {
        let sema = &self.semas[sid.index()];
        if sema.in_use {
            Ok(sema)
        } else {
            Err(KernelError::InvalidHandle)
        }
    }

    fn get_mut(&mut self, sid: SemaId) -> Result<&mut Semaphore, KernelError> {
        let sema = &mut self.semas[sid.index()];
        if sema.in_use {
            Ok(sema)
        } else {
            Err(KernelError::InvalidHandle)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SemaId, &Semaphore)> {
        self.semas
            .iter()
            .enumerate()
            .filter(|(_, sema)| sema.in_use)
            .map(|(i, sema)| (SemaId::from_index(i), sema))
    }

    pub fn create(
        &mut self,
        init_count: i32,
        max_count: i32,
        attr: u32,
        option: u32,
    ) -> Result<SemaId, KernelError> {
        if init_count < 0 || max_count < 0 {
            return Err(KernelError::InvalidArgument);
        }
        let index = self.free.pop().ok_or(KernelError::ResourceExhausted)?;
        self.semas[index] = Semaphore {
            count: init_count as u32,
            max_count: max_count as u32,
            init_count: init_count as u32,
            attr,
            option,
            wait_threads: 0,
            waiters: ListHead::new(),
            in_use: true,
        };
        Ok(SemaId::from_index(index))
    }

    /// Frees the slot. Its wait list must already be empty.
    fn free(&mut self, sid: SemaId) {
        debug_assert!(self.semas[sid.index()].waiters.is_empty());
        self.semas[sid.index()] = Semaphore::default();
        self.free.push(sid.index());
    }

    /// Takes one unit if available.
    pub fn try_acquire(&mut self, sid: SemaId) -> Result<bool, KernelError> {
        let sema = self.get_mut(sid)?;
        if sema.count > 0 {
            sema.count -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Gives back one unit, saturating at the maximum count.
    fn post(&mut self, sid: SemaId) -> Result<(), KernelError> {
        let sema = self.get_mut(sid)?;
        if sema.count < sema.max_count {
            sema.count += 1;
        }
        Ok(())
    }

    fn push_waiter(&mut self, sid: SemaId, tid: ThreadId) {
        let sema = &mut self.semas[sid.index()];
        sema.waiters.push_back(&mut self.wait_links, tid.index());
        sema.wait_threads += 1;
    }

    /// Dequeues the oldest waiter.
    fn pop_waiter(&mut self, sid: SemaId) -> Option<ThreadId> {
        let sema = &mut self.semas[sid.index()];
        let index = sema.waiters.pop_front(&mut self.wait_links)?;
        sema.wait_threads -= 1;
        Some(ThreadId::from_index(index))
    }

    pub fn remove_waiter(&mut self, sid: SemaId, tid: ThreadId) {
        if !self.wait_links.is_linked(tid.index()) {
            return;
        }
        let sema = &mut self.semas[sid.index()];
        sema.waiters.remove(&mut self.wait_links, tid.index());
        sema.wait_threads -= 1;
    }

    /// Waiting threads, oldest first.
    pub fn waiters(&self, sid: SemaId) -> Result<impl Iterator<Item = ThreadId> + '_, KernelError> {
        let sema = self.get(sid)?;
        Ok(sema.waiters.iter(&self.wait_links).map(ThreadId::from_index))
    }

    pub fn info(&self, sid: SemaId) -> Result<SemaInfo, KernelError> {
        let sema = self.get(sid)?;
        Ok(SemaInfo {
            count: sema.count,
            max_count: sema.max_count,
            init_count: sema.init_count,
            wait_threads: sema.wait_threads,
            attr: sema.attr,
            option: sema.option,
        })
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        for (sid, sema) in self.iter() {
            let listed = sema.waiters.iter(&self.wait_links).count();
            if listed != sema.wait_threads as usize {
                return Err(format!(
                    "sema {}: wait_threads={} but {} queued",
                    sid.val(),
                    sema.wait_threads,
                    listed
                ));
            }
        }
        Ok(())
    }
}

impl Kernel {
    pub fn create_sema(
        &mut self,
        init_count: i32,
        max_count: i32,
        attr: u32,
        option: u32,
    ) -> Result<SemaId, KernelError> {
        let sid = self.semas.create(init_count, max_count, attr, option)?;
        debug!("CreateSema: sid={} count={}/{}", sid.val(), init_count, max_count);
        Ok(sid)
    }

    /// Frees the semaphore. Waiters are released and see
    /// [`KernelError::InvalidHandle`]'s code as their WaitSema result.
    pub fn i_delete_sema(&mut self, sid: SemaId) -> Result<(), KernelError> {
        self.semas.get(sid)?;
        let mut released = 0;
        while let Some(tid) = self.semas.pop_waiter(sid) {
            self.threads.release(tid, KernelError::InvalidHandle.code() as u32);
            released += 1;
        }
        self.semas.free(sid);
        debug!("DeleteSema: sid={} released {} waiters", sid.val(), released);
        Ok(())
    }

    pub fn delete_sema(&mut self, cpu: &mut Cpu, sid: SemaId) -> Result<(), KernelError> {
        self.i_delete_sema(sid)?;
        self.reschedule(cpu)
    }

    pub fn i_signal_sema(&mut self, sid: SemaId) -> Result<(), KernelError> {
        self.semas.get(sid)?;
        match self.semas.pop_waiter(sid) {
            Some(tid) => {
                self.threads.release(tid, sid.val());
                debug!("SignalSema: sid={} woke thread {}", sid.val(), tid.val());
                Ok(())
            }
            None => self.semas.post(sid),
        }
    }

    pub fn signal_sema(&mut self, cpu: &mut Cpu, sid: SemaId) -> Result<(), KernelError> {
        self.i_signal_sema(sid)?;
        self.reschedule(cpu)
    }

    /// Takes a unit or queues the caller. Does not switch threads.
    pub(crate) fn try_wait_sema(&mut self, sid: SemaId) -> Result<SemaWait, KernelError> {
        self.semas.get(sid)?;
        self.threads.caller()?;
        if self.semas.try_acquire(sid)? {
            return Ok(SemaWait::Acquired);
        }
        let tid = self.threads.block_current(WaitReason::Semaphore(sid))?;
        self.semas.push_waiter(sid, tid);
        debug!("WaitSema: sid={} blocks thread {}", sid.val(), tid.val());
        Ok(SemaWait::Blocked)
    }

    pub fn wait_sema(&mut self, cpu: &mut Cpu, sid: SemaId) -> Result<SemaWait, KernelError> {
        let outcome = self.try_wait_sema(sid)?;
        self.reschedule(cpu)?;
        Ok(outcome)
    }

    /// Non-blocking WaitSema; `InvalidState` when the count is zero.
    pub fn poll_sema(&mut self, sid: SemaId) -> Result<(), KernelError> {
        if self.semas.try_acquire(sid)? {
            Ok(())
        } else {
            Err(KernelError::InvalidState)
        }
    }

    pub fn refer_sema_status(&self, sid: SemaId) -> Result<SemaInfo, KernelError> {
        self.semas.info(sid)
    }
}
