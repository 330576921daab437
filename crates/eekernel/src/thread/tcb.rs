use crate::types::SemaId;
use bitflags::bitflags;
use eekernel_hw::{Cpu, Register};

bitflags! {
    /// Thread status in its guest encoding. A free slot has no bits set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThreadStatus: u32 {
        const RUN = 0x01;
        const READY = 0x02;
        const WAIT = 0x04;
        const SUSPEND = 0x08;
        const DORMANT = 0x10;
    }
}

impl ThreadStatus {
    pub const WAIT_SUSPEND: ThreadStatus = ThreadStatus::WAIT.union(ThreadStatus::SUSPEND);

    pub fn is_free(self) -> bool {
        self.is_empty()
    }
}

/// What a WAIT thread is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Sleep,
    Semaphore(SemaId),
}

impl WaitReason {
    /// Guest `waitType`: 1 for sleep, 2 for semaphore.
    pub fn guest_type(self) -> u32 {
        match self {
            WaitReason::Sleep => 1,
            WaitReason::Semaphore(_) => 2,
        }
    }
}

/// Register file saved at a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedContext {
    pub pc: u32,
    pub regs: [u32; 32],
    pub hi: u32,
    pub lo: u32,
}

impl SavedContext {
    pub fn new(entry_point: u32, stack_top: u32, gp: u32, return_addr: u32) -> Self {
        let mut regs = [0; 32];
        regs[Register::SP.val()] = stack_top;
        regs[Register::FP.val()] = stack_top;
        regs[Register::GP.val()] = gp;
        regs[Register::RA.val()] = return_addr;
        Self {
            pc: entry_point,
            regs,
            hi: 0,
            lo: 0,
        }
    }

    pub fn save_from(&mut self, cpu: &Cpu) {
        self.pc = cpu.pc;
        self.regs = cpu.regs;
        self.hi = cpu.hi;
        self.lo = cpu.lo;
    }

    pub fn restore_to(&self, cpu: &mut Cpu) {
        cpu.pc = self.pc;
        cpu.regs = self.regs;
        cpu.hi = self.hi;
        cpu.lo = self.lo;
    }

    /// Sets the value the thread sees in `v0` when it resumes.
    pub fn set_return(&mut self, value: u32) {
        self.regs[Register::V0.val()] = value;
    }

    pub fn set_arg(&mut self, value: u32) {
        self.regs[Register::A0.val()] = value;
    }
}

/// Creation parameters for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadParams {
    pub entry: u32,
    pub stack: u32,
    pub stack_size: u32,
    pub gp: u32,
    pub priority: u32,
    pub attr: u32,
    pub option: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadControlBlock {
    pub status: ThreadStatus,
    pub entry: u32,
    pub stack: u32,
    pub stack_size: u32,
    pub gp: u32,
    pub initial_priority: u32,
    pub priority: u32,
    pub attr: u32,
    pub option: u32,
    pub wakeup_count: u32,
    pub wait: Option<WaitReason>,
    pub heap_end: u32,
    pub return_addr: u32,
    pub context: SavedContext,
}

impl Default for ThreadStatus {
    fn default() -> Self {
        ThreadStatus::empty()
    }
}

impl ThreadControlBlock {
    pub fn stack_top(&self) -> u32 {
        self.stack.wrapping_add(self.stack_size)
    }

    pub fn initial_context(&self) -> SavedContext {
        SavedContext::new(self.entry, self.stack_top(), self.gp, self.return_addr)
    }

    /// Puts a retired thread back the way CreateThread left it.
    pub fn reset(&mut self) {
        self.status = ThreadStatus::DORMANT;
        self.priority = self.initial_priority;
        self.wakeup_count = 0;
        self.wait = None;
        self.context = self.initial_context();
    }
}

/// Snapshot returned by ReferThreadStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub status: ThreadStatus,
    pub entry: u32,
    pub stack: u32,
    pub stack_size: u32,
    pub gp: u32,
    pub initial_priority: u32,
    pub current_priority: u32,
    pub attr: u32,
    pub option: u32,
    pub wait: Option<WaitReason>,
    pub wakeup_count: u32,
}

impl From<&ThreadControlBlock> for ThreadInfo {
    fn from(tcb: &ThreadControlBlock) -> Self {
        Self {
            status: tcb.status,
            entry: tcb.entry,
            stack: tcb.stack,
            stack_size: tcb.stack_size,
            gp: tcb.gp,
            initial_priority: tcb.initial_priority,
            current_priority: tcb.priority,
            attr: tcb.attr,
            option: tcb.option,
            wait: tcb.wait,
            wakeup_count: tcb.wakeup_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_context_points_at_entry_and_stack_top() {
        let tcb = ThreadControlBlock {
            entry: 0x1000,
            stack: 0x8000,
            stack_size: 0x800,
            gp: 0x4000,
            return_addr: 0x20,
            ..Default::default()
        };
        let ctx = tcb.initial_context();
        assert_eq!(ctx.pc, 0x1000);
        assert_eq!(ctx.regs[29], 0x8800);
        assert_eq!(ctx.regs[30], 0x8800);
        assert_eq!(ctx.regs[28], 0x4000);
        assert_eq!(ctx.regs[31], 0x20);
    }

    #[test]
    fn save_and_restore_swap_the_whole_register_file() {
        let mut cpu = Cpu::new(0x40);
        cpu.write_reg(Register::V0, 7);
        cpu.hi = 1;
        let mut ctx = SavedContext::default();
        ctx.save_from(&cpu);

        let mut other = Cpu::new(0);
        ctx.restore_to(&mut other);
        assert_eq!(other, cpu);
    }

    #[test]
    fn wait_suspend_composes() {
        let s = ThreadStatus::WAIT_SUSPEND;
        assert_eq!(s.bits(), 0x0C);
        assert!(s.contains(ThreadStatus::WAIT));
        assert!(ThreadStatus::default().is_free());
    }
}
