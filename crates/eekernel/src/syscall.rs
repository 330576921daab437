//! Guest kernel-call ABI.
//!
//! The call number is in `v1`; a negative number selects the interrupt-context
//! variant, which never switches threads. Arguments are `a0..a3` then `t0`,
//! the result goes to `v0`.

use crate::error::SyscallError;
use crate::thread::tcb::ThreadInfo;
use crate::sema::SemaInfo;
use bytemuck::{Pod, Zeroable};
use eekernel_hw::{Cpu, InterruptLine, Register};

/// Guest `ThreadParam` layout, twelve words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GuestThreadParam {
    pub status: u32,
    pub func: u32,
    pub stack: u32,
    pub stack_size: u32,
    pub gp_reg: u32,
    pub initial_priority: u32,
    pub current_priority: u32,
    pub attr: u32,
    pub option: u32,
    pub wait_type: u32,
    pub wait_id: u32,
    pub wakeup_count: u32,
}

impl From<&ThreadInfo> for GuestThreadParam {
    fn from(info: &ThreadInfo) -> Self {
        let (wait_type, wait_id) = match info.wait {
            Some(reason @ crate::thread::tcb::WaitReason::Semaphore(sid)) => {
                (reason.guest_type(), sid.val())
            }
            Some(reason) => (reason.guest_type(), 0),
            None => (0, 0),
        };
        Self {
            status: info.status.bits(),
            func: info.entry,
            stack: info.stack,
            stack_size: info.stack_size,
            gp_reg: info.gp,
            initial_priority: info.initial_priority,
            current_priority: info.current_priority,
            attr: info.attr,
            option: info.option,
            wait_type,
            wait_id,
            wakeup_count: info.wakeup_count,
        }
    }
}

/// Guest `SemaParam` layout, six words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GuestSemaParam {
    pub count: i32,
    pub max_count: i32,
    pub init_count: i32,
    pub wait_threads: i32,
    pub attr: u32,
    pub option: u32,
}

impl From<&SemaInfo> for GuestSemaParam {
    fn from(info: &SemaInfo) -> Self {
        Self {
            count: info.count as i32,
            max_count: info.max_count as i32,
            init_count: info.init_count as i32,
            wait_threads: info.wait_threads as i32,
            attr: info.attr,
            option: info.option,
        }
    }
}

/// Where a new handler goes in its chain, as the guest encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestPosition {
    Head,
    Tail,
    After(u32),
}

impl GuestPosition {
    /// `-1` appends, `0` prepends, anything else is the handler to follow.
    pub fn decode(next: i32) -> Self {
        match next {
            -1 => GuestPosition::Tail,
            0 => GuestPosition::Head,
            id => GuestPosition::After(id as u32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Exit { code: i32 },

    AddHandler { line: InterruptLine, cause: u32, entry: u32, next: GuestPosition, arg: u32 },
    RemoveHandler { line: InterruptLine, cause: u32, id: u32 },
    EnableCause { line: InterruptLine, cause: u32 },
    DisableCause { line: InterruptLine, cause: u32 },
    EnableHandler { line: InterruptLine, id: u32 },
    DisableHandler { line: InterruptLine, id: u32 },

    SetAlarm { ticks: u32, entry: u32, arg: u32 },
    ReleaseAlarm { id: u32 },

    CreateThread { param: u32 },
    DeleteThread { tid: u32 },
    StartThread { tid: u32, arg: u32 },
    ExitThread,
    ExitDeleteThread,
    TerminateThread { tid: u32 },
    ChangeThreadPriority { tid: u32, priority: u32 },
    RotateThreadReadyQueue { priority: u32 },
    ReleaseWaitThread { tid: u32 },
    GetThreadId,
    ReferThreadStatus { tid: u32, info: u32 },
    SleepThread,
    WakeupThread { tid: u32 },
    CancelWakeupThread { tid: u32 },
    SuspendThread { tid: u32 },
    ResumeThread { tid: u32 },
    InitializeMainThread { gp: u32, stack: u32, stack_size: u32, args: u32, root: u32 },
    InitializeHeapArea { base: u32, size: i32 },
    EndOfHeap,

    CreateSema { param: u32 },
    DeleteSema { sid: u32 },
    SignalSema { sid: u32 },
    WaitSema { sid: u32 },
    PollSema { sid: u32 },
    ReferSemaStatus { sid: u32, info: u32 },
}

/// A decoded call and the context it was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub call: Syscall,
    pub from_interrupt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallReturn {
    Success,
    Value(i32),
    Handle(u32),
}

impl Syscall {
    pub fn from_registers(cpu: &Cpu) -> Result<Request, SyscallError> {
        let number = cpu.read_reg(Register::V1) as i32;
        let [a0, a1, a2, a3, t0] = cpu.syscall_args();
        use InterruptLine::{Dmac, Intc};

        let call = match number {
            4 => Syscall::Exit { code: a0 as i32 },
            16 | 18 => Syscall::AddHandler {
                line: if number == 16 { Intc } else { Dmac },
                cause: a0,
                entry: a1,
                next: GuestPosition::decode(a2 as i32),
                arg: a3,
            },
            17 | 19 => Syscall::RemoveHandler {
                line: if number == 17 { Intc } else { Dmac },
                cause: a0,
                id: a1,
            },
            20 => Syscall::EnableCause { line: Intc, cause: a0 },
            21 => Syscall::DisableCause { line: Intc, cause: a0 },
            22 => Syscall::EnableCause { line: Dmac, cause: a0 },
            23 => Syscall::DisableCause { line: Dmac, cause: a0 },
            24 | -30 => Syscall::SetAlarm { ticks: a0 & 0xFFFF, entry: a1, arg: a2 },
            25 | -31 => Syscall::ReleaseAlarm { id: a0 },
            32 => Syscall::CreateThread { param: a0 },
            33 => Syscall::DeleteThread { tid: a0 },
            34 => Syscall::StartThread { tid: a0, arg: a1 },
            35 => Syscall::ExitThread,
            36 => Syscall::ExitDeleteThread,
            37 | -38 => Syscall::TerminateThread { tid: a0 },
            41 | -42 => Syscall::ChangeThreadPriority { tid: a0, priority: a1 },
            43 | -44 => Syscall::RotateThreadReadyQueue { priority: a0 },
            45 | -46 => Syscall::ReleaseWaitThread { tid: a0 },
            47 => Syscall::GetThreadId,
            48 | -49 => Syscall::ReferThreadStatus { tid: a0, info: a1 },
            50 => Syscall::SleepThread,
            51 | -52 => Syscall::WakeupThread { tid: a0 },
            53 | -54 => Syscall::CancelWakeupThread { tid: a0 },
            55 | -56 => Syscall::SuspendThread { tid: a0 },
            57 | -58 => Syscall::ResumeThread { tid: a0 },
            60 => Syscall::InitializeMainThread {
                gp: a0,
                stack: a1,
                stack_size: a2,
                args: a3,
                root: t0,
            },
            61 => Syscall::InitializeHeapArea { base: a0, size: a1 as i32 },
            62 => Syscall::EndOfHeap,
            64 => Syscall::CreateSema { param: a0 },
            65 | -73 => Syscall::DeleteSema { sid: a0 },
            66 | -67 => Syscall::SignalSema { sid: a0 },
            68 => Syscall::WaitSema { sid: a0 },
            69 | -70 => Syscall::PollSema { sid: a0 },
            71 | -72 => Syscall::ReferSemaStatus { sid: a0, info: a1 },
            92 => Syscall::EnableHandler { line: Intc, id: a0 },
            93 => Syscall::DisableHandler { line: Intc, id: a0 },
            94 => Syscall::EnableHandler { line: Dmac, id: a0 },
            95 => Syscall::DisableHandler { line: Dmac, id: a0 },
            _ => return Err(SyscallError::InvalidSyscallNumber(number)),
        };

        Ok(Request {
            call,
            from_interrupt: number < 0,
        })
    }

    pub fn encode_result(result: Result<SyscallReturn, SyscallError>, cpu: &mut Cpu) {
        let v0 = match result {
            Ok(SyscallReturn::Success) => 0,
            Ok(SyscallReturn::Value(v)) => v as u32,
            Ok(SyscallReturn::Handle(h)) => h,
            Err(e) => e.code() as u32,
        };
        cpu.write_reg(Register::V0, v0);
    }
}
