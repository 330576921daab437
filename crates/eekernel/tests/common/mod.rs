#![allow(dead_code)]

use eekernel::syscall::GuestThreadParam;
use eekernel::{Kernel, KernelConfig, ThreadId};
use eekernel_hw::{write_pod, Machine, MachineConfig, Register, StepResult};

pub const MAIN_ENTRY: u32 = 0x1000;
pub const MAIN_GP: u32 = 0x8000;
pub const MAIN_STACK: u32 = 0x8_0000;
pub const MAIN_STACK_SIZE: u32 = 0x4000;
pub const IDLE_ENTRY: u32 = 0xdead_0000;
/// Scratch guest memory for structures passed by pointer.
pub const SCRATCH: u32 = 0x1_0000;

pub mod nr {
    pub const EXIT: i32 = 4;
    pub const ADD_INTC_HANDLER: i32 = 16;
    pub const REMOVE_INTC_HANDLER: i32 = 17;
    pub const ENABLE_INTC: i32 = 20;
    pub const SET_ALARM: i32 = 24;
    pub const CREATE_THREAD: i32 = 32;
    pub const DELETE_THREAD: i32 = 33;
    pub const START_THREAD: i32 = 34;
    pub const EXIT_THREAD: i32 = 35;
    pub const EXIT_DELETE_THREAD: i32 = 36;
    pub const CHANGE_THREAD_PRIORITY: i32 = 41;
    pub const I_CHANGE_THREAD_PRIORITY: i32 = -42;
    pub const ROTATE_THREAD_READY_QUEUE: i32 = 43;
    pub const RELEASE_WAIT_THREAD: i32 = 45;
    pub const GET_THREAD_ID: i32 = 47;
    pub const REFER_THREAD_STATUS: i32 = 48;
    pub const SLEEP_THREAD: i32 = 50;
    pub const WAKEUP_THREAD: i32 = 51;
    pub const SUSPEND_THREAD: i32 = 55;
    pub const RESUME_THREAD: i32 = 57;
    pub const INITIALIZE_MAIN_THREAD: i32 = 60;
    pub const INITIALIZE_HEAP_AREA: i32 = 61;
    pub const END_OF_HEAP: i32 = 62;
    pub const CREATE_SEMA: i32 = 64;
    pub const DELETE_SEMA: i32 = 65;
    pub const SIGNAL_SEMA: i32 = 66;
    pub const I_SIGNAL_SEMA: i32 = -67;
    pub const WAIT_SEMA: i32 = 68;
    pub const POLL_SEMA: i32 = 69;
    pub const REFER_SEMA_STATUS: i32 = 71;
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A machine whose main thread has been seeded through the syscall ABI.
pub fn boot(config: KernelConfig) -> Machine<Kernel> {
    init_logger();
    let mut m = Machine::new(
        MachineConfig {
            memory_size: 0x10_0000,
            ..Default::default()
        },
        Kernel::new(KernelConfig {
            idle_entry: IDLE_ENTRY,
            ..config
        }),
    );
    m.cpu.pc = MAIN_ENTRY;
    let step = m
        .syscall(
            nr::INITIALIZE_MAIN_THREAD,
            &[MAIN_GP, MAIN_STACK, MAIN_STACK_SIZE, 0, 0],
        )
        .unwrap();
    assert_eq!(step, StepResult::Continue);
    assert_eq!(v0(&m), (MAIN_STACK + MAIN_STACK_SIZE) as i32);
    m
}

pub fn boot_at(main_priority: u32) -> Machine<Kernel> {
    boot(KernelConfig {
        main_priority,
        ..Default::default()
    })
}

pub fn v0(m: &Machine<Kernel>) -> i32 {
    m.cpu.read_reg(Register::V0) as i32
}

/// Issues a call and returns `v0` as the caller sees it right away.
pub fn call(m: &mut Machine<Kernel>, number: i32, args: &[u32]) -> i32 {
    let step = m.syscall(number, args).unwrap();
    assert_eq!(step, StepResult::Continue, "call {number} stopped the machine");
    v0(m)
}

pub fn current(m: &Machine<Kernel>) -> Option<ThreadId> {
    m.handler.threads().current_thread
}

pub fn tid(raw: u32) -> ThreadId {
    ThreadId::new(raw).unwrap()
}

/// Creates a DORMANT thread through guest RAM.
pub fn create_thread(m: &mut Machine<Kernel>, entry: u32, priority: u32) -> u32 {
    let param = GuestThreadParam {
        func: entry,
        stack: 0x4_0000 + entry,
        stack_size: 0x400,
        gp_reg: MAIN_GP,
        initial_priority: priority,
        ..Default::default()
    };
    write_pod(&mut m.bus, SCRATCH, &param).unwrap();
    let tid = call(m, nr::CREATE_THREAD, &[SCRATCH]);
    assert!(tid > 0, "CreateThread failed with {tid}");
    tid as u32
}

/// Creates a semaphore through guest RAM.
pub fn create_sema(m: &mut Machine<Kernel>, init: i32, max: i32) -> u32 {
    let param = eekernel::syscall::GuestSemaParam {
        init_count: init,
        max_count: max,
        ..Default::default()
    };
    write_pod(&mut m.bus, SCRATCH, &param).unwrap();
    let sid = call(m, nr::CREATE_SEMA, &[SCRATCH]);
    assert!(sid >= 0, "CreateSema failed with {sid}");
    sid as u32
}
