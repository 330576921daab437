mod common;

use common::*;
use eekernel::syscall::{GuestSemaParam, GuestThreadParam};
use eekernel::{Kernel, KernelConfig, KernelError, SemaId, ThreadStatus, MAIN_THREAD};
use eekernel_hw::{
    read_pod, write_pod, ExitReason, Machine, MachineConfig, StepResult, TrapError, VmError,
};

const INFO: u32 = SCRATCH + 0x100;

#[test]
fn thread_status_is_written_in_guest_layout() {
    let mut m = boot_at(64);
    let param = GuestThreadParam {
        func: 0x2000,
        stack: 0x4_0000,
        stack_size: 0x800,
        gp_reg: 0x7000,
        initial_priority: 30,
        attr: 0x11,
        option: 0x22,
        ..Default::default()
    };
    write_pod(&mut m.bus, SCRATCH, &param).unwrap();
    let tid = call(&mut m, nr::CREATE_THREAD, &[SCRATCH]) as u32;

    let status = call(&mut m, nr::REFER_THREAD_STATUS, &[tid, INFO]);
    assert_eq!(status as u32, ThreadStatus::DORMANT.bits());
    let info: GuestThreadParam = read_pod(&m.bus, INFO).unwrap();
    assert_eq!(info.func, 0x2000);
    assert_eq!(info.stack, 0x4_0000);
    assert_eq!(info.stack_size, 0x800);
    assert_eq!(info.gp_reg, 0x7000);
    assert_eq!((info.initial_priority, info.current_priority), (30, 30));
    assert_eq!((info.attr, info.option), (0x11, 0x22));

    assert_eq!(call(&mut m, nr::CHANGE_THREAD_PRIORITY, &[tid, 40]), 30);
    assert_eq!(
        call(&mut m, nr::CHANGE_THREAD_PRIORITY, &[tid, 200]),
        KernelError::InvalidArgument.code()
    );
    call(&mut m, nr::REFER_THREAD_STATUS, &[tid, INFO]);
    let info: GuestThreadParam = read_pod(&m.bus, INFO).unwrap();
    assert_eq!(info.current_priority, 40);

    // 0 names the caller
    let status = call(&mut m, nr::REFER_THREAD_STATUS, &[0, 0]);
    assert_eq!(status as u32, ThreadStatus::RUN.bits());
}

#[test]
fn waiting_thread_reports_its_semaphore() {
    let mut m = boot_at(64);
    let s = create_sema(&mut m, 0, 1);
    let a = create_thread(&mut m, 0x2000, 10);
    call(&mut m, nr::START_THREAD, &[a, 0]);
    call(&mut m, nr::WAIT_SEMA, &[s]);

    call(&mut m, nr::REFER_THREAD_STATUS, &[a, INFO]);
    let info: GuestThreadParam = read_pod(&m.bus, INFO).unwrap();
    assert_eq!(info.status, ThreadStatus::WAIT.bits());
    assert_eq!((info.wait_type, info.wait_id), (2, s));

    // terminating the waiter unlinks it from the semaphore
    assert_eq!(call(&mut m, 37, &[a]), a as i32);
    let sema = m.handler.refer_sema_status(SemaId::new(s).unwrap()).unwrap();
    assert_eq!(sema.wait_threads, 0);
    m.handler.check_invariants().unwrap();
}

#[test]
fn semaphore_status_and_polling() {
    let mut m = boot_at(64);
    let param = GuestSemaParam {
        init_count: 2,
        max_count: 5,
        attr: 3,
        option: 4,
        ..Default::default()
    };
    write_pod(&mut m.bus, SCRATCH, &param).unwrap();
    let s = call(&mut m, nr::CREATE_SEMA, &[SCRATCH]) as u32;

    assert_eq!(call(&mut m, nr::REFER_SEMA_STATUS, &[s, INFO]), s as i32);
    let info: GuestSemaParam = read_pod(&m.bus, INFO).unwrap();
    assert_eq!(
        info,
        GuestSemaParam {
            count: 2,
            max_count: 5,
            init_count: 2,
            wait_threads: 0,
            attr: 3,
            option: 4,
        }
    );

    assert_eq!(call(&mut m, nr::POLL_SEMA, &[s]), s as i32);
    assert_eq!(call(&mut m, nr::POLL_SEMA, &[s]), s as i32);
    assert_eq!(call(&mut m, nr::POLL_SEMA, &[s]), KernelError::InvalidState.code());

    // signals beyond the maximum saturate
    for _ in 0..7 {
        call(&mut m, nr::SIGNAL_SEMA, &[s]);
    }
    call(&mut m, nr::REFER_SEMA_STATUS, &[s, INFO]);
    let info: GuestSemaParam = read_pod(&m.bus, INFO).unwrap();
    assert_eq!(info.count, 5);
}

#[test]
fn negative_semaphore_counts_are_rejected() {
    let mut m = boot_at(64);
    let param = GuestSemaParam {
        init_count: -1,
        max_count: 1,
        ..Default::default()
    };
    write_pod(&mut m.bus, SCRATCH, &param).unwrap();
    assert_eq!(
        call(&mut m, nr::CREATE_SEMA, &[SCRATCH]),
        KernelError::InvalidArgument.code()
    );
}

#[test]
fn interrupt_variants_defer_the_switch() {
    let mut m = boot_at(1);
    let a = create_thread(&mut m, 0x2000, 10);
    call(&mut m, nr::START_THREAD, &[a, 0]);

    assert_eq!(call(&mut m, nr::I_CHANGE_THREAD_PRIORITY, &[0, 100]), 1);
    assert_eq!(current(&m), Some(MAIN_THREAD));
    assert!(m.handler.threads().is_reschedule_pending());

    // the next thread-context call performs it
    call(&mut m, nr::GET_THREAD_ID, &[]);
    assert_eq!(current(&m), Some(tid(a)));
}

#[test]
fn interrupt_signal_from_thread_context_still_readies() {
    let mut m = boot_at(64);
    let s = create_sema(&mut m, 0, 1);
    let a = create_thread(&mut m, 0x2000, 10);
    call(&mut m, nr::START_THREAD, &[a, 0]);
    call(&mut m, nr::WAIT_SEMA, &[s]);
    assert_eq!(current(&m), Some(MAIN_THREAD));

    call(&mut m, nr::I_SIGNAL_SEMA, &[s]);
    assert_eq!(current(&m), Some(MAIN_THREAD));
    assert_eq!(
        m.handler.refer_thread_status(tid(a)).unwrap().status,
        ThreadStatus::READY
    );
}

#[test]
fn heap_area_tracks_the_caller() {
    let mut m = boot_at(64);
    assert_eq!(call(&mut m, nr::INITIALIZE_HEAP_AREA, &[0x9_0000, 0x1000]), 0x9_1000);
    assert_eq!(call(&mut m, nr::END_OF_HEAP, &[]), 0x9_1000);
    assert_eq!(
        call(&mut m, nr::INITIALIZE_HEAP_AREA, &[0x9_0000, (-1i32) as u32]),
        MAIN_STACK as i32
    );
}

#[test]
fn main_stack_can_be_placed_at_the_top_of_ram() {
    init_logger();
    let mut m = Machine::new(
        MachineConfig {
            memory_size: 0x10_0000,
            ..Default::default()
        },
        Kernel::new(KernelConfig::default()),
    );
    m.cpu.pc = MAIN_ENTRY;
    let top = call(&mut m, nr::INITIALIZE_MAIN_THREAD, &[0, u32::MAX, 0x4000, 0, 0]);
    assert_eq!(top as u32, 0x10_0000 - 0x1000);
    let main = m.handler.refer_thread_status(MAIN_THREAD).unwrap();
    assert_eq!(main.stack, 0x10_0000 - 0x1000 - 0x4000);
}

#[test]
fn bad_handles_and_pointers_return_error_codes() {
    let mut m = boot_at(64);
    assert_eq!(call(&mut m, nr::WAIT_SEMA, &[200]), KernelError::InvalidHandle.code());
    assert_eq!(call(&mut m, nr::START_THREAD, &[300, 0]), KernelError::InvalidHandle.code());
    assert_eq!(call(&mut m, nr::START_THREAD, &[0, 0]), KernelError::InvalidState.code());
    assert_eq!(
        call(&mut m, nr::CREATE_THREAD, &[0xFFFF_0000]),
        KernelError::InvalidArgument.code()
    );
    assert_eq!(call(&mut m, nr::DELETE_THREAD, &[7]), KernelError::InvalidHandle.code());
}

#[test]
fn unknown_call_numbers_fault_the_trap() {
    let mut m = boot_at(64);
    assert!(matches!(
        m.syscall(99, &[]),
        Err(VmError::Trap(TrapError::HandlerPanic(_)))
    ));
}

#[test]
fn exit_halts_the_machine() {
    let mut m = boot_at(64);
    assert_eq!(m.syscall(nr::EXIT, &[0]).unwrap(), StepResult::Exit(ExitReason::Halt));
}
