//! EE guest kernel services: threads, semaphores, interrupt handler chains
//! and alarms, reached through the guest syscall ABI or called directly.

pub mod alarm;
pub mod callback;
pub mod error;
pub mod intc;
pub mod list;
pub mod sema;
pub mod syscall;
pub mod thread;
pub mod types;

pub use alarm::{AlarmInfo, AlarmTable};
pub use callback::{AlarmCall, AlarmFn, Callback, GuestInvoker, HandlerCall, HandlerFn};
pub use error::{KernelError, SyscallError};
pub use intc::{HandlerInfo, HandlerRegistry, Position};
pub use sema::{SemaInfo, SemaManager, SemaWait};
pub use thread::ops::MainThread;
pub use thread::tcb::{ThreadInfo, ThreadParams, ThreadStatus, WaitReason};
pub use thread::{Sleep, ThreadManager};
pub use types::*;

use eekernel_hw::{Cpu, InterruptLine, SystemBus, TrapCause, TrapError, TrapHandler};
use log::{debug, info};
use syscall::Syscall;

/// What the CPU does when no thread is READY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdlePolicy {
    /// Park on the idle entry until an interrupt readies a thread.
    #[default]
    Idle,
    /// Stop the machine.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub idle_policy: IdlePolicy,
    /// PC loaded while idling.
    pub idle_entry: u32,
    /// Timer period programmed when no alarm is armed.
    pub alarm_quantum: u32,
    pub main_priority: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            idle_policy: IdlePolicy::Idle,
            idle_entry: 0,
            alarm_quantum: 0x1_0000,
            main_priority: 0,
        }
    }
}

pub struct Kernel {
    config: KernelConfig,
    threads: ThreadManager,
    semas: SemaManager,
    handlers: HandlerRegistry,
    alarms: AlarmTable,
    invoker: Option<Box<dyn GuestInvoker>>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            threads: ThreadManager::new(),
            semas: SemaManager::new(),
            handlers: HandlerRegistry::new(),
            alarms: AlarmTable::new(),
            invoker: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Installs the emulator hook used to run guest-address callbacks.
    pub fn set_guest_invoker(&mut self, invoker: Box<dyn GuestInvoker>) {
        self.invoker = Some(invoker);
    }

    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    pub fn semaphores(&self) -> &SemaManager {
        &self.semas
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn alarms(&self) -> &AlarmTable {
        &self.alarms
    }

    /// Performs any switch marked pending since the last suspension point.
    pub fn reschedule(&mut self, cpu: &mut Cpu) -> Result<(), KernelError> {
        self.threads
            .reschedule(cpu, self.config.idle_policy, self.config.idle_entry)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.threads.check_invariants()?;
        self.semas.check_invariants()?;
        for (sid, _) in self.semas.iter() {
            for tid in self.semas.waiters(sid).map_err(|e| e.to_string())? {
                let tcb = self.threads.get(tid).map_err(|e| e.to_string())?;
                if tcb.wait != Some(WaitReason::Semaphore(sid)) {
                    return Err(format!(
                        "thread {} queued on sema {} but waits on {:?}",
                        tid.val(),
                        sid.val(),
                        tcb.wait
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle_syscall(&mut self, cpu: &mut Cpu, bus: &mut SystemBus) -> Result<u32, TrapError> {
        let request = Syscall::from_registers(cpu)
            .map_err(|e| TrapError::HandlerPanic(format!("Syscall decode error: {e}")))?;
        debug!("Syscall: {:?}", request);

        cpu.pc = cpu.pc.wrapping_add(4);

        let result = match request.call {
            Syscall::Exit { code } => {
                info!("guest exit: {}", code);
                return Err(TrapError::Halt);
            }
            call @ (Syscall::AddHandler { .. }
            | Syscall::RemoveHandler { .. }
            | Syscall::EnableCause { .. }
            | Syscall::DisableCause { .. }
            | Syscall::EnableHandler { .. }
            | Syscall::DisableHandler { .. }) => intc::syscalls::handle_syscall(self, call, cpu, bus),
            call @ (Syscall::SetAlarm { .. } | Syscall::ReleaseAlarm { .. }) => {
                alarm::syscalls::handle_syscall(self, call, cpu, bus)
            }
            call @ (Syscall::CreateSema { .. }
            | Syscall::DeleteSema { .. }
            | Syscall::SignalSema { .. }
            | Syscall::WaitSema { .. }
            | Syscall::PollSema { .. }
            | Syscall::ReferSemaStatus { .. }) => sema::syscalls::handle_syscall(self, call, bus),
            call => thread::syscalls::handle_syscall(self, call, cpu, bus),
        };
        if let Err(e) = &result {
            debug!("{:?} failed: {}", request.call, e);
        }
        Syscall::encode_result(result, cpu);

        if request.from_interrupt {
            return Ok(cpu.pc);
        }
        match self.reschedule(cpu) {
            Ok(()) => Ok(cpu.pc),
            Err(KernelError::NoRunnableThread) => {
                info!("no runnable thread left, halting");
                Err(TrapError::Halt)
            }
            Err(e) => Err(TrapError::HandlerPanic(e.to_string())),
        }
    }

    fn handle_interrupt(
        &mut self,
        line: InterruptLine,
        cpu: &mut Cpu,
        bus: &mut SystemBus,
    ) -> Result<u32, TrapError> {
        match self.dispatch_interrupt(line, cpu, bus) {
            Ok(()) => Ok(cpu.pc),
            Err(KernelError::NoRunnableThread) => {
                info!("no runnable thread left, halting");
                Err(TrapError::Halt)
            }
            Err(e) => Err(TrapError::HandlerPanic(e.to_string())),
        }
    }
}

impl TrapHandler for Kernel {
    fn handle_trap(
        &mut self,
        cause: TrapCause,
        cpu: &mut Cpu,
        bus: &mut SystemBus,
    ) -> Result<u32, TrapError> {
        match cause {
            TrapCause::Syscall => self.handle_syscall(cpu, bus),
            TrapCause::Interrupt(line) => self.handle_interrupt(line, cpu, bus),
            _ => Err(TrapError::Unhandled(cause)),
        }
    }
}
