//! Simulated Emotion Engine surface for the guest kernel.
//!
//! This crate stands in for the CPU emulator and device backends: it owns the
//! register file, guest RAM, the INTC/DMAC cause latches and the alarm counter,
//! and it delivers traps to a [`TrapHandler`]. It never decodes instructions.

pub mod cpu;
pub mod error;
pub mod intc;
pub mod memory;
pub mod system_bus;
pub mod timer;
pub mod trap;

pub use cpu::*;
pub use error::*;
pub use intc::{InterruptController, InterruptLine};
pub use memory::*;
pub use system_bus::SystemBus;
pub use timer::{Timer, TimerMode};
pub use trap::*;

use log::{trace, warn};

pub struct MachineConfig {
    pub memory_size: usize,
    /// Upper bound on back-to-back interrupt traps delivered by one step.
    pub max_interrupts_per_step: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: 32 * 1024 * 1024,
            max_interrupts_per_step: 64,
        }
    }
}

pub struct Machine<H: TrapHandler> {
    pub cpu: Cpu,
    pub bus: SystemBus,
    pub handler: H,
    pub config: MachineConfig,
    pub trap_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Halt,
    Breakpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Exit(ExitReason),
}

impl<H: TrapHandler> Machine<H> {
    pub fn new(config: MachineConfig, handler: H) -> Self {
        Self {
            cpu: Cpu::new(0),
            bus: SystemBus::new(config.memory_size),
            handler,
            config,
            trap_count: 0,
        }
    }

    fn trap(&mut self, cause: TrapCause) -> Result<StepResult, VmError> {
        self.trap_count += 1;
        trace!("trap #{}: {:?} at pc={:#x}", self.trap_count, cause, self.cpu.pc);
        match self.handler.handle_trap(cause, &mut self.cpu, &mut self.bus) {
            Ok(resume_addr) => {
                self.cpu.pc = resume_addr;
                Ok(StepResult::Continue)
            }
            Err(TrapError::Halt) => Ok(StepResult::Exit(ExitReason::Halt)),
            Err(e) => Err(VmError::Trap(e)),
        }
    }

    /// Performs a kernel call on behalf of the running guest thread.
    ///
    /// `number` goes to `v1`, `args` to `a0..a3` then `t0`; extra arguments
    /// are ignored.
    pub fn syscall(&mut self, number: i32, args: &[u32]) -> Result<StepResult, VmError> {
        self.cpu.write_reg(Register::V1, number as u32);
        let regs = [Register::A0, Register::A1, Register::A2, Register::A3, Register::T0];
        for (reg, &val) in regs.iter().zip(args) {
            self.cpu.write_reg(*reg, val);
        }
        match self.trap(TrapCause::Syscall)? {
            StepResult::Continue => self.deliver_interrupts(),
            exit => Ok(exit),
        }
    }

    pub fn breakpoint(&mut self) -> Result<StepResult, VmError> {
        match self.trap(TrapCause::Breakpoint)? {
            StepResult::Continue => Ok(StepResult::Exit(ExitReason::Breakpoint)),
            exit => Ok(exit),
        }
    }

    /// Latches a device interrupt and delivers whatever became pending.
    pub fn raise(&mut self, line: InterruptLine, cause: u32) -> Result<StepResult, VmError> {
        self.bus.controller_mut(line).raise(cause)?;
        self.deliver_interrupts()
    }

    /// Lets `ticks` of simulated time pass on the alarm counter.
    pub fn advance(&mut self, ticks: u32) -> Result<StepResult, VmError> {
        self.bus.advance_timer(ticks);
        self.deliver_interrupts()
    }

    /// Takes one interrupt trap per pending line until nothing is pending.
    pub fn deliver_interrupts(&mut self) -> Result<StepResult, VmError> {
        for _ in 0..self.config.max_interrupts_per_step {
            let Some(line) = self.bus.pending_line() else {
                return Ok(StepResult::Continue);
            };
            if let StepResult::Exit(reason) = self.trap(TrapCause::Interrupt(line))? {
                return Ok(StepResult::Exit(reason));
            }
        }
        if self.bus.pending_line().is_some() {
            warn!(
                "interrupts still pending after {} traps (intc={:#x}, dmac={:#x})",
                self.config.max_interrupts_per_step,
                self.bus.intc.pending(),
                self.bus.dmac.pending()
            );
        }
        Ok(StepResult::Continue)
    }
}
