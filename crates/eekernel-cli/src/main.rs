mod script;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use eekernel::syscall::{GuestSemaParam, GuestThreadParam};
use eekernel::{Callback, IdlePolicy, Kernel, KernelConfig, Position};
use eekernel_hw::{write_pod, InterruptLine, Machine, MachineConfig, Register, StepResult};
use log::info;
use script::Command;
use std::path::PathBuf;

/// Guest address used for structures passed to the kernel by pointer.
const SCRATCH: u32 = 0x1_0000;
const MAIN_ENTRY: u32 = 0x1000;
const MAIN_GP: u32 = 0x8000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IdleArg {
    Idle,
    Halt,
}

impl From<IdleArg> for IdlePolicy {
    fn from(arg: IdleArg) -> Self {
        match arg {
            IdleArg::Idle => IdlePolicy::Idle,
            IdleArg::Halt => IdlePolicy::Halt,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario script against a fresh kernel
    Run {
        /// Path to the script
        file: PathBuf,

        /// What the CPU does when no thread is ready
        #[arg(long, value_enum, default_value_t = IdleArg::Idle)]
        idle_policy: IdleArg,

        /// Timer period used when no alarm is armed
        #[arg(long, default_value_t = 0x1_0000)]
        alarm_quantum: u32,

        /// Priority of the main thread
        #[arg(long, default_value_t = 64)]
        main_priority: u32,

        /// Guest memory size in bytes
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        memory: usize,
    },
}

enum Reply {
    /// `v0` of a call, or the id a host-side registration produced.
    Value(i32),
    Quiet,
    Halted,
}

struct Session {
    machine: Machine<Kernel>,
}

impl Session {
    fn new(kernel: KernelConfig, memory: usize) -> Self {
        let mut machine = Machine::new(
            MachineConfig {
                memory_size: memory,
                ..Default::default()
            },
            Kernel::new(kernel),
        );
        machine.cpu.pc = MAIN_ENTRY;
        Self { machine }
    }

    fn v0(&self) -> i32 {
        self.machine.cpu.read_reg(Register::V0) as i32
    }

    fn step(&self, step: StepResult) -> Reply {
        match step {
            StepResult::Continue => Reply::Quiet,
            StepResult::Exit(reason) => {
                info!("machine stopped: {:?}", reason);
                Reply::Halted
            }
        }
    }

    /// Issues a kernel call from whatever context the CPU is in.
    fn call(&mut self, number: i32, args: &[u32]) -> Result<Reply> {
        let step = self.machine.syscall(number, args)?;
        Ok(match self.step(step) {
            Reply::Quiet => Reply::Value(self.v0()),
            other => other,
        })
    }

    /// Runs one command. Returns `false` once the machine has stopped.
    fn execute(&mut self, command: Command) -> Result<bool> {
        let reply = match command {
            Command::Boot { stack_size } => {
                let top = self.machine.bus.ram.size() as u32;
                let stack = top
                    .checked_sub(0x1000 + stack_size)
                    .context("stack does not fit in guest memory")?;
                self.call(60, &[MAIN_GP, stack, stack_size, 0, 0])?
            }
            Command::Thread { entry, priority } => {
                let param = GuestThreadParam {
                    func: entry,
                    stack: 0x10_0000 + entry,
                    stack_size: 0x1000,
                    gp_reg: MAIN_GP,
                    initial_priority: priority,
                    ..Default::default()
                };
                write_pod(&mut self.machine.bus, SCRATCH, &param)?;
                self.call(32, &[SCRATCH])?
            }
            Command::Start { tid, arg } => self.call(34, &[tid, arg])?,
            Command::Sema { init, max } => {
                let param = GuestSemaParam {
                    init_count: init,
                    max_count: max,
                    ..Default::default()
                };
                write_pod(&mut self.machine.bus, SCRATCH, &param)?;
                self.call(64, &[SCRATCH])?
            }
            Command::Wait { sid } => self.call(68, &[sid])?,
            Command::Signal { sid } => self.call(66, &[sid])?,
            Command::Sleep => self.call(50, &[])?,
            Command::Wakeup { tid } => self.call(51, &[tid])?,
            Command::ExitThread => self.call(35, &[])?,
            Command::Call { number, args } => self.call(number, &args)?,
            Command::Handler { line, cause } => {
                let callback = Callback::handler(move |kernel, _, call| {
                    info!(
                        "{} handler: cause={} running={:?}",
                        line.name(),
                        call.cause,
                        kernel.threads().current_thread.map(|t| t.val())
                    );
                });
                let kernel = &mut self.machine.handler;
                let id = match line {
                    InterruptLine::Intc => {
                        kernel.add_intc_handler(cause, callback, Position::Tail, 0)?
                    }
                    InterruptLine::Dmac => {
                        kernel.add_dmac_handler(cause, callback, Position::Tail, 0)?
                    }
                };
                Reply::Value(id.val() as i32)
            }
            Command::Enable { line, cause } => {
                let kernel = &mut self.machine.handler;
                let bus = &mut self.machine.bus;
                let changed = match line {
                    InterruptLine::Intc => kernel.enable_intc(bus, cause)?,
                    InterruptLine::Dmac => kernel.enable_dmac(bus, cause)?,
                };
                Reply::Value(changed as i32)
            }
            Command::Raise { line, cause } => {
                let step = self.machine.raise(line, cause)?;
                self.step(step)
            }
            Command::Alarm { ticks } => {
                let callback = Callback::alarm(|_, bus, call| {
                    info!("alarm {} fired at {:#x}", call.id.val(), bus.timer.count());
                });
                let id = self
                    .machine
                    .handler
                    .set_alarm(&mut self.machine.bus, ticks, callback, 0)?;
                Reply::Value(id.val() as i32)
            }
            Command::Tick { ticks } => {
                let step = self.machine.advance(ticks)?;
                self.step(step)
            }
            Command::Status => {
                self.print_status();
                Reply::Quiet
            }
        };
        match reply {
            Reply::Value(v0) => println!("  -> {v0}"),
            Reply::Quiet => {}
            Reply::Halted => return Ok(false),
        }
        Ok(true)
    }

    fn print_status(&self) {
        let kernel = &self.machine.handler;
        let running = kernel.threads().current_thread;
        println!("  timer count={:#x} pc={:#x}", self.machine.bus.timer.count(), self.machine.cpu.pc);
        for (tid, tcb) in kernel.threads().iter() {
            let marker = if Some(tid) == running { "*" } else { " " };
            println!(
                "  {marker}thread {:3} {:?} prio={} wait={:?} wakeups={}",
                tid.val(),
                tcb.status,
                tcb.priority,
                tcb.wait,
                tcb.wakeup_count
            );
        }
        for (sid, sema) in kernel.semaphores().iter() {
            println!(
                "   sema {:3} count={} waiting={}",
                sid.val(),
                sema.count,
                kernel.semaphores().waiters(sid).map(|w| w.count()).unwrap_or(0)
            );
        }
        for alarm in kernel.alarms().iter() {
            println!("   alarm {:3} remaining={}", alarm.id.val(), alarm.remaining);
        }
        for handler in kernel.handlers().iter() {
            println!(
                "   handler {:3} {} cause={} enabled={}",
                handler.id.val(),
                handler.line.name(),
                handler.cause,
                handler.enabled
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            idle_policy,
            alarm_quantum,
            main_priority,
            memory,
        } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let commands = script::parse(&source)?;
            if memory < 0x20_0000 {
                bail!("guest memory must be at least 2 MiB");
            }

            let config = KernelConfig {
                idle_policy: idle_policy.into(),
                alarm_quantum,
                main_priority,
                ..Default::default()
            };
            let mut session = Session::new(config, memory);
            info!("running {} commands from {}", commands.len(), file.display());

            for (line, command) in commands {
                println!("{line:4}: {command:?}");
                let keep_going = session
                    .execute(command)
                    .with_context(|| format!("line {line}"))?;
                if !keep_going {
                    println!("machine halted at line {line}");
                    break;
                }
            }
        }
    }

    Ok(())
}
