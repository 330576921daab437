//! User callbacks run from interrupt context.
//!
//! Host callbacks are plain closures. Guest callbacks are code addresses in
//! guest RAM and need a [`GuestInvoker`] (the CPU emulator) to run.

use crate::types::{AlarmId, ThreadId};
use crate::Kernel;
use eekernel_hw::SystemBus;
use std::fmt;
use std::sync::Arc;

/// Arguments handed to an interrupt or DMA handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerCall {
    pub cause: u32,
    pub arg: u32,
    /// `gp` of the thread that registered the handler.
    pub gp: u32,
}

/// Arguments handed to an alarm callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmCall {
    pub id: AlarmId,
    /// Timer count when the alarm fired.
    pub time: u32,
    pub arg: u32,
    pub gp: u32,
    /// Thread that set the alarm, if one was running.
    pub owner: Option<ThreadId>,
}

pub type HandlerFn = Arc<dyn Fn(&mut Kernel, &mut SystemBus, &HandlerCall) + Send + Sync>;
pub type AlarmFn = Arc<dyn Fn(&mut Kernel, &mut SystemBus, &AlarmCall) + Send + Sync>;

#[derive(Clone)]
pub enum Callback<F> {
    Host(F),
    Guest { entry: u32 },
}

impl<F> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Host(_) => f.write_str("Host(..)"),
            Callback::Guest { entry } => write!(f, "Guest({entry:#x})"),
        }
    }
}

impl Callback<HandlerFn> {
    pub fn handler(f: impl Fn(&mut Kernel, &mut SystemBus, &HandlerCall) + Send + Sync + 'static) -> Self {
        Callback::Host(Arc::new(f))
    }
}

impl Callback<AlarmFn> {
    pub fn alarm(f: impl Fn(&mut Kernel, &mut SystemBus, &AlarmCall) + Send + Sync + 'static) -> Self {
        Callback::Host(Arc::new(f))
    }
}

/// Runs guest code on the kernel's behalf.
pub trait GuestInvoker: Send {
    /// Calls the function at `entry` with `gp` loaded and `args` in `a0..a2`,
    /// returning once it does.
    fn invoke(&mut self, kernel: &mut Kernel, bus: &mut SystemBus, entry: u32, gp: u32, args: [u32; 3]);
}

impl Kernel {
    pub(crate) fn call_guest(&mut self, bus: &mut SystemBus, entry: u32, gp: u32, args: [u32; 3]) {
        match self.invoker.take() {
            Some(mut invoker) => {
                invoker.invoke(self, bus, entry, gp, args);
                // a nested call may have installed a new invoker; keep it
                if self.invoker.is_none() {
                    self.invoker = Some(invoker);
                }
            }
            None => log::warn!("no guest invoker; skipping callback at {entry:#x}"),
        }
    }

    pub(crate) fn run_handler(&mut self, bus: &mut SystemBus, callback: &Callback<HandlerFn>, call: &HandlerCall) {
        match callback {
            Callback::Host(f) => f(self, bus, call),
            Callback::Guest { entry } => self.call_guest(bus, *entry, call.gp, [call.cause, call.arg, 0]),
        }
    }

    pub(crate) fn run_alarm(&mut self, bus: &mut SystemBus, callback: &Callback<AlarmFn>, call: &AlarmCall) {
        match callback {
            Callback::Host(f) => f(self, bus, call),
            Callback::Guest { entry } => {
                self.call_guest(bus, *entry, call.gp, [call.id.val(), call.time, call.arg])
            }
        }
    }
}
