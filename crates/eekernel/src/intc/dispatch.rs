use crate::callback::HandlerCall;
use crate::error::KernelError;
use crate::types::MAX_HANDLERS;
use crate::Kernel;
use eekernel_hw::intc::cause::TIM3;
use eekernel_hw::{Cpu, InterruptLine, SystemBus};
use log::{trace, warn};

impl Kernel {
    /// Services one interrupt trap on `line`.
    ///
    /// Only the highest pending cause is taken; anything else still pending
    /// raises another trap once this one returns.
    pub fn dispatch_interrupt(
        &mut self,
        line: InterruptLine,
        cpu: &mut Cpu,
        bus: &mut SystemBus,
    ) -> Result<(), KernelError> {
        let pending = bus.controller(line).pending();
        if pending == 0 {
            warn!("spurious {} interrupt", line.name());
            return self.reschedule(cpu);
        }
        let cause = 31 - pending.leading_zeros();
        bus.controller_mut(line)
            .acknowledge(cause)
            .map_err(|_| KernelError::InvalidArgument)?;
        trace!("{} cause {} (pending {:#x})", line.name(), cause, pending);

        if line == InterruptLine::Intc && cause == TIM3 {
            self.service_alarms(bus);
        }
        self.run_chain(line, cause, bus);
        self.reschedule(cpu)
    }

    /// Invokes the chain as it stood when the interrupt was taken. Handlers
    /// removed or disabled by an earlier handler in the same pass are skipped.
    fn run_chain(&mut self, line: InterruptLine, cause: u32, bus: &mut SystemBus) {
        let mut order = [0u8; MAX_HANDLERS];
        let len = self.handlers.snapshot(line, cause, &mut order);
        for &slot in &order[..len] {
            if let Some((callback, arg, gp)) = self.handlers.invocation(slot as usize, line, cause) {
                self.run_handler(bus, &callback, &HandlerCall { cause, arg, gp });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::callback::Callback;
    use crate::intc::Position;
    use crate::{Kernel, KernelConfig};
    use eekernel_hw::{Cpu, InterruptLine, SystemBus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn setup() -> (Kernel, Cpu, SystemBus) {
        (Kernel::new(KernelConfig::default()), Cpu::new(0), SystemBus::new(0x1000))
    }

    #[test]
    fn chain_runs_in_registration_order() {
        let (mut kernel, mut cpu, mut bus) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in [1u32, 2, 3] {
            let seen = seen.clone();
            kernel
                .add_intc_handler(
                    5,
                    Callback::handler(move |_, _, call| seen.lock().unwrap().push((tag, call.arg))),
                    Position::Tail,
                    tag * 10,
                )
                .unwrap();
        }
        bus.intc.enable(5).unwrap();
        bus.intc.raise(5).unwrap();
        kernel.dispatch_interrupt(InterruptLine::Intc, &mut cpu, &mut bus).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 10), (2, 20), (3, 30)]);
        assert_eq!(bus.intc.stat(), 0);
    }

    #[test]
    fn one_cause_per_trap_highest_first() {
        let (mut kernel, mut cpu, mut bus) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for cause in [1u32, 6] {
            let seen = seen.clone();
            kernel
                .add_dmac_handler(
                    cause,
                    Callback::handler(move |_, _, call| seen.lock().unwrap().push(call.cause)),
                    Position::Tail,
                    0,
                )
                .unwrap();
            bus.dmac.enable(cause).unwrap();
            bus.dmac.raise(cause).unwrap();
        }
        kernel.dispatch_interrupt(InterruptLine::Dmac, &mut cpu, &mut bus).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![6]);
        assert_eq!(bus.dmac.pending(), 1 << 1);
        kernel.dispatch_interrupt(InterruptLine::Dmac, &mut cpu, &mut bus).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![6, 1]);
    }

    #[test]
    fn a_handler_may_remove_a_later_one() {
        let (mut kernel, mut cpu, mut bus) = setup();
        let hits = Arc::new(AtomicU32::new(0));
        let victim = Arc::new(AtomicU32::new(0));
        let v = victim.clone();
        kernel
            .add_intc_handler(
                2,
                Callback::handler(move |k, _, _| {
                    let id = crate::HandlerId::new(v.load(Ordering::SeqCst)).unwrap();
                    k.remove_intc_handler(2, id).unwrap();
                }),
                Position::Tail,
                0,
            )
            .unwrap();
        let h = hits.clone();
        let id = kernel
            .add_intc_handler(
                2,
                Callback::handler(move |_, _, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
                Position::Tail,
                0,
            )
            .unwrap();
        victim.store(id.val(), Ordering::SeqCst);

        bus.intc.enable(2).unwrap();
        bus.intc.raise(2).unwrap();
        kernel.dispatch_interrupt(InterruptLine::Intc, &mut cpu, &mut bus).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(kernel.handlers().count(InterruptLine::Intc, 2), Ok(1));
    }

    #[test]
    fn guest_handlers_without_invoker_are_skipped() {
        let (mut kernel, mut cpu, mut bus) = setup();
        kernel
            .add_intc_handler(0, Callback::Guest { entry: 0x4000 }, Position::Tail, 0)
            .unwrap();
        bus.intc.enable(0).unwrap();
        bus.intc.raise(0).unwrap();
        kernel.dispatch_interrupt(InterruptLine::Intc, &mut cpu, &mut bus).unwrap();
        assert_eq!(bus.intc.pending(), 0);
    }
}
