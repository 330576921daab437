use crate::error::MemoryError;
use crate::intc::{cause, InterruptController, InterruptLine};
use crate::memory::{Memory, Ram};
use crate::timer::Timer;

/// Everything the kernel can touch besides the register file.
pub struct SystemBus {
    pub ram: Ram,
    pub intc: InterruptController,
    pub dmac: InterruptController,
    pub timer: Timer,
}

impl SystemBus {
    pub fn new(memory_size: usize) -> Self {
        Self {
            ram: Ram::new(memory_size),
            intc: InterruptController::new(InterruptLine::Intc),
            dmac: InterruptController::new(InterruptLine::Dmac),
            timer: Timer::new(),
        }
    }

    pub fn controller(&self, line: InterruptLine) -> &InterruptController {
        match line {
            InterruptLine::Intc => &self.intc,
            InterruptLine::Dmac => &self.dmac,
        }
    }

    pub fn controller_mut(&mut self, line: InterruptLine) -> &mut InterruptController {
        match line {
            InterruptLine::Intc => &mut self.intc,
            InterruptLine::Dmac => &mut self.dmac,
        }
    }

    /// Advances the alarm counter, latching TIM3 when its target is crossed.
    pub fn advance_timer(&mut self, ticks: u32) {
        if self.timer.advance(ticks) {
            // TIM3 is always in range
            let _ = self.intc.raise(cause::TIM3);
        }
    }

    /// The first line with an enabled, latched cause. DMAC wins ties.
    pub fn pending_line(&self) -> Option<InterruptLine> {
        if self.dmac.pending() != 0 {
            Some(InterruptLine::Dmac)
        } else if self.intc.pending() != 0 {
            Some(InterruptLine::Intc)
        } else {
            None
        }
    }
}

impl Memory for SystemBus {
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.ram.read_bytes(addr, buf)
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.ram.write_bytes(addr, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_compare_latches_tim3() {
        let mut bus = SystemBus::new(0x1000);
        bus.intc.enable(cause::TIM3).unwrap();
        bus.timer.arm(10);
        bus.advance_timer(9);
        assert_eq!(bus.pending_line(), None);
        bus.advance_timer(1);
        assert_eq!(bus.pending_line(), Some(InterruptLine::Intc));
        assert_eq!(bus.intc.pending(), 1 << cause::TIM3);
    }

    #[test]
    fn dmac_line_is_reported_first() {
        let mut bus = SystemBus::new(0x1000);
        bus.intc.enable(cause::GS).unwrap();
        bus.dmac.enable(3).unwrap();
        bus.intc.raise(cause::GS).unwrap();
        bus.dmac.raise(3).unwrap();
        assert_eq!(bus.pending_line(), Some(InterruptLine::Dmac));
        bus.dmac.acknowledge(3).unwrap();
        assert_eq!(bus.pending_line(), Some(InterruptLine::Intc));
    }
}
