use bitflags::bitflags;

bitflags! {
    /// Subset of the EE counter mode register the kernel programs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerMode: u32 {
        const COUNT_ENABLE = 0x080;
        const COMPARE_INTERRUPT = 0x100;
        const COMPARE_REACHED = 0x400;
    }
}

/// Free-running hardware counter with a compare target (RCNT3).
///
/// Ticks are abstract; the harness decides what one tick means.
#[derive(Debug, Clone)]
pub struct Timer {
    count: u32,
    target: u32,
    mode: TimerMode,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            count: 0,
            target: u32::MAX,
            mode: TimerMode::COUNT_ENABLE,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn target(&self) -> Option<u32> {
        self.mode
            .contains(TimerMode::COMPARE_INTERRUPT)
            .then_some(self.target)
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    /// Programs the compare target and enables the compare interrupt.
    pub fn arm(&mut self, target: u32) {
        self.target = target;
        self.mode.insert(TimerMode::COMPARE_INTERRUPT);
        self.mode.remove(TimerMode::COMPARE_REACHED);
    }

    pub fn disarm(&mut self) {
        self.mode
            .remove(TimerMode::COMPARE_INTERRUPT | TimerMode::COMPARE_REACHED);
    }

    /// Advances the counter. Returns `true` when an armed target was crossed.
    pub fn advance(&mut self, ticks: u32) -> bool {
        if !self.mode.contains(TimerMode::COUNT_ENABLE) || ticks == 0 {
            return false;
        }
        let before = self.count;
        self.count = self.count.wrapping_add(ticks);
        if !self.mode.contains(TimerMode::COMPARE_INTERRUPT) {
            return false;
        }
        // distance to target measured from where we started, so wrap is handled
        let distance = self.target.wrapping_sub(before);
        let crossed = distance != 0 && distance <= ticks;
        if crossed {
            self.mode.insert(TimerMode::COMPARE_REACHED);
        }
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_fires_once_when_target_is_crossed() {
        let mut timer = Timer::new();
        timer.arm(100);
        assert!(!timer.advance(60));
        assert!(timer.advance(60));
        assert_eq!(timer.count(), 120);
        assert!(timer.mode().contains(TimerMode::COMPARE_REACHED));
        assert!(!timer.advance(10));
    }

    #[test]
    fn disarmed_timer_never_fires() {
        let mut timer = Timer::new();
        assert_eq!(timer.target(), None);
        assert!(!timer.advance(u32::MAX));
    }

    #[test]
    fn target_across_wrap() {
        let mut timer = Timer::new();
        timer.advance(u32::MAX - 5);
        timer.arm(4);
        assert!(!timer.advance(5));
        assert!(timer.advance(5));
    }

    proptest::proptest! {
        #[test]
        fn any_chunking_crosses_the_target_once(
            target in 1u32..10_000,
            steps in proptest::collection::vec(1u32..500, 1..100),
        ) {
            let mut timer = Timer::new();
            timer.arm(target);
            let crossings = steps.iter().filter(|&&ticks| timer.advance(ticks)).count();
            let total: u32 = steps.iter().sum();
            proptest::prop_assert_eq!(crossings, usize::from(total >= target));
        }
    }
}
