//! Interrupt cause latches for the INTC and DMAC.
//!
//! Device backends raise a cause by setting its bit in `stat`; the kernel's
//! dispatcher only ever sees `stat & mask`.

use crate::error::DecodeError;

pub const INTC_CAUSES: u32 = 15;
pub const DMAC_CAUSES: u32 = 16;

/// INTC cause numbers.
pub mod cause {
    pub const GS: u32 = 0;
    pub const SBUS: u32 = 1;
    pub const VBLANK_START: u32 = 2;
    pub const VBLANK_END: u32 = 3;
    pub const VIF0: u32 = 4;
    pub const VIF1: u32 = 5;
    pub const VU0: u32 = 6;
    pub const VU1: u32 = 7;
    pub const IPU: u32 = 8;
    pub const TIM0: u32 = 9;
    pub const TIM1: u32 = 10;
    pub const TIM2: u32 = 11;
    pub const TIM3: u32 = 12;
    pub const SFIFO: u32 = 13;
    pub const VU0WD: u32 = 14;
}

/// Which controller raised an interrupt trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptLine {
    Intc,
    Dmac,
}

impl InterruptLine {
    pub fn causes(self) -> u32 {
        match self {
            InterruptLine::Intc => INTC_CAUSES,
            InterruptLine::Dmac => DMAC_CAUSES,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InterruptLine::Intc => "INTC",
            InterruptLine::Dmac => "DMAC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    line: InterruptLine,
    stat: u32,
    mask: u32,
}

impl InterruptController {
    pub fn new(line: InterruptLine) -> Self {
        Self {
            line,
            stat: 0,
            mask: 0,
        }
    }

    pub fn line(&self) -> InterruptLine {
        self.line
    }

    fn bit(&self, cause: u32) -> Result<u32, DecodeError> {
        if cause < self.line.causes() {
            Ok(1 << cause)
        } else {
            Err(DecodeError::InvalidCause {
                controller: self.line.name(),
                cause,
            })
        }
    }

    /// Latches `cause`. Masked causes stay latched but are not pending.
    pub fn raise(&mut self, cause: u32) -> Result<(), DecodeError> {
        self.stat |= self.bit(cause)?;
        Ok(())
    }

    /// Clears the latched bit for `cause`.
    pub fn acknowledge(&mut self, cause: u32) -> Result<(), DecodeError> {
        self.stat &= !self.bit(cause)?;
        Ok(())
    }

    /// Returns `true` if the mask changed.
    pub fn enable(&mut self, cause: u32) -> Result<bool, DecodeError> {
        let bit = self.bit(cause)?;
        let changed = self.mask & bit == 0;
        self.mask |= bit;
        Ok(changed)
    }

    /// Returns `true` if the mask changed.
    pub fn disable(&mut self, cause: u32) -> Result<bool, DecodeError> {
        let bit = self.bit(cause)?;
        let changed = self.mask & bit != 0;
        self.mask &= !bit;
        Ok(changed)
    }

    pub fn is_enabled(&self, cause: u32) -> bool {
        self.bit(cause).map(|bit| self.mask & bit != 0).unwrap_or(false)
    }

    pub fn stat(&self) -> u32 {
        self.stat
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn pending(&self) -> u32 {
        self.stat & self.mask
    }
}
