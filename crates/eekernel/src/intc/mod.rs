//! Interrupt and DMA handler registry.
//!
//! One pool of handler slots serves every INTC and DMAC cause. Each cause
//! owns an ordered chain of slots.

pub mod dispatch;
pub mod syscalls;

use crate::callback::{Callback, HandlerFn};
use crate::error::KernelError;
use crate::list::{FreeList, Links, ListHead};
use crate::types::{HandlerId, MAX_HANDLERS};
use crate::Kernel;
use eekernel_hw::intc::{DMAC_CAUSES, INTC_CAUSES};
use eekernel_hw::{InterruptLine, SystemBus};
use log::debug;

const CHAINS: usize = (INTC_CAUSES + DMAC_CAUSES) as usize;

/// Where a new handler goes in its cause's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Head,
    Tail,
    After(HandlerId),
}

#[derive(Debug, Clone)]
struct HandlerSlot {
    callback: Option<Callback<HandlerFn>>,
    arg: u32,
    gp: u32,
    enabled: bool,
    line: InterruptLine,
    cause: u32,
}

impl HandlerSlot {
    const FREE: HandlerSlot = HandlerSlot {
        callback: None,
        arg: 0,
        gp: 0,
        enabled: false,
        line: InterruptLine::Intc,
        cause: 0,
    };

    fn is_on(&self, line: InterruptLine, cause: u32) -> bool {
        self.callback.is_some() && self.line == line && self.cause == cause
    }
}

/// Read-only view of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerInfo {
    pub id: HandlerId,
    pub line: InterruptLine,
    pub cause: u32,
    pub enabled: bool,
    pub arg: u32,
}

pub struct HandlerRegistry {
    slots: Box<[HandlerSlot]>,
    free: FreeList<MAX_HANDLERS>,
    links: Links<MAX_HANDLERS>,
    chains: [ListHead; CHAINS],
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn chain_index(line: InterruptLine, cause: u32) -> Result<usize, KernelError> {
    if cause >= line.causes() {
        return Err(KernelError::InvalidArgument);
    }
    Ok(match line {
        InterruptLine::Intc => cause as usize,
        InterruptLine::Dmac => (INTC_CAUSES + cause) as usize,
    })
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            slots: vec![HandlerSlot::FREE; MAX_HANDLERS].into_boxed_slice(),
            free: FreeList::full(),
            links: Links::new(),
            chains: [ListHead::new(); CHAINS],
        }
    }

    pub fn add(
        &mut self,
        line: InterruptLine,
        cause: u32,
        callback: Callback<HandlerFn>,
        position: Position,
        arg: u32,
        gp: u32,
    ) -> Result<HandlerId, KernelError> {
        let chain = chain_index(line, cause)?;
        if let Position::After(anchor) = position {
            if !self.slots[anchor.slot()].is_on(line, cause) {
                return Err(KernelError::InvalidHandle);
            }
        }
        let slot = self.free.pop().ok_or(KernelError::ResourceExhausted)?;
        self.slots[slot] = HandlerSlot {
            callback: Some(callback),
            arg,
            gp,
            enabled: true,
            line,
            cause,
        };
        let list = &mut self.chains[chain];
        match position {
            Position::Head => list.push_front(&mut self.links, slot),
            Position::Tail => list.push_back(&mut self.links, slot),
            Position::After(anchor) => list.insert_after(&mut self.links, anchor.slot(), slot),
        }
        Ok(HandlerId::from_slot(slot))
    }

    pub fn remove(&mut self, line: InterruptLine, cause: u32, id: HandlerId) -> Result<(), KernelError> {
        let chain = chain_index(line, cause)?;
        let slot = id.slot();
        if !self.slots[slot].is_on(line, cause) {
            return Err(KernelError::InvalidHandle);
        }
        self.chains[chain].remove(&mut self.links, slot);
        self.slots[slot] = HandlerSlot::FREE;
        self.free.push(slot);
        Ok(())
    }

    pub fn set_enabled(
        &mut self,
        line: InterruptLine,
        id: HandlerId,
        enabled: bool,
    ) -> Result<(), KernelError> {
        let slot = &mut self.slots[id.slot()];
        if slot.callback.is_none() || slot.line != line {
            return Err(KernelError::InvalidHandle);
        }
        slot.enabled = enabled;
        Ok(())
    }

    /// Number of handlers attached to a cause.
    pub fn count(&self, line: InterruptLine, cause: u32) -> Result<usize, KernelError> {
        Ok(self.chains[chain_index(line, cause)?].len())
    }

    /// Handlers on a cause, in invocation order.
    pub fn chain(
        &self,
        line: InterruptLine,
        cause: u32,
    ) -> Result<impl Iterator<Item = HandlerId> + '_, KernelError> {
        let chain = chain_index(line, cause)?;
        Ok(self.chains[chain].iter(&self.links).map(HandlerId::from_slot))
    }

    pub fn info(&self, id: HandlerId) -> Result<HandlerInfo, KernelError> {
        let slot = &self.slots[id.slot()];
        if slot.callback.is_none() {
            return Err(KernelError::InvalidHandle);
        }
        Ok(HandlerInfo {
            id,
            line: slot.line,
            cause: slot.cause,
            enabled: slot.enabled,
            arg: slot.arg,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = HandlerInfo> + '_ {
        (0..MAX_HANDLERS).filter_map(|slot| self.info(HandlerId::from_slot(slot)).ok())
    }

    /// Copies a chain's slot order into `buf`; returns how many were copied.
    fn snapshot(&self, line: InterruptLine, cause: u32, buf: &mut [u8; MAX_HANDLERS]) -> usize {
        let Ok(chain) = chain_index(line, cause) else {
            return 0;
        };
        let mut len = 0;
        for slot in self.chains[chain].iter(&self.links) {
            buf[len] = slot as u8;
            len += 1;
        }
        len
    }

    /// What to run for `slot`, if it is still an enabled member of the chain.
    fn invocation(&self, slot: usize, line: InterruptLine, cause: u32) -> Option<(Callback<HandlerFn>, u32, u32)> {
        let entry = &self.slots[slot];
        if !entry.is_on(line, cause) || !entry.enabled {
            return None;
        }
        entry.callback.clone().map(|cb| (cb, entry.arg, entry.gp))
    }
}

fn enable_error(_: eekernel_hw::DecodeError) -> KernelError {
    KernelError::InvalidArgument
}

impl Kernel {
    pub(crate) fn add_handler(
        &mut self,
        line: InterruptLine,
        cause: u32,
        callback: Callback<HandlerFn>,
        position: Position,
        arg: u32,
        gp: u32,
    ) -> Result<HandlerId, KernelError> {
        let id = self.handlers.add(line, cause, callback, position, arg, gp)?;
        debug!("Add{}Handler: cause={} id={} {:?}", line.name(), cause, id.val(), position);
        Ok(id)
    }

    fn caller_gp(&self) -> u32 {
        self.threads.current_tcb().map_or(0, |tcb| tcb.gp)
    }

    pub fn add_intc_handler(
        &mut self,
        cause: u32,
        callback: Callback<HandlerFn>,
        position: Position,
        arg: u32,
    ) -> Result<HandlerId, KernelError> {
        let gp = self.caller_gp();
        self.add_handler(InterruptLine::Intc, cause, callback, position, arg, gp)
    }

    pub fn add_dmac_handler(
        &mut self,
        cause: u32,
        callback: Callback<HandlerFn>,
        position: Position,
        arg: u32,
    ) -> Result<HandlerId, KernelError> {
        let gp = self.caller_gp();
        self.add_handler(InterruptLine::Dmac, cause, callback, position, arg, gp)
    }

    pub fn remove_intc_handler(&mut self, cause: u32, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.remove(InterruptLine::Intc, cause, id)
    }

    pub fn remove_dmac_handler(&mut self, cause: u32, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.remove(InterruptLine::Dmac, cause, id)
    }

    pub fn enable_intc_handler(&mut self, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.set_enabled(InterruptLine::Intc, id, true)
    }

    pub fn disable_intc_handler(&mut self, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.set_enabled(InterruptLine::Intc, id, false)
    }

    pub fn enable_dmac_handler(&mut self, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.set_enabled(InterruptLine::Dmac, id, true)
    }

    pub fn disable_dmac_handler(&mut self, id: HandlerId) -> Result<(), KernelError> {
        self.handlers.set_enabled(InterruptLine::Dmac, id, false)
    }

    /// Unmasks a cause. Returns whether the mask changed.
    pub fn enable_intc(&mut self, bus: &mut SystemBus, cause: u32) -> Result<bool, KernelError> {
        bus.intc.enable(cause).map_err(enable_error)
    }

    pub fn disable_intc(&mut self, bus: &mut SystemBus, cause: u32) -> Result<bool, KernelError> {
        bus.intc.disable(cause).map_err(enable_error)
    }

    pub fn enable_dmac(&mut self, bus: &mut SystemBus, cause: u32) -> Result<bool, KernelError> {
        bus.dmac.enable(cause).map_err(enable_error)
    }

    pub fn disable_dmac(&mut self, bus: &mut SystemBus, cause: u32) -> Result<bool, KernelError> {
        bus.dmac.disable(cause).map_err(enable_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback<HandlerFn> {
        Callback::handler(|_, _, _| {})
    }

    fn order(reg: &HandlerRegistry, line: InterruptLine, cause: u32) -> Vec<u32> {
        reg.chain(line, cause).unwrap().map(|id| id.val()).collect()
    }

    #[test]
    fn positions_build_the_chain() {
        let mut reg = HandlerRegistry::new();
        let intc = InterruptLine::Intc;
        let a = reg.add(intc, 3, noop(), Position::Tail, 0, 0).unwrap();
        let b = reg.add(intc, 3, noop(), Position::Head, 0, 0).unwrap();
        let c = reg.add(intc, 3, noop(), Position::After(b), 0, 0).unwrap();
        assert_eq!(order(&reg, intc, 3), vec![b.val(), c.val(), a.val()]);
        assert_eq!(reg.count(intc, 3), Ok(3));
    }

    #[test]
    fn anchors_and_ids_must_belong_to_the_chain() {
        let mut reg = HandlerRegistry::new();
        let a = reg.add(InterruptLine::Intc, 3, noop(), Position::Tail, 0, 0).unwrap();
        assert_eq!(
            reg.add(InterruptLine::Intc, 4, noop(), Position::After(a), 0, 0),
            Err(KernelError::InvalidHandle)
        );
        assert_eq!(
            reg.remove(InterruptLine::Dmac, 3, a),
            Err(KernelError::InvalidHandle)
        );
        assert_eq!(
            reg.set_enabled(InterruptLine::Dmac, a, false),
            Err(KernelError::InvalidHandle)
        );
        reg.remove(InterruptLine::Intc, 3, a).unwrap();
        assert_eq!(reg.remove(InterruptLine::Intc, 3, a), Err(KernelError::InvalidHandle));
        assert_eq!(reg.count(InterruptLine::Intc, 3), Ok(0));
    }

    #[test]
    fn cause_range_is_per_controller() {
        let mut reg = HandlerRegistry::new();
        assert_eq!(
            reg.add(InterruptLine::Intc, 15, noop(), Position::Tail, 0, 0),
            Err(KernelError::InvalidArgument)
        );
        assert!(reg.add(InterruptLine::Dmac, 15, noop(), Position::Tail, 0, 0).is_ok());
        assert_eq!(
            reg.add(InterruptLine::Dmac, 16, noop(), Position::Tail, 0, 0),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn pool_is_shared_between_controllers() {
        let mut reg = HandlerRegistry::new();
        for n in 0..MAX_HANDLERS {
            let line = if n % 2 == 0 { InterruptLine::Intc } else { InterruptLine::Dmac };
            reg.add(line, 0, noop(), Position::Tail, 0, 0).unwrap();
        }
        assert_eq!(
            reg.add(InterruptLine::Intc, 1, noop(), Position::Tail, 0, 0),
            Err(KernelError::ResourceExhausted)
        );
        assert_eq!(reg.iter().count(), MAX_HANDLERS);
    }

    #[test]
    fn disabled_handlers_are_not_invoked() {
        let mut reg = HandlerRegistry::new();
        let a = reg.add(InterruptLine::Dmac, 2, noop(), Position::Tail, 7, 9).unwrap();
        assert!(reg.invocation(a.slot(), InterruptLine::Dmac, 2).is_some());
        reg.set_enabled(InterruptLine::Dmac, a, false).unwrap();
        assert!(reg.invocation(a.slot(), InterruptLine::Dmac, 2).is_none());
        assert!(!reg.info(a).unwrap().enabled);
    }
}
