//! One-shot alarms driven by the RCNT3 compare interrupt.
//!
//! Armed alarms are kept in `order`, nearest deadline first. Each keeps a
//! countdown of ticks still to wait; every operation first charges the ticks
//! elapsed since the last one.

pub mod syscalls;

use crate::callback::{AlarmCall, AlarmFn, Callback};
use crate::error::KernelError;
use crate::types::{AlarmId, ThreadId, MAX_ALARMS};
use crate::Kernel;
use eekernel_hw::intc::cause::TIM3;
use eekernel_hw::SystemBus;
use log::{debug, trace};

#[derive(Debug, Clone)]
struct AlarmEntry {
    remaining: u32,
    requested: u32,
    callback: Option<Callback<AlarmFn>>,
    arg: u32,
    gp: u32,
    owner: Option<ThreadId>,
}

impl AlarmEntry {
    const FREE: AlarmEntry = AlarmEntry {
        remaining: 0,
        requested: 0,
        callback: None,
        arg: 0,
        gp: 0,
        owner: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmInfo {
    pub id: AlarmId,
    /// Ticks left as of the last timer sync.
    pub remaining: u32,
    pub requested: u32,
    pub arg: u32,
    pub owner: Option<ThreadId>,
}

pub struct AlarmTable {
    entries: Box<[AlarmEntry]>,
    order: [u8; MAX_ALARMS],
    len: usize,
    last_sync: u32,
}

impl Default for AlarmTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmTable {
    pub fn new() -> Self {
        Self {
            entries: vec![AlarmEntry::FREE; MAX_ALARMS].into_boxed_slice(),
            order: [0; MAX_ALARMS],
            len: 0,
            last_sync: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn armed(&self) -> &[u8] {
        &self.order[..self.len]
    }

    pub fn is_armed(&self, id: AlarmId) -> bool {
        self.armed().contains(&(id.index() as u8))
    }

    /// Armed alarms, nearest first.
    pub fn iter(&self) -> impl Iterator<Item = AlarmInfo> + '_ {
        self.armed().iter().map(|&i| {
            let entry = &self.entries[i as usize];
            AlarmInfo {
                id: AlarmId::from_index(i as usize),
                remaining: entry.remaining,
                requested: entry.requested,
                arg: entry.arg,
                owner: entry.owner,
            }
        })
    }

    /// Charges the ticks elapsed since the last sync against every countdown.
    fn sync(&mut self, now: u32) {
        let elapsed = now.wrapping_sub(self.last_sync);
        self.last_sync = now;
        if elapsed == 0 {
            return;
        }
        for &i in &self.order[..self.len] {
            let entry = &mut self.entries[i as usize];
            entry.remaining = entry.remaining.saturating_sub(elapsed);
        }
    }

    fn insert(
        &mut self,
        ticks: u32,
        callback: Callback<AlarmFn>,
        arg: u32,
        gp: u32,
        owner: Option<ThreadId>,
    ) -> Result<AlarmId, KernelError> {
        let index = (0..MAX_ALARMS)
            .find(|&i| self.entries[i].callback.is_none())
            .ok_or(KernelError::ResourceExhausted)?;
        // a zero delay would fire inside the pass that armed it
        let remaining = ticks.max(1);
        self.entries[index] = AlarmEntry {
            remaining,
            requested: ticks,
            callback: Some(callback),
            arg,
            gp,
            owner,
        };
        let pos = self
            .armed()
            .iter()
            .position(|&i| self.entries[i as usize].remaining > remaining)
            .unwrap_or(self.len);
        self.order.copy_within(pos..self.len, pos + 1);
        self.order[pos] = index as u8;
        self.len += 1;
        Ok(AlarmId::from_index(index))
    }

    fn remove(&mut self, id: AlarmId) -> Result<AlarmEntry, KernelError> {
        let pos = self
            .armed()
            .iter()
            .position(|&i| i as usize == id.index())
            .ok_or(KernelError::InvalidHandle)?;
        self.order.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        Ok(std::mem::replace(&mut self.entries[id.index()], AlarmEntry::FREE))
    }

    /// Ticks until the nearest alarm that has not expired yet.
    pub fn next_deadline(&self) -> Option<u32> {
        self.iter().map(|a| a.remaining).find(|&r| r > 0)
    }

    fn pop_expired(&mut self) -> Option<(AlarmId, AlarmEntry)> {
        let &first = self.armed().first()?;
        if self.entries[first as usize].remaining != 0 {
            return None;
        }
        let id = AlarmId::from_index(first as usize);
        self.remove(id).ok().map(|entry| (id, entry))
    }

    /// Points the compare target at the nearest deadline, or `quantum` ticks
    /// out when nothing is pending.
    fn program(&self, bus: &mut SystemBus, quantum: u32) {
        let delta = self.next_deadline().unwrap_or(quantum).max(1);
        let target = bus.timer.count().wrapping_add(delta);
        bus.timer.arm(target);
        trace!("alarm timer target {:#x} (+{})", target, delta);
    }
}

impl Kernel {
    pub(crate) fn set_alarm_with_gp(
        &mut self,
        bus: &mut SystemBus,
        ticks: u32,
        callback: Callback<AlarmFn>,
        arg: u32,
        gp: u32,
    ) -> Result<AlarmId, KernelError> {
        self.alarms.sync(bus.timer.count());
        let owner = self.threads.current_thread;
        let id = self.alarms.insert(ticks, callback, arg, gp, owner)?;
        self.alarms.program(bus, self.config.alarm_quantum);
        // TIM3 is always a valid INTC cause
        let _ = bus.intc.enable(TIM3);
        debug!("SetAlarm: id={} ticks={}", id.val(), ticks);
        Ok(id)
    }

    /// Arms a one-shot callback `ticks` timer ticks from now.
    pub fn set_alarm(
        &mut self,
        bus: &mut SystemBus,
        ticks: u32,
        callback: Callback<AlarmFn>,
        arg: u32,
    ) -> Result<AlarmId, KernelError> {
        let gp = self.threads.current_tcb().map_or(0, |tcb| tcb.gp);
        self.set_alarm_with_gp(bus, ticks, callback, arg, gp)
    }

    pub fn release_alarm(&mut self, bus: &mut SystemBus, id: AlarmId) -> Result<(), KernelError> {
        self.alarms.sync(bus.timer.count());
        self.alarms.remove(id)?;
        self.alarms.program(bus, self.config.alarm_quantum);
        debug!("ReleaseAlarm: id={}", id.val());
        Ok(())
    }

    /// Timer-tick handler: re-arms the counter, then fires every expired
    /// alarm in deadline order. Each entry is freed before its callback runs.
    pub(crate) fn service_alarms(&mut self, bus: &mut SystemBus) {
        let now = bus.timer.count();
        self.alarms.sync(now);
        self.alarms.program(bus, self.config.alarm_quantum);
        while let Some((id, entry)) = self.alarms.pop_expired() {
            let Some(callback) = entry.callback else {
                continue;
            };
            trace!("alarm {} fired at {:#x}", id.val(), now);
            let call = AlarmCall {
                id,
                time: now,
                arg: entry.arg,
                gp: entry.gp,
                owner: entry.owner,
            };
            self.run_alarm(bus, &callback, &call);
        }
    }
}
