use crate::error::KernelError;
use core::num::NonZeroU32;

pub const MAX_THREADS: usize = 256;
pub const MAX_SEMAPHORES: usize = 256;
pub const MAX_HANDLERS: usize = 160;
pub const MAX_ALARMS: usize = 64;

pub const PRIORITY_LEVELS: usize = 128;
/// Priorities run from 0 (most urgent) to this value.
pub const LOWEST_PRIORITY: u32 = PRIORITY_LEVELS as u32 - 1;

/// Thread slot reserved for the boot thread.
pub const MAIN_THREAD: ThreadId = ThreadId(0);

pub fn check_priority(priority: u32) -> Result<u32, KernelError> {
    if priority <= LOWEST_PRIORITY {
        Ok(priority)
    } else {
        Err(KernelError::InvalidArgument)
    }
}

/// Thread identifier; equal to the thread's slot index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadId(u32);

impl ThreadId {
    pub fn new(id: u32) -> Result<Self, KernelError> {
        if (id as usize) < MAX_THREADS {
            Ok(Self(id))
        } else {
            Err(KernelError::InvalidHandle)
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_THREADS);
        Self(index as u32)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Semaphore identifier; equal to the semaphore's slot index.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SemaId(u32);

impl SemaId {
    pub fn new(id: u32) -> Result<Self, KernelError> {
        if (id as usize) < MAX_SEMAPHORES {
            Ok(Self(id))
        } else {
            Err(KernelError::InvalidHandle)
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_SEMAPHORES);
        Self(index as u32)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handler identifier. Slot index plus one, so zero never names a handler.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct HandlerId(NonZeroU32);

impl HandlerId {
    pub fn new(id: u32) -> Result<Self, KernelError> {
        match NonZeroU32::new(id) {
            Some(id) if id.get() as usize <= MAX_HANDLERS => Ok(Self(id)),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    pub(crate) fn from_slot(slot: usize) -> Self {
        debug_assert!(slot < MAX_HANDLERS);
        Self(NonZeroU32::MIN.saturating_add(slot as u32))
    }

    pub fn val(&self) -> u32 {
        self.0.get()
    }

    pub(crate) fn slot(&self) -> usize {
        self.0.get() as usize - 1
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AlarmId(u32);

impl AlarmId {
    pub fn new(id: u32) -> Result<Self, KernelError> {
        if (id as usize) < MAX_ALARMS {
            Ok(Self(id))
        } else {
            Err(KernelError::InvalidHandle)
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_ALARMS);
        Self(index as u32)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_range_checked() {
        assert!(ThreadId::new(255).is_ok());
        assert_eq!(ThreadId::new(256), Err(KernelError::InvalidHandle));
        assert_eq!(SemaId::new(256), Err(KernelError::InvalidHandle));
        assert_eq!(AlarmId::new(64), Err(KernelError::InvalidHandle));
        assert_eq!(HandlerId::new(0), Err(KernelError::InvalidHandle));
        assert_eq!(HandlerId::new(161), Err(KernelError::InvalidHandle));
    }

    #[test]
    fn handler_id_is_slot_plus_one() {
        let id = HandlerId::from_slot(0);
        assert_eq!(id.val(), 1);
        assert_eq!(id.slot(), 0);
        assert_eq!(HandlerId::new(160).unwrap().slot(), 159);
    }

    #[test]
    fn priority_bounds() {
        assert_eq!(check_priority(0), Ok(0));
        assert_eq!(check_priority(127), Ok(127));
        assert_eq!(check_priority(128), Err(KernelError::InvalidArgument));
    }
}
