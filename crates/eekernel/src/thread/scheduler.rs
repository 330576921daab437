use crate::list::{Links, ListHead};
use crate::types::{ThreadId, MAX_THREADS, PRIORITY_LEVELS};

pub trait Scheduler: Send {
    /// Queue a thread behind its equals.
    fn enqueue(&mut self, thread: ThreadId, priority: u32);

    /// Queue a thread ahead of its equals (it was preempted, not yielding).
    fn enqueue_front(&mut self, thread: ThreadId, priority: u32);

    /// Remove a thread from its bucket (e.g. if blocked or terminated)
    fn dequeue(&mut self, thread: ThreadId, priority: u32) -> bool;

    /// Take the next thread to run.
    fn pick_next(&mut self) -> Option<ThreadId>;

    /// Most urgent non-empty priority.
    fn top_priority(&self) -> Option<u32>;

    /// Move the oldest thread at `priority` behind the others.
    fn rotate(&mut self, priority: u32);

    fn is_queued(&self, thread: ThreadId) -> bool;

    /// Threads queued at `priority`, next to run first.
    fn queued_at(&self, priority: u32) -> Vec<ThreadId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 128 FIFO buckets with an occupancy bitmap. Bit `n` set means bucket `n`
/// is non-empty, so the cursor is the lowest set bit.
pub struct ReadyQueue {
    buckets: [ListHead; PRIORITY_LEVELS],
    links: Links<MAX_THREADS>,
    occupied: u128,
    len: usize,
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            buckets: [ListHead::new(); PRIORITY_LEVELS],
            links: Links::new(),
            occupied: 0,
            len: 0,
        }
    }

    /// Threads at `priority`, oldest first.
    pub fn bucket(&self, priority: u32) -> impl Iterator<Item = ThreadId> + '_ {
        self.buckets[priority as usize]
            .iter(&self.links)
            .map(ThreadId::from_index)
    }

    fn mark(&mut self, priority: u32) {
        if self.buckets[priority as usize].is_empty() {
            self.occupied &= !(1u128 << priority);
        } else {
            self.occupied |= 1u128 << priority;
        }
    }
}

impl Scheduler for ReadyQueue {
    fn enqueue(&mut self, thread: ThreadId, priority: u32) {
        self.buckets[priority as usize].push_back(&mut self.links, thread.index());
        self.occupied |= 1u128 << priority;
        self.len += 1;
    }

    fn enqueue_front(&mut self, thread: ThreadId, priority: u32) {
        self.buckets[priority as usize].push_front(&mut self.links, thread.index());
        self.occupied |= 1u128 << priority;
        self.len += 1;
    }

    fn dequeue(&mut self, thread: ThreadId, priority: u32) -> bool {
        if !self.links.is_linked(thread.index()) {
            return false;
        }
        self.buckets[priority as usize].remove(&mut self.links, thread.index());
        self.mark(priority);
        self.len -= 1;
        true
    }

    fn pick_next(&mut self) -> Option<ThreadId> {
        let priority = self.top_priority()?;
        let index = self.buckets[priority as usize].pop_front(&mut self.links)?;
        self.mark(priority);
        self.len -= 1;
        Some(ThreadId::from_index(index))
    }

    fn top_priority(&self) -> Option<u32> {
        (self.occupied != 0).then(|| self.occupied.trailing_zeros())
    }

    fn rotate(&mut self, priority: u32) {
        let bucket = &mut self.buckets[priority as usize];
        if bucket.len() > 1 {
            if let Some(oldest) = bucket.pop_front(&mut self.links) {
                bucket.push_back(&mut self.links, oldest);
            }
        }
    }

    fn is_queued(&self, thread: ThreadId) -> bool {
        self.links.is_linked(thread.index())
    }

    fn queued_at(&self, priority: u32) -> Vec<ThreadId> {
        self.bucket(priority).collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tid(n: u32) -> ThreadId {
        ThreadId::new(n).unwrap()
    }

    #[test]
    fn most_urgent_bucket_wins() {
        let mut q = ReadyQueue::new();
        q.enqueue(tid(1), 5);
        q.enqueue(tid(2), 2);
        assert_eq!(q.top_priority(), Some(2));
        assert_eq!(q.pick_next(), Some(tid(2)));
        assert_eq!(q.pick_next(), Some(tid(1)));
        assert_eq!(q.pick_next(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn equals_run_in_arrival_order_until_rotated() {
        let mut q = ReadyQueue::new();
        for n in 1..=3 {
            q.enqueue(tid(n), 10);
        }
        q.rotate(10);
        let order: Vec<_> = q.bucket(10).map(|t| t.val()).collect();
        assert_eq!(order, vec![2, 3, 1]);

        q.enqueue_front(tid(9), 10);
        assert_eq!(q.pick_next(), Some(tid(9)));
    }

    #[test]
    fn dequeue_clears_occupancy() {
        let mut q = ReadyQueue::new();
        q.enqueue(tid(4), 127);
        assert!(q.is_queued(tid(4)));
        assert!(q.dequeue(tid(4), 127));
        assert!(!q.dequeue(tid(4), 127));
        assert_eq!(q.top_priority(), None);
    }

    proptest! {
        #[test]
        fn pick_order_is_priority_then_fifo(prios in prop::collection::vec(0u32..128, 1..64)) {
            let mut q = ReadyQueue::new();
            for (n, &p) in prios.iter().enumerate() {
                q.enqueue(tid(n as u32), p);
            }
            let mut expected: Vec<(u32, u32)> =
                prios.iter().enumerate().map(|(n, &p)| (p, n as u32)).collect();
            expected.sort();
            for (_, n) in expected {
                prop_assert_eq!(q.pick_next(), Some(tid(n)));
            }
            prop_assert_eq!(q.pick_next(), None);
        }
    }
}
