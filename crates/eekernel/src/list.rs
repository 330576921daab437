//! Index-linked lists over fixed tables.
//!
//! Each table that can sit on a list owns a [`Links`] array (one entry per
//! slot); a [`ListHead`] only records the two ends. A slot is on at most one
//! list per `Links` array at a time.

const NIL: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    prev: u16,
    next: u16,
    linked: bool,
}

impl Link {
    const UNLINKED: Link = Link {
        prev: NIL,
        next: NIL,
        linked: false,
    };
}

fn opt(index: u16) -> Option<usize> {
    (index != NIL).then_some(index as usize)
}

pub struct Links<const N: usize> {
    links: [Link; N],
}

impl<const N: usize> Default for Links<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Links<N> {
    pub fn new() -> Self {
        debug_assert!(N < NIL as usize);
        Self {
            links: [Link::UNLINKED; N],
        }
    }

    pub fn is_linked(&self, index: usize) -> bool {
        self.links[index].linked
    }

    pub fn next(&self, index: usize) -> Option<usize> {
        opt(self.links[index].next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHead {
    head: u16,
    tail: u16,
    len: u16,
}

impl Default for ListHead {
    fn default() -> Self {
        Self::new()
    }
}

impl ListHead {
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn front(&self) -> Option<usize> {
        opt(self.head)
    }

    pub fn back(&self) -> Option<usize> {
        opt(self.tail)
    }

    pub fn push_back<const N: usize>(&mut self, links: &mut Links<N>, index: usize) {
        debug_assert!(!links.is_linked(index), "slot {index} already linked");
        let i = index as u16;
        links.links[index] = Link {
            prev: self.tail,
            next: NIL,
            linked: true,
        };
        match opt(self.tail) {
            Some(tail) => links.links[tail].next = i,
            None => self.head = i,
        }
        self.tail = i;
        self.len += 1;
    }

    pub fn push_front<const N: usize>(&mut self, links: &mut Links<N>, index: usize) {
        debug_assert!(!links.is_linked(index), "slot {index} already linked");
        let i = index as u16;
        links.links[index] = Link {
            prev: NIL,
            next: self.head,
            linked: true,
        };
        match opt(self.head) {
            Some(head) => links.links[head].prev = i,
            None => self.tail = i,
        }
        self.head = i;
        self.len += 1;
    }

    /// Links `index` directly behind `anchor`, which must be on this list.
    pub fn insert_after<const N: usize>(
        &mut self,
        links: &mut Links<N>,
        anchor: usize,
        index: usize,
    ) {
        debug_assert!(links.is_linked(anchor));
        debug_assert!(!links.is_linked(index), "slot {index} already linked");
        let next = links.links[anchor].next;
        let i = index as u16;
        links.links[index] = Link {
            prev: anchor as u16,
            next,
            linked: true,
        };
        links.links[anchor].next = i;
        match opt(next) {
            Some(next) => links.links[next].prev = i,
            None => self.tail = i,
        }
        self.len += 1;
    }

    /// Unlinks `index`, which must be on this list.
    pub fn remove<const N: usize>(&mut self, links: &mut Links<N>, index: usize) {
        debug_assert!(links.is_linked(index), "slot {index} not linked");
        let Link { prev, next, .. } = links.links[index];
        match opt(prev) {
            Some(prev) => links.links[prev].next = next,
            None => self.head = next,
        }
        match opt(next) {
            Some(next) => links.links[next].prev = prev,
            None => self.tail = prev,
        }
        links.links[index] = Link::UNLINKED;
        self.len -= 1;
    }

    pub fn pop_front<const N: usize>(&mut self, links: &mut Links<N>) -> Option<usize> {
        let head = self.front()?;
        self.remove(links, head);
        Some(head)
    }

    pub fn iter<'a, const N: usize>(&self, links: &'a Links<N>) -> Iter<'a, N> {
        Iter {
            links,
            cursor: self.head,
        }
    }
}

pub struct Iter<'a, const N: usize> {
    links: &'a Links<N>,
    cursor: u16,
}

impl<const N: usize> Iterator for Iter<'_, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = opt(self.cursor)?;
        self.cursor = self.links.links[index].next;
        Some(index)
    }
}

/// Stack of free slot indices. Pops the lowest index first on a fresh table.
pub struct FreeList<const N: usize> {
    slots: [u16; N],
    top: usize,
}

impl<const N: usize> FreeList<N> {
    /// A free list holding every slot in `range`.
    pub fn with_range(range: core::ops::Range<usize>) -> Self {
        let mut slots = [0u16; N];
        let mut top = 0;
        for index in range.rev() {
            slots[top] = index as u16;
            top += 1;
        }
        Self { slots, top }
    }

    pub fn full() -> Self {
        Self::with_range(0..N)
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.top = self.top.checked_sub(1)?;
        Some(self.slots[self.top] as usize)
    }

    pub fn push(&mut self, index: usize) {
        debug_assert!(self.top < N);
        self.slots[self.top] = index as u16;
        self.top += 1;
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect<const N: usize>(list: &ListHead, links: &Links<N>) -> Vec<usize> {
        list.iter(links).collect()
    }

    #[test]
    fn push_insert_remove() {
        let mut links = Links::<8>::new();
        let mut list = ListHead::new();
        list.push_back(&mut links, 3);
        list.push_back(&mut links, 5);
        list.push_front(&mut links, 1);
        list.insert_after(&mut links, 3, 7);
        assert_eq!(collect(&list, &links), vec![1, 3, 7, 5]);

        list.remove(&mut links, 7);
        list.remove(&mut links, 1);
        assert_eq!(collect(&list, &links), vec![3, 5]);
        assert_eq!(list.back(), Some(5));
        assert!(!links.is_linked(7));

        list.insert_after(&mut links, 5, 0);
        assert_eq!(list.back(), Some(0));
        assert_eq!(list.pop_front(&mut links), Some(3));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn free_list_hands_out_lowest_first() {
        let mut free = FreeList::<4>::full();
        assert_eq!(free.pop(), Some(0));
        assert_eq!(free.pop(), Some(1));
        free.push(0);
        assert_eq!(free.pop(), Some(0));
        assert_eq!(free.len(), 2);

        let mut reserved = FreeList::<4>::with_range(1..4);
        assert_eq!(reserved.pop(), Some(1));
        assert_eq!(reserved.len(), 2);
    }

    proptest! {
        #[test]
        fn matches_a_vec_model(ops in prop::collection::vec((0usize..16, any::<bool>()), 0..64)) {
            let mut links = Links::<16>::new();
            let mut list = ListHead::new();
            let mut model: Vec<usize> = Vec::new();
            for (index, front) in ops {
                if links.is_linked(index) {
                    list.remove(&mut links, index);
                    model.retain(|&i| i != index);
                } else if front {
                    list.push_front(&mut links, index);
                    model.insert(0, index);
                } else {
                    list.push_back(&mut links, index);
                    model.push(index);
                }
                prop_assert_eq!(collect(&list, &links), model.clone());
                prop_assert_eq!(list.len(), model.len());
                prop_assert_eq!(list.front(), model.first().copied());
                prop_assert_eq!(list.back(), model.last().copied());
            }
        }
    }
}
