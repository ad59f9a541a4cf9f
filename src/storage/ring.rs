//! Index-linked circular doubly-linked lists.
//!
//! Every element slot owns one `Link` per list family it can belong to
//! (type list, outgoing list, incoming list). A list is identified by its
//! head slot; `None` means empty. All edits are O(1).

/// Sentinel for an unlinked slot.
pub(crate) const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub prev: u32,
    pub next: u32,
}

impl Link {
    pub const DETACHED: Link = Link { prev: NIL, next: NIL };

    pub fn is_linked(&self) -> bool {
        self.next != NIL
    }
}

/// Head of one circular list.
pub(crate) type Head = Option<u32>;

/// Append `slot` at the tail (just before the head).
pub(crate) fn push_back(head: &mut Head, links: &mut [Link], slot: u32) {
    match *head {
        None => {
            links[slot as usize] = Link { prev: slot, next: slot };
            *head = Some(slot);
        }
        Some(h) => {
            let tail = links[h as usize].prev;
            links[slot as usize] = Link { prev: tail, next: h };
            links[tail as usize].next = slot;
            links[h as usize].prev = slot;
        }
    }
}

/// Insert `slot` before the head and make it the new head.
pub(crate) fn push_front(head: &mut Head, links: &mut [Link], slot: u32) {
    push_back(head, links, slot);
    *head = Some(slot);
}

/// Remove `slot` from the list. No-op when the slot is not linked.
pub(crate) fn unlink(head: &mut Head, links: &mut [Link], slot: u32) {
    let Link { prev, next } = links[slot as usize];
    if next == NIL {
        return;
    }
    if next == slot {
        *head = None;
    } else {
        links[prev as usize].next = next;
        links[next as usize].prev = prev;
        if *head == Some(slot) {
            *head = Some(next);
        }
    }
    links[slot as usize] = Link::DETACHED;
}

/// Splice `slot` out of its position and reinsert it at the head.
pub(crate) fn move_to_front(head: &mut Head, links: &mut [Link], slot: u32) {
    if *head == Some(slot) || !links[slot as usize].is_linked() {
        return;
    }
    unlink(head, links, slot);
    push_front(head, links, slot);
}

/// Iterator over the slots of one list, head first.
#[derive(Debug, Clone)]
pub(crate) struct RingIter<'a> {
    links: &'a [Link],
    head: u32,
    cursor: Option<u32>,
}

impl<'a> RingIter<'a> {
    pub fn new(head: Head, links: &'a [Link]) -> Self {
        Self { links, head: head.unwrap_or(NIL), cursor: head }
    }
}

impl Iterator for RingIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let current = self.cursor?;
        let next = self.links[current as usize].next;
        self.cursor = if next == self.head || next == NIL { None } else { Some(next) };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: u32) -> (Head, Vec<Link>) {
        let mut head = None;
        let mut links = vec![Link::DETACHED; n as usize];
        for slot in 0..n {
            push_back(&mut head, &mut links, slot);
        }
        (head, links)
    }

    fn order(head: Head, links: &[Link]) -> Vec<u32> {
        RingIter::new(head, links).collect()
    }

    #[test]
    fn test_push_back_keeps_insertion_order() {
        let (head, links) = ring(4);
        assert_eq!(order(head, &links), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_unlink_head_middle_and_last() {
        let (mut head, mut links) = ring(4);
        unlink(&mut head, &mut links, 0);
        assert_eq!(order(head, &links), vec![1, 2, 3]);
        unlink(&mut head, &mut links, 2);
        assert_eq!(order(head, &links), vec![1, 3]);
        unlink(&mut head, &mut links, 3);
        unlink(&mut head, &mut links, 1);
        assert_eq!(head, None);
        assert!(order(head, &links).is_empty());
        // second unlink is harmless
        unlink(&mut head, &mut links, 1);
        assert_eq!(head, None);
    }

    #[test]
    fn test_move_to_front() {
        let (mut head, mut links) = ring(4);
        move_to_front(&mut head, &mut links, 2);
        assert_eq!(order(head, &links), vec![2, 0, 1, 3]);
        move_to_front(&mut head, &mut links, 3);
        assert_eq!(order(head, &links), vec![3, 2, 0, 1]);
        move_to_front(&mut head, &mut links, 3);
        assert_eq!(order(head, &links), vec![3, 2, 0, 1]);
    }

    #[test]
    fn test_links_stay_symmetric() {
        let (mut head, mut links) = ring(5);
        move_to_front(&mut head, &mut links, 4);
        unlink(&mut head, &mut links, 1);
        for slot in order(head, &links) {
            let l = links[slot as usize];
            assert_eq!(links[l.next as usize].prev, slot);
            assert_eq!(links[l.prev as usize].next, slot);
        }
    }
}
