//! A fixed-depth FIFO of pending block requests: the driver
//! keeps at most one transfer in flight with the card, but additional
//! `start_*` calls queue rather than fail while that transfer completes.
//!
//! Grounded directly in the reference driver's request queue: a pool of
//! fixed slots found by linear scan (here, `BitMap::next_empty_bit`) and
//! linked in submission order — the same shape, without the `malloc`.

use crate::util::BitMap;

use typenum::consts::U8;
use typenum::marker_traits::Unsigned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
    /// A `CMD25` multi-block write; `needs_data` mirrors the reference
    /// driver's flag that makes the pump ask the caller for the first
    /// sector's data before the transfer starts.
    MultiWrite { needs_data: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub kind: RequestKind,
    pub sector: u32,
    next: Option<u8>,
}

impl Request {
    pub fn new(kind: RequestKind, sector: u32) -> Self {
        Self { kind, sector, next: None }
    }
}

/// Queue depth this build supports.
pub type Depth = U8;

pub struct RequestQueue {
    occupied: BitMap<Depth>,
    slots: [Option<Request>; 8],
    head: Option<u8>,
    tail: Option<u8>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self { occupied: BitMap::new(), slots: [None; 8], head: None, tail: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        Depth::to_usize() - self.occupied.empty_bits()
    }

    /// Enqueues `request`, returning `Err(request)` if the queue is full.
    pub fn push(&mut self, request: Request) -> Result<(), Request> {
        let slot = match self.occupied.next_empty_bit() {
            Ok(slot) => slot,
            Err(()) => return Err(request),
        };
        self.occupied.set(slot, true).unwrap();
        self.slots[slot] = Some(Request { next: None, ..request });

        match self.tail {
            Some(tail) => {
                self.slots[tail as usize].as_mut().unwrap().next = Some(slot as u8);
            }
            None => self.head = Some(slot as u8),
        }
        self.tail = Some(slot as u8);
        Ok(())
    }

    /// Removes and returns the oldest queued request, if any.
    pub fn pop(&mut self) -> Option<Request> {
        let head = self.head?;
        let request = self.slots[head as usize].take().unwrap();
        self.occupied.set(head as usize, false).unwrap();
        self.head = request.next;
        if self.head.is_none() {
            self.tail = None;
        }
        Some(request)
    }

    /// The oldest queued request without removing it.
    pub fn peek(&self) -> Option<&Request> {
        self.head.and_then(|h| self.slots[h as usize].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(sector: u32) -> Request {
        Request { kind: RequestKind::Read, sector, next: None }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = RequestQueue::new();
        q.push(req(1)).unwrap();
        q.push(req(2)).unwrap();
        q.push(req(3)).unwrap();

        assert_eq!(q.pop().unwrap().sector, 1);
        assert_eq!(q.pop().unwrap().sector, 2);
        assert_eq!(q.pop().unwrap().sector, 3);
        assert!(q.pop().is_none());
    }

    #[test]
    fn rejects_push_past_capacity() {
        let mut q = RequestQueue::new();
        for i in 0..8 {
            q.push(req(i)).unwrap();
        }
        assert!(q.push(req(99)).is_err());
        assert_eq!(q.len(), 8);
    }

    #[test]
    fn interleaved_push_pop_keeps_order() {
        let mut q = RequestQueue::new();
        q.push(req(1)).unwrap();
        q.push(req(2)).unwrap();
        assert_eq!(q.pop().unwrap().sector, 1);
        q.push(req(3)).unwrap();
        assert_eq!(q.pop().unwrap().sector, 2);
        assert_eq!(q.pop().unwrap().sector, 3);
    }
}
