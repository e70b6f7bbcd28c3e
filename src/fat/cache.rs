//! The single-sector buffer every volume and every open file owns: a
//! sector-sized array plus a "which sector is this" tag and a dirty flag.
//!
//! One slot rather than a multi-way cache with an eviction policy — this
//! target's RAM budget only ever buffers the sector currently being
//! walked, so there's nothing to evict.

use generic_array::{ArrayLength, GenericArray};

/// Sentinel meaning "no sector is currently cached" (`0xFFFFFFFF` = unknown).
pub const NO_SECTOR: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Clean,
    Dirty,
}

#[derive(Debug)]
pub struct SectorBuffer<N: ArrayLength<u8>> {
    data: GenericArray<u8, N>,
    tag: u32,
    state: State,
}

impl<N: ArrayLength<u8>> SectorBuffer<N> {
    pub fn new() -> Self {
        Self { data: GenericArray::default(), tag: NO_SECTOR, state: State::Clean }
    }

    pub fn bytes(&self) -> &GenericArray<u8, N> {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut GenericArray<u8, N> {
        &mut self.data
    }

    pub fn tag(&self) -> Option<u32> {
        if self.tag == NO_SECTOR {
            None
        } else {
            Some(self.tag)
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state == State::Dirty
    }

    pub fn holds(&self, sector: u32) -> bool {
        self.tag() == Some(sector)
    }

    /// Marks the buffer as holding `sector`'s freshly-loaded contents.
    pub fn mark_loaded(&mut self, sector: u32) {
        self.tag = sector;
        self.state = State::Clean;
    }

    pub fn mark_dirty(&mut self) {
        self.state = State::Dirty;
    }

    pub fn mark_clean(&mut self) {
        self.state = State::Clean;
    }

    /// Invalidates the cached tag. Must be called on any code path that
    /// can't prove the cached contents still match what's on disk.
    pub fn invalidate(&mut self) {
        self.tag = NO_SECTOR;
        self.state = State::Clean;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typenum::consts::U512;

    #[test]
    fn starts_empty() {
        let buf = SectorBuffer::<U512>::new();
        assert_eq!(buf.tag(), None);
        assert!(!buf.is_dirty());
    }

    #[test]
    fn load_then_invalidate() {
        let mut buf = SectorBuffer::<U512>::new();
        buf.mark_loaded(42);
        assert!(buf.holds(42));
        buf.mark_dirty();
        assert!(buf.is_dirty());
        buf.invalidate();
        assert_eq!(buf.tag(), None);
        assert!(!buf.is_dirty());
    }
}
