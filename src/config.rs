//! Runtime knobs passed into `mount`/`format`, distinct from the
//! compile-time tuning (`typenum` sector size, the `no_std`/`external_mutex`
//! features) the rest of the crate settles at build time.

/// Mount/format-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Keep every FAT copy identical on every write ("FAT mirroring").
    /// `Volume::format` always honors this; `Volume::mount` overrides
    /// whatever the on-disk BPB says with it too, since this build never
    /// implements FAT32's "single active FAT" addressing and has no other
    /// way to decide which copy is authoritative.
    pub maintain_two_fats: bool,
    /// Flash page size, in sectors, new cluster chains should start aligned
    /// to when possible. `None` disables page-aligned allocation, scanning
    /// for the first free cluster the way this crate always used to.
    pub page_size_hint: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self { maintain_two_fats: true, page_size_hint: None }
    }
}
