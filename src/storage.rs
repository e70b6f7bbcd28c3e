//! The Block Device Interface (BDI) — the abstraction the FAT engine calls
//! into and the SD/SPI driver (`crate::sd`) implements.
//!
//! Kept as an in-tree trait rather than split out into its own published
//! crate: the seam only has one implementor in this build (`crate::sd`),
//! so there is nothing external yet to version against.

use crate::error::{EraseError, FsError, ReadError, WriteError};

use core::fmt::Debug;
use generic_array::{ArrayLength, GenericArray};
use typenum::marker_traits::Unsigned;

/// A sector-addressable block device with a power-of-two sector size.
///
/// Implementors provide synchronous, busy-waiting I/O; `AsyncStorage` below
/// layers cooperative, tick-driven I/O on top for devices (like the SD
/// driver) that can overlap computation with a card program/erase cycle.
pub trait Storage {
    #[allow(non_camel_case_types)]
    type SECTOR_SIZE: ArrayLength<u8>;

    /// The device-specific error a concrete impl can fail with; the FAT
    /// layer only needs `Into<FsError>` to cross the seam.
    type Error: Debug + Copy + Into<FsError>;

    fn read_sector(
        &mut self,
        addr: u32,
        buf: &mut GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), ReadError<Self::Error>>;

    fn write_sector(
        &mut self,
        addr: u32,
        buf: &GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), WriteError<Self::Error>>;

    /// Total number of addressable sectors.
    fn get_total_sectors(&self) -> u32;

    fn get_sector_size(&self) -> u32 {
        Self::SECTOR_SIZE::to_u32()
    }

    /// Natural write page, in sectors. 1 for non-flash media; the
    /// allocation-unit size for flash-backed media like SD.
    fn get_page_size(&self) -> u32 {
        1
    }

    fn get_device_id(&self) -> u16 {
        0
    }

    /// Erases `[first, last]` inclusive. No-op on non-flash media; SD issues
    /// CMD32/CMD33/CMD38. The default writes zeros sector by
    /// sector, stopping at the first error.
    fn erase_sectors(
        &mut self,
        first: u32,
        last: u32,
    ) -> Result<(), EraseError<Self::Error, Self::Error>> {
        let zero = GenericArray::default();
        for addr in first..=last {
            self.write_sector(addr, &zero)
                .map_err(EraseError::ErrorInIndividualErase)?;
        }
        Ok(())
    }

    /// Registers a callback the driver invokes with `(device_id, mounted?)`
    /// whenever card presence changes, after debouncing across a grace
    /// window. The default no-op suits media that can't be
    /// removed (RAM disks, file-backed test harnesses).
    fn register_media_changed_callback(&mut self, _cb: fn(u16, bool)) {}

    /// Drives whatever tick-driven bookkeeping this device needs: debounced
    /// presence detection, draining requests queued behind a multi-sector
    /// stream. Called from the application's own idle loop, as often as it
    /// likes; the default no-op suits media with nothing to tick.
    fn idle_tick(&mut self) {}
}

/// Which way the caller wants a `write_sectors_stream` transfer to proceed
/// once the driver is ready for the next sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamResponse {
    /// `feed`'s buffer holds the next sector; continue the transfer.
    Ready,
    /// No data available yet; end the current multi-sector sequence cleanly
    /// and let the caller resume at the next address later.
    Skip,
    /// Terminate cleanly; the transfer ends successfully.
    Stop,
}

/// A single in-flight asynchronous operation's outcome, as observed via
/// `poll`. `core::task::Poll` is a plain `core` enum (no executor attached),
/// so reusing it keeps the cooperative, tick-driven model free of any
/// async-runtime dependency: no heap, no runtime, state machines driven
/// by hand.
pub use core::task::Poll;

/// Extension of `Storage` for devices that can overlap a slow program/erase
/// cycle with computation elsewhere in the cooperative scheduler. Every
/// method here is driven to completion by repeated calls from the
/// application's own poll loop; none of them block.
pub trait AsyncStorage: Storage {
    /// Begins an asynchronous sector read. Call `poll_read` afterwards,
    /// once per `idle_tick()`, until it returns `Poll::Ready`.
    fn start_read_sector(&mut self, addr: u32) -> Result<(), FsError>;
    fn poll_read(
        &mut self,
        buf: &mut GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Poll<Result<(), FsError>>;

    fn start_write_sector(
        &mut self,
        addr: u32,
        buf: &GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), FsError>;
    fn poll_write(&mut self) -> Poll<Result<(), FsError>>;

    /// Begins a `CMD25`-style multi-sector write starting at `addr` with
    /// `first` as the first sector's payload.
    fn start_write_stream(
        &mut self,
        addr: u32,
        first: &GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), FsError>;

    /// Advances the stream. Returns `Pending` while a sector is still being
    /// transferred/programmed, or while waiting on the caller to `feed_stream`
    /// the next sector (check `awaiting_stream_data` to tell those apart).
    /// Returns `Ready` once the stop token has been sent and the bus
    /// released.
    fn poll_write_stream(&mut self) -> Poll<Result<(), FsError>>;

    /// True exactly when `poll_write_stream` is waiting on the caller to
    /// supply the next sector via `feed_stream`.
    fn awaiting_stream_data(&self) -> bool;

    fn feed_stream(
        &mut self,
        response: StreamResponse,
        buf: Option<&GenericArray<u8, Self::SECTOR_SIZE>>,
    );
}
