//! The open file handle: cursor tracking, buffered sync read/write, flush,
//! and close.
//!
//! Built around the single-sector `SectorBuffer` already used by the FAT
//! cluster layer (`super::cache`), and threads a `FatTable` through each
//! operation explicitly rather than storing a borrow of the whole volume
//! on the handle — pass the pieces an operation needs, nothing more.
//! Sector I/O outside the FAT region goes through `FatTable::storage()`,
//! so a `File` never needs its own borrow of the device.

use super::cache::SectorBuffer;
use super::dir::DirEntry;
use super::table::{Cluster, Entry, FatTable};
use crate::error::FsError;
use crate::rtc::{self, RtcCallback};
use crate::storage::{AsyncStorage, Poll, Storage};

use generic_array::{ArrayLength, GenericArray};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const READ: AccessFlags = AccessFlags(1 << 0);
    pub const WRITE: AccessFlags = AccessFlags(1 << 1);
    pub const APPEND: AccessFlags = AccessFlags(1 << 2);
    pub const OVERWRITE: AccessFlags = AccessFlags(1 << 3);
    pub const CREATE: AccessFlags = AccessFlags(1 << 4);
    pub const NO_BUFFERING: AccessFlags = AccessFlags(1 << 5);
    /// Pre-erases every cluster this handle newly allocates before the
    /// buffered write touches it, turning a read-modify-write of a dirty
    /// flash page into a write onto a known-zero one. Cluster chain *start*
    /// alignment to a flash page boundary is governed separately, by the
    /// `page_size_hint` the volume was mounted or formatted with.
    pub const OPTIMIZE_FOR_FLASH: AccessFlags = AccessFlags(1 << 6);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        // Derived rule: CREATE/APPEND/OVERWRITE imply WRITE;
        // every handle has READ.
        let mut flags = bits | Self::READ.0;
        if flags & (Self::CREATE.0 | Self::APPEND.0 | Self::OVERWRITE.0) != 0 {
            flags |= Self::WRITE.0;
        }
        AccessFlags(flags)
    }

    pub fn has(self, other: AccessFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl core::ops::BitOr for AccessFlags {
    type Output = AccessFlags;
    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Start,
    Current,
    End,
}

/// Volume geometry a file needs to translate a byte offset into a disk
/// sector; owned by the volume, borrowed for the duration of each call.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u8,
    pub first_data_sector: u32,
}

impl Geometry {
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster as u32
    }

    pub fn cluster_to_sector(&self, cluster: Cluster) -> u32 {
        self.first_data_sector + (cluster - 2) * self.sectors_per_cluster as u32
    }
}

/// An open file. `N` is the volume's sector size.
#[derive(Debug)]
pub struct File<N: ArrayLength<u8>> {
    pub entry: DirEntry,
    entry_sector: u32,
    entry_offset_in_sector: u16,
    pub flags: AccessFlags,
    pub cursor: u32,
    pub first_cluster: Cluster,
    buffer: SectorBuffer<N>,
    closed: bool,
}

impl<N: ArrayLength<u8>> File<N> {
    /// Opens a handle over an already-resolved directory entry. `CREATE`'s
    /// "make a fresh zero-sized entry" and pathname resolution both happen
    /// one layer up, in the volume façade; this only wires up
    /// cursor/cluster state and applies `APPEND`/`OVERWRITE`.
    pub fn open<S: Storage<SECTOR_SIZE = N>>(
        entry: DirEntry,
        entry_sector: u32,
        entry_offset_in_sector: u16,
        flags: AccessFlags,
        table: &mut FatTable<'_, S>,
    ) -> Result<Self, FsError> {
        if entry.attributes.is_dir() {
            return Err(FsError::NotAFile);
        }

        let mut file = Self {
            first_cluster: entry.cluster_num(),
            entry,
            entry_sector,
            entry_offset_in_sector,
            flags,
            cursor: 0,
            buffer: SectorBuffer::new(),
            closed: false,
        };

        if flags.has(AccessFlags::OVERWRITE) {
            if file.first_cluster != 0 {
                table.free_chain(file.first_cluster)?;
            }
            file.first_cluster = 0;
            file.entry.set_cluster_num(0);
            file.entry.file_size = 0;
        } else if flags.has(AccessFlags::APPEND) {
            file.cursor = file.entry.file_size;
        }

        Ok(file)
    }

    fn require_open(&self) -> Result<(), FsError> {
        if self.closed {
            Err(FsError::InvalidHandle)
        } else {
            Ok(())
        }
    }

    fn cluster_for_byte_offset<S: Storage<SECTOR_SIZE = N>>(
        &self,
        byte_offset: u32,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<Cluster, FsError> {
        let cluster_ord = byte_offset / geometry.bytes_per_cluster();
        let mut cluster = self.first_cluster;
        if cluster == 0 {
            return Err(FsError::InvalidCluster);
        }
        for _ in 0..cluster_ord {
            cluster = match table.get(cluster)? {
                Entry::Next(next) => next,
                _ => return Err(FsError::CorruptedFile),
            };
        }
        Ok(cluster)
    }

    fn sector_for_byte_offset<S: Storage<SECTOR_SIZE = N>>(
        &self,
        byte_offset: u32,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<u32, FsError> {
        let cluster = self.cluster_for_byte_offset(byte_offset, geometry, table)?;
        let sector_in_cluster = (byte_offset % geometry.bytes_per_cluster()) / geometry.bytes_per_sector;
        Ok(geometry.cluster_to_sector(cluster) + sector_in_cluster)
    }

    /// Seeks the cursor. Unbuffered handles may only land on
    /// a sector boundary.
    pub fn seek(&mut self, offset: i64, mode: SeekMode) -> Result<(), FsError> {
        self.require_open()?;

        let base: i64 = match mode {
            SeekMode::Start => 0,
            SeekMode::Current => self.cursor as i64,
            SeekMode::End => {
                if offset != 0 {
                    return Err(FsError::SeekFailed);
                }
                self.entry.file_size as i64
            }
        };

        let target = base + offset;
        if target < 0 || target > u32::MAX as i64 {
            return Err(FsError::SeekFailed);
        }
        let target = target as u32;

        if self.flags.has(AccessFlags::NO_BUFFERING) && target % 512 != 0 {
            return Err(FsError::MisalignedIO);
        }

        self.buffer.invalidate();
        self.cursor = target;
        Ok(())
    }

    /// Buffered read. EOF clamps `buf`'s length to whatever
    /// remains before `current_size`.
    pub fn read<S: Storage<SECTOR_SIZE = N>>(
        &mut self,
        buf: &mut [u8],
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<usize, FsError> {
        self.require_open()?;
        if !self.flags.has(AccessFlags::READ) {
            return Err(FsError::InvalidParameters);
        }

        let available = self.entry.file_size.saturating_sub(self.cursor);
        let to_read = (buf.len() as u32).min(available) as usize;
        let mut done = 0;

        while done < to_read {
            let sector = self.sector_for_byte_offset(self.cursor, geometry, table)?;
            if !self.buffer.holds(sector) {
                table.storage().read_sector(sector, self.buffer.bytes_mut()).map_err(FsError::from)?;
                self.buffer.mark_loaded(sector);
            }

            let offset_in_sector = (self.cursor % geometry.bytes_per_sector) as usize;
            let n = (geometry.bytes_per_sector as usize - offset_in_sector).min(to_read - done);
            buf[done..done + n].copy_from_slice(&self.buffer.bytes()[offset_in_sector..offset_in_sector + n]);

            done += n;
            self.cursor += n as u32;
        }

        Ok(to_read)
    }

    /// Buffered write. Extends the cluster chain as the
    /// cursor crosses into unallocated territory.
    pub fn write<S: Storage<SECTOR_SIZE = N>>(
        &mut self,
        buf: &[u8],
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<usize, FsError> {
        self.require_open()?;
        if !self.flags.has(AccessFlags::WRITE) {
            return Err(FsError::FileNotOpenedForWriteAccess);
        }

        let mut done = 0;
        while done < buf.len() {
            if self.first_cluster == 0 {
                let c = table.allocate_clusters(1, geometry)?;
                if self.flags.has(AccessFlags::OPTIMIZE_FOR_FLASH) {
                    self.zero_cluster(c, geometry, table)?;
                }
                self.first_cluster = c;
                self.entry.set_cluster_num(c);
            }

            let bytes_per_cluster = geometry.bytes_per_cluster();
            let cluster_ord = self.cursor / bytes_per_cluster;
            let mut cluster = self.first_cluster;
            for _ in 0..cluster_ord {
                cluster = match table.get(cluster)? {
                    Entry::Next(next) => next,
                    _ => {
                        let c = table.extend_chain(cluster, geometry)?;
                        if self.flags.has(AccessFlags::OPTIMIZE_FOR_FLASH) {
                            self.zero_cluster(c, geometry, table)?;
                        }
                        c
                    }
                };
            }

            let sector_in_cluster = (self.cursor % bytes_per_cluster) / geometry.bytes_per_sector;
            let sector = geometry.cluster_to_sector(cluster) + sector_in_cluster;

            if !self.buffer.holds(sector) {
                self.flush_buffer(table)?;
                table.storage().read_sector(sector, self.buffer.bytes_mut()).map_err(FsError::from)?;
                self.buffer.mark_loaded(sector);
            }

            let offset_in_sector = (self.cursor % geometry.bytes_per_sector) as usize;
            let n = (geometry.bytes_per_sector as usize - offset_in_sector).min(buf.len() - done);
            self.buffer.bytes_mut()[offset_in_sector..offset_in_sector + n].copy_from_slice(&buf[done..done + n]);
            self.buffer.mark_dirty();

            done += n;
            self.cursor += n as u32;
            if self.cursor > self.entry.file_size {
                self.entry.file_size = self.cursor;
            }
        }

        Ok(done)
    }

    /// Starts an async read of the single sector at the cursor, bypassing
    /// the buffer. The cursor must already sit on a sector boundary, same
    /// restriction `seek` enforces under `NO_BUFFERING`: an async caller
    /// drives the transfer itself across repeated `idle_tick()`s, so there
    /// is no buffered sector to serve an unaligned request from. Call
    /// `poll_read_async` afterwards until it returns `Poll::Ready`.
    pub fn start_read_async<S: AsyncStorage<SECTOR_SIZE = N>>(
        &mut self,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<(), FsError> {
        self.require_open()?;
        if !self.flags.has(AccessFlags::READ) {
            return Err(FsError::InvalidParameters);
        }
        if self.cursor % geometry.bytes_per_sector != 0 {
            return Err(FsError::MisalignedIO);
        }
        let sector = self.sector_for_byte_offset(self.cursor, geometry, table)?;
        table.storage().start_read_sector(sector)
    }

    /// Polls the transfer `start_read_async` began. On `Ready`, fills `buf`
    /// with the sector just landed, advances the cursor by whatever of it
    /// falls before `current_size`, and reports that count.
    pub fn poll_read_async<S: AsyncStorage<SECTOR_SIZE = N>>(
        &mut self,
        buf: &mut GenericArray<u8, N>,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Poll<Result<usize, FsError>> {
        match table.storage().poll_read(buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {
                let available = self.entry.file_size.saturating_sub(self.cursor);
                let n = geometry.bytes_per_sector.min(available);
                self.cursor += n;
                Poll::Ready(Ok(n as usize))
            }
        }
    }

    /// Starts an async write of one full sector at the cursor, bypassing
    /// the buffer (same sector-boundary restriction as `start_read_async`).
    /// Allocates or extends the cluster chain synchronously first, the same
    /// way buffered `write` does, since that bookkeeping always goes
    /// through `Storage`'s blocking `read_sector`/`write_sector`, not the
    /// sector this call is about to transfer. Call `poll_write_async`
    /// afterwards until it returns `Poll::Ready`.
    pub fn start_write_async<S: AsyncStorage<SECTOR_SIZE = N>>(
        &mut self,
        buf: &GenericArray<u8, N>,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<(), FsError> {
        self.require_open()?;
        if !self.flags.has(AccessFlags::WRITE) {
            return Err(FsError::FileNotOpenedForWriteAccess);
        }
        if self.cursor % geometry.bytes_per_sector != 0 {
            return Err(FsError::MisalignedIO);
        }

        if self.first_cluster == 0 {
            let c = table.allocate_clusters(1, geometry)?;
            if self.flags.has(AccessFlags::OPTIMIZE_FOR_FLASH) {
                self.zero_cluster(c, geometry, table)?;
            }
            self.first_cluster = c;
            self.entry.set_cluster_num(c);
        }

        let bytes_per_cluster = geometry.bytes_per_cluster();
        let cluster_ord = self.cursor / bytes_per_cluster;
        let mut cluster = self.first_cluster;
        for _ in 0..cluster_ord {
            cluster = match table.get(cluster)? {
                Entry::Next(next) => next,
                _ => {
                    let c = table.extend_chain(cluster, geometry)?;
                    if self.flags.has(AccessFlags::OPTIMIZE_FOR_FLASH) {
                        self.zero_cluster(c, geometry, table)?;
                    }
                    c
                }
            };
        }

        let sector_in_cluster = (self.cursor % bytes_per_cluster) / geometry.bytes_per_sector;
        let sector = geometry.cluster_to_sector(cluster) + sector_in_cluster;

        self.buffer.invalidate();
        table.storage().start_write_sector(sector, buf)
    }

    /// Polls the transfer `start_write_async` began, advancing the cursor
    /// and `current_size` by one sector once the card reports the write
    /// done.
    pub fn poll_write_async<S: AsyncStorage<SECTOR_SIZE = N>>(
        &mut self,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Poll<Result<(), FsError>> {
        match table.storage().poll_write() {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {
                self.cursor += geometry.bytes_per_sector;
                if self.cursor > self.entry.file_size {
                    self.entry.file_size = self.cursor;
                }
                Poll::Ready(Ok(()))
            }
        }
    }

    fn zero_cluster<S: Storage<SECTOR_SIZE = N>>(
        &self,
        cluster: Cluster,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
    ) -> Result<(), FsError> {
        let zero: GenericArray<u8, N> = GenericArray::default();
        let start = geometry.cluster_to_sector(cluster);
        for s in 0..geometry.sectors_per_cluster as u32 {
            table.storage().write_sector(start + s, &zero).map_err(FsError::from)?;
        }
        Ok(())
    }

    fn flush_buffer<S: Storage<SECTOR_SIZE = N>>(&mut self, table: &mut FatTable<'_, S>) -> Result<(), FsError> {
        if self.buffer.is_dirty() {
            let sector = self.buffer.tag().expect("dirty buffer always holds a sector");
            table.storage().write_sector(sector, self.buffer.bytes()).map_err(FsError::from)?;
            self.buffer.mark_clean();
        }
        Ok(())
    }

    fn write_entry_to_disk<S: Storage<SECTOR_SIZE = N>>(&self, table: &mut FatTable<'_, S>) -> Result<(), FsError> {
        let mut sector: GenericArray<u8, N> = GenericArray::default();
        table.storage().read_sector(self.entry_sector, &mut sector).map_err(FsError::from)?;

        let mut bytes = [0u8; super::dir::ENTRY_SIZE];
        self.entry.to_bytes(&mut bytes);
        let off = self.entry_offset_in_sector as usize;
        sector[off..off + super::dir::ENTRY_SIZE].copy_from_slice(&bytes);
        table.storage().write_sector(self.entry_sector, &sector).map_err(FsError::from)?;

        // Flash-card workaround: rewrite the following
        // sector unchanged as well.
        let next_sector = self.entry_sector + 1;
        let mut next: GenericArray<u8, N> = GenericArray::default();
        table.storage().read_sector(next_sector, &mut next).map_err(FsError::from)?;
        table.storage().write_sector(next_sector, &next).map_err(FsError::from)?;

        Ok(())
    }

    /// Flushes the buffer and the directory entry. Stamps
    /// fresh write timestamps; falls back to the documented default if no
    /// RTC callback is registered.
    pub fn flush<S: Storage<SECTOR_SIZE = N>>(
        &mut self,
        table: &mut FatTable<'_, S>,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<(), FsError> {
        self.require_open()?;
        self.flush_buffer(table)?;

        let now = rtc::now(rtc_callback);
        self.entry.write_time = now.time;
        self.entry.write_date = now.date;

        self.write_entry_to_disk(table)
    }

    /// Truncates any clusters past the one the cursor currently occupies,
    /// flushes, and invalidates the handle.
    pub fn close<S: Storage<SECTOR_SIZE = N>>(
        &mut self,
        geometry: &Geometry,
        table: &mut FatTable<'_, S>,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<(), FsError> {
        self.require_open()?;

        if self.first_cluster != 0 && self.entry.file_size > 0 {
            let last_needed = (self.entry.file_size - 1) / geometry.bytes_per_cluster();
            let mut cluster = self.first_cluster;
            for _ in 0..last_needed {
                cluster = match table.get(cluster)? {
                    Entry::Next(next) => next,
                    _ => break,
                };
            }

            if let Entry::Next(tail) = table.get(cluster)? {
                table.free_chain(tail)?;
                table.set(cluster, Entry::EndOfChain)?;
            }
        }

        self.flush(table, rtc_callback)?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReadError, WriteError};
    use crate::fat::table::FatVariant;
    use typenum::consts::U512;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct NeverErrors;
    impl From<NeverErrors> for FsError {
        fn from(_: NeverErrors) -> Self {
            FsError::UnknownError
        }
    }

    struct RamDisk {
        sectors: [GenericArray<u8, U512>; 32],
        pending_read: Option<u32>,
        write_pending: bool,
    }

    impl RamDisk {
        fn new() -> Self {
            Self { sectors: core::array::from_fn(|_| GenericArray::default()), pending_read: None, write_pending: false }
        }
    }

    impl Storage for RamDisk {
        type SECTOR_SIZE = U512;
        type Error = NeverErrors;

        fn read_sector(&mut self, addr: u32, buf: &mut GenericArray<u8, U512>) -> Result<(), ReadError<NeverErrors>> {
            *buf = self.sectors[addr as usize].clone();
            Ok(())
        }

        fn write_sector(&mut self, addr: u32, buf: &GenericArray<u8, U512>) -> Result<(), WriteError<NeverErrors>> {
            self.sectors[addr as usize] = buf.clone();
            Ok(())
        }

        fn get_total_sectors(&self) -> u32 {
            32
        }
    }

    // Resolves every transfer on the first poll; good enough to exercise
    // `File`'s start/poll pairing without a real multi-tick device.
    impl AsyncStorage for RamDisk {
        fn start_read_sector(&mut self, addr: u32) -> Result<(), FsError> {
            self.pending_read = Some(addr);
            Ok(())
        }

        fn poll_read(&mut self, buf: &mut GenericArray<u8, U512>) -> Poll<Result<(), FsError>> {
            match self.pending_read.take() {
                Some(addr) => {
                    *buf = self.sectors[addr as usize].clone();
                    Poll::Ready(Ok(()))
                }
                None => Poll::Pending,
            }
        }

        fn start_write_sector(&mut self, addr: u32, buf: &GenericArray<u8, U512>) -> Result<(), FsError> {
            self.sectors[addr as usize] = buf.clone();
            self.write_pending = true;
            Ok(())
        }

        fn poll_write(&mut self) -> Poll<Result<(), FsError>> {
            if core::mem::take(&mut self.write_pending) {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        }

        fn start_write_stream(&mut self, _addr: u32, _first: &GenericArray<u8, U512>) -> Result<(), FsError> {
            unimplemented!("not exercised by the async sector read/write tests")
        }

        fn poll_write_stream(&mut self) -> Poll<Result<(), FsError>> {
            unimplemented!("not exercised by the async sector read/write tests")
        }

        fn awaiting_stream_data(&self) -> bool {
            false
        }

        fn feed_stream(&mut self, _response: crate::storage::StreamResponse, _buf: Option<&GenericArray<u8, U512>>) {
            unimplemented!("not exercised by the async sector read/write tests")
        }
    }

    #[test]
    fn write_then_read_back_round_trips() {
        let mut disk = RamDisk::new();
        let geometry = Geometry { bytes_per_sector: 512, sectors_per_cluster: 1, first_data_sector: 10 };
        let mut table = FatTable::new(&mut disk, FatVariant::Fat16, 0, 2, 1, false, 20, None);

        let entry = DirEntry::new(*b"HELLO   TXT", super::super::dir::AttributeSet::default(), 0);
        let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
        let mut file: File<U512> = File::open::<RamDisk>(entry, 0, 0, flags, &mut table).unwrap();

        let payload = b"Hello World.";
        let written = file.write(payload, &geometry, &mut table).unwrap();
        assert_eq!(written, payload.len());

        file.flush(&mut table, None).unwrap();
        file.seek(0, SeekMode::Start).unwrap();

        let mut out = [0u8; 12];
        let read = file.read(&mut out, &geometry, &mut table).unwrap();
        assert_eq!(read, 12);
        assert_eq!(&out, payload);
    }

    #[test]
    fn async_write_then_async_read_round_trips_a_sector() {
        let mut disk = RamDisk::new();
        let geometry = Geometry { bytes_per_sector: 512, sectors_per_cluster: 1, first_data_sector: 10 };
        let mut table = FatTable::new(&mut disk, FatVariant::Fat16, 0, 2, 1, false, 20, None);

        let entry = DirEntry::new(*b"ASYNC   BIN", super::super::dir::AttributeSet::default(), 0);
        let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
        let mut file: File<U512> = File::open::<RamDisk>(entry, 0, 0, flags, &mut table).unwrap();

        let mut payload: GenericArray<u8, U512> = GenericArray::default();
        payload[..5].copy_from_slice(b"async");

        file.start_write_async(&payload, &geometry, &mut table).unwrap();
        loop {
            if let Poll::Ready(result) = file.poll_write_async(&geometry, &mut table) {
                result.unwrap();
                break;
            }
        }
        assert_eq!(file.entry.file_size, 512);

        file.seek(0, SeekMode::Start).unwrap();
        file.start_read_async(&geometry, &mut table).unwrap();
        let mut readback: GenericArray<u8, U512> = GenericArray::default();
        loop {
            if let Poll::Ready(result) = file.poll_read_async(&mut readback, &geometry, &mut table) {
                assert_eq!(result.unwrap(), 512);
                break;
            }
        }
        assert_eq!(&readback[..5], b"async");
    }

    #[test]
    fn optimize_for_flash_pre_erases_clusters_it_allocates() {
        let mut disk = RamDisk::new();
        let geometry = Geometry { bytes_per_sector: 512, sectors_per_cluster: 2, first_data_sector: 10 };
        let mut table = FatTable::new(&mut disk, FatVariant::Fat16, 0, 2, 2, false, 20, None);

        // Poison the cluster the file is about to claim so a stale read
        // would fail the later all-zero assertion below.
        let mut poison: GenericArray<u8, U512> = GenericArray::default();
        poison.copy_from_slice(&[0xFFu8; 512]);
        table.storage().write_sector(10, &poison).unwrap();

        let entry = DirEntry::new(*b"FLASH   BIN", super::super::dir::AttributeSet::default(), 0);
        let flags = AccessFlags::from_bits(
            AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits() | AccessFlags::OPTIMIZE_FOR_FLASH.bits(),
        );
        let mut file: File<U512> = File::open::<RamDisk>(entry, 0, 0, flags, &mut table).unwrap();
        file.write(b"hi", &geometry, &mut table).unwrap();

        let mut second_sector = GenericArray::<u8, U512>::default();
        table.storage().read_sector(11, &mut second_sector).unwrap();
        assert_eq!(&second_sector[..], &[0u8; 512][..]);
    }
}
