//! The Volume façade: mount/dismount/format, and the directory/file
//! operations a caller actually uses, wiring together `boot_sector`,
//! `table`, `dir`, `path`, `mbr`, and `file`.
//!
//! One struct, built by `mount`, handed `&mut S` on every call. Mounting
//! probes the MBR partition table rather than GPT, and the FAT width
//! (12/16/32) is read from the boot sector rather than assumed, so the
//! same `Volume` type serves every width.

pub mod boot_sector;
pub mod cache;
pub mod dir;
pub mod file;
pub mod mbr;
pub mod path;
pub mod table;

use boot_sector::{BiosParameterBlock, BootSector, Extended, FsInfo};
use dir::{
    decode_long_name, encode_long_name, fits_short_name, generate_short_name, AttributeSet, Attribute, DirEntry,
    EntryState, LfnEntry, ENTRY_SIZE, LFN_CHARS_PER_ENTRY, LFN_LAST_ENTRY_FLAG, MAX_LFN_ENTRIES,
};
use file::{AccessFlags, File, Geometry};
use table::{Cluster, Entry, FatTable};

pub use table::FatVariant as FsVariant;

use crate::config::Config;
use crate::error::FsError;
use crate::rtc::RtcCallback;
use crate::storage::Storage;

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

/// Bound on how many sectors a single directory walk will visit. Embedded
/// targets have no allocator to grow into; this caps directory size the
/// same way `SectorBuffer`/`FatTable`'s test harness cap their arrays,
/// rather than growing a `Vec` unboundedly.
const MAX_DIR_SECTORS_PER_SCAN: usize = 512;

#[derive(Debug, Clone, Copy)]
enum DirRegion {
    FixedRoot { start_sector: u32, sector_count: u32 },
    Chain { first_cluster: Cluster },
}

/// Which directory a lookup/creation/iteration targets: the root (whose
/// storage region differs by variant) or an ordinary subdirectory entry.
#[derive(Debug, Clone, Copy)]
pub enum DirHandle {
    Root,
    Sub(DirEntry),
}

/// Where a directory entry physically lives, so a caller can patch it in
/// place (used by `create_entry` and `File::open`/`delete_entry`).
#[derive(Debug, Clone, Copy)]
pub struct EntryLocation {
    pub entry: DirEntry,
    pub sector: u32,
    pub offset_in_sector: u16,
    pub long_name_lfn_count: u8,
    /// `(sector, offset_in_sector)` of each LFN fragment that precedes this
    /// entry's SFN, oldest-ordinal first. Only the first `long_name_lfn_count`
    /// slots are meaningful.
    pub lfn_locations: [(u32, u16); MAX_LFN_ENTRIES],
}

/// Opaque progress handle for `find_first_entry`/`find_next_entry`/
/// `find_close`: the region being listed and the flat slot index to
/// resume scanning from.
pub struct FindState {
    region: DirRegion,
    next_slot: usize,
}

/// A mounted FAT12/16/32 volume. `S` must use 512-byte sectors
/// (`typenum::consts::U512` is baked into `BootSector`).
#[derive(Debug, Clone, Copy)]
pub struct Volume {
    pub partition_start_lba: u32,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u32,
    pub num_fats: u8,
    pub fat_size_sectors: u32,
    pub root_dir_start_sector: u32,
    pub root_dir_sector_count: u32,
    pub root_dir_cluster: Cluster,
    pub first_data_sector: u32,
    pub total_clusters: u32,
    pub variant: FsVariant,
    pub mirror_fats: bool,
    pub fsinfo_sector: Option<u32>,
    pub media_descriptor: u8,
    pub label: [u8; 11],
    pub page_size_hint: Option<u32>,
}

impl Volume {
    fn geometry(&self) -> Geometry {
        Geometry {
            bytes_per_sector: self.bytes_per_sector,
            sectors_per_cluster: self.sectors_per_cluster,
            first_data_sector: self.first_data_sector,
        }
    }

    fn table<'s, S: Storage<SECTOR_SIZE = U512>>(&self, storage: &'s mut S) -> FatTable<'s, S> {
        FatTable::new(
            storage,
            self.variant,
            self.partition_start_lba + self.reserved_sectors,
            self.fat_size_sectors,
            self.num_fats,
            self.mirror_fats,
            self.total_clusters,
            self.page_size_hint,
        )
    }

    fn cluster_to_sector(&self, cluster: Cluster) -> u32 {
        self.geometry().cluster_to_sector(cluster)
    }

    fn build_from_bpb(partition_start_lba: u32, bpb: &BiosParameterBlock) -> Result<Self, FsError> {
        if bpb.bytes_per_logical_sector != 512 {
            return Err(FsError::SectorSizeNotSupported);
        }
        if bpb.logical_sectors_per_cluster == 0 || !bpb.logical_sectors_per_cluster.is_power_of_two() {
            return Err(FsError::InvalidFatVolume);
        }

        let reserved_sectors = bpb.num_reserved_logical_sectors as u32;
        let fat_size_sectors = bpb.fat_size();
        let num_fats = bpb.num_file_alloc_tables;
        let root_dir_sector_count = if bpb.is_fat32_layout() { 0 } else { bpb.root_dir_sectors() };
        let root_dir_start_sector = partition_start_lba + reserved_sectors + num_fats as u32 * fat_size_sectors;
        let first_data_sector = root_dir_start_sector + root_dir_sector_count;

        let total_sectors = bpb.total_sectors();
        let system_sectors = reserved_sectors + num_fats as u32 * fat_size_sectors + root_dir_sector_count;
        let data_sectors = total_sectors.checked_sub(system_sectors).ok_or(FsError::InvalidFatVolume)?;
        let total_clusters = data_sectors / bpb.logical_sectors_per_cluster as u32;
        let variant = FsVariant::from_cluster_count(total_clusters);

        let entry_bits: u32 = match variant {
            FsVariant::Fat12 => 12,
            FsVariant::Fat16 => 16,
            FsVariant::Fat32 => 32,
        };
        let required_fat_bytes = ((total_clusters as u64 + 2) * entry_bits as u64 + 7) / 8;
        let required_fat_sectors = (required_fat_bytes + bpb.bytes_per_logical_sector as u64 - 1)
            / bpb.bytes_per_logical_sector as u64;
        if (fat_size_sectors as u64) < required_fat_sectors {
            return Err(FsError::InvalidFatVolume);
        }

        let (root_dir_cluster, fsinfo_sector, mirror_fats) = match bpb.ext {
            Extended::Fat32 { root_dir_cluster_num, fs_info_logical_sector_num, drive_desc_mirroring_flags, .. } => (
                root_dir_cluster_num,
                Some(partition_start_lba + fs_info_logical_sector_num as u32),
                drive_desc_mirroring_flags & 0x0080 == 0,
            ),
            Extended::Fat16 { .. } => (0, None, true),
        };

        Ok(Self {
            partition_start_lba,
            bytes_per_sector: bpb.bytes_per_logical_sector as u32,
            sectors_per_cluster: bpb.logical_sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size_sectors,
            root_dir_start_sector,
            root_dir_sector_count,
            root_dir_cluster,
            first_data_sector,
            total_clusters,
            variant,
            mirror_fats,
            fsinfo_sector,
            media_descriptor: bpb.media_descriptor,
            label: bpb.volume_label(),
            page_size_hint: None,
        })
    }

    fn try_mount_at<S: Storage<SECTOR_SIZE = U512>>(
        storage: &mut S,
        start_lba: u32,
        config: Config,
    ) -> Result<Self, FsError> {
        let mut sector: GenericArray<u8, U512> = GenericArray::default();
        storage.read_sector(start_lba, &mut sector).map_err(FsError::from)?;
        let boot = BootSector::read(&sector);

        let mut volume = Self::build_from_bpb(start_lba, &boot.bpb)?;
        volume.mirror_fats = config.maintain_two_fats;
        volume.page_size_hint = config.page_size_hint;

        let fat_start = volume.partition_start_lba + volume.reserved_sectors;
        storage.read_sector(fat_start, &mut sector).map_err(FsError::from)?;
        if sector[0] != volume.media_descriptor {
            return Err(FsError::InvalidFatVolume);
        }

        if let Some(label) = volume.scan_volume_label(storage)? {
            volume.label = label;
        }

        if let Some(fsinfo_sector) = volume.fsinfo_sector {
            storage.read_sector(fsinfo_sector, &mut sector).map_err(FsError::from)?;
            if let Some(info) = FsInfo::read(&sector) {
                if info.free_count <= volume.total_clusters {
                    // Hints are advisory; `FatTable::next_free_hint` starts
                    // the scan wherever `Volume::table` leaves it, which is
                    // always 2. A hinted start is a worthwhile improvement
                    // left for a follow-up (`FatTable` would need a
                    // caller-supplied starting hint).
                    let _ = info.next_free;
                }
            }
        }

        Ok(volume)
    }

    /// Mounts the volume on `storage`: partitionless first, then each
    /// present MBR partition in table order.
    pub fn mount<S: Storage<SECTOR_SIZE = U512>>(storage: &mut S, config: Config) -> Result<Self, FsError> {
        if let Ok(v) = Self::try_mount_at(storage, 0, config) {
            return Ok(v);
        }

        let mut sector: GenericArray<u8, U512> = GenericArray::default();
        storage.read_sector(0, &mut sector).map_err(FsError::from)?;
        if mbr::has_boot_signature(&sector) {
            for entry in mbr::read_partition_table(&sector) {
                if entry.is_present() {
                    if let Ok(v) = Self::try_mount_at(storage, entry.first_lba, config) {
                        return Ok(v);
                    }
                }
            }
        }

        Err(FsError::InvalidFatVolume)
    }

    /// Rewrites FSInfo, repairing its signatures if a foreign OS clobbered
    /// them.
    pub fn dismount<S: Storage<SECTOR_SIZE = U512>>(&self, storage: &mut S) -> Result<(), FsError> {
        if let Some(fsinfo_sector) = self.fsinfo_sector {
            let free = self.table(storage).count_free_clusters()?;
            let mut sector: GenericArray<u8, U512> = GenericArray::default();
            FsInfo { free_count: free, next_free: 0xFFFF_FFFF }.write(&mut sector);
            storage.write_sector(fsinfo_sector, &sector).map_err(FsError::from)?;
        }
        Ok(())
    }

    /// Lays down a fresh BPB, zeroed FATs (with entries 0/1 seeded), a
    /// zeroed root directory region, and the volume label.
    pub fn format<S: Storage<SECTOR_SIZE = U512>>(
        storage: &mut S,
        starting_lba: u32,
        ending_lba: u32,
        label: [u8; 11],
        config: Config,
    ) -> Result<Self, FsError> {
        let boot = BootSector::new(starting_lba, ending_lba);
        let mut sector: GenericArray<u8, U512> = GenericArray::default();
        boot.write(&mut sector);
        storage.write_sector(starting_lba, &sector).map_err(FsError::from)?;

        if let Extended::Fat32 { boot_sector_backup_logical_sector_start_num, .. } = boot.bpb.ext {
            storage
                .write_sector(starting_lba + boot_sector_backup_logical_sector_start_num as u32, &sector)
                .map_err(FsError::from)?;
        }

        let mut volume = Self::build_from_bpb(starting_lba, &boot.bpb)?;
        volume.mirror_fats = config.maintain_two_fats;
        volume.page_size_hint = config.page_size_hint;

        let zero: GenericArray<u8, U512> = GenericArray::default();
        for fat_idx in 0..volume.num_fats as u32 {
            let fat_start = volume.partition_start_lba + volume.reserved_sectors + fat_idx * volume.fat_size_sectors;
            for s in 0..volume.fat_size_sectors {
                storage.write_sector(fat_start + s, &zero).map_err(FsError::from)?;
            }
        }

        {
            let mut table = volume.table(storage);
            // Entry 0 packs the media descriptor into its low byte with the
            // rest of the entry's bits set; entry 1 is a
            // plain end-of-chain marker.
            let reserved_entry0 = 0xFFFF_FF00 | volume.media_descriptor as u32;
            table.set_raw(0, reserved_entry0)?;
            table.set(1, Entry::EndOfChain)?;
            if volume.variant == FsVariant::Fat32 {
                table.set(2, Entry::EndOfChain)?;
            }
        }

        if volume.variant == FsVariant::Fat32 {
            let root_sector = volume.cluster_to_sector(volume.root_dir_cluster);
            for s in 0..volume.sectors_per_cluster as u32 {
                storage.write_sector(root_sector + s, &zero).map_err(FsError::from)?;
            }
        } else {
            for s in 0..volume.root_dir_sector_count {
                storage.write_sector(volume.root_dir_start_sector + s, &zero).map_err(FsError::from)?;
            }
        }

        if let Some(fsinfo_sector) = volume.fsinfo_sector {
            let mut fsinfo_bytes: GenericArray<u8, U512> = GenericArray::default();
            FsInfo { free_count: volume.total_clusters.saturating_sub(1), next_free: 3 }.write(&mut fsinfo_bytes);
            storage.write_sector(fsinfo_sector, &fsinfo_bytes).map_err(FsError::from)?;
        }

        let mut label_entry = DirEntry::new(label, AttributeSet::from_raw(Attribute::VolumeId as u8), 0);
        label_entry.attributes.set(Attribute::VolumeId, true);
        let region = volume.dir_region(&DirHandle::Root);
        volume.write_entry_into_first_free_slot::<S>(storage, region, &label_entry)?;

        Ok(Self { label, ..volume })
    }

    fn dir_region(&self, handle: &DirHandle) -> DirRegion {
        match handle {
            DirHandle::Root => match self.variant {
                FsVariant::Fat32 => DirRegion::Chain { first_cluster: self.root_dir_cluster },
                _ => DirRegion::FixedRoot {
                    start_sector: self.root_dir_start_sector,
                    sector_count: self.root_dir_sector_count,
                },
            },
            DirHandle::Sub(entry) => DirRegion::Chain { first_cluster: entry.cluster_num() },
        }
    }

    fn collect_region_sectors<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        region: DirRegion,
        table: &mut FatTable<S>,
        out: &mut [u32; MAX_DIR_SECTORS_PER_SCAN],
    ) -> Result<usize, FsError> {
        match region {
            DirRegion::FixedRoot { start_sector, sector_count } => {
                let count = sector_count as usize;
                if count > MAX_DIR_SECTORS_PER_SCAN {
                    return Err(FsError::RootDirectoryLimitExceeded);
                }
                for i in 0..count {
                    out[i] = start_sector + i as u32;
                }
                Ok(count)
            }
            DirRegion::Chain { first_cluster } => {
                if first_cluster == 0 {
                    return Ok(0);
                }
                let mut n = 0;
                let mut cluster = first_cluster;
                loop {
                    for s in 0..self.sectors_per_cluster as u32 {
                        if n >= MAX_DIR_SECTORS_PER_SCAN {
                            return Err(FsError::DirectoryLimitExceeded);
                        }
                        out[n] = self.cluster_to_sector(cluster) + s;
                        n += 1;
                    }
                    match table.get(cluster)? {
                        Entry::Next(next) => cluster = next,
                        _ => break,
                    }
                }
                Ok(n)
            }
        }
    }

    fn scan_volume_label<S: Storage<SECTOR_SIZE = U512>>(&self, storage: &mut S) -> Result<Option<[u8; 11]>, FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let region = self.dir_region(&DirHandle::Root);
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(region, &mut table, &mut sectors)?;

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        for &sector in &sectors[..n] {
            table.storage().read_sector(sector, &mut buf).map_err(FsError::from)?;
            for chunk in buf.chunks_exact(ENTRY_SIZE) {
                let raw: [u8; ENTRY_SIZE] = chunk.try_into().unwrap();
                let entry = DirEntry::from_bytes(&raw);
                if entry.state() == EntryState::End {
                    return Ok(None);
                }
                if entry.state() == EntryState::Exists && entry.attributes.is_volume_id() {
                    return Ok(Some(entry.name));
                }
            }
        }
        Ok(None)
    }

    fn write_entry_into_first_free_slot<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        entry: &DirEntry,
    ) -> Result<(), FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(region, &mut table, &mut sectors)?;

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        for &sector in &sectors[..n] {
            table.storage().read_sector(sector, &mut buf).map_err(FsError::from)?;
            for (slot, chunk) in buf.chunks_exact_mut(ENTRY_SIZE).enumerate() {
                let raw: [u8; ENTRY_SIZE] = (&*chunk).try_into().unwrap();
                let existing = DirEntry::from_bytes(&raw);
                if existing.state() != EntryState::Exists {
                    let mut bytes = [0u8; ENTRY_SIZE];
                    entry.to_bytes(&mut bytes);
                    chunk.copy_from_slice(&bytes);
                    table.storage().write_sector(sector, &buf).map_err(FsError::from)?;
                    let _ = slot;
                    return Ok(());
                }
            }
        }
        Err(FsError::DirectoryLimitExceeded)
    }

    /// Picks the 11-byte short name a new or renamed entry should carry:
    /// `component` itself upper-cased if it already fits 8.3, otherwise a
    /// generated numeric-tail short name unique within `region`.
    fn short_name_for<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        component: &str,
    ) -> [u8; 11] {
        if fits_short_name(component) {
            let mut out = [0x20u8; 11];
            let (base, ext) = match component.rsplit_once('.') {
                Some((b, e)) => (b, e),
                None => (component, ""),
            };
            for (i, b) in base.bytes().take(8).enumerate() {
                out[i] = b.to_ascii_uppercase();
            }
            for (i, b) in ext.bytes().take(3).enumerate() {
                out[8 + i] = b.to_ascii_uppercase();
            }
            out
        } else {
            generate_short_name(component, |candidate| {
                matches!(self.find_component(storage, region, core::str::from_utf8(candidate).unwrap_or("")), Ok(Some(_)))
            })
        }
    }

    /// Long-name-aware lookup of one path component among `region`'s
    /// entries. Returns the matching SFN's location, or `None`.
    fn find_component<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        component: &str,
    ) -> Result<Option<EntryLocation>, FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(region, &mut table, &mut sectors)?;

        let mut lfn_units = [0u16; MAX_LFN_ENTRIES * LFN_CHARS_PER_ENTRY];
        let mut lfn_len = 0usize;
        let mut lfn_fragments = 0u8;
        let mut lfn_checksum = 0u8;
        let mut lfn_positions = [(0u32, 0u16); MAX_LFN_ENTRIES];
        let mut name_buf = [0u8; MAX_LFN_ENTRIES * LFN_CHARS_PER_ENTRY * 4];

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        for &sector in &sectors[..n] {
            table.storage().read_sector(sector, &mut buf).map_err(FsError::from)?;
            for (slot, chunk) in buf.chunks_exact(ENTRY_SIZE).enumerate() {
                let raw: [u8; ENTRY_SIZE] = chunk.try_into().unwrap();

                if dir::AttributeSet::from_raw(raw[11]).is_lfn_fragment() {
                    let lfn = LfnEntry::from_bytes(&raw);
                    if lfn.ordinal & LFN_LAST_ENTRY_FLAG != 0 {
                        lfn_fragments = lfn.ordinal & !LFN_LAST_ENTRY_FLAG;
                        lfn_checksum = lfn.checksum;
                        lfn_len = 0;
                    }
                    let ordinal = lfn.ordinal & !LFN_LAST_ENTRY_FLAG;
                    if lfn.checksum != lfn_checksum || ordinal == 0 {
                        lfn_fragments = 0;
                        continue;
                    }
                    let (chars, len) = lfn.chars();
                    let start = (ordinal as usize - 1) * LFN_CHARS_PER_ENTRY;
                    if start + LFN_CHARS_PER_ENTRY > lfn_units.len() || ordinal as usize > MAX_LFN_ENTRIES {
                        lfn_fragments = 0;
                        continue;
                    }
                    lfn_units[start..start + LFN_CHARS_PER_ENTRY].copy_from_slice(&chars);
                    lfn_positions[ordinal as usize - 1] = (sector, (slot * ENTRY_SIZE) as u16);
                    lfn_len = lfn_len.max(start + len);
                    continue;
                }

                let entry = DirEntry::from_bytes(&raw);
                match entry.state() {
                    EntryState::End => return Ok(None),
                    EntryState::Deleted => {
                        lfn_fragments = 0;
                        continue;
                    }
                    EntryState::Exists => {}
                }

                if entry.attributes.is_volume_id() {
                    lfn_fragments = 0;
                    continue;
                }

                let has_lfn = lfn_fragments > 0 && entry.lfn_checksum() == lfn_checksum;
                let long_name = if has_lfn { decode_long_name(&lfn_units[..lfn_len], &mut name_buf) } else { None };
                let matched_lfn_count = if has_lfn { lfn_fragments } else { 0 };
                let matched_lfn_positions = lfn_positions;
                lfn_fragments = 0;

                if path::entry_matches_component(&entry, long_name, component) {
                    return Ok(Some(EntryLocation {
                        entry,
                        sector,
                        offset_in_sector: (slot * ENTRY_SIZE) as u16,
                        long_name_lfn_count: matched_lfn_count,
                        lfn_locations: matched_lfn_positions,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Resolves a `\`-separated path to its entry's location, starting from
    /// the root.
    pub fn resolve<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        path: &str,
    ) -> Result<EntryLocation, FsError> {
        let mut current = DirHandle::Root;
        let mut last = None;

        for component in path::components(path) {
            path::validate_component(component.raw)?;
            let region = self.dir_region(&current);
            let found = self.find_component(storage, region, component.raw)?.ok_or(FsError::FileNotFound)?;
            current = DirHandle::Sub(found.entry);
            last = Some(found);
        }

        last.ok_or(FsError::InvalidPath)
    }

    /// Creates a new, empty entry named by the final component of `path`
    ///. The parent must already exist.
    pub fn create_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        path: &str,
        attributes: AttributeSet,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<EntryLocation, FsError> {
        let (parent_path, final_component) = path::split_parent(path)?;
        path::validate_component(final_component)?;

        let parent = if parent_path.is_empty() {
            DirHandle::Root
        } else {
            DirHandle::Sub(self.resolve(storage, parent_path)?.entry)
        };
        let region = self.dir_region(&parent);

        if self.find_component(storage, region, final_component)?.is_some() {
            return Err(FsError::FilenameAlreadyExists);
        }

        let now = crate::rtc::now(rtc_callback);

        let first_cluster = if attributes.is_dir() {
            let parent_cluster = match parent {
                DirHandle::Root => self.root_dir_cluster,
                DirHandle::Sub(ref e) => e.cluster_num(),
            };
            let mut table = self.table(storage);
            let c = table.allocate_clusters(1, &self.geometry())?;
            self.zero_cluster(table.storage(), c)?;
            self.seed_dot_entries(table.storage(), c, parent_cluster, now.date, now.time)?;
            c
        } else {
            0
        };

        let short_name = self.short_name_for(storage, region, final_component);

        let mut entry = DirEntry::new(short_name, attributes, first_cluster);
        entry.creation_date = now.date;
        entry.creation_time = now.time;
        entry.creation_time_tenths = now.time_tenths;
        entry.write_date = now.date;
        entry.write_time = now.time;
        entry.last_access_date = now.date;

        let needs_lfn = !fits_short_name(final_component);
        if needs_lfn {
            let mut fragments = [LfnEntry { ordinal: 0, name1: [0; 5], checksum: 0, name2: [0; 6], name3: [0; 2] };
                MAX_LFN_ENTRIES];
            let count = encode_long_name(final_component, entry.lfn_checksum(), &mut fragments);
            self.write_lfn_and_entry(storage, region, &fragments[..count], &entry)?;
        } else {
            self.write_entry_into_first_free_slot(storage, region, &entry)?;
        }

        self.find_component(storage, region, final_component)?.ok_or(FsError::FileNotFound)
    }

    fn zero_cluster<S: Storage<SECTOR_SIZE = U512>>(&self, storage: &mut S, cluster: Cluster) -> Result<(), FsError> {
        let zero: GenericArray<u8, U512> = GenericArray::default();
        let start = self.cluster_to_sector(cluster);
        for s in 0..self.sectors_per_cluster as u32 {
            storage.write_sector(start + s, &zero).map_err(FsError::from)?;
        }
        Ok(())
    }

    fn seed_dot_entries<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        cluster: Cluster,
        parent_cluster: Cluster,
        date: u16,
        time: u16,
    ) -> Result<(), FsError> {
        let mut dot = DirEntry::new(*b".          ", AttributeSet::from_raw(Attribute::Directory as u8), cluster);
        dot.creation_date = date;
        dot.creation_time = time;
        dot.write_date = date;
        dot.write_time = time;

        let mut dotdot =
            DirEntry::new(*b"..         ", AttributeSet::from_raw(Attribute::Directory as u8), parent_cluster);
        dotdot.creation_date = date;
        dotdot.creation_time = time;
        dotdot.write_date = date;
        dotdot.write_time = time;

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        let sector = self.cluster_to_sector(cluster);
        storage.read_sector(sector, &mut buf).map_err(FsError::from)?;

        let mut dot_bytes = [0u8; ENTRY_SIZE];
        dot.to_bytes(&mut dot_bytes);
        buf[0..ENTRY_SIZE].copy_from_slice(&dot_bytes);

        let mut dotdot_bytes = [0u8; ENTRY_SIZE];
        dotdot.to_bytes(&mut dotdot_bytes);
        buf[ENTRY_SIZE..ENTRY_SIZE * 2].copy_from_slice(&dotdot_bytes);

        storage.write_sector(sector, &buf).map_err(FsError::from)
    }

    /// Scans `region` for the first run of at least `needed` consecutive
    /// slots that aren't `EntryState::Exists`, returning its flat slot
    /// index (`sector = sectors[idx / entries_per_sector]`, `offset = (idx
    /// % entries_per_sector) * ENTRY_SIZE`). Hitting an `End` entry means
    /// every slot from there to the end of the region is free, so a run
    /// that reaches one doesn't need its remaining sectors read.
    fn find_free_run<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        needed: usize,
    ) -> Result<Option<usize>, FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(region, &mut table, &mut sectors)?;
        let entries_per_sector = table.storage().get_sector_size() as usize / ENTRY_SIZE;

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        let mut run_start: Option<usize> = None;

        for (sector_idx, &sector) in sectors[..n].iter().enumerate() {
            table.storage().read_sector(sector, &mut buf).map_err(FsError::from)?;
            for (slot, chunk) in buf.chunks_exact(ENTRY_SIZE).enumerate() {
                let raw: [u8; ENTRY_SIZE] = chunk.try_into().unwrap();
                let global = sector_idx * entries_per_sector + slot;
                let state = DirEntry::from_bytes(&raw).state();

                match state {
                    EntryState::Exists => run_start = None,
                    EntryState::Deleted => {
                        if run_start.is_none() {
                            run_start = Some(global);
                        }
                    }
                    EntryState::End => {
                        let start = run_start.unwrap_or(global);
                        let total_slots = n * entries_per_sector;
                        return Ok(if total_slots - start >= needed { Some(start) } else { None });
                    }
                }

                if let Some(start) = run_start {
                    if global - start + 1 >= needed {
                        return Ok(Some(start));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Writes `records` into the `needed` consecutive slots starting at flat
    /// slot index `run_start`, found beforehand by `find_free_run`.
    fn write_run<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        run_start: usize,
        records: &[DirEntry],
    ) -> Result<(), FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(region, &mut table, &mut sectors)?;
        let entries_per_sector = table.storage().get_sector_size() as usize / ENTRY_SIZE;

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        let mut current_sector_idx = usize::MAX;

        for (i, record) in records.iter().enumerate() {
            let global = run_start + i;
            let sector_idx = global / entries_per_sector;
            let slot = global % entries_per_sector;
            if sector_idx >= n {
                return Err(FsError::DirectoryLimitExceeded);
            }

            if sector_idx != current_sector_idx {
                if current_sector_idx != usize::MAX {
                    table.storage().write_sector(sectors[current_sector_idx], &buf).map_err(FsError::from)?;
                }
                table.storage().read_sector(sectors[sector_idx], &mut buf).map_err(FsError::from)?;
                current_sector_idx = sector_idx;
            }

            let mut bytes = [0u8; ENTRY_SIZE];
            record.to_bytes(&mut bytes);
            buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE].copy_from_slice(&bytes);
        }

        if current_sector_idx != usize::MAX {
            table.storage().write_sector(sectors[current_sector_idx], &buf).map_err(FsError::from)?;
        }
        Ok(())
    }

    /// Writes an LFN fragment chain immediately followed by its SFN into one
    /// contiguous run of free slots, growing the parent directory's cluster
    /// chain (bounded, `FixedRoot` excepted) when no run is long enough yet.
    fn write_lfn_and_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        region: DirRegion,
        fragments: &[LfnEntry],
        entry: &DirEntry,
    ) -> Result<(), FsError> {
        let needed = fragments.len() + 1;
        // 8 extensions is comfortably more than the worst case (21 slots for
        // the longest LFN chain) even at the smallest cluster size this
        // crate supports (1 sector == 16 slots per extension).
        const MAX_GROWTH_ATTEMPTS: u32 = 8;

        let mut attempts = 0;
        loop {
            if let Some(run_start) = self.find_free_run(storage, region, needed)? {
                let mut records = [DirEntry::empty(); MAX_LFN_ENTRIES + 1];
                for (i, fragment) in fragments.iter().enumerate() {
                    let mut raw = [0u8; ENTRY_SIZE];
                    fragment.to_bytes(&mut raw);
                    records[i] = DirEntry::from_bytes(&raw);
                }
                records[fragments.len()] = *entry;
                return self.write_run(storage, region, run_start, &records[..needed]);
            }

            let first_cluster = match region {
                DirRegion::Chain { first_cluster } if first_cluster != 0 => first_cluster,
                _ => return Err(FsError::RootDirectoryLimitExceeded),
            };
            if attempts >= MAX_GROWTH_ATTEMPTS {
                return Err(FsError::DirectoryLimitExceeded);
            }
            attempts += 1;

            let mut table = self.table(storage);
            let last = table.last_cluster(first_cluster)?;
            let new_cluster = table.extend_chain(last, &self.geometry())?;
            drop(table);
            self.zero_cluster(storage, new_cluster)?;
        }
    }

    /// Marks the SFN and any LFN fragments preceding it deleted, and frees
    /// its cluster chain.
    pub fn delete_entry<S: Storage<SECTOR_SIZE = U512>>(&self, storage: &mut S, path: &str) -> Result<(), FsError> {
        let location = self.resolve(storage, path)?;

        if location.entry.cluster_num() != 0 {
            self.table(storage).free_chain(location.entry.cluster_num())?;
        }

        // Mark every LFN fragment in the chain as well as the SFN itself,
        // so a stale fragment doesn't get picked up by a later scan as an
        // orphaned long name.
        for &(sector, offset) in &location.lfn_locations[..location.long_name_lfn_count as usize] {
            self.mark_entry_deleted(storage, sector, offset)?;
        }
        self.mark_entry_deleted(storage, location.sector, location.offset_in_sector)
    }

    fn mark_entry_deleted<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        sector: u32,
        offset_in_sector: u16,
    ) -> Result<(), FsError> {
        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        storage.read_sector(sector, &mut buf).map_err(FsError::from)?;
        buf[offset_in_sector as usize] = dir::ENTRY_DELETED;
        storage.write_sector(sector, &buf).map_err(FsError::from)
    }

    /// Creates a new, empty subdirectory named by the final component of
    /// `path`. The parent must already exist.
    pub fn create_directory<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        path: &str,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<EntryLocation, FsError> {
        self.create_entry(storage, path, AttributeSet::from_raw(Attribute::Directory as u8), rtc_callback)
    }

    /// Looks up `path` without opening it as a file. Works for
    /// subdirectories as well as regular files, unlike `open_file`.
    pub fn get_file_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        path: &str,
    ) -> Result<EntryLocation, FsError> {
        self.resolve(storage, path)
    }

    /// Renames or moves the entry at `from` to `to`. Only the directory
    /// entry is relinked — `from`'s data clusters are never touched, so
    /// this costs the same handful of sector writes regardless of the
    /// file's size.
    pub fn file_rename<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        from: &str,
        to: &str,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<(), FsError> {
        let source = self.resolve(storage, from)?;

        let (parent_path, final_component) = path::split_parent(to)?;
        path::validate_component(final_component)?;

        let parent = if parent_path.is_empty() {
            DirHandle::Root
        } else {
            DirHandle::Sub(self.resolve(storage, parent_path)?.entry)
        };
        let region = self.dir_region(&parent);

        if self.find_component(storage, region, final_component)?.is_some() {
            return Err(FsError::FilenameAlreadyExists);
        }

        let mut entry = source.entry;
        entry.name = self.short_name_for(storage, region, final_component);

        let now = crate::rtc::now(rtc_callback);
        entry.write_date = now.date;
        entry.write_time = now.time;

        let needs_lfn = !fits_short_name(final_component);
        if needs_lfn {
            let mut fragments = [LfnEntry { ordinal: 0, name1: [0; 5], checksum: 0, name2: [0; 6], name3: [0; 2] };
                MAX_LFN_ENTRIES];
            let count = encode_long_name(final_component, entry.lfn_checksum(), &mut fragments);
            self.write_lfn_and_entry(storage, region, &fragments[..count], &entry)?;
        } else {
            self.write_entry_into_first_free_slot(storage, region, &entry)?;
        }

        for &(sector, offset) in &source.lfn_locations[..source.long_name_lfn_count as usize] {
            self.mark_entry_deleted(storage, sector, offset)?;
        }
        self.mark_entry_deleted(storage, source.sector, source.offset_in_sector)
    }

    /// Starts a directory listing, returning the first entry alongside the
    /// state `find_next_entry` resumes from. `dot`/`dot-dot` pseudo-entries
    /// and the volume label are never yielded, matching `resolve`'s own
    /// filtering.
    pub fn find_first_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        dir: DirHandle,
    ) -> Result<(FindState, Option<EntryLocation>), FsError> {
        let mut state = FindState { region: self.dir_region(&dir), next_slot: 0 };
        let first = self.find_next_raw(storage, &mut state)?;
        Ok((state, first))
    }

    /// Continues a listing started by `find_first_entry`.
    pub fn find_next_entry<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        state: &mut FindState,
    ) -> Result<Option<EntryLocation>, FsError> {
        self.find_next_raw(storage, state)
    }

    /// Ends a listing. `FindState` owns nothing beyond a slot index, so
    /// this exists only to close the find/next/close triple out
    /// symmetrically with callers that expect to release one.
    pub fn find_close(&self, _state: FindState) {}

    fn find_next_raw<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        state: &mut FindState,
    ) -> Result<Option<EntryLocation>, FsError> {
        let mut sectors = [0u32; MAX_DIR_SECTORS_PER_SCAN];
        let mut table = self.table(storage);
        let n = self.collect_region_sectors(state.region, &mut table, &mut sectors)?;
        let entries_per_sector = table.storage().get_sector_size() as usize / ENTRY_SIZE;

        let mut lfn_units = [0u16; MAX_LFN_ENTRIES * LFN_CHARS_PER_ENTRY];
        let mut lfn_len = 0usize;
        let mut lfn_fragments = 0u8;
        let mut lfn_checksum = 0u8;
        let mut lfn_positions = [(0u32, 0u16); MAX_LFN_ENTRIES];

        let mut buf: GenericArray<u8, U512> = GenericArray::default();
        let mut current_sector_idx = usize::MAX;

        let mut global = state.next_slot;
        loop {
            let sector_idx = global / entries_per_sector;
            if sector_idx >= n {
                return Ok(None);
            }
            let slot = global % entries_per_sector;
            if sector_idx != current_sector_idx {
                table.storage().read_sector(sectors[sector_idx], &mut buf).map_err(FsError::from)?;
                current_sector_idx = sector_idx;
            }

            let start = slot * ENTRY_SIZE;
            let raw: [u8; ENTRY_SIZE] = buf[start..start + ENTRY_SIZE].try_into().unwrap();

            if dir::AttributeSet::from_raw(raw[11]).is_lfn_fragment() {
                let lfn = LfnEntry::from_bytes(&raw);
                if lfn.ordinal & LFN_LAST_ENTRY_FLAG != 0 {
                    lfn_fragments = lfn.ordinal & !LFN_LAST_ENTRY_FLAG;
                    lfn_checksum = lfn.checksum;
                    lfn_len = 0;
                }
                let ordinal = lfn.ordinal & !LFN_LAST_ENTRY_FLAG;
                if lfn.checksum == lfn_checksum && ordinal != 0 && ordinal as usize <= MAX_LFN_ENTRIES {
                    let (chars, len) = lfn.chars();
                    let start_idx = (ordinal as usize - 1) * LFN_CHARS_PER_ENTRY;
                    lfn_units[start_idx..start_idx + LFN_CHARS_PER_ENTRY].copy_from_slice(&chars);
                    lfn_positions[ordinal as usize - 1] = (sectors[sector_idx], (slot * ENTRY_SIZE) as u16);
                    lfn_len = lfn_len.max(start_idx + len);
                } else {
                    lfn_fragments = 0;
                }
                global += 1;
                continue;
            }

            let entry = DirEntry::from_bytes(&raw);
            match entry.state() {
                EntryState::End => return Ok(None),
                EntryState::Deleted => {
                    lfn_fragments = 0;
                    global += 1;
                    continue;
                }
                EntryState::Exists => {}
            }

            if entry.attributes.is_volume_id() {
                lfn_fragments = 0;
                global += 1;
                continue;
            }

            let matched_lfn_count =
                if lfn_fragments > 0 && entry.lfn_checksum() == lfn_checksum { lfn_fragments } else { 0 };
            let matched_lfn_positions = lfn_positions;

            state.next_slot = global + 1;
            return Ok(Some(EntryLocation {
                entry,
                sector: sectors[sector_idx],
                offset_in_sector: (slot * ENTRY_SIZE) as u16,
                long_name_lfn_count: matched_lfn_count,
                lfn_locations: matched_lfn_positions,
            }));
        }
    }

    /// Renders `location`'s display name into `buf`: the decoded long name
    /// if it has one, the 8.3 short name (`"BASE.EXT"`) otherwise.
    pub fn decode_entry_name<'b, S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        location: &EntryLocation,
        buf: &'b mut [u8],
    ) -> Result<&'b str, FsError> {
        if location.long_name_lfn_count == 0 {
            return Ok(dir::format_short_name(&location.entry.name, buf));
        }

        let mut lfn_units = [0u16; MAX_LFN_ENTRIES * LFN_CHARS_PER_ENTRY];
        let mut lfn_len = 0usize;
        let mut raw: GenericArray<u8, U512> = GenericArray::default();

        for ordinal in 1..=location.long_name_lfn_count {
            let (sector, offset) = location.lfn_locations[ordinal as usize - 1];
            storage.read_sector(sector, &mut raw).map_err(FsError::from)?;
            let bytes: [u8; ENTRY_SIZE] =
                raw[offset as usize..offset as usize + ENTRY_SIZE].try_into().unwrap();
            let lfn = LfnEntry::from_bytes(&bytes);
            let (chars, len) = lfn.chars();
            let start = (ordinal as usize - 1) * LFN_CHARS_PER_ENTRY;
            lfn_units[start..start + LFN_CHARS_PER_ENTRY].copy_from_slice(&chars);
            lfn_len = lfn_len.max(start + len);
        }

        decode_long_name(&lfn_units[..lfn_len], buf).ok_or(FsError::CorruptedFile)
    }

    /// Opens (or creates, with `AccessFlags::CREATE`) the file at `path`.
    pub fn open_file<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        path: &str,
        flags: AccessFlags,
    ) -> Result<File<U512>, FsError> {
        let location = match self.resolve(storage, path) {
            Ok(loc) => loc,
            Err(FsError::FileNotFound) if flags.has(AccessFlags::CREATE) => {
                self.create_entry(storage, path, AttributeSet::default(), None)?
            }
            Err(e) => return Err(e),
        };

        let mut table = self.table(storage);
        File::open(location.entry, location.sector, location.offset_in_sector, flags, &mut table)
    }

    pub fn read_file<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        file: &mut File<U512>,
        buf: &mut [u8],
    ) -> Result<usize, FsError> {
        let geometry = self.geometry();
        let mut table = self.table(storage);
        file.read(buf, &geometry, &mut table)
    }

    pub fn write_file<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        file: &mut File<U512>,
        buf: &[u8],
    ) -> Result<usize, FsError> {
        let geometry = self.geometry();
        let mut table = self.table(storage);
        file.write(buf, &geometry, &mut table)
    }

    pub fn close_file<S: Storage<SECTOR_SIZE = U512>>(
        &self,
        storage: &mut S,
        file: &mut File<U512>,
        rtc_callback: Option<RtcCallback>,
    ) -> Result<(), FsError> {
        let geometry = self.geometry();
        let mut table = self.table(storage);
        file.close(&geometry, &mut table, rtc_callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReadError, WriteError};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct NeverErrors;
    impl From<NeverErrors> for FsError {
        fn from(_: NeverErrors) -> Self {
            FsError::UnknownError
        }
    }

    struct RamDisk {
        sectors: Vec<GenericArray<u8, U512>>,
    }

    impl RamDisk {
        fn new(total_sectors: usize) -> Self {
            Self { sectors: (0..total_sectors).map(|_| GenericArray::default()).collect() }
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
            self.sectors.len() as u32
        }
    }

    #[test]
    fn format_then_mount_round_trips() {
        let mut disk = RamDisk::new(70_000);
        let volume = Volume::format(&mut disk, 0, 70_000, *b"TESTDISK   ", Config::default()).unwrap();
        assert_eq!(volume.variant, FsVariant::Fat16);

        let mounted = Volume::mount(&mut disk, Config::default()).unwrap();
        assert_eq!(mounted.variant, FsVariant::Fat16);
        assert_eq!(mounted.label, *b"TESTDISK   ");
    }

    #[test]
    fn create_open_write_read_close_a_file() {
        let mut disk = RamDisk::new(70_000);
        let volume = Volume::format(&mut disk, 0, 70_000, *b"NO NAME    ", Config::default()).unwrap();

        let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
        let mut file = volume.open_file(&mut disk, "hello.txt", flags).unwrap();

        let written = volume.write_file(&mut disk, &mut file, b"hi there").unwrap();
        assert_eq!(written, 8);
        volume.close_file(&mut disk, &mut file, None).unwrap();

        let mut read_back = volume.open_file(&mut disk, "hello.txt", AccessFlags::READ).unwrap();
        let mut out = [0u8; 8];
        let n = volume.read_file(&mut disk, &mut read_back, &mut out).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&out, b"hi there");
    }

    #[test]
    fn create_directory_makes_a_resolvable_subdirectory() {
        let mut disk = RamDisk::new(70_000);
        let volume = Volume::format(&mut disk, 0, 70_000, *b"NO NAME    ", Config::default()).unwrap();

        let dir = volume.create_directory(&mut disk, "docs", None).unwrap();
        assert!(dir.entry.attributes.is_dir());

        let looked_up = volume.get_file_entry(&mut disk, "docs").unwrap();
        assert!(looked_up.entry.attributes.is_dir());
    }

    #[test]
    fn file_rename_moves_the_entry_without_touching_its_data() {
        let mut disk = RamDisk::new(70_000);
        let volume = Volume::format(&mut disk, 0, 70_000, *b"NO NAME    ", Config::default()).unwrap();

        let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
        let mut file = volume.open_file(&mut disk, "old.txt", flags).unwrap();
        volume.write_file(&mut disk, &mut file, b"payload").unwrap();
        volume.close_file(&mut disk, &mut file, None).unwrap();

        volume.file_rename(&mut disk, "old.txt", "new.txt", None).unwrap();

        assert_eq!(volume.get_file_entry(&mut disk, "old.txt").unwrap_err(), FsError::FileNotFound);

        let mut reopened = volume.open_file(&mut disk, "new.txt", AccessFlags::READ).unwrap();
        let mut out = [0u8; 7];
        volume.read_file(&mut disk, &mut reopened, &mut out).unwrap();
        assert_eq!(&out, b"payload");
    }

    #[test]
    fn find_first_and_next_entry_enumerate_every_file_once() {
        let mut disk = RamDisk::new(70_000);
        let volume = Volume::format(&mut disk, 0, 70_000, *b"NO NAME    ", Config::default()).unwrap();

        for name in ["a.txt", "b.txt", "a name long enough to need an lfn.txt"] {
            let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
            let mut file = volume.open_file(&mut disk, name, flags).unwrap();
            volume.close_file(&mut disk, &mut file, None).unwrap();
        }

        let (mut state, first) = volume.find_first_entry(&mut disk, DirHandle::Root).unwrap();
        let mut seen = Vec::new();
        let mut next = first;
        while let Some(location) = next {
            let mut buf = [0u8; 260];
            let name = volume.decode_entry_name(&mut disk, &location, &mut buf).unwrap().to_string();
            seen.push(name);
            next = volume.find_next_entry(&mut disk, &mut state).unwrap();
        }
        volume.find_close(state);

        seen.sort();
        assert_eq!(seen, ["A.TXT", "B.TXT", "a name long enough to need an lfn.txt"]);
    }
}
