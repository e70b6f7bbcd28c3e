//! Volume manager glue: a thin, fixed-capacity registry that
//! lets an application address a volume by label instead of carrying a
//! `Volume` handle around itself. No I/O lives here — every mount/dismount
//! still takes `&mut S` from the caller the same way `Volume::mount` does;
//! the registry only remembers which device id claims which label and
//! which slot a mounted `Volume` landed in.

use crate::config::Config;
use crate::error::FsError;
use crate::fat::Volume;
use crate::rtc::RtcCallback;
use crate::storage::Storage;

use typenum::consts::U512;

const MAX_DEVICES: usize = 4;
const MAX_VOLUMES: usize = 4;

#[derive(Debug, Clone, Copy)]
struct DeviceEntry {
    device_id: u16,
    label: [u8; 11],
}

/// Tracks which labels have been claimed by a storage device and which of
/// them are currently mounted. An
/// application owns one of these (typically just one, for its lifetime)
/// and passes `&mut` it to the top-level `fs_*` functions — kept as a
/// plain value here rather than behind a crate-owned `static`, since the
/// `Mutex` backends this crate selects between aren't uniformly usable in
/// a `static` initializer (the externally-supplied one calls into FFI).
pub struct VolumeManager {
    filesystem_registered: bool,
    devices: [Option<DeviceEntry>; MAX_DEVICES],
    volumes: [Option<(u16, Volume)>; MAX_VOLUMES],
    rtc_callback: Option<RtcCallback>,
    mounted_cb: Option<fn(u16, [u8; 11])>,
    dismounted_cb: Option<fn(u16)>,
    media_changed_cb: Option<fn(u16, bool)>,
}

impl VolumeManager {
    pub const fn new() -> Self {
        Self {
            filesystem_registered: false,
            devices: [None; MAX_DEVICES],
            volumes: [None; MAX_VOLUMES],
            rtc_callback: None,
            mounted_cb: None,
            dismounted_cb: None,
            media_changed_cb: None,
        }
    }

    pub fn register_rtc(&mut self, callback: RtcCallback) {
        self.rtc_callback = Some(callback);
    }

    pub fn rtc_callback(&self) -> Option<RtcCallback> {
        self.rtc_callback
    }

    /// Declares that this build's filesystem implementation (FAT12/16/32,
    /// the only one this crate carries) is available. Idempotent; a second
    /// call is a no-op rather than an error, since re-initializing doesn't
    /// change anything about the single `fs_vtable` a FAT-only build has.
    pub fn register_filesystem(&mut self) {
        self.filesystem_registered = true;
    }

    /// Associates `device_id` with `label` for later lookup by
    /// `mount_volume_by_label`. Does not touch the device.
    pub fn register_storage_device(&mut self, device_id: u16, label: [u8; 11]) -> Result<(), FsError> {
        let slot = self
            .devices
            .iter_mut()
            .find(|d| d.is_none())
            .ok_or(FsError::DirectoryLimitExceeded)?;
        *slot = Some(DeviceEntry { device_id, label });
        Ok(())
    }

    pub fn register_volume_mounted_callback(&mut self, cb: fn(u16, [u8; 11])) {
        self.mounted_cb = Some(cb);
    }

    pub fn register_volume_dismounted_callback(&mut self, cb: fn(u16)) {
        self.dismounted_cb = Some(cb);
    }

    pub fn register_media_changed_callback(&mut self, cb: fn(u16, bool)) {
        self.media_changed_cb = Some(cb);
    }

    /// Invoked by the driver's `idle_tick()` plumbing when a device's
    /// presence changes; relays to whatever the application registered.
    pub fn notify_media_changed(&mut self, device_id: u16, present: bool) {
        if let Some(cb) = self.media_changed_cb {
            cb(device_id, present);
        }
    }

    /// Looks up the device registered for `label`, mounts it, and files the
    /// result under a free slot.
    pub fn mount_volume_by_label<S: Storage<SECTOR_SIZE = U512>>(
        &mut self,
        label: [u8; 11],
        storage: &mut S,
        config: Config,
    ) -> Result<(), FsError> {
        if !self.filesystem_registered {
            return Err(FsError::InvalidFatVolume);
        }
        let device = self
            .devices
            .iter()
            .flatten()
            .find(|d| d.label == label)
            .ok_or(FsError::DirectoryDoesNotExist)?;

        let volume = Volume::mount(storage, config)?;
        if volume.label != label {
            return Err(FsError::InvalidFatVolume);
        }

        let slot = self
            .volumes
            .iter_mut()
            .find(|v| v.is_none())
            .ok_or(FsError::DirectoryLimitExceeded)?;
        let device_id = device.device_id;
        *slot = Some((device_id, volume));

        if let Some(cb) = self.mounted_cb {
            cb(device_id, label);
        }
        Ok(())
    }

    pub fn dismount_volume<S: Storage<SECTOR_SIZE = U512>>(
        &mut self,
        label: [u8; 11],
        storage: &mut S,
    ) -> Result<(), FsError> {
        let slot = self
            .volumes
            .iter_mut()
            .find(|v| matches!(v, Some((_, vol)) if vol.label == label))
            .ok_or(FsError::DirectoryDoesNotExist)?;
        let (device_id, volume) = slot.take().unwrap();
        volume.dismount(storage)?;
        if let Some(cb) = self.dismounted_cb {
            cb(device_id);
        }
        Ok(())
    }

    pub fn volume(&self, label: [u8; 11]) -> Option<&Volume> {
        self.volumes.iter().flatten().find(|(_, v)| v.label == label).map(|(_, v)| v)
    }

    /// Drives `storage`'s tick-driven I/O: debounced media-presence checks
    /// and any queued async requests. `storage` fires whatever
    /// `register_media_changed_callback` it was given directly; this just
    /// gives that polling a regular place to run from.
    pub fn idle_tick<S: Storage<SECTOR_SIZE = U512>>(&mut self, storage: &mut S) {
        storage.idle_tick();
    }
}

impl Default for VolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReadError, WriteError};
    use generic_array::GenericArray;

    struct RamDisk {
        sectors: std::vec::Vec<GenericArray<u8, U512>>,
    }

    impl RamDisk {
        fn new(count: usize) -> Self {
            Self { sectors: std::vec![GenericArray::default(); count] }
        }
    }

    impl Storage for RamDisk {
        type SECTOR_SIZE = U512;
        type Error = FsError;

        fn read_sector(&mut self, addr: u32, buf: &mut GenericArray<u8, U512>) -> Result<(), ReadError<FsError>> {
            let sector = self.sectors.get(addr as usize).ok_or(FsError::OutOfRange)?;
            buf.copy_from_slice(sector);
            Ok(())
        }

        fn write_sector(&mut self, addr: u32, buf: &GenericArray<u8, U512>) -> Result<(), WriteError<FsError>> {
            let sector = self.sectors.get_mut(addr as usize).ok_or(FsError::OutOfRange)?;
            sector.copy_from_slice(buf);
            Ok(())
        }

        fn get_total_sectors(&self) -> u32 {
            self.sectors.len() as u32
        }
    }

    #[test]
    fn mount_by_label_requires_registered_device() {
        let mut mgr = VolumeManager::new();
        mgr.register_filesystem();
        let mut disk = RamDisk::new(70_000);
        crate::fat::Volume::format(&mut disk, 0, 70_000, *b"NOLABEL    ", Config::default()).unwrap();

        assert_eq!(
            mgr.mount_volume_by_label(*b"NOLABEL    ", &mut disk, Config::default()),
            Err(FsError::DirectoryDoesNotExist)
        );

        mgr.register_storage_device(7, *b"NOLABEL    ").unwrap();
        mgr.mount_volume_by_label(*b"NOLABEL    ", &mut disk, Config::default()).unwrap();
        assert!(mgr.volume(*b"NOLABEL    ").is_some());
    }

    #[test]
    fn dismount_clears_the_slot() {
        let mut mgr = VolumeManager::new();
        mgr.register_filesystem();
        let mut disk = RamDisk::new(70_000);
        crate::fat::Volume::format(&mut disk, 0, 70_000, *b"NOLABEL    ", Config::default()).unwrap();
        mgr.register_storage_device(1, *b"NOLABEL    ").unwrap();
        mgr.mount_volume_by_label(*b"NOLABEL    ", &mut disk, Config::default()).unwrap();

        mgr.dismount_volume(*b"NOLABEL    ", &mut disk).unwrap();
        assert!(mgr.volume(*b"NOLABEL    ").is_none());
    }
}
