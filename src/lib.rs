
// Mark the crate as no_std if the feature is enabled (and only)
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

// // Gotta do this since we're a staticlib:
// // (it'd be nicer to be able to use `panic_halt` or its ilk, but alas)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

pub mod mutex;

pub mod config;
pub mod error;
pub mod fat;
pub mod manager;
pub mod rtc;
pub mod sd;
pub mod storage;
pub mod util;

use config::Config;
use error::FsError;
use manager::VolumeManager;
use rtc::RtcCallback;
use storage::Storage;
use typenum::consts::U512;

/// Brings the volume manager up. Registers this build's only
/// filesystem implementation (FAT12/16/32); an application typically calls
/// this once at startup on the `VolumeManager` it owns for the rest of its
/// lifetime.
pub fn fs_init(registry: &mut VolumeManager) {
    registry.register_filesystem();
}

/// Registers the wall-clock callback directory/file timestamps are stamped
/// with.
pub fn fs_register_rtc(registry: &mut VolumeManager, callback: RtcCallback) {
    registry.register_rtc(callback);
}

pub fn register_storage_device(registry: &mut VolumeManager, device_id: u16, label: [u8; 11]) -> Result<(), FsError> {
    registry.register_storage_device(device_id, label)
}

pub fn register_volume_mounted_callback(registry: &mut VolumeManager, cb: fn(u16, [u8; 11])) {
    registry.register_volume_mounted_callback(cb);
}

pub fn register_volume_dismounted_callback(registry: &mut VolumeManager, cb: fn(u16)) {
    registry.register_volume_dismounted_callback(cb);
}

pub fn register_media_changed_callback(registry: &mut VolumeManager, cb: fn(u16, bool)) {
    registry.register_media_changed_callback(cb);
}

pub fn mount_volume_by_label<S: Storage<SECTOR_SIZE = U512>>(
    registry: &mut VolumeManager,
    label: [u8; 11],
    storage: &mut S,
    config: Config,
) -> Result<(), FsError> {
    registry.mount_volume_by_label(label, storage, config)
}

/// Drives whatever tick-driven I/O `storage` has in flight (debounced
/// media-presence checks, queued async requests). An application calls
/// this regularly from its own idle loop; synchronous-only `Storage` impls
/// have nothing to do here and the default no-op costs nothing.
pub fn idle_tick<S: Storage<SECTOR_SIZE = U512>>(storage: &mut S) {
    storage.idle_tick();
}

pub fn dismount_volume<S: Storage<SECTOR_SIZE = U512>>(
    registry: &mut VolumeManager,
    label: [u8; 11],
    storage: &mut S,
) -> Result<(), FsError> {
    registry.dismount_volume(label, storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_round_trips_through_the_registry() {
        fn fixed_clock() -> Option<i64> {
            Some(1_000_000)
        }
        let mut registry = VolumeManager::new();
        fs_register_rtc(&mut registry, fixed_clock);
        assert_eq!(registry.rtc_callback().unwrap()(), Some(1_000_000));
    }
}
