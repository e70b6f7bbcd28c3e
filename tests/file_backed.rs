//! End-to-end exercise of mount/create/write/read/delete/remount against a
//! RAM-backed volume, driving the same `Volume`/`File` paths a real file or
//! SD-card-backed `Storage` would.

use fatcore::config::Config;
use fatcore::error::{FsError, ReadError, WriteError};
use fatcore::fat::file::AccessFlags;
use fatcore::fat::Volume;
use fatcore::storage::Storage;

use generic_array::GenericArray;
use typenum::consts::U512;

const TOTAL_SECTORS: u32 = 70_000;

struct RamDisk {
    sectors: Vec<GenericArray<u8, U512>>,
}

impl RamDisk {
    fn new(total_sectors: u32) -> Self {
        Self { sectors: (0..total_sectors).map(|_| GenericArray::default()).collect() }
    }
}

impl Storage for RamDisk {
    type SECTOR_SIZE = U512;
    type Error = FsError;

    fn read_sector(&mut self, addr: u32, buf: &mut GenericArray<u8, U512>) -> Result<(), ReadError<Self::Error>> {
        let sector = self.sectors.get(addr as usize).ok_or(FsError::OutOfRange)?;
        buf.copy_from_slice(sector);
        Ok(())
    }

    fn write_sector(&mut self, addr: u32, buf: &GenericArray<u8, U512>) -> Result<(), WriteError<Self::Error>> {
        let sector = self.sectors.get_mut(addr as usize).ok_or(FsError::OutOfRange)?;
        sector.copy_from_slice(buf);
        Ok(())
    }

    fn get_total_sectors(&self) -> u32 {
        self.sectors.len() as u32
    }
}

#[test]
fn format_then_mount_recovers_the_label() {
    let mut disk = RamDisk::new(TOTAL_SECTORS);
    Volume::format(&mut disk, 0, TOTAL_SECTORS, *b"INTEGTEST  ", Config::default()).unwrap();

    let volume = Volume::mount(&mut disk, Config::default()).unwrap();
    assert_eq!(volume.label, *b"INTEGTEST  ");
}

#[test]
fn write_then_read_back_round_trips_across_a_remount() {
    let mut disk = RamDisk::new(TOTAL_SECTORS);
    let volume = Volume::format(&mut disk, 0, TOTAL_SECTORS, *b"INTEGTEST  ", Config::default()).unwrap();

    let payload: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
    let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
    let mut file = volume.open_file(&mut disk, "data.bin", flags).unwrap();
    volume.write_file(&mut disk, &mut file, &payload).unwrap();
    volume.close_file(&mut disk, &mut file, None).unwrap();

    // Drop and remount to make sure what landed on disk survives, not just
    // what's cached in the in-memory `File`/`Volume` handles.
    let volume = Volume::mount(&mut disk, Config::default()).unwrap();
    let mut file = volume.open_file(&mut disk, "data.bin", AccessFlags::READ).unwrap();
    let mut readback = vec![0u8; payload.len()];
    let read = volume.read_file(&mut disk, &mut file, &mut readback).unwrap();

    assert_eq!(read, payload.len());
    assert_eq!(readback, payload);
}

#[test]
fn delete_then_reopen_reports_file_not_found() {
    let mut disk = RamDisk::new(TOTAL_SECTORS);
    let volume = Volume::format(&mut disk, 0, TOTAL_SECTORS, *b"INTEGTEST  ", Config::default()).unwrap();

    let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
    let mut file = volume.open_file(&mut disk, "scratch.txt", flags).unwrap();
    volume.write_file(&mut disk, &mut file, b"temporary").unwrap();
    volume.close_file(&mut disk, &mut file, None).unwrap();

    volume.delete_entry(&mut disk, "scratch.txt").unwrap();

    assert_eq!(
        volume.open_file(&mut disk, "scratch.txt", AccessFlags::READ).unwrap_err(),
        FsError::FileNotFound,
    );
}

#[test]
fn a_name_long_enough_to_need_lfn_entries_round_trips() {
    let mut disk = RamDisk::new(TOTAL_SECTORS);
    let volume = Volume::format(&mut disk, 0, TOTAL_SECTORS, *b"INTEGTEST  ", Config::default()).unwrap();

    let name = "this name is much longer than eight dot three.txt";
    let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
    let mut file = volume.open_file(&mut disk, name, flags).unwrap();
    volume.write_file(&mut disk, &mut file, b"lfn").unwrap();
    volume.close_file(&mut disk, &mut file, None).unwrap();

    let volume = Volume::mount(&mut disk, Config::default()).unwrap();
    let mut file = volume.open_file(&mut disk, name, AccessFlags::READ).unwrap();
    let mut readback = [0u8; 3];
    volume.read_file(&mut disk, &mut file, &mut readback).unwrap();
    assert_eq!(&readback, b"lfn");
}
