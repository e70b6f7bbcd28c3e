//! A read/write throughput benchmark against an in-memory volume, exercising
//! the same `Volume`/`File` read and write paths a real SD card or disk
//! image would see.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use fatcore::config::Config;
use fatcore::error::{FsError, ReadError, WriteError};
use fatcore::fat::file::AccessFlags;
use fatcore::fat::Volume;
use fatcore::storage::Storage;

use generic_array::GenericArray;
use std::cell::RefCell;
use typenum::consts::U512;

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
    type Error = FsError;

    fn read_sector(&mut self, addr: u32, buf: &mut GenericArray<u8, U512>) -> Result<(), ReadError<Self::Error>> {
        buf.copy_from_slice(&self.sectors[addr as usize]);
        Ok(())
    }

    fn write_sector(&mut self, addr: u32, buf: &GenericArray<u8, U512>) -> Result<(), WriteError<Self::Error>> {
        self.sectors[addr as usize].copy_from_slice(buf);
        Ok(())
    }

    fn get_total_sectors(&self) -> u32 {
        self.sectors.len() as u32
    }
}

const SIZES: &[(&str, usize)] = &[("1k", 1024), ("100k", 100 * 1024), ("1M", 1024 * 1024)];

fn bench_read_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("read speed");

    for &(label, size) in SIZES {
        let disk = RefCell::new(RamDisk::new(200_000));
        let volume =
            Volume::format(&mut disk.borrow_mut(), 0, 200_000, *b"BENCH      ", Config::default()).unwrap();
        let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
        let mut file = volume.open_file(&mut disk.borrow_mut(), "bench.bin", flags).unwrap();
        let payload = vec![0xABu8; size];
        volume.write_file(&mut disk.borrow_mut(), &mut file, &payload).unwrap();
        volume.close_file(&mut disk.borrow_mut(), &mut file, None).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("read", label), &size, |b, &size| {
            b.iter_batched(
                || {
                    let handle = volume.open_file(&mut disk.borrow_mut(), "bench.bin", AccessFlags::READ).unwrap();
                    (handle, vec![0u8; size])
                },
                |(mut handle, mut out)| {
                    volume.read_file(&mut disk.borrow_mut(), &mut handle, &mut out).unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_write_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("write speed");

    for &(label, size) in SIZES {
        let payload = vec![0xCDu8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("write", label), &size, |b, _| {
            b.iter_batched(
                || {
                    let mut disk = RamDisk::new(200_000);
                    let volume = Volume::format(&mut disk, 0, 200_000, *b"BENCH      ", Config::default()).unwrap();
                    let flags = AccessFlags::from_bits(AccessFlags::CREATE.bits() | AccessFlags::WRITE.bits());
                    let file = volume.open_file(&mut disk, "bench.bin", flags).unwrap();
                    (disk, volume, file)
                },
                |(mut disk, volume, mut file)| {
                    volume.write_file(&mut disk, &mut file, &payload).unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_read_speed, bench_write_speed);
criterion_main!(benches);
