//! Fixture builders shared by the unit tests

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::browse::reader::{SectorReader, SECTOR_SIZE};
use super::error::{DiscError, DiscResult};
use super::gdfx::{Attributes, DirectoryRecord, GdfxHeader, HEADER_OFFSET};
use super::god::remap_sector_to_god;
use super::svod::svod_sector_to_address;

/// Record to place in a fixture directory table
pub struct FixtureEntry {
    pub name: Vec<u8>,
    pub start_sector: u32,
    pub size: u32,
    pub attributes: u8,
}

pub fn file(name: &str, start_sector: u32, size: u32) -> FixtureEntry {
    FixtureEntry {
        name: name.as_bytes().to_vec(),
        start_sector,
        size,
        attributes: Attributes::ARCHIVE,
    }
}

pub fn dir(name: &str, start_sector: u32, size: u32) -> FixtureEntry {
    FixtureEntry {
        name: name.as_bytes().to_vec(),
        start_sector,
        size,
        attributes: Attributes::DIRECTORY,
    }
}

/// Build a one-sector directory table
///
/// Records are laid out in pre-order of a balanced search tree over the
/// upper-cased names, so the root sits at offset 0 and the physical order
/// differs from the sorted order.
pub fn build_table(entries: &[FixtureEntry]) -> Vec<u8> {
    let mut sorted: Vec<&FixtureEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.name.to_ascii_uppercase());

    let mut out = Vec::new();
    emit_subtree(&sorted, &mut out);

    out.extend_from_slice(&[0xFF; 4]);
    assert!(out.len() <= SECTOR_SIZE as usize, "fixture table exceeds one sector");
    out.resize(SECTOR_SIZE as usize, 0xFF);
    out
}

fn emit_subtree(entries: &[&FixtureEntry], out: &mut Vec<u8>) -> u16 {
    if entries.is_empty() {
        return 0;
    }

    let mid = entries.len() / 2;
    let node = entries[mid];
    let pos = out.len();

    let record = DirectoryRecord {
        left_offset: 0,
        right_offset: 0,
        start_sector: node.start_sector,
        size: node.size,
        attributes: Attributes(node.attributes),
        name: node.name.clone(),
    };
    out.extend_from_slice(&record.to_bytes().unwrap());
    while out.len() % 4 != 0 {
        out.push(0xFF);
    }

    let left = emit_subtree(&entries[..mid], out);
    let right = emit_subtree(&entries[mid + 1..], out);
    out[pos..pos + 2].copy_from_slice(&left.to_le_bytes());
    out[pos + 2..pos + 4].copy_from_slice(&right.to_le_bytes());

    (pos / 4) as u16
}

pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 253) as u8)).collect()
}

/// Sparse logical disc, addressed by 2048-byte sectors
#[derive(Default, Clone)]
pub struct MemoryDisc {
    sectors: BTreeMap<u64, Vec<u8>>,
    pub sector_limit: Option<u64>,
}

impl MemoryDisc {
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let absolute = offset + i as u64;
            let sector = self
                .sectors
                .entry(absolute / SECTOR_SIZE)
                .or_insert_with(|| vec![0u8; SECTOR_SIZE as usize]);
            sector[(absolute % SECTOR_SIZE) as usize] = *byte;
        }
    }

    pub fn write_sector(&mut self, sector: u32, data: &[u8]) {
        self.write(sector as u64 * SECTOR_SIZE, data);
    }

    pub fn write_header(&mut self, root_sector: u32, root_size: u32) {
        let header = GdfxHeader {
            root_sector,
            root_size,
            creation_time: 0x01D0_0000_0000_0000,
        };
        self.write(HEADER_OFFSET, &header.to_bytes());
    }

    pub fn sectors(&self) -> impl Iterator<Item = (&u64, &Vec<u8>)> {
        self.sectors.iter()
    }
}

impl SectorReader for MemoryDisc {
    fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>> {
        if let Some(limit) = self.sector_limit {
            if lba >= limit {
                return Err(DiscError::out_of_range(format!("sector {}", lba)));
            }
        }
        Ok(self
            .sectors
            .get(&lba)
            .cloned()
            .unwrap_or_else(|| vec![0u8; SECTOR_SIZE as usize]))
    }

    fn sector_count(&self) -> Option<u64> {
        self.sector_limit
    }
}

/// A small disc with nested directories, an empty file and an empty directory
///
/// ```text
/// default.xex          5000 bytes
/// media/
///   audio/
///     theme.wma         100 bytes
///   intro.wmv          3000 bytes
/// readme.txt              0 bytes
/// Zdir/                 (empty)
/// ```
pub fn sample_disc() -> (MemoryDisc, Vec<(&'static str, Vec<u8>)>) {
    let mut disc = MemoryDisc::default();
    disc.write_header(34, 2048);

    disc.write_sector(
        34,
        &build_table(&[
            file("default.xex", 40, 5000),
            dir("media", 35, 2048),
            file("readme.txt", 0, 0),
            dir("Zdir", 0, 0),
        ]),
    );
    disc.write_sector(
        35,
        &build_table(&[file("intro.wmv", 44, 3000), dir("audio", 36, 2048)]),
    );
    disc.write_sector(36, &build_table(&[file("theme.wma", 47, 100)]));

    let contents = vec![
        ("default.xex", pattern(1, 5000)),
        ("media/intro.wmv", pattern(2, 3000)),
        ("media/audio/theme.wma", pattern(3, 100)),
        ("readme.txt", Vec::new()),
    ];
    disc.write_sector(40, &contents[0].1);
    disc.write_sector(44, &contents[1].1);
    disc.write_sector(47, &contents[2].1);

    (disc, contents)
}

pub fn write_at(path: &Path, offset: u64, data: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(data).unwrap();
}

fn create_sized(path: &Path, len: u64) {
    let file = fs::File::create(path).unwrap();
    file.set_len(len).unwrap();
}

/// Write `disc` as a monolithic image whose origin sits at `base` bytes
pub fn write_xiso(path: &Path, disc: &MemoryDisc, base: u64, total_len: u64) {
    create_sized(path, total_len);
    for (sector, data) in disc.sectors() {
        write_at(path, base + sector * SECTOR_SIZE, data);
    }
}

/// Byte offsets of the XContent header fields used by the fixtures
pub const HEADER_SIZE_FIELD: usize = 0x340;
pub const CONTENT_TYPE_FIELD: usize = 0x344;
pub const DESCRIPTOR_FIELD: usize = 0x379;
pub const FILE_SYSTEM_FIELD: usize = 0x3A9;

/// Root descriptor for a non-enhanced game-on-demand split virtual disc
pub fn root_descriptor(content_type: u32, file_system: u32, flags: u8) -> Vec<u8> {
    let mut data = vec![0u8; 0x1000];
    data[..4].copy_from_slice(b"LIVE");
    data[HEADER_SIZE_FIELD..HEADER_SIZE_FIELD + 4].copy_from_slice(&0x0A00u32.to_be_bytes());
    data[CONTENT_TYPE_FIELD..CONTENT_TYPE_FIELD + 4].copy_from_slice(&content_type.to_be_bytes());
    data[DESCRIPTOR_FIELD] = 0x24;
    data[DESCRIPTOR_FIELD + 1] = 0x08;
    data[DESCRIPTOR_FIELD + 0x18] = flags;
    // data block count (24-bit little-endian)
    data[DESCRIPTOR_FIELD + 0x19..DESCRIPTOR_FIELD + 0x1C].copy_from_slice(&[0x40, 0, 0]);
    data[FILE_SYSTEM_FIELD..FILE_SYSTEM_FIELD + 4].copy_from_slice(&file_system.to_be_bytes());
    data
}

/// Split virtual disc part file lengths used by the fixtures
pub const SVOD_PART_LENGTHS: [u64; 2] = [0x22000, 0x5000];

/// Part file length holding exactly one part's worth of sectors
pub const SVOD_FULL_PART_LENGTH: u64 = 0xA29_0000;

/// Write `disc` as a split virtual disc; returns the root descriptor path
pub fn write_svod(dir: &Path, disc: &MemoryDisc) -> PathBuf {
    write_svod_parts(dir, disc, &SVOD_PART_LENGTHS)
}

/// Write `disc` as a split virtual disc with the given (sparse) part lengths
pub fn write_svod_parts(dir: &Path, disc: &MemoryDisc, part_lengths: &[u64]) -> PathBuf {
    let root = dir.join("4D5307E6");
    fs::write(&root, root_descriptor(0x7000, 1, 0)).unwrap();

    let data_dir = dir.join("4D5307E6.data");
    fs::create_dir(&data_dir).unwrap();
    for (i, len) in part_lengths.iter().enumerate() {
        create_sized(&data_dir.join(format!("Data{:04}", i)), *len);
    }

    for (sector, data) in disc.sectors() {
        let (offset, index) = svod_sector_to_address(*sector as u32, 0, 0x1000);
        write_at(&data_dir.join(format!("Data{:04}", index)), offset, data);
    }

    root
}

/// Write `disc` as a package image directory with `parts` part files
pub fn write_god(dir: &Path, disc: &MemoryDisc, part_len: u64, parts: usize) {
    for i in 0..parts {
        create_sized(&dir.join(format!("Data{:04}", i)), part_len);
    }

    for (sector, data) in disc.sectors() {
        let remap = remap_sector_to_god(*sector);
        write_at(
            &dir.join(format!("Data{:04}", remap.part_index)),
            remap.offset,
            data,
        );
    }
}
