//! Package image (GOD) sector remapping
//!
//! A package stores a disc image in numbered part files (`Data0000`,
//! `Data0001`, ...). Each part file begins with a master hash table and
//! interleaves a sub hash table block before every 0xCB data blocks:
//!
//! ```text
//! 0x0000  master hash table
//! 0x1000  sub hash table 0
//! 0x2000  data blocks 0 .. 0xCA
//! ...     sub hash table 1, data blocks 0xCB .. 0x195, ...
//! ```

use std::path::{Path, PathBuf};

use super::browse::entry::DirectoryEntry;
use super::browse::filesystem::{read_entry_range, DiscFilesystem, Progress};
use super::browse::reader::{SectorReader, SECTOR_SIZE};
use super::error::{DiscError, DiscResult};
use super::multifile::{IndexableMultiFileIo, LocalPartFiles};

/// Data and hash table block size
pub const BLOCK_SIZE: u64 = 0x1000;

/// Data blocks stored in one part file
pub const DATA_BLOCKS_PER_PART: u64 = 0xA290;

/// Data blocks covered by one sub hash table
pub const DATA_BLOCKS_PER_SHT: u64 = 0xCB;

/// Part files are scanned up to this count
const MAX_PARTS: usize = 100;

/// Physical location of a disc sector in a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GodAddress {
    /// Byte offset within the part file
    pub offset: u64,
    pub part_index: usize,
}

/// Map a disc sector to its location in the package part files
pub fn remap_sector_to_god(sector: u64) -> GodAddress {
    let byte_offset = sector * SECTOR_SIZE;
    let block = byte_offset / BLOCK_SIZE;
    let part_index = (block / DATA_BLOCKS_PER_PART) as usize;
    let block_in_part = block % DATA_BLOCKS_PER_PART;
    let hash_table = block_in_part / DATA_BLOCKS_PER_SHT;

    let offset = BLOCK_SIZE
        + (hash_table + 1) * BLOCK_SIZE
        + block_in_part * BLOCK_SIZE
        + byte_offset % BLOCK_SIZE;

    GodAddress { offset, part_index }
}

/// Map a location in a part file back to the disc sector stored there
///
/// Offsets inside the master table or a sub hash table, or past the last
/// data block of a part file, hold no sector.
pub fn remap_god_to_sector(address: GodAddress) -> DiscResult<u64> {
    let offset = address.offset;
    let mut remaining = offset.checked_sub(BLOCK_SIZE).ok_or_else(|| {
        DiscError::out_of_range(format!("Offset 0x{:X} is inside the master hash table", offset))
    })?;

    let group_span = DATA_BLOCKS_PER_SHT * BLOCK_SIZE;
    let mut hash_table = 0;
    loop {
        if remaining < BLOCK_SIZE {
            return Err(DiscError::out_of_range(format!(
                "Offset 0x{:X} is inside sub hash table {}",
                offset, hash_table
            )));
        }
        remaining -= BLOCK_SIZE;

        if remaining < group_span {
            break;
        }
        remaining -= group_span;
        hash_table += 1;
    }

    let block_in_part = hash_table * DATA_BLOCKS_PER_SHT + remaining / BLOCK_SIZE;
    if block_in_part >= DATA_BLOCKS_PER_PART {
        return Err(DiscError::out_of_range(format!(
            "Offset 0x{:X} is past the last data block of a part file",
            offset
        )));
    }

    let block = address.part_index as u64 * DATA_BLOCKS_PER_PART + block_in_part;
    Ok((block * BLOCK_SIZE + remaining % BLOCK_SIZE) / SECTOR_SIZE)
}

/// Contiguous `Data0000`, `Data0001`, ... files in `dir`
pub fn find_data_files(dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for i in 0..MAX_PARTS {
        let path = dir.join(format!("Data{:04}", i));
        if !path.is_file() {
            break;
        }
        paths.push(path);
    }
    paths
}

/// Package image opened for sector access
pub struct PackageImage {
    directory: PathBuf,
    io: IndexableMultiFileIo,
    total_sectors: u64,
}

impl PackageImage {
    pub fn open(dir: &Path) -> DiscResult<Self> {
        let paths = find_data_files(dir);
        if paths.is_empty() {
            return Err(DiscError::format(format!(
                "No Data0000 part file in {}",
                dir.display()
            )));
        }

        let total_sectors = paths.len() as u64 * DATA_BLOCKS_PER_PART * BLOCK_SIZE / SECTOR_SIZE;
        log::info!(
            "Opened package image {} ({} part files, {} sectors)",
            dir.display(),
            paths.len(),
            total_sectors
        );

        let io = IndexableMultiFileIo::new(Box::new(LocalPartFiles::from_paths(paths, false)))?;
        Ok(Self {
            directory: dir.to_path_buf(),
            io,
            total_sectors,
        })
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn part_count(&self) -> usize {
        self.io.file_count()
    }

    fn unsupported(&self) -> DiscError {
        DiscError::UnsupportedLayout(format!(
            "Directory listing of package images is not implemented ({})",
            self.directory.display()
        ))
    }
}

impl SectorReader for PackageImage {
    fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>> {
        if lba >= self.total_sectors {
            return Err(DiscError::out_of_range(format!(
                "Sector {} is past the end of the package ({} sectors)",
                lba, self.total_sectors
            )));
        }

        let address = remap_sector_to_god(lba);
        log::trace!(
            "Sector 0x{:X} -> part {} offset 0x{:X}",
            lba,
            address.part_index,
            address.offset
        );

        let mut buffer = vec![0u8; SECTOR_SIZE as usize];
        self.io.set_position(address.offset, Some(address.part_index))?;
        self.io.read(&mut buffer)?;
        Ok(buffer)
    }

    fn sector_count(&self) -> Option<u64> {
        Some(self.total_sectors)
    }
}

impl DiscFilesystem for PackageImage {
    fn list(&mut self) -> DiscResult<&[DirectoryEntry]> {
        Err(self.unsupported())
    }

    fn read_file_range(
        &mut self,
        entry: &DirectoryEntry,
        offset: u64,
        length: usize,
    ) -> DiscResult<Vec<u8>> {
        read_entry_range(self, entry, offset, length)
    }

    fn extract_one(
        &mut self,
        _entry: &DirectoryEntry,
        _out_dir: &Path,
        _progress: Option<Progress<'_>>,
    ) -> DiscResult<PathBuf> {
        Err(self.unsupported())
    }

    fn extract_all(&mut self, _out_dir: &Path, _progress: Option<Progress<'_>>) -> DiscResult<u64> {
        Err(self.unsupported())
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Format", "Package image (GOD)".to_string()),
            ("Part files", self.io.file_count().to_string()),
            ("Total sectors", self.total_sectors.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::gdfx::{GdfxHeader, HEADER_OFFSET, HEADER_SIZE};
    use crate::disc::test_support::{sample_disc, write_god};
    use std::fs;

    #[test]
    fn test_remap_known_values() {
        assert_eq!(
            remap_sector_to_god(0),
            GodAddress { offset: 0x2000, part_index: 0 }
        );
        assert_eq!(
            remap_sector_to_god(1),
            GodAddress { offset: 0x2800, part_index: 0 }
        );
        // First block after the first sub hash table group
        assert_eq!(
            remap_sector_to_god(0xCB * 2),
            GodAddress { offset: 0x2000 + 0xCB * 0x1000 + 0x1000, part_index: 0 }
        );
        assert_eq!(
            remap_sector_to_god(DATA_BLOCKS_PER_PART * 2 + 1),
            GodAddress { offset: 0x2800, part_index: 1 }
        );
    }

    #[test]
    fn test_remap_round_trip() {
        let per_part = DATA_BLOCKS_PER_PART * 2;
        let mut samples: Vec<u64> = (0..0x400).collect();
        for boundary in [0xCB * 2, per_part, per_part * 3] {
            samples.extend(boundary - 3..boundary + 3);
        }
        samples.extend((0..per_part * 2).step_by(997));
        samples.push(per_part - 1);

        for sector in samples {
            let address = remap_sector_to_god(sector);
            assert_eq!(remap_god_to_sector(address).unwrap(), sector, "sector {}", sector);
        }
    }

    #[test]
    fn test_inverse_rejects_hash_tables() {
        let hashes = [
            0,
            0xFFF,
            0x1000,
            0x1FFF,
            0x2000 + 0xCB * 0x1000,
            0x2000 + 0xCB * 0x1000 + 0xFFF,
        ];
        for offset in hashes {
            let result = remap_god_to_sector(GodAddress { offset, part_index: 0 });
            assert!(
                matches!(result, Err(DiscError::AddressOutOfRange(_))),
                "offset 0x{:X}",
                offset
            );
        }
    }

    #[test]
    fn test_inverse_rejects_past_last_block() {
        let last = remap_sector_to_god(DATA_BLOCKS_PER_PART * 2 - 1);
        let past = GodAddress {
            offset: last.offset + 0x800,
            part_index: 0,
        };
        assert!(matches!(
            remap_god_to_sector(past),
            Err(DiscError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_open_and_read_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let (disc, contents) = sample_disc();
        write_god(dir.path(), &disc, 0x20000, 2);

        let mut image = PackageImage::open(dir.path()).unwrap();
        assert_eq!(image.part_count(), 2);
        assert_eq!(image.total_sectors(), 2 * 0xA290 * 2);

        let raw = image.read_bytes(HEADER_OFFSET, HEADER_SIZE).unwrap();
        let header = GdfxHeader::parse(&raw).unwrap();
        assert_eq!(header.root_sector, 34);

        let data = image.read_bytes(40 * SECTOR_SIZE, 5000).unwrap();
        assert_eq!(data, contents[0].1);

        assert!(matches!(
            image.read_sector(image.total_sectors()),
            Err(DiscError::AddressOutOfRange(_))
        ));
    }

    #[test]
    fn test_part_scan_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Data0000", "Data0001", "Data0003"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(find_data_files(dir.path()).len(), 2);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            PackageImage::open(empty.path()),
            Err(DiscError::Format(_))
        ));
    }

    #[test]
    fn test_listing_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let (disc, _) = sample_disc();
        write_god(dir.path(), &disc, 0x20000, 1);

        let mut image = PackageImage::open(dir.path()).unwrap();
        assert!(matches!(image.list(), Err(DiscError::UnsupportedLayout(_))));
        assert!(matches!(
            image.extract_all(dir.path(), None),
            Err(DiscError::UnsupportedLayout(_))
        ));
    }
}
