//! Split virtual disc (SVOD)
//!
//! A GDFX disc image stored across the part files of a `<root>.data/`
//! directory, with a hash table block interleaved after every 0x198 data
//! sectors and a master hash table at the start of each part file. The root
//! descriptor file carries the container metadata that anchors the hash
//! tree.

mod file;
mod rehash;

pub use file::SvodFile;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::browse::entry::DirectoryEntry;
use super::browse::filesystem::{extract_entry, read_entry_range, DiscFilesystem, Progress};
use super::browse::reader::{SectorReader, SECTOR_SIZE};
use super::browse::tree::read_directory_tree;
use super::error::{DiscError, DiscResult};
use super::gdfx::{DirectoryRecord, GdfxHeader, HEADER_SIZE};
use super::metadata::{ContentMetadata, FileSystemKind, XContentHeader};
use super::multifile::{IndexableMultiFileIo, LocalPartFiles, LogicalAddress, PartFileSource};

/// Logical sectors stored in one part file
pub const SECTORS_PER_PART: u32 = 0x14388;

/// Data sectors covered by one interleaved hash table block
pub const SECTORS_PER_HASH_TABLE: u32 = 0x198;

/// Size of a hash table block
pub const HASH_BLOCK_SIZE: u64 = 0x1000;

/// Map a logical sector to `(offset in part file, part file index)`
///
/// `data_block_offset` comes from the volume descriptor and `offset` is the
/// layout's leading hash area (0x1000, or 0x2000 for the enhanced layout).
pub fn svod_sector_to_address(sector: u32, data_block_offset: u32, offset: u64) -> (u64, usize) {
    let relative = sector.wrapping_sub(data_block_offset.wrapping_mul(2));
    let true_sector = relative % SECTORS_PER_PART;
    let part_index = (relative / SECTORS_PER_PART) as usize;

    let hash_tables = (true_sector / SECTORS_PER_HASH_TABLE) as u64
        + if true_sector % SECTORS_PER_HASH_TABLE == 0 && true_sector != 0 {
            0
        } else {
            1
        };

    let address = true_sector as u64 * SECTOR_SIZE + offset + hash_tables * HASH_BLOCK_SIZE;
    (address, part_index)
}

/// Logical sectors addressable in a split virtual disc
///
/// Every part file but the last holds [`SECTORS_PER_PART`] sectors; the last
/// one holds whatever follows its master table and first level-0 table, less
/// one hash table block per complete group.
pub fn svod_sector_count(part_count: usize, last_part_len: u64, data_block_offset: u32) -> u64 {
    if part_count == 0 {
        return 0;
    }
    let tail = last_part_len.saturating_sub(0x2000);
    let tail_sectors = (tail - HASH_BLOCK_SIZE * (tail / 0xCD000)) / SECTOR_SIZE;
    data_block_offset as u64 * 2 + (part_count as u64 - 1) * SECTORS_PER_PART as u64 + tail_sectors
}

/// Part file directory belonging to a root descriptor
pub fn data_directory(root: &Path) -> DiscResult<PathBuf> {
    let name = root.file_name().ok_or_else(|| {
        DiscError::InvalidArgument(format!("{} is not a root descriptor file", root.display()))
    })?;
    let mut data_name = OsString::from(name);
    data_name.push(".data");
    Ok(root.with_file_name(data_name))
}

/// Sorted part files of the split virtual disc rooted at `root`; empty when
/// the data directory does not exist
pub fn data_file_paths(root: &Path) -> DiscResult<Vec<PathBuf>> {
    let dir = data_directory(root)?;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(LocalPartFiles::from_directory(&dir, false)?.paths().to_vec())
}

/// An opened split virtual disc
pub struct SplitVirtualDisc {
    metadata: Box<dyn ContentMetadata>,
    io: IndexableMultiFileIo,
    base_address: u64,
    offset: u64,
    header: GdfxHeader,
    sector_count: u64,
    root: Option<Vec<DirectoryEntry>>,
}

impl SplitVirtualDisc {
    /// Open read-only from the root descriptor path
    pub fn open(root: &Path) -> DiscResult<Self> {
        Self::open_local(root, false)
    }

    /// Open with write access to the part files and the root descriptor,
    /// as needed for rehashing and in-place edits
    pub fn open_writable(root: &Path) -> DiscResult<Self> {
        Self::open_local(root, true)
    }

    fn open_local(root: &Path, writable: bool) -> DiscResult<Self> {
        log::info!("Opening split virtual disc {}", root.display());
        let metadata = XContentHeader::open(root, writable)?;
        let parts = LocalPartFiles::from_directory(&data_directory(root)?, writable)?;
        Self::from_parts(Box::new(metadata), Box::new(parts))
    }

    /// Open from explicit collaborators, for part files that do not live in a
    /// local directory
    pub fn from_parts(
        metadata: Box<dyn ContentMetadata>,
        parts: Box<dyn PartFileSource>,
    ) -> DiscResult<Self> {
        validate(metadata.as_ref())?;

        let (base_address, offset) = if metadata.svod_descriptor().is_enhanced() {
            (0x2000, 0x2000)
        } else {
            (0x12000, 0x1000)
        };

        let mut io = IndexableMultiFileIo::new(parts)?;
        io.set_position(base_address, Some(0))?;
        let mut raw = [0u8; HEADER_SIZE];
        io.read(&mut raw)?;
        let header = GdfxHeader::parse(&raw)?;

        let last_len = io.file_length(io.file_count().saturating_sub(1))?;
        let sector_count = svod_sector_count(
            io.file_count(),
            last_len,
            metadata.svod_descriptor().data_block_offset,
        );

        log::debug!(
            "GDFX header at 0x{:X}: root sector 0x{:X}, root size {} ({} part files, {} sectors)",
            base_address,
            header.root_sector,
            header.root_size,
            io.file_count(),
            sector_count
        );

        Ok(Self {
            metadata,
            io,
            base_address,
            offset,
            header,
            sector_count,
            root: None,
        })
    }

    pub fn header(&self) -> &GdfxHeader {
        &self.header
    }

    pub fn metadata(&self) -> &dyn ContentMetadata {
        self.metadata.as_ref()
    }

    /// Byte offset of the GDFX header in the first part file
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn part_count(&self) -> usize {
        self.io.file_count()
    }

    /// Logical sectors the part files can hold
    pub fn total_sectors(&self) -> u64 {
        self.sector_count
    }

    /// Physical location of a logical sector
    pub fn sector_to_address(&self, sector: u32) -> LogicalAddress {
        let (offset, file_index) = svod_sector_to_address(
            sector,
            self.metadata.svod_descriptor().data_block_offset,
            self.offset,
        );
        LogicalAddress { file_index, offset }
    }

    fn seek_logical(&mut self, sector: u64, within: u64) -> DiscResult<()> {
        let sector = u32::try_from(sector)
            .map_err(|_| DiscError::out_of_range(format!("Sector {} is not addressable", sector)))?;
        let address = self.sector_to_address(sector);
        self.io
            .set_position(address.offset + within, Some(address.file_index))
    }

    /// Read `buf.len()` bytes starting `offset` bytes past `start_sector`
    ///
    /// Transfers are split at sector boundaries since consecutive sectors are
    /// not always physically adjacent.
    pub(crate) fn read_logical(&mut self, start_sector: u32, offset: u64, buf: &mut [u8]) -> DiscResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let position = offset + done as u64;
            let within = position % SECTOR_SIZE;
            let len = ((SECTOR_SIZE - within) as usize).min(buf.len() - done);

            self.seek_logical(start_sector as u64 + position / SECTOR_SIZE, within)?;
            self.io.read(&mut buf[done..done + len])?;
            done += len;
        }
        Ok(())
    }

    /// Write counterpart of [`Self::read_logical`]
    pub(crate) fn write_logical(&mut self, start_sector: u32, offset: u64, buf: &[u8]) -> DiscResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let position = offset + done as u64;
            let within = position % SECTOR_SIZE;
            let len = ((SECTOR_SIZE - within) as usize).min(buf.len() - done);

            self.seek_logical(start_sector as u64 + position / SECTOR_SIZE, within)?;
            self.io.write(&buf[done..done + len])?;
            done += len;
        }
        self.io.flush()
    }

    /// Byte stream over one file entry
    pub fn open_file(&mut self, entry: &DirectoryEntry) -> DiscResult<SvodFile<'_>> {
        if !entry.is_file() {
            return Err(DiscError::NotAFile(entry.path.clone()));
        }
        Ok(SvodFile::new(self, entry.clone()))
    }

    /// Byte stream over the file at `path`
    pub fn open_file_at(&mut self, path: &str) -> DiscResult<SvodFile<'_>> {
        let entry = self.find_entry(path)?;
        self.open_file(&entry)
    }

    /// Re-encode an entry's directory record in place
    ///
    /// The name may change only if the record keeps its padded length, so the
    /// table layout is preserved. The cached listing is dropped.
    pub fn write_file_entry(&mut self, entry: &DirectoryEntry) -> DiscResult<()> {
        let record = entry.to_record()?;
        let location = entry.record;
        let sector = location.table_sector as u64 + location.table_offset as u64 / SECTOR_SIZE;
        let within = location.table_offset as u64 % SECTOR_SIZE;

        let mut current = vec![0u8; SECTOR_SIZE as usize];
        self.seek_logical(sector, 0)?;
        self.io.read(&mut current)?;
        let existing = DirectoryRecord::read(&current, within as usize)?.ok_or_else(|| {
            DiscError::InvalidArgument(format!("No directory record for {} on disc", entry.path))
        })?;
        if existing.padded_len() != record.padded_len() {
            return Err(DiscError::InvalidArgument(format!(
                "Record for {} would change length from {} to {} bytes",
                entry.path,
                existing.padded_len(),
                record.padded_len()
            )));
        }

        let bytes = record.to_bytes()?;
        self.seek_logical(sector, within)?;
        self.io.write(&bytes)?;
        self.io.flush()?;

        log::debug!(
            "Rewrote directory record of {} at sector 0x{:X} + 0x{:X}",
            entry.path,
            sector,
            within
        );
        self.root = None;
        Ok(())
    }
}

fn validate(metadata: &dyn ContentMetadata) -> DiscResult<()> {
    if metadata.file_system() != FileSystemKind::Svod {
        return Err(DiscError::format(format!(
            "Invalid file system {:?}, expected a split virtual disc",
            metadata.file_system()
        )));
    }

    if !metadata.content_type().is_disc_content() {
        return Err(DiscError::format(format!(
            "Unrecognized content type 0x{:X}",
            metadata.content_type().as_u32()
        )));
    }
    Ok(())
}

impl SectorReader for SplitVirtualDisc {
    fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>> {
        let mut buffer = vec![0u8; SECTOR_SIZE as usize];
        self.seek_logical(lba, 0)?;
        self.io.read(&mut buffer)?;
        Ok(buffer)
    }

    fn sector_count(&self) -> Option<u64> {
        Some(self.sector_count)
    }
}

impl DiscFilesystem for SplitVirtualDisc {
    fn list(&mut self) -> DiscResult<&[DirectoryEntry]> {
        if self.root.is_none() {
            let (sector, size) = (self.header.root_sector, self.header.root_size);
            let tree = read_directory_tree(self, sector, size)?;
            log::info!("Read split virtual disc listing ({} root entries)", tree.len());
            self.root = Some(tree);
        }
        Ok(self.root.as_deref().unwrap_or_default())
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
        entry: &DirectoryEntry,
        out_dir: &Path,
        progress: Option<Progress<'_>>,
    ) -> DiscResult<PathBuf> {
        extract_entry(self, entry, out_dir, progress)
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        let descriptor = self.metadata.svod_descriptor();
        let root_hash: String = descriptor.root_hash.iter().map(|b| format!("{:02X}", b)).collect();
        vec![
            ("Format", "Split virtual disc".to_string()),
            ("Content name", self.metadata.content_name()),
            ("Content type", self.metadata.content_type().display_name().to_string()),
            (
                "Layout",
                if descriptor.is_enhanced() { "Enhanced" } else { "Legacy" }.to_string(),
            ),
            ("Part files", self.io.file_count().to_string()),
            ("Total sectors", self.sector_count.to_string()),
            ("Data blocks", descriptor.data_block_count.to_string()),
            ("Data block offset", descriptor.data_block_offset.to_string()),
            ("Root hash", root_hash),
            ("Root sector", format!("0x{:X}", self.header.root_sector)),
            ("Root size", self.header.root_size.to_string()),
        ]
    }
}
