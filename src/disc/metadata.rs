//! Signed container metadata consumed by the split virtual disc
//!
//! Only the fields the storage layer depends on are modelled. Signing is
//! left to whoever owns the container; [`ContentMetadata::commit`] only
//! rewrites the volume descriptor and the header digest.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use super::error::{DiscError, DiscResult};

/// Header digest (SHA-1 of the header from `CONTENT_TYPE_OFFSET` on)
pub const HEADER_HASH_OFFSET: u64 = 0x32C;
pub const HEADER_SIZE_OFFSET: u64 = 0x340;
pub const CONTENT_TYPE_OFFSET: u64 = 0x344;
pub const TITLE_ID_OFFSET: u64 = 0x360;
pub const VOLUME_DESCRIPTOR_OFFSET: u64 = 0x379;
pub const FILE_SYSTEM_OFFSET: u64 = 0x3A9;

/// Bytes of the header read when opening a container
const FIXED_HEADER_LEN: usize = 0x3AD;

/// Descriptor flag selecting the enhanced GDF layout
pub const ENHANCED_GDF_LAYOUT: u8 = 0x40;

/// Filesystem kind declared by a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemKind {
    Stfs,
    Svod,
    Fatx,
    Other(u32),
}

impl FileSystemKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Stfs,
            1 => Self::Svod,
            2 => Self::Fatx,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Stfs => 0,
            Self::Svod => 1,
            Self::Fatx => 2,
            Self::Other(value) => value,
        }
    }
}

/// Content type declared by a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    GameOnDemand,
    InstalledGame,
    XboxOriginalGame,
    Other(u32),
}

impl ContentType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x7000 => Self::GameOnDemand,
            0x4000 => Self::InstalledGame,
            0x5000 => Self::XboxOriginalGame,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::GameOnDemand => 0x7000,
            Self::InstalledGame => 0x4000,
            Self::XboxOriginalGame => 0x5000,
            Self::Other(value) => value,
        }
    }

    /// Whether a split virtual disc may carry this content
    pub fn is_disc_content(self) -> bool {
        !matches!(self, Self::Other(_))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GameOnDemand => "Game on Demand",
            Self::InstalledGame => "Installed Game",
            Self::XboxOriginalGame => "Xbox Original Game",
            Self::Other(_) => "Unknown",
        }
    }
}

/// Split virtual disc volume descriptor (0x24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SvodVolumeDescriptor {
    pub size: u8,
    pub block_cache_element_count: u8,
    pub worker_thread_processor: u8,
    pub worker_thread_priority: u8,
    pub root_hash: [u8; 20],
    pub flags: u8,
    /// 24-bit little-endian on disk
    pub data_block_count: u32,
    /// 24-bit little-endian on disk
    pub data_block_offset: u32,
    pub reserved: [u8; 5],
}

impl SvodVolumeDescriptor {
    pub const SIZE: usize = 0x24;

    pub fn parse(data: &[u8]) -> DiscResult<Self> {
        if data.len() < Self::SIZE {
            return Err(DiscError::format(format!(
                "Volume descriptor too small: {} bytes",
                data.len()
            )));
        }

        let mut root_hash = [0u8; 20];
        root_hash.copy_from_slice(&data[4..24]);
        let mut reserved = [0u8; 5];
        reserved.copy_from_slice(&data[31..36]);

        Ok(Self {
            size: data[0],
            block_cache_element_count: data[1],
            worker_thread_processor: data[2],
            worker_thread_priority: data[3],
            root_hash,
            flags: data[24],
            data_block_count: read_u24_le(&data[25..28]),
            data_block_offset: read_u24_le(&data[28..31]),
            reserved,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.size;
        out[1] = self.block_cache_element_count;
        out[2] = self.worker_thread_processor;
        out[3] = self.worker_thread_priority;
        out[4..24].copy_from_slice(&self.root_hash);
        out[24] = self.flags;
        out[25..28].copy_from_slice(&self.data_block_count.to_le_bytes()[..3]);
        out[28..31].copy_from_slice(&self.data_block_offset.to_le_bytes()[..3]);
        out[31..36].copy_from_slice(&self.reserved);
        out
    }

    pub fn is_enhanced(&self) -> bool {
        self.flags & ENHANCED_GDF_LAYOUT != 0
    }
}

fn read_u24_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], 0])
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Signed container metadata the split virtual disc is rooted in
pub trait ContentMetadata: Send {
    fn file_system(&self) -> FileSystemKind;

    fn content_type(&self) -> ContentType;

    fn svod_descriptor(&self) -> &SvodVolumeDescriptor;

    /// Name under which the console lists the content
    fn content_name(&self) -> String;

    /// Replace the hash-tree root held in the volume descriptor
    fn set_root_hash(&mut self, hash: [u8; 20]);

    /// Persist the descriptor and refresh the header digest
    fn commit(&mut self) -> DiscResult<()>;
}

/// Container header backed by the root descriptor file
#[derive(Debug, Clone)]
pub struct XContentHeader {
    path: PathBuf,
    writable: bool,
    pub header_hash: [u8; 20],
    pub header_size: u32,
    pub content_type: ContentType,
    pub title_id: u32,
    pub descriptor: SvodVolumeDescriptor,
    pub file_system: FileSystemKind,
}

impl XContentHeader {
    /// Read the header of the root descriptor at `path`
    pub fn open(path: &Path, writable: bool) -> DiscResult<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < FIXED_HEADER_LEN as u64 {
            return Err(DiscError::format(format!(
                "{} is too small for a content header ({} bytes)",
                path.display(),
                len
            )));
        }

        let mut data = vec![0u8; FIXED_HEADER_LEN];
        file.read_exact(&mut data)?;

        let mut header_hash = [0u8; 20];
        let hash_at = HEADER_HASH_OFFSET as usize;
        header_hash.copy_from_slice(&data[hash_at..hash_at + 20]);

        let descriptor_at = VOLUME_DESCRIPTOR_OFFSET as usize;
        let header = Self {
            path: path.to_path_buf(),
            writable,
            header_hash,
            header_size: read_u32_be(&data, HEADER_SIZE_OFFSET as usize),
            content_type: ContentType::from_u32(read_u32_be(&data, CONTENT_TYPE_OFFSET as usize)),
            title_id: read_u32_be(&data, TITLE_ID_OFFSET as usize),
            descriptor: SvodVolumeDescriptor::parse(
                &data[descriptor_at..descriptor_at + SvodVolumeDescriptor::SIZE],
            )?,
            file_system: FileSystemKind::from_u32(read_u32_be(&data, FILE_SYSTEM_OFFSET as usize)),
        };

        log::debug!(
            "Content header of {}: type {:?}, file system {:?}, flags 0x{:02X}",
            path.display(),
            header.content_type,
            header.file_system,
            header.descriptor.flags
        );
        Ok(header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte range covered by the header digest
    fn hashed_len(&self) -> u64 {
        let aligned = (self.header_size as u64 + 0xFFF) & !0xFFF;
        aligned.saturating_sub(CONTENT_TYPE_OFFSET)
    }
}

impl ContentMetadata for XContentHeader {
    fn file_system(&self) -> FileSystemKind {
        self.file_system
    }

    fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn svod_descriptor(&self) -> &SvodVolumeDescriptor {
        &self.descriptor
    }

    /// First 16 bytes of the header digest in hex, then the title ID's top byte
    fn content_name(&self) -> String {
        let mut name: String = self.header_hash[..16]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        name.push_str(&format!("{:02X}", self.title_id >> 24));
        name
    }

    fn set_root_hash(&mut self, hash: [u8; 20]) {
        self.descriptor.root_hash = hash;
    }

    fn commit(&mut self) -> DiscResult<()> {
        if !self.writable {
            return Err(DiscError::InvalidArgument(format!(
                "{} was opened read-only",
                self.path.display()
            )));
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(VOLUME_DESCRIPTOR_OFFSET))?;
        file.write_all(&self.descriptor.to_bytes())?;

        let mut hashed = vec![0u8; self.hashed_len() as usize];
        file.seek(SeekFrom::Start(CONTENT_TYPE_OFFSET))?;
        file.read_exact(&mut hashed)?;
        self.header_hash = Sha1::digest(&hashed).into();

        file.seek(SeekFrom::Start(HEADER_HASH_OFFSET))?;
        file.write_all(&self.header_hash)?;
        file.flush()?;

        log::info!("Updated content header of {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::test_support::root_descriptor;
    use std::fs;

    fn write_root(flags: u8) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root");
        fs::write(&path, root_descriptor(0x7000, 1, flags)).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_reads_fields() {
        let (_dir, path) = write_root(ENHANCED_GDF_LAYOUT);
        let header = XContentHeader::open(&path, false).unwrap();

        assert_eq!(header.content_type(), ContentType::GameOnDemand);
        assert_eq!(header.file_system(), FileSystemKind::Svod);
        assert_eq!(header.header_size, 0x0A00);
        assert!(header.svod_descriptor().is_enhanced());
        assert_eq!(header.svod_descriptor().data_block_count, 0x40);
        assert_eq!(header.svod_descriptor().data_block_offset, 0);
    }

    #[test]
    fn test_descriptor_layout() {
        let descriptor = SvodVolumeDescriptor {
            size: 0x24,
            root_hash: [0xAB; 20],
            flags: 0x40,
            data_block_count: 0x0123_45,
            data_block_offset: 0x0A_0B0C,
            ..Default::default()
        };
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes[24], 0x40);
        assert_eq!(&bytes[25..28], &[0x45, 0x23, 0x01]);
        assert_eq!(&bytes[28..31], &[0x0C, 0x0B, 0x0A]);
        assert_eq!(SvodVolumeDescriptor::parse(&bytes).unwrap(), descriptor);
    }

    #[test]
    fn test_commit_writes_descriptor_and_digest() {
        let (_dir, path) = write_root(0);
        let mut header = XContentHeader::open(&path, true).unwrap();
        header.set_root_hash([0x5A; 20]);
        header.commit().unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(&data[0x37D..0x391], &[0x5A; 20]);

        let expected: [u8; 20] = Sha1::digest(&data[0x344..0x1000]).into();
        assert_eq!(&data[0x32C..0x340], &expected);

        let reopened = XContentHeader::open(&path, false).unwrap();
        assert_eq!(reopened.descriptor.root_hash, [0x5A; 20]);
        assert_eq!(reopened.header_hash, expected);
    }

    #[test]
    fn test_commit_read_only() {
        let (_dir, path) = write_root(0);
        let mut header = XContentHeader::open(&path, false).unwrap();
        assert!(matches!(header.commit(), Err(DiscError::InvalidArgument(_))));
    }

    #[test]
    fn test_truncated_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        fs::write(&path, vec![0u8; 0x100]).unwrap();
        assert!(matches!(
            XContentHeader::open(&path, false),
            Err(DiscError::Format(_))
        ));
    }

    #[test]
    fn test_content_name() {
        let (_dir, path) = write_root(0);
        let mut header = XContentHeader::open(&path, false).unwrap();
        header.header_hash = [0x11; 20];
        header.title_id = 0x4D53_07E6;
        assert_eq!(header.content_name(), format!("{}4D", "11".repeat(16)));
    }
}
