//! GDFX volume header and directory records
//!
//! Disc images and split virtual discs share this on-disk format. A
//! directory is a table of variable-length records forming a binary search
//! tree: each record points at its left and right siblings by offset (in
//! 4-byte units) from the start of the same table.
//!
//! Record layout, little-endian:
//!
//! | Offset | Size | Field                        |
//! |--------|------|------------------------------|
//! | 0x00   | 2    | left child offset            |
//! | 0x02   | 2    | right child offset           |
//! | 0x04   | 4    | start sector                 |
//! | 0x08   | 4    | size in bytes                |
//! | 0x0C   | 1    | attributes                   |
//! | 0x0D   | 1    | name length                  |
//! | 0x0E   | n    | name                         |
//!
//! Records start on 4-byte boundaries. A table ends where `0xFFFFFFFF` is
//! found at the next record position.

use std::io::Write;

use super::error::{DiscError, DiscResult};

/// Magic string at the start of the volume header
pub const MAGIC: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Byte offset of the volume header from the image origin
pub const HEADER_OFFSET: u64 = 0x10000;

/// Size of the volume header fields this crate reads
pub const HEADER_SIZE: usize = 36;

/// Fixed part of a directory record
pub const RECORD_HEADER_SIZE: usize = 14;

/// Marker found where the next record would start at the end of a table
pub const END_OF_TABLE: u32 = 0xFFFF_FFFF;

/// Left child value used by padding bytes
pub const PADDING_OFFSET: u16 = 0xFFFF;

/// Sector size of the directory tables
pub const SECTOR_SIZE: u64 = 2048;

/// GDFX volume header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GdfxHeader {
    pub root_sector: u32,
    pub root_size: u32,
    /// Windows FILETIME of volume creation
    pub creation_time: u64,
}

impl GdfxHeader {
    /// Parse the header from the bytes starting at the magic string
    pub fn parse(data: &[u8]) -> DiscResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(DiscError::format(format!(
                "GDFX header too small: {} bytes",
                data.len()
            )));
        }

        if &data[..20] != MAGIC {
            return Err(DiscError::format("Invalid GDFX magic"));
        }

        Ok(Self {
            root_sector: read_u32_le(data, 20),
            root_size: read_u32_le(data, 24),
            creation_time: u64::from_le_bytes([
                data[28], data[29], data[30], data[31], data[32], data[33], data[34], data[35],
            ]),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..20].copy_from_slice(MAGIC);
        out[20..24].copy_from_slice(&self.root_sector.to_le_bytes());
        out[24..28].copy_from_slice(&self.root_size.to_le_bytes());
        out[28..36].copy_from_slice(&self.creation_time.to_le_bytes());
        out
    }
}

/// Directory record attribute bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes(pub u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const DEVICE: u8 = 0x40;
    pub const NORMAL: u8 = 0x80;

    pub fn contains(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn is_directory(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }
}

/// One on-disk directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub left_offset: u16,
    pub right_offset: u16,
    pub start_sector: u32,
    pub size: u32,
    pub attributes: Attributes,
    /// Name bytes as stored; not necessarily UTF-8
    pub name: Vec<u8>,
}

impl DirectoryRecord {
    /// Read the record at byte `pos` of a directory table
    ///
    /// Returns `Ok(None)` at the end-of-table marker. A record whose name
    /// would run past the end of its sector or of the table is rejected.
    pub fn read(table: &[u8], pos: usize) -> DiscResult<Option<Self>> {
        if pos + 4 > table.len() {
            return Err(DiscError::format(format!(
                "Directory record at 0x{:X} starts past the end of its table (0x{:X} bytes)",
                pos,
                table.len()
            )));
        }

        if read_u32_le(table, pos) == END_OF_TABLE {
            return Ok(None);
        }

        let sector_end = (pos / SECTOR_SIZE as usize + 1) * SECTOR_SIZE as usize;
        let limit = sector_end.min(table.len());

        if pos + RECORD_HEADER_SIZE > limit {
            return Err(DiscError::format(format!(
                "Directory record at 0x{:X} is truncated",
                pos
            )));
        }

        let name_len = table[pos + 13] as usize;
        let name_start = pos + RECORD_HEADER_SIZE;
        if name_start + name_len > limit {
            return Err(DiscError::format(format!(
                "Directory record at 0x{:X} has a name of {} bytes running past its sector",
                pos, name_len
            )));
        }

        Ok(Some(Self {
            left_offset: read_u16_le(table, pos),
            right_offset: read_u16_le(table, pos + 2),
            start_sector: read_u32_le(table, pos + 4),
            size: read_u32_le(table, pos + 8),
            attributes: Attributes(table[pos + 12]),
            name: table[name_start..name_start + name_len].to_vec(),
        }))
    }

    /// Write the 14-byte header and the name; no alignment padding is added
    pub fn write<W: Write>(&self, writer: &mut W) -> DiscResult<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> DiscResult<Vec<u8>> {
        let name = self.name.as_slice();
        if name.len() > u8::MAX as usize {
            return Err(DiscError::InvalidArgument(format!(
                "Entry name is {} bytes, the limit is 255",
                name.len()
            )));
        }

        let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + name.len());
        out.extend_from_slice(&self.left_offset.to_le_bytes());
        out.extend_from_slice(&self.right_offset.to_le_bytes());
        out.extend_from_slice(&self.start_sector.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.push(self.attributes.0);
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        Ok(out)
    }

    /// Name for display, with invalid UTF-8 replaced
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Bytes from this record's start to the next record's start
    pub fn padded_len(&self) -> usize {
        (self.name.len() + 0x11) & !3
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }
}

pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
