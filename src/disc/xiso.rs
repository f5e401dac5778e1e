//! Monolithic disc images (XISO / GDF)
//!
//! Depending on the disc generation, the GDFX volume sits at a different
//! byte offset in the image file. Opening an image tries each known offset
//! for the volume header magic; the first match becomes the logical origin
//! for every sector address.

use std::path::{Path, PathBuf};

use super::browse::entry::DirectoryEntry;
use super::browse::filesystem::{extract_entry, read_entry_range, DiscFilesystem, Progress};
use super::browse::reader::{XisoSectorReader, SECTOR_SIZE};
use super::browse::tree::read_directory_tree;
use super::error::{DiscError, DiscResult};
use super::gdfx::{GdfxHeader, HEADER_OFFSET, HEADER_SIZE, MAGIC};

/// Disc generation, identified by where the volume was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// Plain GDF volume at the start of the file
    Gdf,
    Xgd1,
    Xgd2,
    Xgd3,
}

impl ImageType {
    /// Byte offset of the volume origin for this generation
    pub fn base_offset(self) -> u64 {
        match self {
            Self::Gdf => 0,
            Self::Xgd2 => 0xFDA_0000,
            Self::Xgd3 => 0x208_0000,
            Self::Xgd1 => 0x1830_0000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gdf => "GDF",
            Self::Xgd1 => "XGD1",
            Self::Xgd2 => "XGD2",
            Self::Xgd3 => "XGD3",
        }
    }
}

/// Candidates in detection order
const ORIGIN_ORDER: [ImageType; 4] = [ImageType::Gdf, ImageType::Xgd2, ImageType::Xgd3, ImageType::Xgd1];

/// Metadata of an opened disc image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscInfo {
    pub path: PathBuf,
    pub image_type: ImageType,
    pub sector_size: u64,
    pub root_sector: u32,
    pub root_size: u32,
    /// Total length of the image file in bytes
    pub image_len: u64,
    /// Byte offset of the volume origin (the magic sits 0x10000 past it)
    pub image_offset: u64,
    /// Windows FILETIME from the volume header
    pub creation_time: u64,
}

impl DiscInfo {
    /// Sectors between the volume origin and the end of the file
    pub fn total_sectors(&self) -> u64 {
        self.image_len.saturating_sub(self.image_offset) / self.sector_size
    }
}

/// An opened disc image
pub struct DiscImage {
    reader: XisoSectorReader,
    info: DiscInfo,
    root: Option<Vec<DirectoryEntry>>,
}

impl DiscImage {
    pub fn open(path: &Path) -> DiscResult<Self> {
        let mut reader = XisoSectorReader::new(path)?;
        let image_len = reader.image_len();

        let (image_type, header) = detect_origin(&mut reader)?;
        reader.set_image_offset(image_type.base_offset());

        let info = DiscInfo {
            path: path.to_path_buf(),
            image_type,
            sector_size: SECTOR_SIZE,
            root_sector: header.root_sector,
            root_size: header.root_size,
            image_len,
            image_offset: image_type.base_offset(),
            creation_time: header.creation_time,
        };

        log::info!(
            "Opened {} image {} (origin 0x{:X}, root sector 0x{:X}, {} bytes)",
            image_type.name(),
            path.display(),
            info.image_offset,
            info.root_sector,
            info.root_size
        );

        Ok(Self {
            reader,
            info,
            root: None,
        })
    }

    pub fn info(&self) -> &DiscInfo {
        &self.info
    }
}

/// Find the first candidate origin holding the volume magic
fn detect_origin(reader: &mut XisoSectorReader) -> DiscResult<(ImageType, GdfxHeader)> {
    let len = reader.image_len();

    for image_type in ORIGIN_ORDER {
        let magic_pos = image_type.base_offset() + HEADER_OFFSET;
        if magic_pos + MAGIC.len() as u64 > len {
            log::warn!(
                "Skipping {} header candidate at 0x{:X}: image is only 0x{:X} bytes",
                image_type.name(),
                magic_pos,
                len
            );
            continue;
        }

        let magic = reader.read_absolute(magic_pos, MAGIC.len())?;
        if magic.as_slice() != MAGIC {
            log::debug!("No volume magic at 0x{:X}", magic_pos);
            continue;
        }

        let raw = reader.read_absolute(magic_pos, HEADER_SIZE).map_err(|_| {
            DiscError::format(format!("Volume header at 0x{:X} is truncated", magic_pos))
        })?;
        return Ok((image_type, GdfxHeader::parse(&raw)?));
    }

    Err(DiscError::format("No Xbox disc image header found"))
}

impl DiscFilesystem for DiscImage {
    fn list(&mut self) -> DiscResult<&[DirectoryEntry]> {
        if self.root.is_none() {
            let tree =
                read_directory_tree(&mut self.reader, self.info.root_sector, self.info.root_size)?;
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
        read_entry_range(&mut self.reader, entry, offset, length)
    }

    fn extract_one(
        &mut self,
        entry: &DirectoryEntry,
        out_dir: &Path,
        progress: Option<Progress<'_>>,
    ) -> DiscResult<PathBuf> {
        extract_entry(&mut self.reader, entry, out_dir, progress)
    }

    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Format", "Disc image".to_string()),
            ("Type", self.info.image_type.name().to_string()),
            ("Image offset", format!("0x{:X}", self.info.image_offset)),
            ("Image size", self.info.image_len.to_string()),
            ("Total sectors", self.info.total_sectors().to_string()),
            ("Root sector", format!("0x{:X}", self.info.root_sector)),
            ("Root size", self.info.root_size.to_string()),
        ]
    }
}
