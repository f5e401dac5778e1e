//! Sector reader trait and the plain disc image implementation

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::disc::error::{DiscError, DiscResult};

/// Logical sector size of every representation (2048 bytes)
pub const SECTOR_SIZE: u64 = 2048;

/// Trait for reading logical disc sectors from different on-disk layouts
pub trait SectorReader: Send {
    /// Read a single sector at the given LBA (Logical Block Address)
    fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>>;

    /// Read multiple contiguous sectors
    fn read_sectors(&mut self, start_lba: u64, count: u64) -> DiscResult<Vec<u8>> {
        let mut result = Vec::with_capacity((count * SECTOR_SIZE) as usize);
        for i in 0..count {
            let sector = self.read_sector(start_lba + i)?;
            result.extend_from_slice(&sector);
        }
        Ok(result)
    }

    /// Read raw bytes at a logical byte offset
    fn read_bytes(&mut self, offset: u64, length: usize) -> DiscResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }

        // Convert byte offset to sector + offset within sector
        let start_lba = offset / SECTOR_SIZE;
        let offset_in_sector = (offset % SECTOR_SIZE) as usize;

        // Calculate how many sectors we need to read
        let end_offset = offset + length as u64;
        let end_lba = end_offset.div_ceil(SECTOR_SIZE);
        let sectors = self.read_sectors(start_lba, end_lba - start_lba)?;

        Ok(sectors[offset_in_sector..offset_in_sector + length].to_vec())
    }

    /// Get the logical sector size
    fn sector_size(&self) -> u64 {
        SECTOR_SIZE
    }

    /// Number of addressable sectors, when the layout knows it
    fn sector_count(&self) -> Option<u64> {
        None
    }
}

/// Sector reader for a monolithic disc image whose logical origin may sit
/// at a non-zero byte offset
pub struct XisoSectorReader {
    file: BufReader<File>,
    /// Byte offset of the image origin within the file
    image_offset: u64,
    /// Total file length
    image_len: u64,
}

impl XisoSectorReader {
    /// Open an image file with its origin at byte 0
    pub fn new(path: &Path) -> DiscResult<Self> {
        let file = File::open(path)?;
        let image_len = file.metadata()?.len();
        Ok(Self {
            file: BufReader::new(file),
            image_offset: 0,
            image_len,
        })
    }

    /// Move the logical origin to `offset` bytes into the file
    pub fn set_image_offset(&mut self, offset: u64) {
        self.image_offset = offset;
    }

    pub fn image_len(&self) -> u64 {
        self.image_len
    }

    /// Read `length` bytes at an absolute file offset
    pub fn read_absolute(&mut self, position: u64, length: usize) -> DiscResult<Vec<u8>> {
        if position + length as u64 > self.image_len {
            return Err(DiscError::out_of_range(format!(
                "Read of {} bytes at 0x{:X} runs past the image end (0x{:X})",
                length, position, self.image_len
            )));
        }

        self.file.seek(SeekFrom::Start(position))?;
        let mut buffer = vec![0u8; length];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl SectorReader for XisoSectorReader {
    fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>> {
        self.read_bytes(lba * SECTOR_SIZE, SECTOR_SIZE as usize)
    }

    fn read_sectors(&mut self, start_lba: u64, count: u64) -> DiscResult<Vec<u8>> {
        self.read_bytes(start_lba * SECTOR_SIZE, (count * SECTOR_SIZE) as usize)
    }

    fn read_bytes(&mut self, offset: u64, length: usize) -> DiscResult<Vec<u8>> {
        self.read_absolute(self.image_offset + offset, length)
    }

    fn sector_count(&self) -> Option<u64> {
        Some(self.image_len.saturating_sub(self.image_offset) / SECTOR_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// In-memory reader used to exercise the default methods
    struct MemoryReader(Vec<u8>);

    impl SectorReader for MemoryReader {
        fn read_sector(&mut self, lba: u64) -> DiscResult<Vec<u8>> {
            let start = (lba * SECTOR_SIZE) as usize;
            self.0
                .get(start..start + SECTOR_SIZE as usize)
                .map(|s| s.to_vec())
                .ok_or_else(|| DiscError::out_of_range(format!("sector {}", lba)))
        }
    }

    #[test]
    fn test_default_read_bytes_spans_sectors() {
        let data: Vec<u8> = (0..3 * SECTOR_SIZE as usize).map(|i| (i % 251) as u8).collect();
        let mut reader = MemoryReader(data.clone());

        let bytes = reader.read_bytes(2040, 20).unwrap();
        assert_eq!(bytes, data[2040..2060].to_vec());
        assert!(reader.read_bytes(0, 0).unwrap().is_empty());
        assert!(reader.read_bytes(6000, 200).is_err());
    }

    #[test]
    fn test_xiso_reader_offset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut data = vec![0u8; 4 * SECTOR_SIZE as usize];
        data[SECTOR_SIZE as usize + 5] = 0x42;
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mut reader = XisoSectorReader::new(file.path()).unwrap();
        assert_eq!(reader.sector_count(), Some(4));

        reader.set_image_offset(SECTOR_SIZE);
        assert_eq!(reader.sector_count(), Some(3));
        assert_eq!(reader.read_sector(0).unwrap()[5], 0x42);
        assert!(matches!(
            reader.read_sector(3),
            Err(DiscError::AddressOutOfRange(_))
        ));
    }
}
