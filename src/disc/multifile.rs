//! Indexable multi-file IO
//!
//! Presents an ordered list of physical part files as one seekable stream
//! addressed by `(file index, offset within file)`. Reads and writes that run
//! off the end of one part file continue at offset 0 of the next one.
//! Only one part file handle is open at any time.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{DiscError, DiscResult};

/// Random-access handle to one physical part file
pub trait PartFile: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> PartFile for T {}

/// Supplies the ordered physical files behind an [`IndexableMultiFileIo`]
///
/// Local directories are handled by [`LocalPartFiles`]; other containers
/// (for example a FATX drive) provide their own implementation.
pub trait PartFileSource: Send {
    /// Number of part files
    fn count(&self) -> usize;

    /// Display name of a part file, used for logging
    fn name(&self, index: usize) -> String;

    /// Open the part file at `index`
    fn open(&self, index: usize) -> DiscResult<Box<dyn PartFile>>;
}

/// Part files stored in a local directory
#[derive(Debug, Clone)]
pub struct LocalPartFiles {
    paths: Vec<PathBuf>,
    writable: bool,
}

impl LocalPartFiles {
    /// Use every regular file in `dir`, sorted by file name
    ///
    /// Part file names carry zero-padded numeric suffixes, so lexicographic
    /// order is physical order.
    pub fn from_directory(dir: &Path, writable: bool) -> DiscResult<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }

        if paths.is_empty() {
            return Err(DiscError::format(format!(
                "No part files found in {}",
                dir.display()
            )));
        }

        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        log::debug!("Found {} part files in {}", paths.len(), dir.display());

        Ok(Self { paths, writable })
    }

    /// Use the given files in the given order
    pub fn from_paths(paths: Vec<PathBuf>, writable: bool) -> Self {
        Self { paths, writable }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl PartFileSource for LocalPartFiles {
    fn count(&self) -> usize {
        self.paths.len()
    }

    fn name(&self, index: usize) -> String {
        self.paths
            .get(index)
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    fn open(&self, index: usize) -> DiscResult<Box<dyn PartFile>> {
        let path = self.paths.get(index).ok_or_else(|| {
            DiscError::out_of_range(format!("Part file index {} is out of range", index))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(self.writable)
            .open(path)?;
        Ok(Box::new(file))
    }
}

/// Position within a multi-file stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalAddress {
    pub file_index: usize,
    pub offset: u64,
}

/// A sequence of part files addressed as one stream
pub struct IndexableMultiFileIo {
    source: Box<dyn PartFileSource>,
    current: Option<Box<dyn PartFile>>,
    current_len: u64,
    file_index: usize,
    offset: u64,
}

impl IndexableMultiFileIo {
    /// Create the stream, positioned at the start of the first part file
    pub fn new(source: Box<dyn PartFileSource>) -> DiscResult<Self> {
        if source.count() == 0 {
            return Err(DiscError::format("No part files are loaded"));
        }

        let mut io = Self {
            source,
            current: None,
            current_len: 0,
            file_index: 0,
            offset: 0,
        };
        io.open_part(0)?;
        Ok(io)
    }

    /// Close the current part file and open the one at `index`
    fn open_part(&mut self, index: usize) -> DiscResult<()> {
        self.current = None;

        let mut file = self.source.open(index)?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        log::trace!("Opened part file {} ({} bytes)", self.source.name(index), len);

        self.current = Some(file);
        self.current_len = len;
        self.file_index = index;
        self.offset = 0;
        Ok(())
    }

    fn current_file(&mut self) -> DiscResult<&mut Box<dyn PartFile>> {
        self.current
            .as_mut()
            .ok_or_else(|| DiscError::format("No part file is open"))
    }

    /// Seek to `offset` within part file `file_index`, or within the current
    /// part file when `file_index` is `None`
    ///
    /// Switching to another part file closes the current one first; if the
    /// offset is then rejected the stream is left at the start of the newly
    /// opened file.
    pub fn set_position(&mut self, offset: u64, file_index: Option<usize>) -> DiscResult<()> {
        match file_index {
            Some(index) if index != self.file_index => {
                if index >= self.source.count() {
                    return Err(DiscError::out_of_range(format!(
                        "Part file index {} is out of range ({} files)",
                        index,
                        self.source.count()
                    )));
                }
                self.open_part(index)?;
            }
            _ => {}
        }

        if offset >= self.current_len {
            return Err(DiscError::out_of_range(format!(
                "Cannot seek to 0x{:X} in part file {} of length 0x{:X}",
                offset, self.file_index, self.current_len
            )));
        }

        self.current_file()?.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Current `(file index, offset)` position
    pub fn position(&self) -> LogicalAddress {
        LogicalAddress {
            file_index: self.file_index,
            offset: self.offset,
        }
    }

    pub fn current_file_length(&self) -> u64 {
        self.current_len
    }

    /// Switch to part file `index` and return its length
    ///
    /// The stream is left at offset 0 of that file, which may be empty.
    pub fn file_length(&mut self, index: usize) -> DiscResult<u64> {
        if index >= self.source.count() {
            return Err(DiscError::out_of_range(format!(
                "Part file index {} is out of range ({} files)",
                index,
                self.source.count()
            )));
        }
        self.open_part(index)?;
        Ok(self.current_len)
    }

    pub fn file_count(&self) -> usize {
        self.source.count()
    }

    fn advance(&mut self) -> DiscResult<()> {
        let next = self.file_index + 1;
        if next >= self.source.count() {
            return Err(DiscError::out_of_range(format!(
                "Transfer runs past the end of the final part file ({})",
                self.file_index
            )));
        }
        self.set_position(0, Some(next))
    }

    /// Fill `buf` completely, crossing into following part files as needed
    pub fn read(&mut self, buf: &mut [u8]) -> DiscResult<()> {
        let mut done = 0;
        while done < buf.len() {
            if self.offset >= self.current_len {
                self.advance()?;
                continue;
            }

            let left = self.current_len - self.offset;
            let amount = left.min((buf.len() - done) as u64) as usize;
            self.current_file()?.read_exact(&mut buf[done..done + amount])?;
            self.offset += amount as u64;
            done += amount;

            if self.offset == self.current_len && self.file_index + 1 < self.source.count() {
                self.advance()?;
            }
        }
        Ok(())
    }

    /// Write all of `buf`, crossing into following part files as needed
    ///
    /// Bytes already written to earlier part files stay written if a later
    /// part of the transfer fails.
    pub fn write(&mut self, buf: &[u8]) -> DiscResult<()> {
        let mut done = 0;
        while done < buf.len() {
            if self.offset >= self.current_len {
                self.advance()?;
                continue;
            }

            let left = self.current_len - self.offset;
            let amount = left.min((buf.len() - done) as u64) as usize;
            self.current_file()?.write_all(&buf[done..done + amount])?;
            self.offset += amount as u64;
            done += amount;

            if self.offset == self.current_len && self.file_index + 1 < self.source.count() {
                self.advance()?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> DiscResult<()> {
        self.current_file()?.flush()?;
        Ok(())
    }
}
