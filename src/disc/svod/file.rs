//! Byte stream over a single file stored in a split virtual disc

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::SplitVirtualDisc;
use crate::disc::browse::entry::DirectoryEntry;
use crate::disc::browse::filesystem::{copy_to_file, Progress, EXTRACT_CHUNK_SIZE};
use crate::disc::error::{DiscError, DiscResult};

/// Seekable view of one file entry
///
/// Reads and writes stay within the entry's size; files cannot grow.
pub struct SvodFile<'a> {
    disc: &'a mut SplitVirtualDisc,
    entry: DirectoryEntry,
    pos: u64,
}

impl<'a> SvodFile<'a> {
    pub(super) fn new(disc: &'a mut SplitVirtualDisc, entry: DirectoryEntry) -> Self {
        Self { disc, entry, pos: 0 }
    }

    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    pub fn len(&self) -> u64 {
        self.entry.size
    }

    pub fn is_empty(&self) -> bool {
        self.entry.size == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    fn remaining(&self) -> u64 {
        self.entry.size.saturating_sub(self.pos)
    }

    /// Copy the file's contents to `path`, reporting `(bytes done, total)`
    pub fn save_to(&mut self, path: &Path, progress: Option<Progress<'_>>) -> DiscResult<()> {
        log::info!("Saving {} to {}", self.entry.path, path.display());
        let start = self.entry.start_sector;
        let disc = &mut *self.disc;
        copy_to_file(
            path,
            self.entry.size,
            |offset, len| {
                let mut chunk = vec![0u8; len];
                disc.read_logical(start, offset, &mut chunk)?;
                Ok(chunk)
            },
            progress,
        )
    }

    /// Replace the file's contents with those of `path`
    ///
    /// The replacement must have exactly the entry's size. The hash tree is
    /// stale afterwards until the disc is rehashed.
    pub fn overwrite_from(&mut self, path: &Path, mut progress: Option<Progress<'_>>) -> DiscResult<()> {
        let mut input = File::open(path)?;
        let len = input.metadata()?.len();
        if len != self.entry.size {
            return Err(DiscError::InvalidArgument(format!(
                "{} is {} bytes but {} is {} bytes",
                path.display(),
                len,
                self.entry.path,
                self.entry.size
            )));
        }

        log::info!("Overwriting {} with {}", self.entry.path, path.display());
        let mut buffer = vec![0u8; EXTRACT_CHUNK_SIZE];
        let mut written = 0u64;
        while written < len {
            let amount = (len - written).min(EXTRACT_CHUNK_SIZE as u64) as usize;
            input.read_exact(&mut buffer[..amount])?;
            self.disc
                .write_logical(self.entry.start_sector, written, &buffer[..amount])?;
            written += amount as u64;

            if let Some(cb) = progress.as_mut() {
                cb(written, len);
            }
        }

        self.pos = 0;
        Ok(())
    }
}

impl Read for SvodFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let amount = self.remaining().min(buf.len() as u64) as usize;
        if amount == 0 {
            return Ok(0);
        }

        self.disc
            .read_logical(self.entry.start_sector, self.pos, &mut buf[..amount])?;
        self.pos += amount as u64;
        Ok(amount)
    }
}

impl Write for SvodFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let amount = self.remaining().min(buf.len() as u64) as usize;
        if amount == 0 {
            return Ok(0);
        }

        self.disc
            .write_logical(self.entry.start_sector, self.pos, &buf[..amount])?;
        self.pos += amount as u64;
        Ok(amount)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SvodFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.entry.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
