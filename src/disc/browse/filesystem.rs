//! Uniform filesystem surface shared by every disc representation

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::entry::{self, count_files, flatten, DirectoryEntry};
use super::reader::{SectorReader, SECTOR_SIZE};
use crate::disc::error::{DiscError, DiscResult};

/// Extraction copies file contents in chunks of this size
pub const EXTRACT_CHUNK_SIZE: usize = 64 * 1024;

/// Progress callback receiving `(done, total)`
pub type Progress<'a> = &'a mut dyn FnMut(u64, u64);

/// Abstraction over the disc image, split virtual disc and package layouts
pub trait DiscFilesystem: Send {
    /// Parsed directory tree; read once and memoized
    fn list(&mut self) -> DiscResult<&[DirectoryEntry]>;

    /// Flat pre-order listing of every entry in the tree
    fn list_entries(&mut self) -> DiscResult<Vec<DirectoryEntry>> {
        Ok(flatten(self.list()?))
    }

    /// Look up an entry by its path relative to the disc root
    fn find_entry(&mut self, path: &str) -> DiscResult<DirectoryEntry> {
        entry::find_entry(self.list()?, path).cloned()
    }

    /// Read part of a file's contents
    fn read_file_range(
        &mut self,
        entry: &DirectoryEntry,
        offset: u64,
        length: usize,
    ) -> DiscResult<Vec<u8>>;

    /// Extract one file to `out_dir/<entry path>`, returning the written path
    fn extract_one(
        &mut self,
        entry: &DirectoryEntry,
        out_dir: &Path,
        progress: Option<Progress<'_>>,
    ) -> DiscResult<PathBuf>;

    /// Extract every file, reporting `(files completed, total files)`
    ///
    /// Directories are recreated even when empty. Returns the number of files
    /// written.
    fn extract_all(&mut self, out_dir: &Path, mut progress: Option<Progress<'_>>) -> DiscResult<u64> {
        let total = count_files(self.list()?);
        let entries = self.list_entries()?;
        log::info!("Extracting {} files to {}", total, out_dir.display());

        fs::create_dir_all(out_dir)?;
        let mut done = 0;
        for entry in &entries {
            if entry.is_directory() {
                fs::create_dir_all(output_path(out_dir, entry)?)?;
                continue;
            }

            self.extract_one(entry, out_dir, None)?;
            done += 1;
            if let Some(cb) = progress.as_mut() {
                cb(done, total);
            }
        }

        log::info!("Extracted {} files", done);
        Ok(done)
    }

    /// Key/value facts about the opened container, for display
    fn properties(&self) -> Vec<(&'static str, String)>;
}

/// Destination of `entry` below `out_dir`
///
/// Names that would escape the output directory are rejected.
pub fn output_path(out_dir: &Path, entry: &DirectoryEntry) -> DiscResult<PathBuf> {
    let mut target = out_dir.to_path_buf();
    for part in entry.path.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => target.push(name),
            _ => {
                return Err(DiscError::format(format!(
                    "Entry path '{}' cannot be extracted safely",
                    entry.path
                )))
            }
        }
    }
    Ok(target)
}

/// Read `length` bytes at `offset` within a file entry through a sector reader
pub fn read_entry_range(
    reader: &mut dyn SectorReader,
    entry: &DirectoryEntry,
    offset: u64,
    length: usize,
) -> DiscResult<Vec<u8>> {
    if !entry.is_file() {
        return Err(DiscError::NotAFile(entry.path.clone()));
    }

    if offset + length as u64 > entry.size {
        return Err(DiscError::out_of_range(format!(
            "Read of {} bytes at {} runs past the end of {} ({} bytes)",
            length, offset, entry.path, entry.size
        )));
    }

    reader.read_bytes(entry.start_sector as u64 * SECTOR_SIZE + offset, length)
}

/// Extract a file entry by reading its sectors through `reader`
pub fn extract_entry(
    reader: &mut dyn SectorReader,
    entry: &DirectoryEntry,
    out_dir: &Path,
    progress: Option<Progress<'_>>,
) -> DiscResult<PathBuf> {
    if !entry.is_file() {
        return Err(DiscError::NotAFile(entry.path.clone()));
    }

    let target = output_path(out_dir, entry)?;
    let base = entry.start_sector as u64 * SECTOR_SIZE;
    log::debug!(
        "Extracting {} ({} bytes at sector 0x{:X})",
        entry.path,
        entry.size,
        entry.start_sector
    );

    copy_to_file(
        &target,
        entry.size,
        |offset, len| reader.read_bytes(base + offset, len),
        progress,
    )?;
    Ok(target)
}

/// Write `size` bytes obtained from `read_chunk(offset, len)` to `target`
///
/// Parent directories are created and an existing file is overwritten. On
/// failure the partially written file is removed.
pub fn copy_to_file<F>(
    target: &Path,
    size: u64,
    read_chunk: F,
    progress: Option<Progress<'_>>,
) -> DiscResult<()>
where
    F: FnMut(u64, usize) -> DiscResult<Vec<u8>>,
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(target)?;
    let result = write_chunks(file, size, read_chunk, progress);
    if result.is_err() {
        if let Err(e) = fs::remove_file(target) {
            log::warn!("Failed to remove partial file {}: {}", target.display(), e);
        }
    }
    result
}

fn write_chunks<F>(
    mut file: File,
    size: u64,
    mut read_chunk: F,
    mut progress: Option<Progress<'_>>,
) -> DiscResult<()>
where
    F: FnMut(u64, usize) -> DiscResult<Vec<u8>>,
{
    let mut written = 0u64;
    while written < size {
        let len = (size - written).min(EXTRACT_CHUNK_SIZE as u64) as usize;
        let chunk = read_chunk(written, len)?;
        file.write_all(&chunk)?;
        written += len as u64;

        if let Some(cb) = progress.as_mut() {
            cb(written, size);
        }
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::browse::entry::RecordLocation;
    use crate::disc::gdfx::{Attributes, DirectoryRecord};
    use crate::disc::test_support::{pattern, MemoryDisc};

    fn file_entry(path: &str, start_sector: u32, size: u32) -> DirectoryEntry {
        let (parent, name) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            None => ("", path),
        };
        let record = DirectoryRecord {
            left_offset: 0,
            right_offset: 0,
            start_sector,
            size,
            attributes: Attributes(Attributes::ARCHIVE),
            name: name.as_bytes().to_vec(),
        };
        DirectoryEntry::from_record(&record, parent, RecordLocation::default())
    }

    #[test]
    fn test_extract_entry_in_chunks() {
        let data = pattern(9, EXTRACT_CHUNK_SIZE * 2 + 100);
        let mut disc = MemoryDisc::default();
        disc.write_sector(10, &data);

        let out = tempfile::tempdir().unwrap();
        let entry = file_entry("dir/big.bin", 10, data.len() as u32);
        let mut calls = Vec::new();
        let mut record = |done: u64, total: u64| calls.push((done, total));

        let path = extract_entry(&mut disc, &entry, out.path(), Some(&mut record)).unwrap();
        assert_eq!(path, out.path().join("dir").join("big.bin"));
        assert_eq!(fs::read(&path).unwrap(), data);

        let total = data.len() as u64;
        assert_eq!(
            calls,
            vec![
                (EXTRACT_CHUNK_SIZE as u64, total),
                (2 * EXTRACT_CHUNK_SIZE as u64, total),
                (total, total)
            ]
        );
    }

    #[test]
    fn test_zero_length_file() {
        let mut disc = MemoryDisc::default();
        let out = tempfile::tempdir().unwrap();
        let path = extract_entry(&mut disc, &file_entry("empty", 0, 0), out.path(), None).unwrap();
        assert_eq!(fs::metadata(path).unwrap().len(), 0);
    }

    #[test]
    fn test_overwrites_existing_file() {
        let mut disc = MemoryDisc::default();
        disc.write_sector(3, b"new");
        let out = tempfile::tempdir().unwrap();
        fs::write(out.path().join("a.txt"), b"old contents").unwrap();

        extract_entry(&mut disc, &file_entry("a.txt", 3, 3), out.path(), None).unwrap();
        assert_eq!(fs::read(out.path().join("a.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_failed_extraction_removes_partial_file() {
        let mut disc = MemoryDisc::default();
        disc.sector_limit = Some(40);
        let out = tempfile::tempdir().unwrap();
        let entry = file_entry("broken.bin", 0, (EXTRACT_CHUNK_SIZE * 2) as u32);

        let result = extract_entry(&mut disc, &entry, out.path(), None);
        assert!(matches!(result, Err(DiscError::AddressOutOfRange(_))));
        assert!(!out.path().join("broken.bin").exists());
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let out = Path::new("/tmp/out");
        assert!(output_path(out, &file_entry("a/../b", 0, 0)).is_err());
        assert!(output_path(out, &file_entry("..", 0, 0)).is_err());
        assert_eq!(
            output_path(out, &file_entry("a/b", 0, 0)).unwrap(),
            out.join("a").join("b")
        );
    }

    #[test]
    fn test_read_entry_range_bounds() {
        let mut disc = MemoryDisc::default();
        disc.write_sector(5, b"0123456789");
        let entry = file_entry("digits", 5, 10);

        assert_eq!(read_entry_range(&mut disc, &entry, 3, 4).unwrap(), b"3456");
        assert!(matches!(
            read_entry_range(&mut disc, &entry, 8, 4),
            Err(DiscError::AddressOutOfRange(_))
        ));
    }
}
