//! Directory entry structures for GDFX filesystem browsing

use std::cmp::Ordering;

use crate::disc::error::{DiscError, DiscResult};
use crate::disc::gdfx::{Attributes, DirectoryRecord};

/// Represents a single file or directory entry in a GDFX directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File/directory name
    pub name: String,
    /// Name bytes as stored in the record
    pub raw_name: Vec<u8>,
    /// Path relative to the disc root (e.g., "media/audio/intro.wma")
    pub path: String,
    /// Entry type (file or directory)
    pub entry_type: EntryType,
    /// Sector where the content (or nested directory table) begins
    pub start_sector: u32,
    /// Size in bytes; for directories, the size of the nested table
    pub size: u64,
    /// Raw attribute bits
    pub attributes: Attributes,
    /// Where the record itself lives on disc
    pub record: RecordLocation,
    /// Children entries (only populated for directories)
    pub children: Option<Vec<DirectoryEntry>>,
}

/// Location and tree links of the on-disk record an entry was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordLocation {
    /// First sector of the directory table holding the record
    pub table_sector: u32,
    /// Byte offset of the record from the start of that table
    pub table_offset: u32,
    pub left_offset: u16,
    pub right_offset: u16,
}

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

impl DirectoryEntry {
    /// Build an entry from a parsed record found in `parent_path`
    pub fn from_record(record: &DirectoryRecord, parent_path: &str, location: RecordLocation) -> Self {
        let name = record.display_name();
        let path = if parent_path.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", parent_path, name)
        };

        let entry_type = if record.is_directory() {
            EntryType::Directory
        } else {
            EntryType::File
        };

        Self {
            name,
            raw_name: record.name.clone(),
            path,
            entry_type,
            start_sector: record.start_sector,
            size: record.size as u64,
            attributes: record.attributes,
            record: location,
            children: match entry_type {
                EntryType::Directory => Some(Vec::new()),
                EntryType::File => None,
            },
        }
    }

    /// Re-encode this entry as an on-disk record
    ///
    /// The stored name bytes are kept unless `name` was changed.
    pub fn to_record(&self) -> DiscResult<DirectoryRecord> {
        let size = u32::try_from(self.size).map_err(|_| {
            DiscError::InvalidArgument(format!("{} is too large for a directory record", self.path))
        })?;

        Ok(DirectoryRecord {
            left_offset: self.record.left_offset,
            right_offset: self.record.right_offset,
            start_sector: self.start_sector,
            size,
            attributes: self.attributes,
            name: self.record_name(),
        })
    }

    fn record_name(&self) -> Vec<u8> {
        if String::from_utf8_lossy(&self.raw_name) == self.name {
            self.raw_name.clone()
        } else {
            self.name.as_bytes().to_vec()
        }
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Check if this is a file
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Path of the containing directory ("" for root entries)
    pub fn parent_path(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    pub fn children(&self) -> &[DirectoryEntry] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Get a display-friendly size string
    pub fn size_string(&self) -> String {
        if self.is_directory() {
            return String::new();
        }

        if self.size < 1024 {
            format!("{} B", self.size)
        } else if self.size < 1024 * 1024 {
            format!("{:.1} KB", self.size as f64 / 1024.0)
        } else if self.size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.size as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.2} GB", self.size as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }
}

/// Order directories before files
///
/// Entries of the same kind compare equal, so a stable sort keeps the order
/// the directory table's tree gives them.
pub fn sort_directories_first(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    match (a.entry_type, b.entry_type) {
        (EntryType::Directory, EntryType::File) => Ordering::Less,
        (EntryType::File, EntryType::Directory) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Flatten a tree into pre-order (each directory followed by its contents)
pub fn flatten(entries: &[DirectoryEntry]) -> Vec<DirectoryEntry> {
    let mut out = Vec::new();
    flatten_into(entries, &mut out);
    out
}

fn flatten_into(entries: &[DirectoryEntry], out: &mut Vec<DirectoryEntry>) {
    for entry in entries {
        out.push(entry.clone());
        flatten_into(entry.children(), out);
    }
}

/// Number of file entries in a tree
pub fn count_files(entries: &[DirectoryEntry]) -> u64 {
    entries
        .iter()
        .map(|e| if e.is_file() { 1 } else { count_files(e.children()) })
        .sum()
}

/// Resolve a path like "media/intro.wmv" (either separator, leading one optional)
pub fn find_entry<'a>(entries: &'a [DirectoryEntry], path: &str) -> DiscResult<&'a DirectoryEntry> {
    let normalized = path.replace('\\', "/");
    let mut components = normalized.split('/').filter(|c| !c.is_empty()).peekable();

    let mut level = entries;
    while let Some(component) = components.next() {
        let found = level
            .iter()
            .find(|e| e.name == component)
            .ok_or_else(|| DiscError::NotFound(path.to_string()))?;

        if components.peek().is_none() {
            return Ok(found);
        }
        level = found.children();
    }

    Err(DiscError::NotFound(path.to_string()))
}
