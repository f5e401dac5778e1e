//! GDFX directory tree reader
//!
//! Walks each directory table as the binary search tree it encodes (left
//! subtree, record, right subtree), descending into non-empty directories
//! through their own tables. Works over any [`SectorReader`], so disc images,
//! split virtual discs and package images share one parser.

use std::collections::HashSet;

use super::entry::{sort_directories_first, DirectoryEntry, RecordLocation};
use super::reader::{SectorReader, SECTOR_SIZE};
use crate::disc::error::{DiscError, DiscResult};
use crate::disc::gdfx::{read_u16_le, DirectoryRecord, PADDING_OFFSET};

/// Directories nested deeper than this are treated as corrupt
const MAX_DEPTH: usize = 64;

/// Read the complete tree below the table at `root_sector`
pub fn read_directory_tree(
    reader: &mut dyn SectorReader,
    root_sector: u32,
    root_size: u32,
) -> DiscResult<Vec<DirectoryEntry>> {
    let sector_count = reader.sector_count();
    let mut walker = TreeWalker {
        reader,
        sector_count,
    };
    walker.read_directory(root_sector, root_size, "", 0)
}

struct TreeWalker<'a> {
    reader: &'a mut dyn SectorReader,
    sector_count: Option<u64>,
}

/// One directory table held in memory while its tree is walked
struct Table<'p> {
    data: Vec<u8>,
    sector: u32,
    size: usize,
    path: &'p str,
    depth: usize,
}

impl TreeWalker<'_> {
    fn read_directory(
        &mut self,
        sector: u32,
        size: u32,
        path: &str,
        depth: usize,
    ) -> DiscResult<Vec<DirectoryEntry>> {
        if size == 0 {
            return Ok(Vec::new());
        }

        if depth > MAX_DEPTH {
            return Err(DiscError::format(format!(
                "Directory nesting deeper than {} at '{}'",
                MAX_DEPTH, path
            )));
        }

        let sectors = (size as u64).div_ceil(SECTOR_SIZE);
        if let Some(count) = self.sector_count {
            if sector as u64 + sectors > count {
                return Err(DiscError::format(format!(
                    "Directory table of '{}' at sector 0x{:X} ({} sectors) lies outside the disc ({} sectors)",
                    path, sector, sectors, count
                )));
            }
        }

        log::debug!(
            "Reading directory table '{}' at sector 0x{:X} ({} bytes)",
            path,
            sector,
            size
        );

        let table = Table {
            data: self.reader.read_sectors(sector as u64, sectors)?,
            sector,
            size: size as usize,
            path,
            depth,
        };

        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        self.walk_node(&table, 0, &mut visited, &mut entries)?;

        entries.sort_by(sort_directories_first);
        Ok(entries)
    }

    fn walk_node(
        &mut self,
        table: &Table<'_>,
        offset: u16,
        visited: &mut HashSet<u16>,
        entries: &mut Vec<DirectoryEntry>,
    ) -> DiscResult<()> {
        let pos = offset as usize * 4;
        if pos >= table.size {
            return Ok(());
        }

        if !visited.insert(offset) {
            return Err(DiscError::format(format!(
                "Directory table of '{}' links back to offset 0x{:X}",
                table.path, pos
            )));
        }

        // 0xFF padding between and after records
        if read_u16_le(&table.data, pos) == PADDING_OFFSET {
            return Ok(());
        }

        let record = match DirectoryRecord::read(&table.data, pos)? {
            Some(record) => record,
            None => return Ok(()),
        };
        if record.name.is_empty() {
            return Ok(());
        }

        if record.left_offset != 0 {
            self.walk_node(table, record.left_offset, visited, entries)?;
        }

        let location = RecordLocation {
            table_sector: table.sector,
            table_offset: pos as u32,
            left_offset: record.left_offset,
            right_offset: record.right_offset,
        };
        let mut entry = DirectoryEntry::from_record(&record, table.path, location);

        if entry.is_directory() && record.size > 0 {
            let children =
                self.read_directory(record.start_sector, record.size, &entry.path, table.depth + 1)?;
            entry.children = Some(children);
        }
        entries.push(entry);

        if record.right_offset != 0 {
            self.walk_node(table, record.right_offset, visited, entries)?;
        }

        Ok(())
    }
}
