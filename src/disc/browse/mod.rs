//! GDFX filesystem browsing
//!
//! Sector access, the directory tree reader and the filesystem surface shared
//! by every disc representation.

pub mod entry;
pub mod filesystem;
pub mod reader;
pub mod tree;

pub use entry::{find_entry, flatten, sort_directories_first, DirectoryEntry, EntryType};
pub use filesystem::{DiscFilesystem, Progress};
pub use reader::{SectorReader, XisoSectorReader, SECTOR_SIZE};
pub use tree::read_directory_tree;
