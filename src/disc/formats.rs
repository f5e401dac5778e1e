//! Storage representation detection

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Part file names shared by package images and split virtual discs
static PART_FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Data(\d{4})$").unwrap());

/// On-disk representations of a disc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Monolithic image file (.iso, .xiso, ...)
    DiscImage,
    /// Root descriptor plus a `<root>.data/` part directory
    SplitVirtualDisc,
    /// Directory of `DataNNNN` part files with interleaved hash tables
    PackageImage,
}

impl ImageFormat {
    /// Detect the representation at `path`
    ///
    /// Returns the path the representation is opened from: the root
    /// descriptor for split virtual discs and the part directory for
    /// package images. A part file resolves to the container it belongs to.
    pub fn detect(path: &Path) -> Option<(Self, PathBuf)> {
        if path.is_dir() {
            return Self::detect_directory(path);
        }

        if !path.is_file() {
            return None;
        }

        let name = path.file_name()?.to_str()?;
        if has_data_directory(path) {
            return Some((Self::SplitVirtualDisc, path.to_path_buf()));
        }
        if PART_FILE_PATTERN.is_match(name) {
            return Self::detect_directory(path.parent()?);
        }

        Some((Self::DiscImage, path.to_path_buf()))
    }

    fn detect_directory(dir: &Path) -> Option<(Self, PathBuf)> {
        if let Some(root) = svod_root_of(dir) {
            return Some((Self::SplitVirtualDisc, root));
        }

        let first_part = std::fs::read_dir(dir).ok()?.flatten().any(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| PART_FILE_PATTERN.captures(name))
                .is_some_and(|caps| &caps[1] == "0000")
                && entry.path().is_file()
        });

        if first_part {
            Some((Self::PackageImage, dir.to_path_buf()))
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DiscImage => "Disc image (XISO/GDF)",
            Self::SplitVirtualDisc => "Split virtual disc (SVOD)",
            Self::PackageImage => "Package image (GOD)",
        }
    }
}

fn has_data_directory(root: &Path) -> bool {
    match root.file_name() {
        Some(name) => {
            let mut data_name = name.to_os_string();
            data_name.push(".data");
            root.with_file_name(data_name).is_dir()
        }
        None => false,
    }
}

/// Root descriptor owning a `<root>.data` directory, if it exists
fn svod_root_of(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_str()?;
    let root_name = name.strip_suffix(".data")?;
    let root = dir.with_file_name(root_name);
    root.is_file().then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_disc_image() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("game.iso");
        fs::write(&iso, b"").unwrap();

        assert_eq!(
            ImageFormat::detect(&iso),
            Some((ImageFormat::DiscImage, iso.clone()))
        );
        assert_eq!(ImageFormat::detect(&dir.path().join("missing.iso")), None);
    }

    #[test]
    fn test_detect_split_virtual_disc() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("4D5307E6");
        let data = dir.path().join("4D5307E6.data");
        fs::write(&root, b"").unwrap();
        fs::create_dir(&data).unwrap();
        fs::write(data.join("Data0000"), b"").unwrap();

        let expected = Some((ImageFormat::SplitVirtualDisc, root.clone()));
        assert_eq!(ImageFormat::detect(&root), expected);
        assert_eq!(ImageFormat::detect(&data), expected);
        assert_eq!(ImageFormat::detect(&data.join("Data0000")), expected);
    }

    #[test]
    fn test_detect_package_image() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Data0000"), b"").unwrap();
        fs::write(dir.path().join("Data0001"), b"").unwrap();

        let expected = Some((ImageFormat::PackageImage, dir.path().to_path_buf()));
        assert_eq!(ImageFormat::detect(dir.path()), expected);
        assert_eq!(ImageFormat::detect(&dir.path().join("Data0001")), expected);
    }

    #[test]
    fn test_directory_without_parts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Data0001"), b"").unwrap();
        fs::write(dir.path().join("Data00000"), b"").unwrap();
        assert_eq!(ImageFormat::detect(dir.path()), None);
    }
}
