//! Xbox 360 virtual optical-disc storage
//!
//! Three on-disk representations of a game disc are exposed through one
//! [`DiscFilesystem`] surface: monolithic disc images, split virtual discs
//! and package images.

pub mod browse;
pub mod error;
pub mod formats;
pub mod gdfx;
pub mod god;
pub mod metadata;
pub mod multifile;
pub mod svod;
pub mod xiso;

#[cfg(test)]
mod test_support;

pub use browse::{DirectoryEntry, DiscFilesystem, EntryType, SectorReader};
pub use error::{DiscError, DiscResult};
pub use formats::ImageFormat;
pub use god::{remap_god_to_sector, remap_sector_to_god, GodAddress, PackageImage};
pub use svod::SplitVirtualDisc;
pub use xiso::{DiscImage, DiscInfo, ImageType};

use std::path::Path;

/// Detect the representation at `path` and open it read-only
pub fn open_image(path: &Path) -> DiscResult<(ImageFormat, Box<dyn DiscFilesystem>)> {
    let (format, resolved) = ImageFormat::detect(path).ok_or_else(|| {
        DiscError::NotFound(format!("No disc image at {}", path.display()))
    })?;

    log::debug!("{} detected as {}", path.display(), format.display_name());

    let filesystem: Box<dyn DiscFilesystem> = match format {
        ImageFormat::DiscImage => Box::new(DiscImage::open(&resolved)?),
        ImageFormat::SplitVirtualDisc => Box::new(SplitVirtualDisc::open(&resolved)?),
        ImageFormat::PackageImage => Box::new(PackageImage::open(&resolved)?),
    };
    Ok((format, filesystem))
}
