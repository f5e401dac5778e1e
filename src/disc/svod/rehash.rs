//! Hash tree regeneration
//!
//! Each part file starts with a master hash table, followed by groups of a
//! level-0 hash table and up to 0xCC data blocks:
//!
//! ```text
//! 0x0000   master table   SHA-1 of each level-0 table, then the digest of
//!                         the next part file's master table
//! 0x1000   level-0 table  SHA-1 of each of the following data blocks
//! 0x2000   data blocks    0xCC x 0x1000
//! 0xCE000  level-0 table  ...
//! ```
//!
//! Part files are processed last to first so that each master table can
//! include the digest of its successor. The first part file's master digest
//! is the root hash stored in the content metadata.

use sha1::{Digest, Sha1};

use super::SplitVirtualDisc;
use crate::disc::browse::filesystem::Progress;
use crate::disc::error::{DiscError, DiscResult};

const BLOCK_SIZE: usize = 0x1000;
const DIGEST_SIZE: usize = 20;

/// Data blocks covered by one level-0 table
const BLOCKS_PER_TABLE: u64 = 0xCC;

/// Span of one level-0 table plus its data blocks
const GROUP_SPAN: u64 = 0xCD000;

/// First level-0 table of a part file
const FIRST_TABLE: u64 = 0x1000;

/// First data block of a part file
const FIRST_DATA_BLOCK: u64 = 0x2000;

impl SplitVirtualDisc {
    /// Recompute every hash table and the root hash, then commit the content
    /// metadata
    ///
    /// Progress is reported as `(part files done, part file count)`. Any
    /// failure aborts before the metadata is touched.
    pub fn rehash(&mut self, mut progress: Option<Progress<'_>>) -> DiscResult<[u8; 20]> {
        let count = self.io.file_count();
        log::info!("Rehashing split virtual disc ({} part files)", count);

        let mut block = vec![0u8; BLOCK_SIZE];
        let mut prev_hash = [0u8; DIGEST_SIZE];

        for i in (0..count).rev() {
            self.io.set_position(0, Some(i))?;
            let len = self.io.current_file_length();
            if len < FIRST_DATA_BLOCK {
                return Err(DiscError::format(format!(
                    "Part file {} is too small to hold hash tables ({} bytes)",
                    i, len
                )));
            }

            let table_count = (len - FIRST_DATA_BLOCK).div_ceil(GROUP_SPAN);
            if (table_count as usize + 1) * DIGEST_SIZE > BLOCK_SIZE {
                return Err(DiscError::format(format!(
                    "Part file {} needs {} hash tables, more than a master table holds",
                    i, table_count
                )));
            }

            let mut total_blocks = (len - FIRST_TABLE - table_count * BLOCK_SIZE as u64) >> 12;
            let mut master = vec![0u8; BLOCK_SIZE];

            for x in 0..table_count {
                let block_count = if total_blocks >= BLOCKS_PER_TABLE {
                    BLOCKS_PER_TABLE
                } else {
                    total_blocks % BLOCKS_PER_TABLE
                };
                total_blocks = total_blocks.saturating_sub(BLOCKS_PER_TABLE);

                let mut level0 = vec![0u8; BLOCK_SIZE];
                if block_count > 0 {
                    self.io.set_position(FIRST_DATA_BLOCK + x * GROUP_SPAN, Some(i))?;
                }
                for y in 0..block_count as usize {
                    self.io.read(&mut block)?;
                    let digest = Sha1::digest(&block);
                    level0[y * DIGEST_SIZE..(y + 1) * DIGEST_SIZE].copy_from_slice(&digest);
                }

                self.io.set_position(FIRST_TABLE + x * GROUP_SPAN, Some(i))?;
                self.io.write(&level0)?;

                let digest = Sha1::digest(&level0);
                let slot = x as usize * DIGEST_SIZE;
                master[slot..slot + DIGEST_SIZE].copy_from_slice(&digest);
            }

            let slot = table_count as usize * DIGEST_SIZE;
            master[slot..slot + DIGEST_SIZE].copy_from_slice(&prev_hash);

            self.io.set_position(0, Some(i))?;
            self.io.write(&master)?;
            self.io.flush()?;

            prev_hash = Sha1::digest(&master).into();
            log::debug!(
                "Part file {}: {} hash tables, master digest {}",
                i,
                table_count,
                hex(&prev_hash)
            );

            if let Some(cb) = progress.as_mut() {
                cb((count - i) as u64, count as u64);
            }
        }

        self.metadata.set_root_hash(prev_hash);
        self.metadata.commit()?;

        log::info!("New root hash {}", hex(&prev_hash));
        Ok(prev_hash)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
