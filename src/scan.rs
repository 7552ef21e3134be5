use std::io::{Read, Seek, SeekFrom};

use tracing::trace;

use crate::error::{Error, Result};

/// Magic at the start of every boot image header
pub const BOOT_MAGIC: &[u8; 8] = b"ANDROID!";

/// Default highest offset probed for [`BOOT_MAGIC`].
pub const DEFAULT_SEARCH_LIMIT: u64 = 4096;

/// Finds the first offset in `0..=search_limit` at which [`BOOT_MAGIC`] starts.
///
/// Some vendors prepend their own preamble to the image, so the header is not
/// assumed to be at offset 0. On success the reader is left positioned at the
/// returned offset.
pub fn find_magic<R: Read + Seek>(reader: &mut R, search_limit: u64) -> Result<u64> {
    reader.seek(SeekFrom::Start(0))?;

    let window_len = search_limit.saturating_add(BOOT_MAGIC.len() as u64);
    let mut window = Vec::new();
    reader.by_ref().take(window_len).read_to_end(&mut window)?;
    trace!(bytes = window.len(), search_limit, "Scanning for boot magic");

    let offset = window
        .windows(BOOT_MAGIC.len())
        .position(|candidate| candidate == BOOT_MAGIC)
        .ok_or(Error::MagicNotFound { search_limit })? as u64;

    reader.seek(SeekFrom::Start(offset))?;
    Ok(offset)
}
