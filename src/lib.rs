//! Unpacker for legacy Android boot images.
//!
//! A boot image is a 608-byte header followed by page-aligned kernel,
//! ramdisk, second bootloader and device tree segments, optionally followed
//! by a vendor signature block. [`BootImage`] locates the header, decodes it
//! and streams each segment to a [`SegmentSink`].

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

mod error;
mod extract;
mod header;
mod report;
mod scan;
mod version;

pub use error::{Error, Result};
pub use extract::{
    padding, ExtractSummary, Segment, SegmentInfo, SegmentKind, SegmentSink,
    SEANDROID_SIGNATURE_SIZE, SEANDROID_TAG, SIGNATURE_SIZE, SIGNATURE_THRESHOLD,
};
pub use header::{
    BootImageHeader, BOARD_NAME_SIZE, CMDLINE_SIZE, DEFAULT_KERNEL_OFFSET, HEADER_SIZE, ID_SIZE,
};
pub use report::{field_files, report, Field, ReportLine};
pub use scan::{find_magic, BOOT_MAGIC, DEFAULT_SEARCH_LIMIT};
pub use version::{OsPatch, OsVersion, OsVersionPatch};

use extract::Extractor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Overrides the header's page size. `None` and `Some(0)` use the header's.
    pub page_size: Option<u32>,
    /// Highest offset probed for the boot magic
    pub search_limit: u64,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            page_size: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// An opened boot image whose header has been decoded
#[derive(Debug)]
pub struct BootImage<R> {
    reader: R,
    len: u64,
    magic_offset: u64,
    page_size: u32,
    header: BootImageHeader,
}

impl<R: Read + Seek> BootImage<R> {
    /// Locates and decodes the header and resolves the page size.
    ///
    /// Nothing is emitted yet, so a failure here leaves no partial output.
    pub fn open(mut reader: R, options: &UnpackOptions) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let magic_offset = find_magic(&mut reader, options.search_limit)?;
        if magic_offset > 0 {
            debug!(magic_offset, "Boot magic found after preamble");
        }

        let header = BootImageHeader::parse(&mut reader)?;
        let page_size = resolve_page_size(options.page_size, header.page_size)?;
        debug!(len, page_size, header_page_size = header.page_size, "Decoded header");

        Ok(Self {
            reader,
            len,
            magic_offset,
            page_size,
            header,
        })
    }

    /// Reads every present segment in on-disk order and hands each to `sink`.
    ///
    /// Can be called repeatedly; every call rereads the segments from the
    /// image.
    pub fn extract<S: SegmentSink + ?Sized>(&mut self, sink: &mut S) -> Result<ExtractSummary> {
        let hdr = &self.header;
        self.reader
            .seek(SeekFrom::Start(self.magic_offset + HEADER_SIZE))?;

        let mut ex = Extractor::new(&mut self.reader, self.len, self.page_size, self.magic_offset);
        ex.skip_consumed(HEADER_SIZE)?;
        ex.segment(sink, SegmentKind::Kernel, hdr.kernel_size)?;
        ex.segment(sink, SegmentKind::Ramdisk, hdr.ramdisk_size)?;
        ex.segment(sink, SegmentKind::Second, hdr.second_size)?;
        ex.segment(sink, SegmentKind::DeviceTree, hdr.dt_size)?;
        ex.signature(sink)?;
        Ok(ex.finish())
    }

    pub fn header(&self) -> &BootImageHeader {
        &self.header
    }
    /// Offset of the boot magic, non-zero when the image has a preamble.
    pub fn magic_offset(&self) -> u64 {
        self.magic_offset
    }
    /// Page size used for padding, after applying any override.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }
    /// Total image length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn report(&self) -> Vec<ReportLine> {
        report(&self.header)
    }
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn resolve_page_size(page_size_override: Option<u32>, header_page_size: u32) -> Result<u32> {
    let page_size = page_size_override
        .filter(|&size| size != 0)
        .unwrap_or(header_page_size);
    if page_size.is_power_of_two() {
        Ok(page_size)
    } else {
        Err(Error::InvalidPageSize(page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_takes_precedence() {
        assert_eq!(resolve_page_size(Some(4096), 2048).unwrap(), 4096);
        assert_eq!(resolve_page_size(Some(0), 2048).unwrap(), 2048);
        assert_eq!(resolve_page_size(None, 2048).unwrap(), 2048);
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(
            resolve_page_size(None, 0),
            Err(Error::InvalidPageSize(0))
        ));
        assert!(matches!(
            resolve_page_size(Some(3000), 2048),
            Err(Error::InvalidPageSize(3000))
        ));
        assert!(matches!(
            resolve_page_size(None, 2049),
            Err(Error::InvalidPageSize(2049))
        ));
    }
}
