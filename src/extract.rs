use std::{
    fmt, io,
    io::{Read, Seek, SeekFrom},
};

use tracing::debug;

use crate::error::{Error, Result};

/// Tag some vendors place at the start of the trailing signature block.
pub const SEANDROID_TAG: &[u8; 16] = b"SEANDROIDENFORCE";
/// Minimum number of trailing bytes for a signature block to be extracted.
pub const SIGNATURE_THRESHOLD: u64 = 256;
/// Signature block size when it starts with [`SEANDROID_TAG`].
pub const SEANDROID_SIGNATURE_SIZE: u64 = 272;
/// Signature block size otherwise.
pub const SIGNATURE_SIZE: u64 = 256;

/// Payload regions of a boot image, in on-disk order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKind {
    Kernel,
    Ramdisk,
    Second,
    DeviceTree,
    Signature,
}

impl SegmentKind {
    /// Suffix appended to the image name for this segment's output file.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Kernel => "zImage",
            Self::Ramdisk => "ramdisk.gz",
            Self::Second => "second",
            Self::DeviceTree => "dtb",
            Self::Signature => "signature",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Second => "second bootloader",
            Self::DeviceTree => "device tree",
            Self::Signature => "signature",
        })
    }
}

/// A segment's bytes, read in full.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Absolute offset of the first byte in the image
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Receives every non-empty segment as soon as it has been read.
pub trait SegmentSink {
    fn write_segment(&mut self, segment: Segment) -> io::Result<()>;
}

impl SegmentSink for Vec<Segment> {
    fn write_segment(&mut self, segment: Segment) -> io::Result<()> {
        self.push(segment);
        Ok(())
    }
}

/// Number of bytes needed after `size` bytes to reach a multiple of `page_size`.
///
/// `page_size` must be a power of two.
pub fn padding(size: u64, page_size: u32) -> u64 {
    debug_assert!(page_size.is_power_of_two(), "page size {page_size}");
    let mask = page_size as u64 - 1;
    (page_size as u64 - (size & mask)) & mask
}

/// Where an emitted segment was found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentInfo {
    pub kind: SegmentKind,
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Offset of the boot magic
    pub magic_offset: u64,
    /// Page size used for padding, after applying any override
    pub page_size: u32,
    /// Bytes accounted for: magic offset, header, segments and padding
    pub consumed: u64,
    pub segments: Vec<SegmentInfo>,
}

/// Walks the segments following the header, tracking the consumed byte count.
pub(crate) struct Extractor<'a, R> {
    reader: &'a mut R,
    len: u64,
    page_size: u32,
    start: u64,
    consumed: u64,
    segments: Vec<SegmentInfo>,
}

impl<'a, R: Read + Seek> Extractor<'a, R> {
    /// `consumed` is the byte count already accounted for at the reader's
    /// current position.
    pub fn new(reader: &'a mut R, len: u64, page_size: u32, consumed: u64) -> Self {
        Self {
            reader,
            len,
            page_size,
            start: consumed,
            consumed,
            segments: Vec::new(),
        }
    }

    /// Accounts for `size` bytes that were already read and skips their padding.
    pub fn skip_consumed(&mut self, size: u64) -> Result<()> {
        self.consumed += size;
        self.skip_padding(size)
    }

    fn skip_padding(&mut self, size: u64) -> Result<()> {
        let pad = padding(size, self.page_size);
        if pad != 0 {
            self.reader.seek(SeekFrom::Current(pad as i64))?;
            self.consumed += pad;
        }
        Ok(())
    }

    fn read_exact_segment(&mut self, kind: SegmentKind, size: u64) -> Result<Segment> {
        let offset = self.reader.stream_position()?;
        let available = self.len.saturating_sub(offset);
        if size > available {
            return Err(Error::TruncatedSegment {
                kind,
                offset,
                expected: size,
                available,
            });
        }

        let mut data = Vec::new();
        self.reader.by_ref().take(size).read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(Error::TruncatedSegment {
                kind,
                offset,
                expected: size,
                available: data.len() as u64,
            });
        }
        Ok(Segment { kind, offset, data })
    }

    fn emit<S: SegmentSink + ?Sized>(&mut self, sink: &mut S, segment: Segment) -> Result<()> {
        let kind = segment.kind;
        self.segments.push(SegmentInfo {
            kind,
            offset: segment.offset,
            size: segment.data.len() as u64,
        });
        sink.write_segment(segment)
            .map_err(|source| Error::Sink { kind, source })
    }

    /// Reads one page-aligned segment and hands it to `sink`. Empty segments
    /// are skipped without consuming any padding.
    pub fn segment<S: SegmentSink + ?Sized>(
        &mut self,
        sink: &mut S,
        kind: SegmentKind,
        size: u32,
    ) -> Result<()> {
        if size == 0 {
            debug!(%kind, "Segment absent");
            return Ok(());
        }
        let size = size as u64;
        let segment = self.read_exact_segment(kind, size)?;
        debug!(
            %kind,
            offset = segment.offset,
            size,
            padding = padding(size, self.page_size),
            "Read segment"
        );
        self.consumed += size;
        self.emit(sink, segment)?;
        self.skip_padding(size)
    }

    /// Extracts the vendor signature block appended after the last segment,
    /// if at least [`SIGNATURE_THRESHOLD`] bytes remain.
    pub fn signature<S: SegmentSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        let trailing = self.len.saturating_sub(self.consumed);
        if trailing < SIGNATURE_THRESHOLD {
            debug!(trailing, "No signature block");
            return Ok(());
        }

        self.reader.seek(SeekFrom::Start(self.consumed))?;
        let mut tag = [0u8; 16];
        self.reader.read_exact(&mut tag)?;
        let size = if &tag == SEANDROID_TAG {
            SEANDROID_SIGNATURE_SIZE
        } else {
            SIGNATURE_SIZE
        };
        debug!(trailing, size, "Found signature block");

        self.reader.seek(SeekFrom::Start(self.consumed))?;
        let segment = self.read_exact_segment(SegmentKind::Signature, size)?;
        self.consumed += size;
        self.emit(sink, segment)
    }

    pub fn finish(self) -> ExtractSummary {
        debug!(consumed = self.consumed, "Extraction finished");
        ExtractSummary {
            magic_offset: self.start,
            page_size: self.page_size,
            consumed: self.consumed,
            segments: self.segments,
        }
    }
}
