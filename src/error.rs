use std::io;

use thiserror::Error;

use crate::extract::SegmentKind;

/// Errors that abort unpacking a boot image.
///
/// Every variant is terminal: once one is returned, no further segments are
/// read or emitted.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Android boot magic not found within the first {search_limit} bytes")]
    MagicNotFound { search_limit: u64 },
    #[error("Truncated header at offset {offset}: need {expected} bytes, have {available}")]
    TruncatedHeader {
        offset: u64,
        expected: u64,
        available: u64,
    },
    #[error("Truncated {kind} segment at offset {offset}: need {expected} bytes, have {available}")]
    TruncatedSegment {
        kind: SegmentKind,
        offset: u64,
        expected: u64,
        available: u64,
    },
    #[error("Invalid page size: {0} (must be a non-zero power of two)")]
    InvalidPageSize(u32),
    #[error("Failed to decode header")]
    Header(#[source] binrw::Error),
    #[error("Failed to emit {kind} segment")]
    Sink {
        kind: SegmentKind,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
