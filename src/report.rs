use std::fmt::{self, Write};

use crate::header::BootImageHeader;

/// A reportable header field or value derived from the header
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Cmdline,
    Base,
    Board,
    PageSize,
    KernelOffset,
    RamdiskOffset,
    SecondOffset,
    TagsOffset,
    DtSize,
    Unknown,
    OsVersion,
    OsPatchLevel,
    Id,
}

impl Field {
    /// Label used in the console report.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cmdline => "BOARD_KERNEL_CMDLINE",
            Self::Base => "BOARD_KERNEL_BASE",
            Self::Board => "BOARD_NAME",
            Self::PageSize => "BOARD_PAGE_SIZE",
            Self::KernelOffset => "BOARD_KERNEL_OFFSET",
            Self::RamdiskOffset => "BOARD_RAMDISK_OFFSET",
            Self::SecondOffset => "BOARD_SECOND_OFFSET",
            Self::TagsOffset => "BOARD_TAGS_OFFSET",
            Self::DtSize => "BOARD_DT_SIZE",
            Self::Unknown => "BOARD_UNKNOWN",
            Self::OsVersion => "BOARD_OS_VERSION",
            Self::OsPatchLevel => "BOARD_OS_PATCH_LEVEL",
            Self::Id => "BOARD_ID",
        }
    }

    /// Suffix of the file this field is written to, if it gets one.
    pub fn file_suffix(self) -> Option<&'static str> {
        Some(match self {
            Self::Cmdline => "cmdline",
            Self::Base => "base",
            Self::Board => "board",
            Self::PageSize => "pagesize",
            Self::KernelOffset => "kerneloff",
            Self::RamdiskOffset => "ramdiskoff",
            Self::SecondOffset => "secondoff",
            Self::TagsOffset => "tagsoff",
            Self::Unknown => "unknown",
            Self::DtSize | Self::OsVersion | Self::OsPatchLevel | Self::Id => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLine {
    pub field: Field,
    pub value: String,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.label(), self.value)
    }
}

/// Renders the header's fields in console order.
///
/// Fields only present on some images (device tree size, OS version) are
/// left out when zero.
pub fn report(hdr: &BootImageHeader) -> Vec<ReportLine> {
    let mut lines = Vec::with_capacity(13);
    let mut push = |field, value| lines.push(ReportLine { field, value });

    push(Field::Cmdline, lossy(hdr.cmdline()));
    push(Field::Base, format!("{:08x}", hdr.base()));
    push(Field::Board, lossy(hdr.board_name()));
    push(Field::PageSize, hdr.page_size.to_string());
    push(Field::KernelOffset, format!("{:08x}", hdr.kernel_offset()));
    push(Field::RamdiskOffset, format!("{:08x}", hdr.ramdisk_offset()));
    push(Field::SecondOffset, format!("{:08x}", hdr.second_offset()));
    push(Field::TagsOffset, format!("{:08x}", hdr.tags_offset()));
    if hdr.dt_size != 0 {
        push(Field::DtSize, hdr.dt_size.to_string());
    }
    push(Field::Unknown, format!("{:08x}", hdr.unknown));
    if let Some(vp) = hdr.os_version_patch() {
        push(Field::OsVersion, vp.version().to_string());
        push(Field::OsPatchLevel, vp.patch().to_string());
    }
    push(Field::Id, hex(&hdr.id));

    lines
}

/// Contents of the per-field output files as `(suffix, bytes)`, each ending
/// in a newline.
///
/// String fields keep their raw header bytes; the lossy UTF-8 text in
/// [`ReportLine`] is only meant for the console.
pub fn field_files(hdr: &BootImageHeader) -> Vec<(&'static str, Vec<u8>)> {
    report(hdr)
        .into_iter()
        .filter_map(|line| {
            let suffix = line.field.file_suffix()?;
            let mut contents = match line.field {
                Field::Cmdline => hdr.cmdline().to_vec(),
                Field::Board => hdr.board_name().to_vec(),
                _ => line.value.into_bytes(),
            };
            contents.push(b'\n');
            Some((suffix, contents))
        })
        .collect()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
