use std::io::{Read, Seek, SeekFrom};

use binrw::{binrw, BinRead};

use crate::{
    error::{Error, Result},
    version::OsVersionPatch,
};

/// Size of [`BootImageHeader`] on disk, magic included.
pub const HEADER_SIZE: u64 = 608;

/// Distance between the kernel load address and the base address.
///
/// The legacy format has no base field; the base is recovered by assuming the
/// kernel was loaded at the default offset.
pub const DEFAULT_KERNEL_OFFSET: u32 = 0x0000_8000;

pub const BOARD_NAME_SIZE: usize = 16;
pub const CMDLINE_SIZE: usize = 512;
pub const ID_SIZE: usize = 32;

/// Legacy Android boot image header with a device tree size field
#[binrw]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[brw(little, magic = b"ANDROID!")]
pub struct BootImageHeader {
    /// Kernel size
    pub kernel_size: u32,
    /// Kernel physical load addr
    pub kernel_addr: u32,
    /// Ramdisk size
    pub ramdisk_size: u32,
    /// Ramdisk physical load addr
    pub ramdisk_addr: u32,
    /// Second bootloader size, 0 when absent
    pub second_size: u32,
    /// Second bootloader physical load addr
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    /// Device tree blob size, 0 when absent
    pub dt_size: u32,
    /// Reserved. Newer images store the packed OS version and patch level here.
    pub unknown: u32,
    pub name: [u8; BOARD_NAME_SIZE],
    pub cmdline: Box<[u8; CMDLINE_SIZE]>,
    /// Image digest
    pub id: [u8; ID_SIZE],
}

impl BootImageHeader {
    /// Decodes the header at the reader's current position.
    ///
    /// The caller is expected to have located the magic first, see
    /// [`find_magic`](crate::find_magic).
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let offset = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(offset))?;

        let available = end.saturating_sub(offset);
        if available < HEADER_SIZE {
            return Err(Error::TruncatedHeader {
                offset,
                expected: HEADER_SIZE,
                available,
            });
        }

        Self::read(reader).map_err(Error::Header)
    }

    pub fn base(&self) -> u32 {
        self.kernel_addr.wrapping_sub(DEFAULT_KERNEL_OFFSET)
    }
    pub fn kernel_offset(&self) -> u32 {
        self.kernel_addr.wrapping_sub(self.base())
    }
    pub fn ramdisk_offset(&self) -> u32 {
        self.ramdisk_addr.wrapping_sub(self.base())
    }
    pub fn second_offset(&self) -> u32 {
        self.second_addr.wrapping_sub(self.base())
    }
    pub fn tags_offset(&self) -> u32 {
        self.tags_addr.wrapping_sub(self.base())
    }

    /// Board name up to the first NUL, never longer than the field.
    pub fn board_name(&self) -> &[u8] {
        take_until_null(&self.name)
    }
    /// Kernel command line up to the first NUL, never longer than the field.
    pub fn cmdline(&self) -> &[u8] {
        take_until_null(&*self.cmdline)
    }

    /// Returns the OS version and patch level stored in [`Self::unknown`], if set.
    pub fn os_version_patch(&self) -> Option<OsVersionPatch> {
        (self.unknown != 0).then(|| OsVersionPatch::from(self.unknown))
    }
}

pub(crate) fn take_until_null(input: &[u8]) -> &[u8] {
    match input.iter().position(|x| *x == 0) {
        Some(null_idx) => &input[..null_idx],
        None => input,
    }
}

#[cfg(test)]
pub(crate) fn test_header() -> BootImageHeader {
    let mut name = [0u8; BOARD_NAME_SIZE];
    name[..6].copy_from_slice(b"msm8k\0");
    let mut cmdline = Box::new([0u8; CMDLINE_SIZE]);
    cmdline[..22].copy_from_slice(b"console=ttyHSL0,115200");
    BootImageHeader {
        kernel_size: 0,
        kernel_addr: 0x1000_8000,
        ramdisk_size: 0,
        ramdisk_addr: 0x1100_0000,
        second_size: 0,
        second_addr: 0x10f0_0000,
        tags_addr: 0x1000_0100,
        page_size: 2048,
        dt_size: 0,
        unknown: 0,
        name,
        cmdline,
        id: [0; ID_SIZE],
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::BinWrite;

    use super::*;

    fn encode(hdr: &BootImageHeader) -> Vec<u8> {
        let mut w = Cursor::new(Vec::new());
        hdr.write(&mut w).unwrap();
        w.into_inner()
    }

    #[test]
    fn encoded_size_matches_layout() {
        assert_eq!(encode(&test_header()).len() as u64, HEADER_SIZE);
    }

    #[test]
    fn fields_at_fixed_offsets() {
        let mut hdr = test_header();
        hdr.dt_size = 0x1234;
        hdr.unknown = 0xdead_beef;
        let bytes = encode(&hdr);
        assert_eq!(&bytes[..8], b"ANDROID!");
        assert_eq!(&bytes[12..16], &0x1000_8000u32.to_le_bytes());
        assert_eq!(&bytes[36..40], &2048u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &0x1234u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &0xdead_beefu32.to_le_bytes());
        assert_eq!(&bytes[48..53], b"msm8k");
        assert_eq!(&bytes[64..86], b"console=ttyHSL0,115200");
    }

    #[test]
    fn roundtrip() {
        let mut hdr = test_header();
        hdr.id = [0x5a; ID_SIZE];
        hdr.second_size = 77;
        let parsed = BootImageHeader::parse(&mut Cursor::new(encode(&hdr))).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn derived_offsets() {
        let hdr = test_header();
        assert_eq!(hdr.base(), 0x1000_0000);
        assert_eq!(hdr.kernel_offset(), 0x0000_8000);
        assert_eq!(hdr.ramdisk_offset(), 0x0100_0000);
        assert_eq!(hdr.second_offset(), 0x00f0_0000);
        assert_eq!(hdr.tags_offset(), 0x0000_0100);
    }

    #[test]
    fn base_wraps_for_low_kernel_addr() {
        let mut hdr = test_header();
        hdr.kernel_addr = 0x4000;
        assert_eq!(hdr.base(), 0xffff_c000);
        assert_eq!(hdr.kernel_offset(), 0x8000);
    }

    #[test]
    fn strings_stop_at_nul() {
        let hdr = test_header();
        assert_eq!(hdr.board_name(), b"msm8k");
        assert_eq!(hdr.cmdline(), b"console=ttyHSL0,115200");
    }

    #[test]
    fn unterminated_name_is_full_width() {
        let mut hdr = test_header();
        hdr.name = *b"ABCDEFGHIJKLMNOP";
        assert_eq!(hdr.board_name(), b"ABCDEFGHIJKLMNOP");
        let mut hdr = test_header();
        *hdr.cmdline = [b'x'; CMDLINE_SIZE];
        assert_eq!(hdr.cmdline().len(), CMDLINE_SIZE);
    }

    #[test]
    fn truncated_header() {
        let bytes = encode(&test_header());
        let mut r = Cursor::new(bytes[..100].to_vec());
        assert!(matches!(
            BootImageHeader::parse(&mut r),
            Err(Error::TruncatedHeader {
                offset: 0,
                expected: HEADER_SIZE,
                available: 100
            })
        ));
    }

    #[test]
    fn parse_from_nonzero_offset() {
        let mut data = vec![0u8; 32];
        data.extend(encode(&test_header()));
        let mut r = Cursor::new(data);
        r.set_position(32);
        assert_eq!(BootImageHeader::parse(&mut r).unwrap(), test_header());
        assert_eq!(r.position(), 32 + HEADER_SIZE);
    }

    #[test]
    fn os_version_from_unknown_field() {
        let mut hdr = test_header();
        assert_eq!(hdr.os_version_patch(), None);
        hdr.unknown = 402653574;
        let vp = hdr.os_version_patch().unwrap();
        assert_eq!(vp.version().to_string(), "12.0.0");
        assert_eq!(vp.patch().to_string(), "2024-06");
    }
}
