use std::fmt;

/// OS version and patch level packed into a single header word
///
/// Legacy images leave this word zero. Images produced by newer tooling pack
/// it as follows, from most to least significant bit:
///
/// * 7 bits major version
/// * 7 bits minor version
/// * 7 bits patch version
/// * 7 bits patch year, counted from 2000
/// * 4 bits patch month
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersionPatch(u32);

impl OsVersionPatch {
    #[cfg(test)]
    pub fn new(version: OsVersion, patch: OsPatch) -> Self {
        Self((version.0 << 11) | patch.0 as u32)
    }
    pub fn version(self) -> OsVersion {
        OsVersion(self.0 >> 11)
    }
    pub fn patch(self) -> OsPatch {
        OsPatch((self.0 & 0x7ff) as u16)
    }
}

impl From<u32> for OsVersionPatch {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<OsVersionPatch> for u32 {
    fn from(vp: OsVersionPatch) -> Self {
        vp.0
    }
}

impl fmt::Debug for OsVersionPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OsVersionPatch({}, {})", self.version(), self.patch())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsPatch(u16);

impl OsPatch {
    #[cfg(test)]
    pub fn new(year: u16, month: u8) -> Self {
        Self((year.saturating_sub(2000) << 4) | (month & 0xf) as u16)
    }
    pub fn year(self) -> u16 {
        (self.0 >> 4) + 2000
    }
    pub fn month(self) -> u8 {
        (self.0 & 0xf) as u8
    }
}

impl fmt::Display for OsPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}
impl fmt::Debug for OsPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion(u32);

impl OsVersion {
    #[cfg(test)]
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self(((a as u32 & 0x7f) << 14) | ((b as u32 & 0x7f) << 7) | (c as u32 & 0x7f))
    }
    pub fn version_parts(self) -> (u8, u8, u8) {
        let x = self.0;
        let a = (x >> 14) & 0x7f;
        let b = (x >> 7) & 0x7f;
        let c = x & 0x7f;
        (a as u8, b as u8, c as u8)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, c) = self.version_parts();
        write!(f, "{a}.{b}.{c}")
    }
}
impl fmt::Debug for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
