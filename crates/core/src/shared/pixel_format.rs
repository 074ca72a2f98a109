use std::fmt;

/// Four-character code packed big-endian into a `u32`.
///
/// Used for both codec identifiers (`avc1`, `hvc1`) and pixel formats
/// (`2vuy`, `420v`, `BGRA`), the way hardware decode APIs name them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(u32);

impl FourCc {
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parses exactly four ASCII characters, e.g. `"2vuy"`.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return None;
        }
        Some(Self::from_bytes(bytes))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

/// Output pixel formats the bundled engines know how to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 4:2:2, Cb Y0 Cr Y1 (`2vuy`).
    Uyvy422,
    /// Bi-planar 4:2:0, video range (`420v`).
    Nv12,
    /// Packed 32-bit BGRA (`BGRA`).
    Bgra,
}

impl PixelLayout {
    pub fn from_fourcc(format: FourCc) -> Option<Self> {
        match &format.to_bytes() {
            b"2vuy" => Some(Self::Uyvy422),
            b"420v" => Some(Self::Nv12),
            b"BGRA" => Some(Self::Bgra),
            _ => None,
        }
    }

    pub fn fourcc(self) -> FourCc {
        match self {
            Self::Uyvy422 => FourCc::from_bytes(*b"2vuy"),
            Self::Nv12 => FourCc::from_bytes(*b"420v"),
            Self::Bgra => FourCc::from_bytes(*b"BGRA"),
        }
    }

    /// Byte length of one tightly packed image in this layout.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Uyvy422 => w * h * 2,
            Self::Nv12 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
            Self::Bgra => w * h * 4,
        }
    }
}
