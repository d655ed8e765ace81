//! Four-byte box identifiers (`spec.md` §4.8.1: boxes are `(size32 | 'type' | payload)`).

use std::fmt;

/// A box id, stored as the big-endian `u32` read straight off the wire so comparisons
/// are a single integer compare rather than a byte-slice compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*tag))
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.as_bytes()) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') => write!(f, "FourCc({s:?})"),
            _ => write!(f, "FourCc(0x{:08x})", self.0),
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.as_bytes()) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') => write!(f, "{s}"),
            _ => write!(f, "0x{:08x}", self.0),
        }
    }
}

macro_rules! fourcc_consts {
    ($($name:ident = $tag:literal;)*) => {
        $(pub const $name: FourCc = FourCc::new($tag);)*
    };
}

fourcc_consts! {
    FTYP = b"ftyp";
    MOOV = b"moov";
    MVHD = b"mvhd";
    TRAK = b"trak";
    TKHD = b"tkhd";
    MDIA = b"mdia";
    MDHD = b"mdhd";
    MINF = b"minf";
    STBL = b"stbl";
    STSD = b"stsd";
    STTS = b"stts";
    STSC = b"stsc";
    STCO = b"stco";
    CO64 = b"co64";
    STSZ = b"stsz";
    MVEX = b"mvex";
    MEHD = b"mehd";
    MOOF = b"moof";
    TRAF = b"traf";
    TFHD = b"tfhd";
    TRUN = b"trun";
    SIDX = b"sidx";
    ESDS = b"esds";
    ALAC = b"alac";
    DFLA = b"dfLa";
    DOPS = b"dOps";
    SCHM = b"schm";
    TENC = b"tenc";
    SENC = b"senc";
    MDAT = b"mdat";
    ENCA = b"enca";
    SINF = b"sinf";
    FREE = b"free";
    SKIP = b"skip";
    FRMA = b"frma";
    SCHI = b"schi";
    HDLR = b"hdlr";
    SMHD = b"smhd";
    DINF = b"dinf";
    TREX = b"trex";
    UDTA = b"udta";
    MFHD = b"mfhd";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_be_bytes() {
        assert_eq!(FourCc::from_be_bytes(*b"moov"), MOOV);
        assert_eq!(MOOV.as_bytes(), *b"moov");
    }

    #[test]
    fn debug_renders_ascii_tags_as_text() {
        assert_eq!(format!("{:?}", STSD), "FourCc(\"stsd\")");
    }
}
