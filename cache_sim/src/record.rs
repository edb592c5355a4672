use std::fmt;

use num_enum::TryFromPrimitive;
use thiserror::Error;

use crate::bin::{extract, physical};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("access type {code} of `{word:#010x}` is not a cache access")]
    UnmappedAccessType { code: u8, word: u32 },
}

/// bus access type held in bits 31..29 of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessKind {
    InstructionRead = 4,
    DataRead = 6,
    DataWrite = 7,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::InstructionRead => write!(f, "IR"),
            AccessKind::DataRead => write!(f, "DR"),
            AccessKind::DataWrite => write!(f, "DW"),
        }
    }
}

/// one decoded bus record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    pub kind: AccessKind,
    /// 27-bit physical address.
    pub addr: u32,
    /// dependent transfers bundled with this access (0..=3).
    pub burst: u32,
}

impl AccessRecord {
    /// `addr` is masked to 27 bits and `burst` to 2.
    pub fn new(kind: AccessKind, addr: u32, burst: u32) -> Self {
        Self {
            kind,
            addr: physical(addr),
            burst: burst & 0b11,
        }
    }

    /// decodes `[31:29] type | [28:27] burst | [26:0] address`.
    pub fn decode_from(word: u32) -> Result<Self, DecodeError> {
        let code = extract(word, 29..31) as u8;
        let kind = AccessKind::try_from(code)
            .map_err(|_| DecodeError::UnmappedAccessType { code, word })?;
        Ok(Self {
            kind,
            addr: extract(word, 0..26),
            burst: extract(word, 27..28),
        })
    }

    /// inverse of [`AccessRecord::decode_from`]. fields are truncated to
    /// their widths.
    pub fn encode(&self) -> u32 {
        ((self.kind as u32) << 29) | ((self.burst & 0b11) << 27) | physical(self.addr)
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#09x} +{}", self.kind, self.addr, self.burst)
    }
}
