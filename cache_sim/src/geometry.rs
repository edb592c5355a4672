use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bin::{exact_log2, low_mask, ADDRESS_BITS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{parameter} must be a power of two, got {value}")]
    NotPowerOfTwo {
        parameter: &'static str,
        value: usize,
    },
    #[error("offset bits ({offset_bits}) + set bits ({set_bits}) exceed the 27-bit address")]
    AddressTooNarrow { offset_bits: u32, set_bits: u32 },
    #[error("associativity {associativity} exceeds the {tag_bits}-bit tag space of a set")]
    AssociativityTooLarge { associativity: usize, tag_bits: u32 },
}

/// address split into its cache coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposed {
    pub tag: u32,
    pub set: usize,
    pub offset: usize,
}

/// Shape of one cache: `line_bytes` (L), `associativity` (K) and `sets` (N).
///
/// The masks and shifts used by [`Geometry::decode`] are computed once here,
/// so a `Geometry` that exists is always a valid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GeometryRaw", into = "GeometryRaw")]
pub struct Geometry {
    line_bytes: usize,
    associativity: usize,
    sets: usize,
    offset_bits: u32,
    set_bits: u32,
    tag_bits: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct GeometryRaw {
    line_bytes: usize,
    associativity: usize,
    sets: usize,
}

impl TryFrom<GeometryRaw> for Geometry {
    type Error = ConfigurationError;

    fn try_from(raw: GeometryRaw) -> Result<Self, Self::Error> {
        Geometry::new(raw.line_bytes, raw.associativity, raw.sets)
    }
}

impl From<Geometry> for GeometryRaw {
    fn from(g: Geometry) -> Self {
        GeometryRaw {
            line_bytes: g.line_bytes,
            associativity: g.associativity,
            sets: g.sets,
        }
    }
}

impl Geometry {
    /// canonical instruction cache: 16-byte lines, direct mapped, 1024 sets.
    pub const INSTRUCTION: Geometry = Geometry {
        line_bytes: 16,
        associativity: 1,
        sets: 1024,
        offset_bits: 4,
        set_bits: 10,
        tag_bits: 13,
    };
    /// canonical data cache: 16-byte lines, 8-way, 256 sets.
    pub const DATA: Geometry = Geometry {
        line_bytes: 16,
        associativity: 8,
        sets: 256,
        offset_bits: 4,
        set_bits: 8,
        tag_bits: 15,
    };

    pub fn new(
        line_bytes: usize,
        associativity: usize,
        sets: usize,
    ) -> Result<Self, ConfigurationError> {
        fn log2_of(parameter: &'static str, value: usize) -> Result<u32, ConfigurationError> {
            exact_log2(value).ok_or(ConfigurationError::NotPowerOfTwo { parameter, value })
        }
        let offset_bits = log2_of("line size", line_bytes)?;
        let way_bits = log2_of("associativity", associativity)?;
        let set_bits = log2_of("set count", sets)?;
        if offset_bits + set_bits > ADDRESS_BITS {
            return Err(ConfigurationError::AddressTooNarrow {
                offset_bits,
                set_bits,
            });
        }
        let tag_bits = ADDRESS_BITS - offset_bits - set_bits;
        // a set never holds more distinct tags than the tag field can name,
        // which keeps L * K * N within the 27-bit address space
        if way_bits > tag_bits {
            return Err(ConfigurationError::AssociativityTooLarge {
                associativity,
                tag_bits,
            });
        }
        Ok(Self {
            line_bytes,
            associativity,
            sets,
            offset_bits,
            set_bits,
            tag_bits,
        })
    }

    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }
    pub fn associativity(&self) -> usize {
        self.associativity
    }
    pub fn sets(&self) -> usize {
        self.sets
    }
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }
    pub fn set_bits(&self) -> u32 {
        self.set_bits
    }
    pub fn tag_bits(&self) -> u32 {
        self.tag_bits
    }
    pub fn capacity_bytes(&self) -> usize {
        self.line_bytes * self.associativity * self.sets
    }

    /// splits `addr` into (tag, set, offset). `addr` is expected to be
    /// already masked to the 27-bit address space.
    #[inline]
    pub fn decode(&self, addr: u32) -> Decomposed {
        let offset = addr & low_mask(self.offset_bits);
        let set = (addr >> self.offset_bits) & low_mask(self.set_bits);
        let tag = (addr >> (self.offset_bits + self.set_bits)) & low_mask(self.tag_bits);
        Decomposed {
            tag,
            set: set as usize,
            offset: offset as usize,
        }
    }

    /// inverse of [`Geometry::decode`].
    #[inline]
    pub fn encode(&self, Decomposed { tag, set, offset }: Decomposed) -> u32 {
        (tag << (self.offset_bits + self.set_bits))
            | ((set as u32) << self.offset_bits)
            | offset as u32
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L={} K={} N={}",
            self.line_bytes, self.associativity, self.sets
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_bits() {
        assert_eq!(Ok(Geometry::INSTRUCTION), Geometry::new(16, 1, 1024));
        assert_eq!(Ok(Geometry::DATA), Geometry::new(16, 8, 256));
        let i = Geometry::INSTRUCTION;
        assert_eq!((4, 10, 13), (i.offset_bits(), i.set_bits(), i.tag_bits()));
        let d = Geometry::DATA;
        assert_eq!((4, 8, 15), (d.offset_bits(), d.set_bits(), d.tag_bits()));
        assert_eq!(32768, d.capacity_bytes());
    }
    #[test]
    fn test_decode() {
        let g = Geometry::INSTRUCTION;
        let d = g.decode(0x0123_4567);
        assert_eq!(0x7, d.offset);
        assert_eq!(0x056, d.set);
        assert_eq!(0x0123_4567 >> 14, d.tag);
        // 0x10 and 0x20 share offset 0 and land in sets 1 and 2
        assert_eq!((1, 0), (g.decode(0x10).set, g.decode(0x10).offset));
        assert_eq!((2, 0), (g.decode(0x20).set, g.decode(0x20).offset));
    }
    #[test]
    fn test_round_trip() {
        let shapes = [
            (1, 1, 1),
            (16, 1, 1024),
            (16, 8, 256),
            (64, 4, 1 << 19),
            (1 << 26, 2, 1),
        ];
        for (l, k, n) in shapes {
            let g = Geometry::new(l, k, n).unwrap();
            let max_tag = low_mask(g.tag_bits());
            for tag in [0, 1, max_tag / 3, max_tag].into_iter().filter(|&t| t <= max_tag) {
                for set in [0, n / 2, n - 1] {
                    for offset in [0, l / 2, l - 1] {
                        let d = Decomposed { tag, set, offset };
                        assert_eq!(d, g.decode(g.encode(d)), "geometry {g}");
                    }
                }
            }
        }
    }
    #[test]
    fn test_configuration_error() {
        assert_eq!(
            Geometry::new(12, 1, 1024),
            Err(ConfigurationError::NotPowerOfTwo {
                parameter: "line size",
                value: 12
            })
        );
        assert_eq!(
            Geometry::new(16, 3, 1024),
            Err(ConfigurationError::NotPowerOfTwo {
                parameter: "associativity",
                value: 3
            })
        );
        assert_eq!(
            Geometry::new(16, 1, 0),
            Err(ConfigurationError::NotPowerOfTwo {
                parameter: "set count",
                value: 0
            })
        );
        assert_eq!(
            Geometry::new(1 << 16, 1, 1 << 12),
            Err(ConfigurationError::AddressTooNarrow {
                offset_bits: 16,
                set_bits: 12
            })
        );
    }
    #[test]
    fn test_associativity_bounded_by_tag_space() {
        assert_eq!(
            Geometry::new(1 << 13, 1 << 50, 1 << 14),
            Err(ConfigurationError::AssociativityTooLarge {
                associativity: 1 << 50,
                tag_bits: 0
            })
        );
        assert_eq!(
            Geometry::new(16, 1 << 14, 256),
            Err(ConfigurationError::AssociativityTooLarge {
                associativity: 1 << 14,
                tag_bits: 15
            })
        );
        // fully associative over the whole tag space is the largest shape
        let g = Geometry::new(16, 1 << 15, 256).unwrap();
        assert_eq!(1 << 27, g.capacity_bytes());
    }
    #[test]
    fn test_deserialize_validates() {
        let g: Geometry =
            serde_json::from_str(r#"{"line_bytes":16,"associativity":8,"sets":256}"#).unwrap();
        assert_eq!(g, Geometry::DATA);
        let e = serde_json::from_str::<Geometry>(r#"{"line_bytes":16,"associativity":6,"sets":256}"#);
        assert!(e.is_err());
    }
}
