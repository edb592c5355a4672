use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{char, hex_digit1, space0, space1},
    combinator::{eof, map_res, peek},
    multi::many1,
    sequence::{preceded, terminated},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{AccessRecord, DecodeError};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to run `xxd`: {0}")]
    Spawn(#[source] io::Error),
    #[error("`xxd` exited with {status}: {stderr}")]
    Xxd { status: ExitStatus, stderr: String },
    #[error("dump of `{}` is not valid UTF-8", .path.display())]
    Utf8 { path: PathBuf },
    #[error("record stride must be at least 1")]
    ZeroStride,
}

/// where the bytes of a capture come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSource {
    /// the capture file itself.
    #[default]
    Raw,
    /// a text file holding the output of `xxd -b <capture>`.
    Dump,
    /// run `xxd -b` on the capture and parse its output.
    Xxd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub source: TraceSource,
    /// read at most this many bytes of the capture.
    pub limit: Option<usize>,
    /// 32-bit words per record. The capture stores 64-bit entries whose
    /// first word is the bus record, hence 2.
    pub stride: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            source: TraceSource::Raw,
            limit: None,
            stride: 2,
        }
    }
}

pub struct TraceDecoder {
    config: TraceConfig,
}

impl TraceDecoder {
    pub fn new(config: TraceConfig) -> Result<Self, TraceError> {
        if config.stride == 0 {
            return Err(TraceError::ZeroStride);
        }
        Ok(Self { config })
    }

    /// acquires the capture at `path` and assembles its records.
    pub fn load(&self, path: &Path) -> Result<Trace, TraceError> {
        let io_err = |source| TraceError::Io {
            path: path.to_owned(),
            source,
        };
        let mut bytes = match self.config.source {
            TraceSource::Raw => {
                let mut file = File::open(path).map_err(io_err)?;
                let mut buf = Vec::new();
                match self.config.limit {
                    Some(limit) => file.by_ref().take(limit as u64).read_to_end(&mut buf),
                    None => file.read_to_end(&mut buf),
                }
                .map_err(io_err)?;
                buf
            }
            TraceSource::Dump => {
                let mut buf = String::new();
                File::open(path)
                    .and_then(|mut f| f.read_to_string(&mut buf))
                    .map_err(io_err)?;
                parse_dump(&buf)
            }
            TraceSource::Xxd => {
                let dump = self.run_xxd(path)?;
                parse_dump(&dump)
            }
        };
        if let Some(limit) = self.config.limit {
            bytes.truncate(limit);
        }
        log::info!("read {} bytes from `{}`.", bytes.len(), path.display());
        Ok(Trace::from_bytes(&bytes, self.config.stride))
    }

    fn run_xxd(&self, path: &Path) -> Result<String, TraceError> {
        let mut cmd = Command::new("xxd");
        cmd.arg("-b");
        if let Some(limit) = self.config.limit {
            cmd.arg("-l").arg(limit.to_string());
        }
        let out = cmd.arg(path).output().map_err(TraceError::Spawn)?;
        if !out.status.success() {
            return Err(TraceError::Xxd {
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        String::from_utf8(out.stdout).map_err(|_| TraceError::Utf8 {
            path: path.to_owned(),
        })
    }
}

/// 32-bit words of a capture, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    words: Vec<u32>,
}

impl Trace {
    pub fn new(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// groups `bytes` into big-endian words and keeps every `stride`-th one.
    /// a trailing partial word is dropped.
    pub fn from_bytes(bytes: &[u8], stride: usize) -> Self {
        let words = bytes
            .chunks_exact(4)
            .step_by(stride.max(1))
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self { words }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Result<AccessRecord, DecodeError>> + '_ {
        self.words.iter().map(|&w| AccessRecord::decode_from(w))
    }
}

/// bytes of an `xxd -b` dump. blank and malformed lines are skipped.
pub fn parse_dump(dump: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (index, line) in dump.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match dump_line(line) {
            Ok((_, row)) => bytes.extend(row),
            Err(e) => log::debug!("skipping dump line {}: {e}", index + 1),
        }
    }
    bytes
}

fn is_bit(c: char) -> bool {
    c == '0' || c == '1'
}

fn binary_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        terminated(take_while_m_n(8, 8, is_bit), peek(alt((space1, eof)))),
        |s| u8::from_str_radix(s, 2),
    )(input)
}

/// `00000000: 01100000 00000000 ...  ascii`
fn dump_line(input: &str) -> IResult<&str, Vec<u8>> {
    let (input, _) = preceded(space0, terminated(hex_digit1, char(':')))(input)?;
    many1(preceded(space1, binary_byte))(input)
}
