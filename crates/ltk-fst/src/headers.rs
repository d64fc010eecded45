// On-disk magic numbers and feature flag sets.

use crate::FstError;
use std::io::{Read, Write};

/// Magic of a compiled dictionary container.
pub const HEADER_CONTAINER: [u8; 4] = *b"LTTB";

/// Magic of an individual transducer body.
pub const HEADER_TRANSDUCER: [u8; 4] = *b"LTTD";

/// Container-level feature bits.
pub mod container_features {
    /// Bodies use the fixed-width little-endian layout.
    pub const MMAP: u64 = 1 << 0;
    /// Features at or above this value are unknown to this version.
    pub const UNKNOWN: u64 = 1 << 1;
}

/// Transducer-level feature bits.
pub mod transducer_features {
    /// The body carries explicit weights.
    pub const WEIGHTS: u64 = 1 << 0;
    /// The body uses the fixed-width little-endian layout.
    pub const MMAP: u64 = 1 << 1;
    /// Features at or above this value are unknown to this version.
    pub const UNKNOWN: u64 = 1 << 2;
}

pub fn write_u64_le<W: Write>(value: u64, output: &mut W) -> Result<(), FstError> {
    output.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_u64_le<R: Read>(input: &mut R) -> Result<u64, FstError> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FstError::Truncated
        } else {
            FstError::Io(e)
        }
    })?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a four-byte magic followed by a little-endian feature word.
pub fn write_header<W: Write>(
    magic: &[u8; 4],
    features: u64,
    output: &mut W,
) -> Result<(), FstError> {
    output.write_all(magic)?;
    write_u64_le(features, output)
}

/// Read and validate a header, returning the feature word.
///
/// Unknown feature bits make the file unloadable by this version.
pub fn read_header<R: Read>(
    magic: &[u8; 4],
    unknown_from: u64,
    input: &mut R,
) -> Result<u64, FstError> {
    let mut found = [0u8; 4];
    input.read_exact(&mut found).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FstError::Truncated
        } else {
            FstError::Io(e)
        }
    })?;
    if found != *magic {
        return Err(FstError::InvalidMagic(found));
    }
    let features = read_u64_le(input)?;
    if features >= unknown_from {
        return Err(FstError::UnknownFeatures(features));
    }
    Ok(features)
}
