//! Weighted letter-transducer engine.
//!
//! This crate implements the finite-state core of the toolkit:
//!
//! - [`codec`] -- variable-length integer/double/string binary codec
//! - [`headers`] -- container magics and feature flags
//! - [`alphabet`] -- symbol and symbol-pair interning
//! - [`transducer`] -- mutable builder FST: construction, normalization,
//!   products, binary body I/O
//! - [`exec`] -- read-optimized executable FST with offset-indexed
//!   transitions
//! - [`container`] -- the on-disk set format `{letters, alphabet, named
//!   transducers}`
//! - [`regexp`] -- recursive-descent compiler for the small regexp language

pub mod alphabet;
pub mod codec;
pub mod container;
pub mod exec;
pub mod headers;
pub mod regexp;
pub mod transducer;

/// Error type for binary I/O and transducer construction.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("value {0} does not fit in a variable-length integer")]
    ValueOutOfRange(u64),
    #[error("unexpected end of stream")]
    Truncated,
    #[error("invalid magic number {0:02x?}")]
    InvalidMagic([u8; 4]),
    #[error("file carries unknown feature flags {0:#x}; refusing to load")]
    UnknownFeatures(u64),
    #[error("transducer has an empty set of final states")]
    EmptyFinals,
}
