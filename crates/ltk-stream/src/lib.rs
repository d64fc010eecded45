//! Stream-processing engine for letter transducers.
//!
//! Drives a compiled dictionary over the tagged text stream used by the
//! translation pipeline:
//!
//! - [`buffer`] -- fixed-size ring of symbol codes with bounded rewind
//! - [`input`] -- character reader with pushback and block/blank readers
//! - [`state`] -- multi-path traversal state over an executable transducer
//! - [`processor`] -- the mode-shared lower layer and configuration
//! - one module per operating mode: [`analysis`], [`generation`],
//!   [`bilingual`], [`postgen`], [`tm`], [`sao`]

pub mod analysis;
pub mod bilingual;
pub mod buffer;
pub mod generation;
pub mod input;
pub mod postgen;
pub mod processor;
pub mod sao;
pub mod state;
pub mod tm;

use ltk_fst::FstError;

/// Error type of the stream engine.
///
/// Binary-format problems are fatal; text-stream problems are recoverable
/// at the next token boundary and mostly reported by discarding the token.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fst(#[from] FstError),
    #[error("malformed input stream")]
    MalformedStream,
    #[error("section name '{0}' has no recognized type suffix")]
    UnsupportedSection(String),
    #[error("invalid input encoding")]
    Encoding,
}
