//! Shared leaf types for the ltk finite-state toolkit.
//!
//! This crate holds the primitives that every other layer agrees on:
//!
//! - [`symbol`] -- integer symbol codes and iteration over tagged text
//! - [`case`] -- per-character case mapping and surface-case detection

pub mod case;
pub mod symbol;

pub use symbol::Symbol;
