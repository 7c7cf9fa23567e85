//! Interpretation of raw partition bytes into typed arrays.
//!
//! This crate holds the decoder family, the per-partition decode engine and
//! the row-range assembler. Reading a column is a two-phase pipeline:
//!
//! 1. [`basket::decode_basket`] applies a [`decoder::Decoder`] to one
//!    partition's decompressed bytes, producing a temporary
//!    [`basket::BasketArray`]. Each call is a pure function of its inputs and
//!    partitions can be decoded in any order, on any thread.
//! 2. [`assemble::final_array`] trims and stitches the temporary arrays
//!    overlapping a requested row range into one logically contiguous array,
//!    handed to an [`adapter::OutputAdapter`] for the caller's representation.
//!
//! Decoders are immutable, hashable values constructed once per column and
//! reused for every partition and row range.

pub mod adapter;
pub mod assemble;
pub mod basket;
pub mod build;
pub mod containers;
pub mod decoder;
pub mod fixed;
pub mod grouped;
pub mod record;
pub mod strings;
pub mod truncated;
pub mod value;

#[cfg(test)]
mod tests;
