//! Wire-format primitives for the treeline container: the binary cursor,
//! versioned framing headers, truncated-float decoding, back-reference
//! tracking and the basic leaf-type vocabulary.
//!
//! Everything here operates on an already-decompressed, immutable byte range;
//! fetching and decompressing partition bytes is the I/O layer's job and
//! happens before any of this code runs.

pub mod cursor;
pub mod refs;
pub mod schema;
