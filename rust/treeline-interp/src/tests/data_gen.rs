//! Wire-format writers for the test suite.
//!
//! The core is read-only; these helpers exist so tests can craft partition
//! bytes in the exact on-wire layout the decoders expect.

use std::ops::Range;

use treeline_format::cursor::BYTE_COUNT_FLAG;

use crate::basket::PartitionBytes;

/// Big-endian byte writer with framed-structure support.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> WireWriter {
        WireWriter::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes a 1-or-5-byte length prefix followed by the payload.
    pub fn str_prefixed(&mut self, payload: &[u8]) -> &mut Self {
        if payload.len() < 255 {
            self.buf.push(payload.len() as u8);
        } else {
            self.buf.push(255);
            self.buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(payload);
        self
    }

    /// Opens a version/byte-count frame; returns the token to pass to
    /// [`end_frame`](Self::end_frame) once the framed content is written.
    pub fn begin_frame(&mut self, version: u16) -> usize {
        let at = self.buf.len();
        self.buf.extend_from_slice(&[0; 4]);
        self.buf.extend_from_slice(&version.to_be_bytes());
        at
    }

    /// Closes a frame, back-patching the byte count (which excludes the
    /// count word itself).
    pub fn end_frame(&mut self, at: usize) {
        let count = (self.buf.len() - at - 4) as u32;
        self.buf[at..at + 4].copy_from_slice(&(BYTE_COUNT_FLAG | count).to_be_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A basket of big-endian `i32` values.
pub fn i32_basket(values: &[i32]) -> Vec<u8> {
    let mut w = WireWriter::new();
    for &value in values {
        w.i32(value);
    }
    w.finish()
}

/// A basket of `vector<int32_t>` rows: framed header, count, elements.
pub fn vector_i32_basket(rows: &[Vec<i32>]) -> Vec<u8> {
    let mut w = WireWriter::new();
    for row in rows {
        let frame = w.begin_frame(1);
        w.u32(row.len() as u32);
        for &value in row {
            w.i32(value);
        }
        w.end_frame(frame);
    }
    w.finish()
}

/// A basket of string rows with the 1-or-5-byte prefix.
pub fn string_basket(rows: &[&[u8]]) -> Vec<u8> {
    let mut w = WireWriter::new();
    for row in rows {
        w.str_prefixed(row);
    }
    w.finish()
}

pub fn partition(data: Vec<u8>, entry_range: Range<u64>) -> PartitionBytes {
    PartitionBytes::new(data, entry_range)
}
