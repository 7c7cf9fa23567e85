//! Sequential binary cursor over an immutable byte range.
//!
//! The cursor only moves forward. All multi-byte integers and floats on the
//! wire are big-endian. Reads that would cross the end of the range fail with
//! `OutOfRange`; nothing is ever silently truncated.

use treeline_common::{Result, error::Error};

/// Flag bit of the 4-byte framing count field: when set, the remaining 31 bits
/// carry a byte count and a 2-byte version follows.
pub const BYTE_COUNT_FLAG: u32 = 0x8000_0000;

/// Result of reading a version/byte-count framing header.
///
/// The wire carries one of two forms and both decode to this shape:
/// a 4-byte count with the top bit set, followed by a 2-byte version, or a
/// left-padded plain 2-byte version with no byte count. The ambiguity is
/// structural to the format and preserved exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionHeader {
    /// Framed byte length, counted from just after the 4-byte count field.
    /// `None` when the wire carried only a bare version.
    pub byte_count: Option<u32>,
    pub version: u16,
}

impl VersionHeader {
    /// Position just past the framed structure, given the position at which
    /// the header itself started.
    pub fn end_position(&self, start: usize) -> Option<usize> {
        self.byte_count.map(|count| start + 4 + count as usize)
    }
}

/// Position-tracking reader over one partition's decompressed bytes.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    context: String,
}

macro_rules! impl_read_be {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
            Ok(<$ty>::from_be_bytes(bytes.try_into().expect("sized read")))
        }
    };
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor {
            data,
            pos: 0,
            context: String::new(),
        }
    }

    /// Creates a cursor carrying a diagnostic context (column and partition
    /// identity) that is attached to every error it produces.
    pub fn with_context(data: &'a [u8], context: impl Into<String>) -> Cursor<'a> {
        Cursor {
            data,
            pos: 0,
            context: context.into(),
        }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Reads `count` bytes, advancing the cursor.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(self.out_of_range(count));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Advances the cursor without touching the bytes.
    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Reads the next 4 bytes as a big-endian `u32` without advancing.
    #[inline]
    pub fn peek_u32(&self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(self.out_of_range(4));
        }
        let bytes = &self.data[self.pos..self.pos + 4];
        Ok(u32::from_be_bytes(bytes.try_into().expect("sized peek")))
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    impl_read_be!(read_u16, u16);
    impl_read_be!(read_i16, i16);
    impl_read_be!(read_u32, u32);
    impl_read_be!(read_i32, i32);
    impl_read_be!(read_u64, u64);
    impl_read_be!(read_i64, i64);
    impl_read_be!(read_f32, f32);
    impl_read_be!(read_f64, f64);

    /// Reads a length-prefixed byte string: one length byte, where the value
    /// 255 escapes to a 4-byte big-endian length.
    pub fn read_length_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let short_len = self.read_u8()?;
        let len = if short_len == 255 {
            self.read_u32()? as usize
        } else {
            short_len as usize
        };
        self.read_bytes(len)
    }

    /// Reads a length-prefixed string.
    ///
    /// Text decoding policy: valid UTF-8 decodes as-is; otherwise every byte
    /// maps to the Unicode scalar of equal value (ISO-8859-1 style). Either
    /// way the mapping is byte-for-byte reversible and never drops bytes.
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        Ok(decode_text(self.read_length_prefixed_bytes()?))
    }

    /// Reads bytes up to (but not including) a NUL terminator, consuming the
    /// terminator. Fails with `MalformedStream` if the range ends first.
    pub fn read_c_string(&mut self) -> Result<String> {
        let start = self.pos;
        match self.data[self.pos..].iter().position(|&b| b == 0) {
            Some(nul) => {
                let bytes = &self.data[start..start + nul];
                self.pos = start + nul + 1;
                Ok(decode_text(bytes))
            }
            None => Err(Error::malformed_stream(
                start,
                &self.context,
                "NUL terminator not found before end of range",
            )),
        }
    }

    /// Decodes one truncated-precision float stored in 4 raw bytes.
    ///
    /// Two algorithms, selected by the declared value range:
    ///
    /// * linear (`low < high`): the low `n_bits` bits of a big-endian `u32`
    ///   rescaled into `[low, high]`;
    /// * unbounded (`low == high == 0`): a 16-bit biased-exponent word
    ///   followed by a 16-bit mantissa word holding `n_bits` mantissa bits,
    ///   with the sign flag at bit `n_bits` (the top truncated bit).
    ///
    /// When `n_bits` is zero the family default applies: 12 bits for the
    /// half-precision family, 32 for the wide family.
    pub fn read_truncated_float(
        &mut self,
        low: f64,
        high: f64,
        n_bits: u32,
        half_precision: bool,
    ) -> Result<f64> {
        let bits = match n_bits {
            0 if half_precision => 12,
            0 => 32,
            n => n.min(32),
        };
        if low == 0.0 && high == 0.0 {
            let exponent = self.read_u16()? as u32;
            let mantissa = self.read_u16()? as u32;
            let mask = (1u32 << bits.min(23)) - 1;
            let ix = (exponent << 23) | ((mantissa & mask) << (23 - bits.min(23)));
            let mut value = f32::from_bits(ix);
            if mantissa & (1 << bits.min(23)) != 0 {
                value = -value;
            }
            Ok(value as f64)
        } else {
            let raw = self.read_u32()?;
            let raw = if bits < 32 { raw & ((1 << bits) - 1) } else { raw };
            Ok(low + (raw as f64) * (high - low) / (1u64 << bits) as f64)
        }
    }

    /// Reads a version/byte-count framing header.
    ///
    /// Reads a 4-byte count field. If its top bit is set, the remaining 31
    /// bits are the framed byte count and a 2-byte version follows. Otherwise
    /// the 4 bytes were themselves a left-padded 2-byte version and no byte
    /// count is known.
    pub fn read_versioned_header(&mut self) -> Result<VersionHeader> {
        let word = self.read_u32()?;
        if word & BYTE_COUNT_FLAG != 0 {
            let version = self.read_u16()?;
            Ok(VersionHeader {
                byte_count: Some(word & !BYTE_COUNT_FLAG),
                version,
            })
        } else {
            Ok(VersionHeader {
                byte_count: None,
                version: word as u16,
            })
        }
    }

    /// Validates that the cursor consumed exactly the declared framed length.
    ///
    /// This is the format's built-in corruption detector; it must be called
    /// whenever a header carried a byte count. `trail` is the decoder nesting
    /// breadcrumb, outermost first.
    pub fn check_framed_length(
        &self,
        start: usize,
        header: &VersionHeader,
        trail: &[String],
    ) -> Result<()> {
        let Some(count) = header.byte_count else {
            return Ok(());
        };
        let declared = count as u64 + 4;
        let observed = (self.pos - start) as u64;
        if declared != observed {
            return Err(Error::framing_mismatch(declared, observed, trail));
        }
        Ok(())
    }

    #[cold]
    fn out_of_range(&self, requested: usize) -> Error {
        Error::out_of_range(self.pos, requested, self.data.len(), &self.context)
    }
}

/// Decodes raw bytes as text: strict UTF-8 when valid, otherwise the
/// ISO-8859-1-style byte-to-scalar mapping, which round-trips every byte.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
