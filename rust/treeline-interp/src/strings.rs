//! Variable-length string decoding.

use treeline_common::{Result, error::Error};
use treeline_format::cursor::Cursor;
use treeline_format::schema::BasicType;
use treeline_sequence::{offsets::Offsets, values::Values};

use crate::basket::{BasketArray, DecodeContext, FixedBatch, JaggedBatch};

/// Length-prefix flavor of a string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringPrefix {
    /// One length byte; the value 255 escapes to a 4-byte big-endian length.
    #[default]
    OneOrFive,
    /// A plain 4-byte big-endian length.
    FourBytes,
}

/// Decoder for string columns: a length prefix per row followed by raw bytes.
///
/// The temporary array is a byte-offset table over the concatenated payload
/// bytes; text decoding happens at the output adapter's discretion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AsString {
    prefix: StringPrefix,
}

impl AsString {
    pub fn new() -> AsString {
        AsString::default()
    }

    pub fn with_prefix(prefix: StringPrefix) -> AsString {
        AsString { prefix }
    }

    pub fn prefix(&self) -> StringPrefix {
        self.prefix
    }

    pub fn cache_key(&self) -> String {
        match self.prefix {
            StringPrefix::OneOrFive => "string(1p5)".to_string(),
            StringPrefix::FourBytes => "string(4)".to_string(),
        }
    }

    /// Reads one string as text, using the documented byte-reversible
    /// decoding policy.
    pub(crate) fn read_one_string(&self, cursor: &mut Cursor<'_>) -> Result<String> {
        Ok(treeline_format::cursor::decode_text(self.read_row(cursor)?))
    }

    fn read_row<'a>(&self, cursor: &mut Cursor<'a>) -> Result<&'a [u8]> {
        match self.prefix {
            StringPrefix::OneOrFive => cursor.read_length_prefixed_bytes(),
            StringPrefix::FourBytes => {
                let len = cursor.read_u32()? as usize;
                cursor.read_bytes(len)
            }
        }
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        row_offsets: Option<&Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        let mut offsets = Offsets::new();
        let mut content = Values::new();
        let mut row = 0usize;
        loop {
            match row_offsets {
                Some(bounds) => {
                    if row == bounds.item_count() {
                        break;
                    }
                    let expected = (bounds.as_slice()[row] - bounds.first()) as usize;
                    if cursor.pos() != expected {
                        return Err(Error::malformed_stream(
                            cursor.pos(),
                            ctx.wire_context(),
                            format!("row {row} expected to start at byte {expected}"),
                        ));
                    }
                }
                None => {
                    if cursor.remaining() == 0 {
                        break;
                    }
                }
            }
            let bytes = self.read_row(cursor)?;
            offsets.push_length(bytes.len());
            content.extend_from_slice(bytes);
            row += 1;
        }
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(BasketArray::Fixed(FixedBatch {
                values: content,
                basic_type: BasicType::UInt8,
            })),
        }))
    }

    pub(crate) fn read_bulk(&self, cursor: &mut Cursor<'_>, count: usize) -> Result<BasketArray> {
        let mut offsets = Offsets::with_capacity(count);
        let mut content = Values::new();
        for _ in 0..count {
            let bytes = self.read_row(cursor)?;
            offsets.push_length(bytes.len());
            content.extend_from_slice(bytes);
        }
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(BasketArray::Fixed(FixedBatch {
                values: content,
                basic_type: BasicType::UInt8,
            })),
        }))
    }
}
