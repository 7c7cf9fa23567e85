//! Fixed-width numeric decoding.

use treeline_common::{Result, error::Error};
use treeline_format::cursor::Cursor;
use treeline_format::schema::BasicType;
use treeline_sequence::values::Values;

use crate::basket::{BasketArray, DecodeContext, FixedBatch, with_basic_type};

/// Decoder for fixed-width numeric columns, possibly with fixed trailing
/// dimensions declared in the column title (e.g. `[10]` for a length-10
/// sub-array per row).
///
/// Wire values are big-endian; decoded storage is native byte order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsFixed {
    basic_type: BasicType,
    dims: Vec<usize>,
}

impl AsFixed {
    pub fn new(basic_type: BasicType) -> AsFixed {
        AsFixed {
            basic_type,
            dims: Vec::new(),
        }
    }

    pub fn with_dims(basic_type: BasicType, dims: Vec<usize>) -> AsFixed {
        AsFixed { basic_type, dims }
    }

    /// Builds the decoder with trailing dimensions parsed from the column
    /// title. Only literal bracketed integers count; a bracketed counter
    /// name (`[n]`) declares variable length and contributes no dimension.
    pub fn from_title(basic_type: BasicType, title: &str) -> AsFixed {
        AsFixed {
            basic_type,
            dims: parse_title_dims(title),
        }
    }

    pub fn basic_type(&self) -> BasicType {
        self.basic_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Leaf elements per row: the product of the trailing dimensions.
    pub fn items_per_row(&self) -> usize {
        self.dims.iter().product()
    }

    /// Wire bytes per row.
    pub fn item_width(&self) -> usize {
        self.basic_type.size() * self.items_per_row()
    }

    pub fn cache_key(&self) -> String {
        let mut key = format!("fixed({}", self.basic_type.code());
        for dim in &self.dims {
            key.push_str(&format!("[{dim}]"));
        }
        key.push(')');
        key
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        let width = self.item_width();
        let remaining = cursor.remaining();
        if remaining % width != 0 {
            return Err(Error::malformed_stream(
                cursor.pos(),
                ctx.wire_context(),
                format!("{remaining} bytes do not divide into {width}-byte rows"),
            ));
        }
        self.read_bulk(cursor, remaining / self.basic_type.size())
    }

    /// Reads `count` elements back-to-back, converting to native byte order.
    pub(crate) fn read_bulk(&self, cursor: &mut Cursor<'_>, count: usize) -> Result<BasketArray> {
        let mut values = Values::with_capacity::<u8>(count * self.basic_type.size());
        with_basic_type!(self.basic_type, T => {
            let bytes = cursor.read_bytes(count * std::mem::size_of::<T>())?;
            for chunk in bytes.chunks_exact(std::mem::size_of::<T>()) {
                values.push(T::from_be_bytes(chunk.try_into().expect("sized chunk")));
            }
        });
        Ok(BasketArray::Fixed(FixedBatch {
            values,
            basic_type: self.basic_type,
        }))
    }
}

/// Extracts literal bracketed dimensions from a column title.
fn parse_title_dims(title: &str) -> Vec<usize> {
    let mut dims = Vec::new();
    let mut rest = title;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let inner = &rest[open + 1..open + close];
        if let Ok(dim) = inner.trim().parse::<usize>() {
            dims.push(dim);
        }
        rest = &rest[open + close + 1..];
    }
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(decoder: &AsFixed, data: &[u8]) -> BasketArray {
        let mut cursor = Cursor::new(data);
        let mut ctx = DecodeContext::new("col", 0);
        decoder.decode_rows(&mut cursor, &mut ctx).unwrap()
    }

    #[test]
    fn round_trips_every_numeric_type() {
        macro_rules! case {
            ($bt:expr, $ty:ty, $values:expr) => {{
                let expected: Vec<$ty> = $values;
                let mut data = Vec::new();
                for v in &expected {
                    data.extend_from_slice(&v.to_be_bytes());
                }
                let array = decode(&AsFixed::new($bt), &data);
                match array {
                    BasketArray::Fixed(batch) => {
                        assert_eq!(batch.values.as_slice::<$ty>(), expected.as_slice());
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }};
        }
        case!(BasicType::Int8, i8, vec![-1, 0, 127]);
        case!(BasicType::UInt16, u16, vec![0, 0xbeef, u16::MAX]);
        case!(BasicType::Int32, i32, vec![i32::MIN, -7, 42]);
        case!(BasicType::UInt64, u64, vec![u64::MAX, 1]);
        case!(BasicType::Float32, f32, vec![1.5, -0.0, f32::MIN_POSITIVE]);
        case!(BasicType::Float64, f64, vec![std::f64::consts::PI, -1e300]);
    }

    #[test]
    fn title_dims_shape_rows() {
        let decoder = AsFixed::from_title(BasicType::Int16, "matrix[2][3]/S");
        assert_eq!(decoder.dims(), &[2, 3]);
        assert_eq!(decoder.items_per_row(), 6);
        assert_eq!(decoder.item_width(), 12);

        // A counter-style title declares no fixed dimension.
        let jagged = AsFixed::from_title(BasicType::Float32, "hits[nhits]/F");
        assert_eq!(jagged.dims(), &[] as &[usize]);
    }

    #[test]
    fn partial_row_is_malformed() {
        let decoder = AsFixed::new(BasicType::Int32);
        let mut cursor = Cursor::new(&[0u8; 6]);
        let mut ctx = DecodeContext::new("col", 3);
        let err = decoder.decode_rows(&mut cursor, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("6 bytes"));
    }

    #[test]
    fn cache_key_is_content_addressed() {
        assert_eq!(AsFixed::new(BasicType::Int32).cache_key(), "fixed(i4)");
        assert_eq!(
            AsFixed::with_dims(BasicType::Float64, vec![10]).cache_key(),
            "fixed(f8[10])"
        );
    }
}
