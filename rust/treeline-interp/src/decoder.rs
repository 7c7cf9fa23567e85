//! The decoder family.
//!
//! [`Decoder`] is a closed union over the decode strategies; dispatch is by
//! pattern matching, so no state can leak between variants. Decoders are
//! immutable, hashable values: they are constructed once per column (from a
//! parsed type descriptor or the column's declared leaf type) and reused
//! across every partition and row-range request. Identity matters: the cache
//! key is stable and content-addressed, so external result caches can key on
//! it directly.

use std::collections::BTreeMap;
use std::ops::Range;

use treeline_common::{Result, error::Error};
use treeline_format::cursor::Cursor;
use treeline_format::schema::BasicType;
use treeline_sequence::offsets::Offsets;

use crate::adapter::OutputAdapter;
use crate::basket::{BasketArray, DecodeContext, FixedBatch, JaggedBatch, MapBatch, RecordBatch};
use crate::containers::{AsMap, AsSet, AsVector};
use crate::fixed::AsFixed;
use crate::grouped::AsGrouped;
use crate::record::AsRecord;
use crate::strings::AsString;
use crate::truncated::AsTruncatedFloat;
use crate::value::ObjectArena;

/// Decode strategy for one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Decoder {
    /// Fixed-width numeric values, possibly multi-dimensional.
    Fixed(AsFixed),
    /// Truncated-precision floats (Float16/Double32 families).
    TruncatedFloat(AsTruncatedFloat),
    /// Length-prefixed strings.
    String(AsString),
    /// `vector<T>` / `bitset<N>`.
    Vector(AsVector),
    /// `set<T>`, value-sorted.
    Set(AsSet),
    /// `map<K,V>`, key-sorted, last-wins duplicates.
    Map(AsMap),
    /// Schema-driven record type.
    Record(AsRecord),
    /// Struct-of-columns grouping; never decodes bytes itself.
    Grouped(AsGrouped),
}

/// Predicted output layout of a decoder, for collaborators that need the
/// shape without decoding (schema introspection, empty-array construction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Flat fixed-width items with optional fixed trailing dimensions.
    Item {
        basic_type: BasicType,
        dims: Vec<usize>,
    },
    /// Variable-length items over a flattened content array.
    Jagged(Box<Shape>),
    /// Key-sorted maps over parallel key/value content arrays.
    Map(Box<Shape>, Box<Shape>),
    /// Opaque record sequence.
    Record(String),
    /// Grouping; readable only through the named sub-columns.
    Grouped(Vec<String>),
}

impl Decoder {
    /// Canonical type-descriptor text, used for diagnostics and schema
    /// introspection.
    pub fn type_name(&self) -> String {
        match self {
            Decoder::Fixed(d) => d.basic_type().canonical_name().to_string(),
            Decoder::TruncatedFloat(d) => d.type_name().to_string(),
            Decoder::String(_) => "string".to_string(),
            Decoder::Vector(d) => d.type_name().to_string(),
            Decoder::Set(d) => d.type_name().to_string(),
            Decoder::Map(d) => d.type_name().to_string(),
            Decoder::Record(d) => d.type_name(),
            Decoder::Grouped(d) => d.name().to_string(),
        }
    }

    /// Stable, content-addressed key: equal decoders produce equal keys, so
    /// `(cache_key, column, row range)` identifies a decode result.
    pub fn cache_key(&self) -> String {
        match self {
            Decoder::Fixed(d) => d.cache_key(),
            Decoder::TruncatedFloat(d) => d.cache_key(),
            Decoder::String(d) => d.cache_key(),
            Decoder::Vector(d) => d.cache_key(),
            Decoder::Set(d) => d.cache_key(),
            Decoder::Map(d) => d.cache_key(),
            Decoder::Record(d) => d.cache_key(),
            Decoder::Grouped(d) => d.cache_key(),
        }
    }

    /// Declared wire bytes per row for fixed-width decoders; `None` when
    /// variable-length.
    pub fn item_width(&self) -> Option<usize> {
        match self {
            Decoder::Fixed(d) => Some(d.item_width()),
            Decoder::TruncatedFloat(_) => Some(4),
            _ => None,
        }
    }

    pub fn logical_shape(&self) -> Shape {
        match self {
            Decoder::Fixed(d) => Shape::Item {
                basic_type: d.basic_type(),
                dims: d.dims().to_vec(),
            },
            Decoder::TruncatedFloat(_) => Shape::Item {
                basic_type: BasicType::Float64,
                dims: Vec::new(),
            },
            Decoder::String(_) => Shape::Jagged(Box::new(Shape::Item {
                basic_type: BasicType::UInt8,
                dims: Vec::new(),
            })),
            Decoder::Vector(d) => Shape::Jagged(Box::new(d.inner().logical_shape())),
            Decoder::Set(d) => Shape::Jagged(Box::new(d.inner().logical_shape())),
            Decoder::Map(d) => Shape::Map(
                Box::new(d.key().logical_shape()),
                Box::new(d.value().logical_shape()),
            ),
            Decoder::Record(d) => Shape::Record(d.name().to_string()),
            Decoder::Grouped(d) => {
                Shape::Grouped(d.sub_column_names().map(|n| n.to_string()).collect())
            }
        }
    }

    /// Decodes one partition's raw bytes into a temporary array.
    ///
    /// A pure function of its inputs: it never reads beyond `data`, and the
    /// only mutation is of the context's per-call reference table and arena.
    /// When `row_offsets` is absent, variable-length decoders derive row
    /// boundaries from the context's counter-column counts or by scanning
    /// the stream until it is exhausted.
    pub fn basket_array(
        &self,
        data: &[u8],
        row_offsets: Option<&Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        if let Decoder::Grouped(grouped) = self {
            return Err(grouped.not_directly_readable());
        }
        let mut cursor = Cursor::with_context(data, ctx.wire_context());
        let mut array = match self {
            Decoder::Fixed(d) => d.decode_rows(&mut cursor, ctx)?,
            Decoder::TruncatedFloat(d) => d.decode_rows(&mut cursor, ctx)?,
            Decoder::String(d) => d.decode_rows(&mut cursor, row_offsets, ctx)?,
            Decoder::Vector(d) => d.decode_rows(&mut cursor, row_offsets, ctx)?,
            Decoder::Set(d) => d.decode_rows(&mut cursor, row_offsets, ctx)?,
            Decoder::Map(d) => d.decode_rows(&mut cursor, row_offsets, ctx)?,
            Decoder::Record(d) => d.decode_rows(&mut cursor, row_offsets, ctx)?,
            Decoder::Grouped(_) => unreachable!("rejected above"),
        };
        if cursor.remaining() != 0 {
            return Err(Error::malformed_stream(
                cursor.pos(),
                ctx.wire_context(),
                format!("{} trailing bytes after the last row", cursor.remaining()),
            ));
        }
        if !ctx.arena.is_empty() {
            array.attach_arena(&ctx.arena);
        }
        Ok(array)
    }

    /// Reads `count` elements back-to-back (the row-less bulk read used for
    /// container elements).
    pub(crate) fn read_bulk(
        &self,
        cursor: &mut Cursor<'_>,
        count: usize,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        match self {
            Decoder::Fixed(d) => d.read_bulk(cursor, count * d.items_per_row()),
            Decoder::TruncatedFloat(d) => d.read_bulk(cursor, count),
            Decoder::String(d) => d.read_bulk(cursor, count),
            Decoder::Vector(d) => d.read_bulk(cursor, count, ctx),
            Decoder::Set(d) => d.read_bulk(cursor, count, ctx),
            Decoder::Map(d) => d.read_bulk(cursor, count, ctx),
            Decoder::Record(d) => d.read_bulk(cursor, count, ctx),
            Decoder::Grouped(d) => Err(d.not_directly_readable()),
        }
    }

    /// An empty temporary array of this decoder's static structure.
    pub(crate) fn empty_basket(&self) -> BasketArray {
        match self {
            Decoder::Fixed(d) => BasketArray::Fixed(FixedBatch {
                values: Default::default(),
                basic_type: d.basic_type(),
            }),
            Decoder::TruncatedFloat(_) => BasketArray::Fixed(FixedBatch {
                values: Default::default(),
                basic_type: BasicType::Float64,
            }),
            Decoder::String(_) => BasketArray::Jagged(JaggedBatch {
                offsets: Offsets::new(),
                content: Box::new(BasketArray::Fixed(FixedBatch {
                    values: Default::default(),
                    basic_type: BasicType::UInt8,
                })),
            }),
            Decoder::Vector(d) => BasketArray::Jagged(JaggedBatch {
                offsets: Offsets::new(),
                content: Box::new(d.inner().empty_basket()),
            }),
            Decoder::Set(d) => BasketArray::Jagged(JaggedBatch {
                offsets: Offsets::new(),
                content: Box::new(d.inner().empty_basket()),
            }),
            Decoder::Map(d) => BasketArray::Map(MapBatch {
                offsets: Offsets::new(),
                keys: Box::new(d.key().empty_basket()),
                values: Box::new(d.value().empty_basket()),
            }),
            // Grouped is rejected before any decode path could ask for this.
            Decoder::Record(_) | Decoder::Grouped(_) => BasketArray::Records(RecordBatch {
                rows: Vec::new(),
                arena: ObjectArena::new(),
            }),
        }
    }

    /// Combines per-partition temporary arrays into one array covering
    /// `row_range`. See [`crate::assemble::final_array`].
    pub fn final_array<A: OutputAdapter>(
        &self,
        baskets: BTreeMap<usize, BasketArray>,
        row_range: Range<u64>,
        entry_ranges: &[Range<u64>],
        adapter: &A,
    ) -> Result<A::Array> {
        crate::assemble::final_array(self, baskets, row_range, entry_ranges, adapter)
    }
}
