//! Per-partition decode: inputs, temporary arrays and the decode engine.

use std::cmp::Ordering;
use std::ops::Range;

use treeline_common::{Result, error::Error};
use treeline_format::refs::ReferenceTable;
use treeline_format::schema::BasicType;
use treeline_sequence::{offsets::Offsets, values::Values};

use crate::decoder::Decoder;
use crate::value::{ObjectArena, Value};

/// One already-decompressed partition, as supplied by the I/O collaborator.
#[derive(Debug, Clone)]
pub struct PartitionBytes {
    /// The partition's decompressed bytes, exclusively owned by the decode
    /// call that consumes them.
    pub data: Vec<u8>,
    /// Byte position of each row within `data`, when the container recorded
    /// one. May carry a partition-local base; only differences matter.
    pub row_offsets: Option<Offsets>,
    /// The contiguous span of logical rows this partition covers within the
    /// column's total row count.
    pub entry_range: Range<u64>,
}

impl PartitionBytes {
    pub fn new(data: Vec<u8>, entry_range: Range<u64>) -> PartitionBytes {
        PartitionBytes {
            data,
            row_offsets: None,
            entry_range,
        }
    }

    pub fn with_row_offsets(mut self, row_offsets: Offsets) -> PartitionBytes {
        self.row_offsets = Some(row_offsets);
        self
    }
}

/// Mutable state scoped to one top-level decode call.
///
/// Everything here is exclusively owned by the call: the reference table and
/// arena never outlive it and are never shared across concurrent decodes.
#[derive(Debug)]
pub struct DecodeContext {
    pub column: String,
    pub partition: usize,
    pub arena: ObjectArena,
    pub refs: ReferenceTable,
    /// Decoder nesting breadcrumb, outermost first; attached to framing
    /// errors, which only surface deep inside nested containers.
    pub trail: Vec<String>,
    /// Per-row element counts from a companion counter column, when the
    /// caller has one; used to drive and validate row boundaries.
    pub expected_counts: Option<Vec<u64>>,
    /// Arena slots of the objects currently being decoded, innermost last;
    /// resolves self-references (tag 1).
    pub(crate) enclosing: Vec<usize>,
}

impl DecodeContext {
    pub fn new(column: impl Into<String>, partition: usize) -> DecodeContext {
        DecodeContext {
            column: column.into(),
            partition,
            arena: ObjectArena::new(),
            refs: ReferenceTable::new(),
            trail: Vec::new(),
            expected_counts: None,
            enclosing: Vec::new(),
        }
    }

    pub fn with_expected_counts(mut self, counts: Vec<u64>) -> DecodeContext {
        self.expected_counts = Some(counts);
        self
    }

    /// Diagnostic identity attached to every cursor error.
    pub fn wire_context(&self) -> String {
        format!("column '{}', partition {}", self.column, self.partition)
    }

    pub(crate) fn enter(&mut self, name: String) {
        self.trail.push(name);
    }

    pub(crate) fn leave(&mut self) {
        self.trail.pop();
    }
}

/// Temporary array produced by decoding one partition.
///
/// Owned by the decode call that produced it and consumed by the range
/// assembler; never shared. The nesting mirrors the decoder that produced it.
#[derive(Debug, Clone)]
pub enum BasketArray {
    Fixed(FixedBatch),
    Jagged(JaggedBatch),
    Map(MapBatch),
    Records(RecordBatch),
}

/// Flat fixed-width values in native byte order.
#[derive(Debug, Clone)]
pub struct FixedBatch {
    pub values: Values,
    pub basic_type: BasicType,
}

/// Variable-length items: offsets into a flattened content array.
#[derive(Debug, Clone)]
pub struct JaggedBatch {
    pub offsets: Offsets,
    pub content: Box<BasketArray>,
}

/// Map items: offsets delimiting each map's span within parallel, key-sorted
/// key/value content arrays.
#[derive(Debug, Clone)]
pub struct MapBatch {
    pub offsets: Offsets,
    pub keys: Box<BasketArray>,
    pub values: Box<BasketArray>,
}

/// Opaque sequence of decoded records plus the arena owning any objects they
/// reference.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub rows: Vec<Value>,
    pub arena: ObjectArena,
}

/// Expands to `$body` with `$t` bound to the native Rust type of a
/// [`BasicType`]. Booleans are stored as `u8` (0 or 1).
macro_rules! with_basic_type {
    ($bt:expr, $t:ident => $body:expr) => {
        match $bt {
            BasicType::Bool | BasicType::UInt8 => {
                type $t = u8;
                $body
            }
            BasicType::Int8 => {
                type $t = i8;
                $body
            }
            BasicType::Int16 => {
                type $t = i16;
                $body
            }
            BasicType::UInt16 => {
                type $t = u16;
                $body
            }
            BasicType::Int32 => {
                type $t = i32;
                $body
            }
            BasicType::UInt32 => {
                type $t = u32;
                $body
            }
            BasicType::Int64 => {
                type $t = i64;
                $body
            }
            BasicType::UInt64 => {
                type $t = u64;
                $body
            }
            BasicType::Float32 => {
                type $t = f32;
                $body
            }
            BasicType::Float64 => {
                type $t = f64;
                $body
            }
        }
    };
}
pub(crate) use with_basic_type;

/// Total order over same-typed primitive slices, `total_cmp` for floats.
pub(crate) trait ItemOrd {
    fn item_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! impl_item_ord {
    (int: $($ty:ty),*) => {
        $(impl ItemOrd for $ty {
            #[inline]
            fn item_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }
        })*
    };
    (float: $($ty:ty),*) => {
        $(impl ItemOrd for $ty {
            #[inline]
            fn item_cmp(&self, other: &Self) -> Ordering {
                self.total_cmp(other)
            }
        })*
    };
}

impl_item_ord!(int: u8, i8, u16, i16, u32, i32, u64, i64);
impl_item_ord!(float: f32, f64);

impl BasketArray {
    /// Number of leaf items (not rows; a fixed decoder with trailing
    /// dimensions stores several items per row).
    pub fn item_count(&self) -> usize {
        match self {
            BasketArray::Fixed(batch) => batch.values.bytes_len() / batch.basic_type.size(),
            BasketArray::Jagged(batch) => batch.offsets.item_count(),
            BasketArray::Map(batch) => batch.offsets.item_count(),
            BasketArray::Records(batch) => batch.rows.len(),
        }
    }

    /// Appends another batch of the same structure.
    ///
    /// Jagged offsets accumulate as lengths, so the result stays zero-based;
    /// record arenas are merged with reference rebasing.
    pub fn append(&mut self, other: BasketArray) {
        match (self, other) {
            (BasketArray::Fixed(this), BasketArray::Fixed(other)) => {
                debug_assert_eq!(this.basic_type, other.basic_type);
                this.values.extend_from_values(&other.values);
            }
            (BasketArray::Jagged(this), BasketArray::Jagged(other)) => {
                this.offsets.extend_with_lengths(other.offsets.lengths());
                this.content.append(*other.content);
            }
            (BasketArray::Map(this), BasketArray::Map(other)) => {
                this.offsets.extend_with_lengths(other.offsets.lengths());
                this.keys.append(*other.keys);
                this.values.append(*other.values);
            }
            (BasketArray::Records(this), BasketArray::Records(other)) => {
                let offset = this.arena.merge(other.arena);
                let mut rows = other.rows;
                if offset > 0 {
                    rows.iter_mut().for_each(|row| row.shift_refs(offset));
                }
                this.rows.extend(rows);
            }
            _ => unreachable!("mismatched basket structure"),
        }
    }

    /// Copies the items selected by `indices`, in order.
    ///
    /// Self-describing: fixed item width comes from the stored basic type,
    /// jagged selection recurses with the expanded content indices.
    pub(crate) fn gather(&self, indices: &[usize]) -> BasketArray {
        match self {
            BasketArray::Fixed(batch) => {
                let width = batch.basic_type.size();
                let bytes = batch.values.as_bytes();
                let mut values = Values::with_capacity::<u8>(indices.len() * width);
                for &index in indices {
                    values.extend_from_slice(&bytes[index * width..(index + 1) * width]);
                }
                BasketArray::Fixed(FixedBatch {
                    values,
                    basic_type: batch.basic_type,
                })
            }
            BasketArray::Jagged(batch) => {
                let (offsets, expanded) = gather_offsets(&batch.offsets, indices);
                BasketArray::Jagged(JaggedBatch {
                    offsets,
                    content: Box::new(batch.content.gather(&expanded)),
                })
            }
            BasketArray::Map(batch) => {
                let (offsets, expanded) = gather_offsets(&batch.offsets, indices);
                BasketArray::Map(MapBatch {
                    offsets,
                    keys: Box::new(batch.keys.gather(&expanded)),
                    values: Box::new(batch.values.gather(&expanded)),
                })
            }
            BasketArray::Records(batch) => BasketArray::Records(RecordBatch {
                rows: indices.iter().map(|&i| batch.rows[i].clone()).collect(),
                arena: batch.arena.clone(),
            }),
        }
    }

    /// Total order over two items of this batch; elementwise for nested
    /// structures, then by length.
    pub(crate) fn compare_items(&self, a: usize, b: usize) -> Ordering {
        match self {
            BasketArray::Fixed(batch) => with_basic_type!(batch.basic_type, T => {
                let values = batch.values.as_slice::<T>();
                values[a].item_cmp(&values[b])
            }),
            BasketArray::Jagged(batch) => {
                let ra = batch.offsets.range_at(a);
                let rb = batch.offsets.range_at(b);
                self.compare_item_ranges(&batch.content, ra, rb)
            }
            BasketArray::Map(batch) => {
                let ra = batch.offsets.range_at(a);
                let rb = batch.offsets.range_at(b);
                self.compare_item_ranges(&batch.keys, ra.clone(), rb.clone())
                    .then_with(|| self.compare_item_ranges(&batch.values, ra, rb))
            }
            BasketArray::Records(batch) => batch.rows[a].total_cmp(&batch.rows[b]),
        }
    }

    fn compare_item_ranges(
        &self,
        content: &BasketArray,
        a: Range<u64>,
        b: Range<u64>,
    ) -> Ordering {
        let base = self.content_base();
        let a = (a.start - base) as usize..(a.end - base) as usize;
        let b = (b.start - base) as usize..(b.end - base) as usize;
        for (x, y) in a.clone().zip(b.clone()) {
            match content.compare_items(x, y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }

    fn content_base(&self) -> u64 {
        match self {
            BasketArray::Jagged(batch) => batch.offsets.first(),
            BasketArray::Map(batch) => batch.offsets.first(),
            _ => 0,
        }
    }

    /// Copies the decode call's arena into every record batch, once decoding
    /// has finished.
    pub(crate) fn attach_arena(&mut self, arena: &ObjectArena) {
        match self {
            BasketArray::Fixed(_) => {}
            BasketArray::Jagged(batch) => batch.content.attach_arena(arena),
            BasketArray::Map(batch) => {
                batch.keys.attach_arena(arena);
                batch.values.attach_arena(arena);
            }
            BasketArray::Records(batch) => batch.arena = arena.clone(),
        }
    }
}

/// Rebuilds a zero-based offsets table for the selected items and expands the
/// selection to content item indices.
fn gather_offsets(offsets: &Offsets, indices: &[usize]) -> (Offsets, Vec<usize>) {
    let base = offsets.first();
    let mut gathered = Offsets::with_capacity(indices.len());
    let mut expanded = Vec::new();
    for &index in indices {
        let range = offsets.range_at(index);
        gathered.push_length((range.end - range.start) as usize);
        expanded.extend(((range.start - base) as usize)..((range.end - base) as usize));
    }
    (gathered, expanded)
}

/// Decodes one partition with the given decoder.
///
/// A pure function of its inputs: partitions may be decoded in any order and
/// concurrently, each call owning its own context, reference table and arena.
pub fn decode_basket(
    decoder: &Decoder,
    basket: &PartitionBytes,
    column: &str,
    partition: usize,
) -> Result<BasketArray> {
    let mut ctx = DecodeContext::new(column, partition);
    decode_basket_with(decoder, basket, &mut ctx)
}

/// Like [`decode_basket`], with a caller-prepared context (counter-column
/// counts, custom diagnostics).
pub fn decode_basket_with(
    decoder: &Decoder,
    basket: &PartitionBytes,
    ctx: &mut DecodeContext,
) -> Result<BasketArray> {
    let array = decoder.basket_array(&basket.data, basket.row_offsets.as_ref(), ctx)?;
    if let Some(row_offsets) = &basket.row_offsets {
        let rows = array.item_count();
        // For fixed-width decoders items outnumber rows; the offsets table
        // is only required to agree for self-describing layouts.
        if !matches!(decoder, Decoder::Fixed(_) | Decoder::TruncatedFloat(_))
            && rows != row_offsets.item_count()
        {
            return Err(Error::malformed_stream(
                basket.data.len(),
                ctx.wire_context(),
                format!(
                    "row offsets declare {} rows, decoded {}",
                    row_offsets.item_count(),
                    rows
                ),
            ));
        }
    }
    Ok(array)
}
