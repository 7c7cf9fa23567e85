//! Row-range assembly: trimming and stitching per-partition arrays.

use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;

use treeline_common::{Result, error::Error};
use treeline_sequence::{offsets::Offsets, values::Values};

use crate::adapter::OutputAdapter;
use crate::basket::{BasketArray, FixedBatch, JaggedBatch, MapBatch, RecordBatch};
use crate::decoder::Decoder;

/// Combines per-partition temporary arrays into one logically contiguous
/// array covering `row_range`.
///
/// `entry_ranges[i]` is the span of logical rows owned by partition `i`; the
/// spans must tile `[0, total_rows)` in order, without gaps or overlaps.
/// `baskets` maps partition index to its decoded temporary array and must
/// contain every partition overlapping `row_range`; baskets are consumed.
///
/// The output row order is ascending by logical row regardless of the order
/// in which partitions were decoded or supplied. An empty `row_range` yields
/// a zero-length array of the decoder's static shape, never an error. For
/// fixed-width decoders trimming is a byte-range copy; for offset-indexed
/// data a new zero-based offsets table is computed by subtracting each
/// partition's local base and accumulating a running total.
pub fn final_array<A: OutputAdapter>(
    decoder: &Decoder,
    mut baskets: BTreeMap<usize, BasketArray>,
    row_range: Range<u64>,
    entry_ranges: &[Range<u64>],
    adapter: &A,
) -> Result<A::Array> {
    if let Decoder::Grouped(grouped) = decoder {
        return Err(grouped.not_directly_readable());
    }
    if row_range.start > row_range.end {
        return Err(Error::invalid_arg(
            "row_range",
            format!("start {} exceeds stop {}", row_range.start, row_range.end),
        ));
    }
    if row_range.start == row_range.end {
        return adapter.make_empty(&decoder.logical_shape());
    }
    validate_tiling(entry_ranges)?;
    let total = entry_ranges.last().map_or(0, |range| range.end);
    if row_range.end > total {
        return Err(Error::invalid_arg(
            "row_range",
            format!("stop {} exceeds the {total} tiled rows", row_range.end),
        ));
    }

    let mut assembled: Option<BasketArray> = None;
    for (index, range) in entry_ranges.iter().enumerate() {
        if range.end <= row_range.start || range.start >= row_range.end {
            continue;
        }
        let basket = baskets.remove(&index).ok_or_else(|| {
            Error::invalid_arg(
                "baskets",
                format!("partition {index} overlaps the requested rows but was not supplied"),
            )
        })?;
        let row_count = rows_in(decoder, &basket);
        if row_count as u64 != range.end - range.start {
            return Err(Error::invalid_arg(
                "baskets",
                format!(
                    "partition {index} holds {row_count} rows but owns entries {}..{}",
                    range.start, range.end
                ),
            ));
        }
        let local = (row_range.start.max(range.start) - range.start) as usize
            ..(row_range.end.min(range.end) - range.start) as usize;
        let trimmed = if local == (0..row_count) {
            basket
        } else {
            trim_rows(decoder, &basket, local)
        };
        assembled = match assembled {
            None => Some(trimmed),
            Some(mut acc) => {
                acc.append(trimmed);
                Some(acc)
            }
        };
    }

    match assembled {
        Some(array) => {
            debug_assert_eq!(
                rows_in(decoder, &array) as u64,
                row_range.end - row_range.start
            );
            finalize(decoder, array, adapter)
        }
        // Unreachable with a valid tiling, but harmless to answer.
        None => adapter.make_empty(&decoder.logical_shape()),
    }
}

fn validate_tiling(entry_ranges: &[Range<u64>]) -> Result<()> {
    if let Some(first) = entry_ranges.first() {
        treeline_common::verify_arg!(entry_ranges, first.start == 0);
    }
    for range in entry_ranges {
        treeline_common::verify_arg!(entry_ranges, range.start <= range.end);
    }
    for (a, b) in entry_ranges.iter().tuple_windows() {
        if a.end != b.start {
            return Err(Error::invalid_arg(
                "entry_ranges",
                format!(
                    "partitions must tile contiguously; {}..{} is followed by {}..{}",
                    a.start, a.end, b.start, b.end
                ),
            ));
        }
    }
    Ok(())
}

/// Logical rows held by a temporary array, under the given decoder.
fn rows_in(decoder: &Decoder, array: &BasketArray) -> usize {
    match (decoder, array) {
        (Decoder::Fixed(fixed), BasketArray::Fixed(batch)) => {
            batch.values.bytes_len() / (batch.basic_type.size() * fixed.items_per_row().max(1))
        }
        _ => array.item_count(),
    }
}

/// Trims a temporary array to a row sub-range. Only the top level needs the
/// decoder (fixed trailing dimensions make rows span several items); nested
/// content is structurally self-describing.
fn trim_rows(decoder: &Decoder, array: &BasketArray, rows: Range<usize>) -> BasketArray {
    match (decoder, array) {
        (Decoder::Fixed(fixed), BasketArray::Fixed(batch)) => {
            let width = batch.basic_type.size() * fixed.items_per_row().max(1);
            BasketArray::Fixed(FixedBatch {
                values: copy_byte_rows(&batch.values, width, rows),
                basic_type: batch.basic_type,
            })
        }
        _ => trim_items(array, rows),
    }
}

fn trim_items(array: &BasketArray, items: Range<usize>) -> BasketArray {
    match array {
        BasketArray::Fixed(batch) => BasketArray::Fixed(FixedBatch {
            values: copy_byte_rows(&batch.values, batch.basic_type.size(), items),
            basic_type: batch.basic_type,
        }),
        BasketArray::Jagged(batch) => {
            let (offsets, content_range) = rebase_offsets(&batch.offsets, items);
            BasketArray::Jagged(JaggedBatch {
                content: Box::new(trim_items(&batch.content, content_range)),
                offsets,
            })
        }
        BasketArray::Map(batch) => {
            let (offsets, content_range) = rebase_offsets(&batch.offsets, items);
            BasketArray::Map(MapBatch {
                keys: Box::new(trim_items(&batch.keys, content_range.clone())),
                values: Box::new(trim_items(&batch.values, content_range)),
                offsets,
            })
        }
        BasketArray::Records(batch) => BasketArray::Records(RecordBatch {
            rows: batch.rows[items].to_vec(),
            arena: batch.arena.clone(),
        }),
    }
}

fn copy_byte_rows(values: &Values, width: usize, rows: Range<usize>) -> Values {
    let bytes = &values.as_bytes()[rows.start * width..rows.end * width];
    let mut out = Values::with_capacity::<u8>(bytes.len());
    out.extend_from_slice(bytes);
    out
}

/// Rebuilds a zero-based offsets table for the selected items and returns the
/// content range they cover, in content-local indices.
fn rebase_offsets(offsets: &Offsets, items: Range<usize>) -> (Offsets, Range<usize>) {
    let table = offsets.as_slice();
    let base = table[0];
    let mut rebased = Offsets::with_capacity(items.len());
    for index in items.clone() {
        rebased.push_length((table[index + 1] - table[index]) as usize);
    }
    let content_range =
        (table[items.start] - base) as usize..(table[items.end] - base) as usize;
    (rebased, content_range)
}

/// Drives the output adapter bottom-up over the assembled array.
fn finalize<A: OutputAdapter>(
    decoder: &Decoder,
    array: BasketArray,
    adapter: &A,
) -> Result<A::Array> {
    match (decoder, array) {
        (Decoder::Fixed(fixed), BasketArray::Fixed(batch)) => {
            adapter.finalize_fixed(batch.values, batch.basic_type, fixed.dims())
        }
        (Decoder::TruncatedFloat(_), BasketArray::Fixed(batch)) => {
            adapter.finalize_fixed(batch.values, batch.basic_type, &[])
        }
        (Decoder::String(_), BasketArray::Jagged(batch)) => {
            let content = match *batch.content {
                BasketArray::Fixed(bytes) => {
                    adapter.finalize_fixed(bytes.values, bytes.basic_type, &[])?
                }
                _ => unreachable!("string content is flat bytes"),
            };
            adapter.finalize_variable(batch.offsets, content)
        }
        (Decoder::Vector(vector), BasketArray::Jagged(batch)) => {
            let content = finalize(vector.inner(), *batch.content, adapter)?;
            adapter.finalize_variable(batch.offsets, content)
        }
        (Decoder::Set(set), BasketArray::Jagged(batch)) => {
            let content = finalize(set.inner(), *batch.content, adapter)?;
            adapter.finalize_variable(batch.offsets, content)
        }
        (Decoder::Map(map), BasketArray::Map(batch)) => {
            let keys = finalize(map.key(), *batch.keys, adapter)?;
            let values = finalize(map.value(), *batch.values, adapter)?;
            adapter.finalize_map(batch.offsets, keys, values)
        }
        (Decoder::Record(_), BasketArray::Records(batch)) => {
            adapter.finalize_records(batch.rows, batch.arena)
        }
        _ => unreachable!("mismatched decoder and array structure"),
    }
}
