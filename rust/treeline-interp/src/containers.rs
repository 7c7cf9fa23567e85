//! Generic container decoding: `vector<T>`, `set<T>`, `map<K,V>`,
//! `bitset<N>`.
//!
//! Per row the wire carries an optional version/byte-count header (top-level
//! containers only; containers nested inside an outer framed structure omit
//! theirs), then a 4-byte big-endian element count, then the elements decoded
//! by the inner decoder back-to-back. Maps stream all keys, then all values.
//! When a byte count was present the framing is validated after the row; that
//! check is the format's corruption detector and is never skipped.

use std::cmp::Ordering;

use treeline_common::{Result, error::Error};
use treeline_format::cursor::Cursor;
use treeline_sequence::offsets::Offsets;

use crate::basket::{BasketArray, DecodeContext, JaggedBatch, MapBatch};
use crate::decoder::Decoder;

/// Decoder for sequence containers. Also covers `bitset<N>`, which decodes as
/// a boolean vector whose element count is validated against `N`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsVector {
    inner: Box<Decoder>,
    header: bool,
    bitset: Option<usize>,
    type_name: String,
}

impl AsVector {
    pub fn new(inner: Decoder, header: bool) -> AsVector {
        let type_name = format!("vector<{}>", inner.type_name());
        AsVector {
            inner: Box::new(inner),
            header,
            bitset: None,
            type_name,
        }
    }

    pub fn bitset(size: usize, inner: Decoder, header: bool) -> AsVector {
        AsVector {
            inner: Box::new(inner),
            header,
            bitset: Some(size),
            type_name: format!("bitset<{size}>"),
        }
    }

    pub fn inner(&self) -> &Decoder {
        &self.inner
    }

    pub fn has_header(&self) -> bool {
        self.header
    }

    /// Declared bit count when this decoder reads a `bitset<N>`.
    pub fn bitset_size(&self) -> Option<usize> {
        self.bitset
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn cache_key(&self) -> String {
        match self.bitset {
            Some(size) => format!(
                "bitset({size},h={},{})",
                self.header as u8,
                self.inner.cache_key()
            ),
            None => format!("vector(h={},{})", self.header as u8, self.inner.cache_key()),
        }
    }

    fn read_row(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<RowBatch> {
        let start = cursor.pos();
        let header = read_row_header(self.header, cursor)?;
        let count = cursor.read_u32()? as usize;
        if let Some(size) = self.bitset {
            if count != size {
                return Err(Error::malformed_stream(
                    start,
                    ctx.wire_context(),
                    format!("bitset declares {size} bits, stream carries {count}"),
                ));
            }
        }
        let batch = self.inner.read_bulk(cursor, count, ctx)?;
        check_row_framing(cursor, start, header.as_ref(), ctx)?;
        Ok(RowBatch {
            wire_count: count,
            batch,
        })
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        row_offsets: Option<&Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::new();
        let mut content = self.inner.empty_basket();
        let mut row = 0usize;
        while has_more_rows(cursor, row_offsets, ctx, row) {
            validate_row_start(cursor, row_offsets, row, ctx)?;
            let row_batch = self.read_row(cursor, ctx)?;
            validate_expected_count(row_batch.wire_count, row, ctx)?;
            offsets.push_length(row_batch.batch.item_count());
            content.append(row_batch.batch);
            row += 1;
        }
        ctx.leave();
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(content),
        }))
    }

    pub(crate) fn read_bulk(
        &self,
        cursor: &mut Cursor<'_>,
        count: usize,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::with_capacity(count);
        let mut content = self.inner.empty_basket();
        for _ in 0..count {
            let row_batch = self.read_row(cursor, ctx)?;
            offsets.push_length(row_batch.batch.item_count());
            content.append(row_batch.batch);
        }
        ctx.leave();
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(content),
        }))
    }
}

/// Decoder for `set<T>`: vector wire layout, value-sorted output with equal
/// elements collapsed (the latest occurrence survives).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsSet {
    inner: Box<Decoder>,
    header: bool,
    type_name: String,
}

impl AsSet {
    pub fn new(inner: Decoder, header: bool) -> AsSet {
        let type_name = format!("set<{}>", inner.type_name());
        AsSet {
            inner: Box::new(inner),
            header,
            type_name,
        }
    }

    pub fn inner(&self) -> &Decoder {
        &self.inner
    }

    pub fn has_header(&self) -> bool {
        self.header
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn cache_key(&self) -> String {
        format!("set(h={},{})", self.header as u8, self.inner.cache_key())
    }

    fn read_row(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<RowBatch> {
        let start = cursor.pos();
        let header = read_row_header(self.header, cursor)?;
        let count = cursor.read_u32()? as usize;
        let batch = self.inner.read_bulk(cursor, count, ctx)?;
        check_row_framing(cursor, start, header.as_ref(), ctx)?;
        let kept = sorted_unique_indices(&batch, count);
        let batch = if is_identity(&kept, count) {
            batch
        } else {
            batch.gather(&kept)
        };
        Ok(RowBatch {
            wire_count: count,
            batch,
        })
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        row_offsets: Option<&Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::new();
        let mut content = self.inner.empty_basket();
        let mut row = 0usize;
        while has_more_rows(cursor, row_offsets, ctx, row) {
            validate_row_start(cursor, row_offsets, row, ctx)?;
            let row_batch = self.read_row(cursor, ctx)?;
            validate_expected_count(row_batch.wire_count, row, ctx)?;
            offsets.push_length(row_batch.batch.item_count());
            content.append(row_batch.batch);
            row += 1;
        }
        ctx.leave();
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(content),
        }))
    }

    pub(crate) fn read_bulk(
        &self,
        cursor: &mut Cursor<'_>,
        count: usize,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::with_capacity(count);
        let mut content = self.inner.empty_basket();
        for _ in 0..count {
            let row_batch = self.read_row(cursor, ctx)?;
            offsets.push_length(row_batch.batch.item_count());
            content.append(row_batch.batch);
        }
        ctx.leave();
        Ok(BasketArray::Jagged(JaggedBatch {
            offsets,
            content: Box::new(content),
        }))
    }
}

/// Decoder for `map<K,V>`: per map instance, all keys then all values (two
/// parallel element runs, not interleaved pairs). Output is key-sorted;
/// duplicate keys keep the last value, deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsMap {
    key: Box<Decoder>,
    value: Box<Decoder>,
    header: bool,
    type_name: String,
}

struct MapRow {
    wire_count: usize,
    keys: BasketArray,
    values: BasketArray,
}

impl AsMap {
    pub fn new(key: Decoder, value: Decoder, header: bool) -> AsMap {
        let type_name = format!("map<{},{}>", key.type_name(), value.type_name());
        AsMap {
            key: Box::new(key),
            value: Box::new(value),
            header,
            type_name,
        }
    }

    pub fn key(&self) -> &Decoder {
        &self.key
    }

    pub fn value(&self) -> &Decoder {
        &self.value
    }

    pub fn has_header(&self) -> bool {
        self.header
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn cache_key(&self) -> String {
        format!(
            "map(h={},{},{})",
            self.header as u8,
            self.key.cache_key(),
            self.value.cache_key()
        )
    }

    fn read_row(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<MapRow> {
        let start = cursor.pos();
        let header = read_row_header(self.header, cursor)?;
        let count = cursor.read_u32()? as usize;
        let keys = self.key.read_bulk(cursor, count, ctx)?;
        let values = self.value.read_bulk(cursor, count, ctx)?;
        check_row_framing(cursor, start, header.as_ref(), ctx)?;
        let kept = sorted_unique_indices(&keys, count);
        if is_identity(&kept, count) {
            Ok(MapRow {
                wire_count: count,
                keys,
                values,
            })
        } else {
            Ok(MapRow {
                wire_count: count,
                keys: keys.gather(&kept),
                values: values.gather(&kept),
            })
        }
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        row_offsets: Option<&Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::new();
        let mut keys = self.key.empty_basket();
        let mut values = self.value.empty_basket();
        let mut row = 0usize;
        while has_more_rows(cursor, row_offsets, ctx, row) {
            validate_row_start(cursor, row_offsets, row, ctx)?;
            let map_row = self.read_row(cursor, ctx)?;
            validate_expected_count(map_row.wire_count, row, ctx)?;
            offsets.push_length(map_row.keys.item_count());
            keys.append(map_row.keys);
            values.append(map_row.values);
            row += 1;
        }
        ctx.leave();
        Ok(BasketArray::Map(MapBatch {
            offsets,
            keys: Box::new(keys),
            values: Box::new(values),
        }))
    }

    pub(crate) fn read_bulk(
        &self,
        cursor: &mut Cursor<'_>,
        count: usize,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        ctx.enter(self.type_name.clone());
        let mut offsets = Offsets::with_capacity(count);
        let mut keys = self.key.empty_basket();
        let mut values = self.value.empty_basket();
        for _ in 0..count {
            let map_row = self.read_row(cursor, ctx)?;
            offsets.push_length(map_row.keys.item_count());
            keys.append(map_row.keys);
            values.append(map_row.values);
        }
        ctx.leave();
        Ok(BasketArray::Map(MapBatch {
            offsets,
            keys: Box::new(keys),
            values: Box::new(values),
        }))
    }
}

struct RowBatch {
    wire_count: usize,
    batch: BasketArray,
}

fn read_row_header(
    enabled: bool,
    cursor: &mut Cursor<'_>,
) -> Result<Option<treeline_format::cursor::VersionHeader>> {
    if enabled {
        Ok(Some(cursor.read_versioned_header()?))
    } else {
        Ok(None)
    }
}

fn check_row_framing(
    cursor: &Cursor<'_>,
    start: usize,
    header: Option<&treeline_format::cursor::VersionHeader>,
    ctx: &DecodeContext,
) -> Result<()> {
    match header {
        Some(header) => cursor.check_framed_length(start, header, &ctx.trail),
        None => Ok(()),
    }
}

fn has_more_rows(
    cursor: &Cursor<'_>,
    row_offsets: Option<&Offsets>,
    ctx: &DecodeContext,
    row: usize,
) -> bool {
    if let Some(bounds) = row_offsets {
        row < bounds.item_count()
    } else if let Some(counts) = &ctx.expected_counts {
        row < counts.len()
    } else {
        cursor.remaining() > 0
    }
}

fn validate_row_start(
    cursor: &Cursor<'_>,
    row_offsets: Option<&Offsets>,
    row: usize,
    ctx: &DecodeContext,
) -> Result<()> {
    let Some(bounds) = row_offsets else {
        return Ok(());
    };
    let expected = (bounds.as_slice()[row] - bounds.first()) as usize;
    if cursor.pos() != expected {
        return Err(Error::malformed_stream(
            cursor.pos(),
            ctx.wire_context(),
            format!("row {row} expected to start at byte {expected}"),
        ));
    }
    Ok(())
}

fn validate_expected_count(wire_count: usize, row: usize, ctx: &DecodeContext) -> Result<()> {
    let Some(counts) = &ctx.expected_counts else {
        return Ok(());
    };
    if wire_count as u64 != counts[row] {
        return Err(Error::malformed_stream(
            0,
            ctx.wire_context(),
            format!(
                "counter column declares {} elements for row {row}, stream carries {wire_count}",
                counts[row]
            ),
        ));
    }
    Ok(())
}

/// Indices of a row batch sorted by value, with equal-element runs collapsed
/// to their latest occurrence. The sort is stable, so within an equal run the
/// original insertion order is preserved and the run's last index is the
/// last-written element.
fn sorted_unique_indices(batch: &BasketArray, count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    indices.sort_by(|&a, &b| batch.compare_items(a, b));
    let mut kept = Vec::with_capacity(indices.len());
    let mut i = 0;
    while i < indices.len() {
        let mut j = i;
        while j + 1 < indices.len()
            && batch.compare_items(indices[j], indices[j + 1]) == Ordering::Equal
        {
            j += 1;
        }
        kept.push(indices[j]);
        i = j + 1;
    }
    kept
}

fn is_identity(indices: &[usize], count: usize) -> bool {
    indices.len() == count && indices.iter().copied().eq(0..count)
}
