//! Output adapter seam.
//!
//! The assembler produces arrays in an internal representation; an
//! [`OutputAdapter`] converts them, bottom-up, into whatever array library
//! the caller prefers. The in-tree [`PlainAdapter`] finalizes to the internal
//! [`ArrayData`] representation and is what the test suite inspects.

use treeline_common::Result;
use treeline_format::schema::BasicType;
use treeline_sequence::{offsets::Offsets, values::Values};

use crate::decoder::Shape;
use crate::value::{ObjectArena, Value};

/// Converts assembled internal arrays into a caller-chosen representation.
///
/// `finalize_*` calls arrive bottom-up: content arrays are finalized before
/// the variable-length or map wrapper that contains them.
pub trait OutputAdapter {
    type Array;

    /// A zero-length array of the given static shape.
    fn make_empty(&self, shape: &Shape) -> Result<Self::Array>;

    /// Flat fixed-width values in native byte order, with optional fixed
    /// trailing dimensions per row.
    fn finalize_fixed(
        &self,
        values: Values,
        basic_type: BasicType,
        dims: &[usize],
    ) -> Result<Self::Array>;

    /// Variable-length items: a zero-based offsets table over the already
    /// finalized content.
    fn finalize_variable(&self, offsets: Offsets, content: Self::Array) -> Result<Self::Array>;

    /// Key-sorted maps over parallel, already finalized key/value arrays.
    fn finalize_map(
        &self,
        offsets: Offsets,
        keys: Self::Array,
        values: Self::Array,
    ) -> Result<Self::Array>;

    /// An opaque record sequence plus the arena owning referenced objects.
    fn finalize_records(&self, rows: Vec<Value>, arena: ObjectArena) -> Result<Self::Array>;
}

/// The internal array representation, finalized as-is.
#[derive(Debug, Clone)]
pub enum ArrayData {
    Fixed {
        values: Values,
        basic_type: BasicType,
        dims: Vec<usize>,
    },
    Jagged {
        offsets: Offsets,
        content: Box<ArrayData>,
    },
    Map {
        offsets: Offsets,
        keys: Box<ArrayData>,
        values: Box<ArrayData>,
    },
    Records {
        rows: Vec<Value>,
        arena: ObjectArena,
    },
}

impl ArrayData {
    /// Number of logical rows.
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Fixed {
                values,
                basic_type,
                dims,
            } => {
                let per_row: usize = dims.iter().product::<usize>().max(1) * basic_type.size();
                values.bytes_len() / per_row
            }
            ArrayData::Jagged { offsets, .. } => offsets.item_count(),
            ArrayData::Map { offsets, .. } => offsets.item_count(),
            ArrayData::Records { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Adapter returning [`ArrayData`] unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAdapter;

impl OutputAdapter for PlainAdapter {
    type Array = ArrayData;

    fn make_empty(&self, shape: &Shape) -> Result<ArrayData> {
        let array = match shape {
            Shape::Item { basic_type, dims } => ArrayData::Fixed {
                values: Values::new(),
                basic_type: *basic_type,
                dims: dims.clone(),
            },
            Shape::Jagged(inner) => ArrayData::Jagged {
                offsets: Offsets::new(),
                content: Box::new(self.make_empty(inner)?),
            },
            Shape::Map(key, value) => ArrayData::Map {
                offsets: Offsets::new(),
                keys: Box::new(self.make_empty(key)?),
                values: Box::new(self.make_empty(value)?),
            },
            Shape::Record(_) => ArrayData::Records {
                rows: Vec::new(),
                arena: ObjectArena::new(),
            },
            Shape::Grouped(_) => ArrayData::Records {
                rows: Vec::new(),
                arena: ObjectArena::new(),
            },
        };
        Ok(array)
    }

    fn finalize_fixed(
        &self,
        values: Values,
        basic_type: BasicType,
        dims: &[usize],
    ) -> Result<ArrayData> {
        Ok(ArrayData::Fixed {
            values,
            basic_type,
            dims: dims.to_vec(),
        })
    }

    fn finalize_variable(&self, offsets: Offsets, content: ArrayData) -> Result<ArrayData> {
        Ok(ArrayData::Jagged {
            offsets,
            content: Box::new(content),
        })
    }

    fn finalize_map(
        &self,
        offsets: Offsets,
        keys: ArrayData,
        values: ArrayData,
    ) -> Result<ArrayData> {
        Ok(ArrayData::Map {
            offsets,
            keys: Box::new(keys),
            values: Box::new(values),
        })
    }

    fn finalize_records(&self, rows: Vec<Value>, arena: ObjectArena) -> Result<ArrayData> {
        Ok(ArrayData::Records { rows, arena })
    }
}
