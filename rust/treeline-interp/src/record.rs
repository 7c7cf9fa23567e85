//! Record (object) column decoding.
//!
//! Record types are decoded by runtime-built plans rather than generated
//! code: a [`RecordPlan`] is an ordered list of [`FieldStep`]s resolved once
//! from versioned schema metadata, and a [`Registry`] maps
//! `(type name, version)` to plans. The registry is constructed once at
//! startup, read-only thereafter, and passed by reference into parse and
//! decode calls; there is no process-wide mutable state.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use treeline_common::{Result, error::Error};
use treeline_format::cursor::{BYTE_COUNT_FLAG, Cursor};
use treeline_format::refs::Reference;
use treeline_format::schema::BasicType;
use treeline_typename::TypeLookup;

use crate::basket::{BasketArray, DecodeContext, RecordBatch};
use crate::decoder::Decoder;
use crate::value::{ObjectArena, Record, Value};

/// Reads the field payload of one record. The version/byte-count framing is
/// the caller's responsibility ([`AsRecord`] handles it), so implementations
/// see the cursor positioned at the first field.
pub trait ObjectDecoder: Send + Sync {
    fn type_name(&self) -> &str;

    fn read_fields(
        &self,
        version: u16,
        cursor: &mut Cursor<'_>,
        ctx: &mut DecodeContext,
    ) -> Result<Record>;
}

/// One step of a record decode plan.
#[derive(Clone)]
pub enum FieldStep {
    /// A fixed-width numeric member.
    ReadFixed { name: String, basic_type: BasicType },
    /// A member with its own decoder (string, container, nested record).
    ReadDecoder { name: String, decoder: Decoder },
    /// Padding or a member deliberately not materialized.
    SkipBytes { count: usize },
    /// The base-class segment: its own framing header followed by the base
    /// type's fields. Decoded as a single field named after the base type.
    ReadBaseClass { base: Arc<RecordDecoder> },
}

/// Ordered field-decode steps for one version of one record type.
#[derive(Clone)]
pub struct RecordPlan {
    type_name: String,
    version: u16,
    steps: Vec<FieldStep>,
}

impl RecordPlan {
    pub fn builder(type_name: impl Into<String>, version: u16) -> RecordPlanBuilder {
        RecordPlanBuilder {
            type_name: type_name.into(),
            version,
            steps: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    fn execute(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<Record> {
        let mut fields = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match step {
                FieldStep::ReadFixed { name, basic_type } => {
                    fields.push((name.clone(), read_scalar_value(cursor, *basic_type)?));
                }
                FieldStep::ReadDecoder { name, decoder } => {
                    fields.push((name.clone(), read_value(decoder, cursor, ctx)?));
                }
                FieldStep::SkipBytes { count } => cursor.skip(*count)?,
                FieldStep::ReadBaseClass { base } => {
                    let start = cursor.pos();
                    let header = cursor.read_versioned_header()?;
                    ctx.enter(base.type_name().to_string());
                    let record = base.read_fields(header.version, cursor, ctx)?;
                    ctx.leave();
                    cursor.check_framed_length(start, &header, &ctx.trail)?;
                    fields.push((base.type_name().to_string(), Value::Record(record)));
                }
            }
        }
        Ok(Record {
            type_name: self.type_name.clone(),
            version: self.version,
            fields,
        })
    }
}

/// Builder assembling a [`RecordPlan`] from versioned schema metadata.
pub struct RecordPlanBuilder {
    type_name: String,
    version: u16,
    steps: Vec<FieldStep>,
}

impl RecordPlanBuilder {
    pub fn fixed_field(mut self, name: impl Into<String>, basic_type: BasicType) -> Self {
        self.steps.push(FieldStep::ReadFixed {
            name: name.into(),
            basic_type,
        });
        self
    }

    pub fn decoder_field(mut self, name: impl Into<String>, decoder: Decoder) -> Self {
        self.steps.push(FieldStep::ReadDecoder {
            name: name.into(),
            decoder,
        });
        self
    }

    pub fn skip_bytes(mut self, count: usize) -> Self {
        self.steps.push(FieldStep::SkipBytes { count });
        self
    }

    pub fn base_class(mut self, base: Arc<RecordDecoder>) -> Self {
        self.steps.push(FieldStep::ReadBaseClass { base });
        self
    }

    pub fn build(self) -> RecordPlan {
        RecordPlan {
            type_name: self.type_name,
            version: self.version,
            steps: self.steps,
        }
    }
}

/// All known versions of one record type.
pub struct RecordDecoder {
    type_name: String,
    plans: BTreeMap<u16, RecordPlan>,
}

impl RecordDecoder {
    pub fn new(type_name: impl Into<String>) -> RecordDecoder {
        RecordDecoder {
            type_name: type_name.into(),
            plans: BTreeMap::new(),
        }
    }

    pub fn with_plan(plan: RecordPlan) -> RecordDecoder {
        let mut decoder = RecordDecoder::new(plan.type_name.clone());
        decoder.add_plan(plan);
        decoder
    }

    /// Adds one version's plan. The plan must be for this decoder's type.
    pub fn add_plan(&mut self, plan: RecordPlan) {
        assert_eq!(plan.type_name, self.type_name, "plan type mismatch");
        self.plans.insert(plan.version, plan);
    }

    pub fn versions(&self) -> impl Iterator<Item = u16> + '_ {
        self.plans.keys().copied()
    }
}

impl ObjectDecoder for RecordDecoder {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn read_fields(
        &self,
        version: u16,
        cursor: &mut Cursor<'_>,
        ctx: &mut DecodeContext,
    ) -> Result<Record> {
        let Some(plan) = self.plans.get(&version) else {
            return Err(Error::malformed_stream(
                cursor.pos(),
                ctx.wire_context(),
                format!(
                    "no decode plan for version {version} of '{}'",
                    self.type_name
                ),
            ));
        };
        plan.execute(cursor, ctx)
    }
}

/// Registry of record decoders, keyed by type name.
///
/// Also serves as the type-name parser's lookup, so a descriptor text can
/// only name record types the registry can actually decode.
#[derive(Default)]
pub struct Registry {
    types: HashMap<String, Arc<RecordDecoder>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a record decoder, returning the shared handle (useful for
    /// wiring base-class steps).
    pub fn register(&mut self, decoder: RecordDecoder) -> Arc<RecordDecoder> {
        let decoder = Arc::new(decoder);
        self.types
            .insert(decoder.type_name().to_string(), decoder.clone());
        decoder
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<RecordDecoder>> {
        self.types.get(name).cloned()
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl TypeLookup for Registry {
    fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

/// Tags are derived from the byte position of the referenced object, shifted
/// past the two reserved tag values.
const TAG_BASE: u32 = 2;

/// Decoder for record columns.
///
/// Delegates all field decoding to the registered [`ObjectDecoder`]; its own
/// responsibilities are the version/byte-count framing around the delegated
/// call and threading the reference table and arena. In pointer mode the wire
/// carries either an inline object (registered under its position tag) or a
/// back-reference to one decoded earlier in the same call.
#[derive(Clone)]
pub struct AsRecord {
    name: String,
    delegate: Arc<dyn ObjectDecoder>,
    pointer: bool,
}

impl AsRecord {
    pub fn new(delegate: Arc<dyn ObjectDecoder>) -> AsRecord {
        AsRecord {
            name: delegate.type_name().to_string(),
            delegate,
            pointer: false,
        }
    }

    pub fn pointer(delegate: Arc<dyn ObjectDecoder>) -> AsRecord {
        AsRecord {
            name: delegate.type_name().to_string(),
            delegate,
            pointer: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer
    }

    pub fn type_name(&self) -> String {
        if self.pointer {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn cache_key(&self) -> String {
        format!("record({},ptr={})", self.name, self.pointer as u8)
    }

    /// Decodes one record (or pointer slot).
    pub fn read_one(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<Value> {
        if self.pointer {
            self.read_pointer(cursor, ctx)
        } else {
            Ok(Value::Record(self.read_inline(cursor, ctx)?))
        }
    }

    fn read_inline(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<Record> {
        let start = cursor.pos();
        let header = cursor.read_versioned_header()?;
        ctx.enter(self.name.clone());
        let record = self.delegate.read_fields(header.version, cursor, ctx)?;
        ctx.leave();
        cursor.check_framed_length(start, &header, &ctx.trail)?;
        Ok(record)
    }

    fn read_pointer(&self, cursor: &mut Cursor<'_>, ctx: &mut DecodeContext) -> Result<Value> {
        let word = cursor.peek_u32()?;
        match word {
            0 => {
                cursor.skip(4)?;
                Ok(Value::Null)
            }
            1 => {
                cursor.skip(4)?;
                match ctx.enclosing.last() {
                    Some(&index) => Ok(Value::Ref(index)),
                    None => Err(Error::malformed_stream(
                        cursor.pos(),
                        ctx.wire_context(),
                        "self-reference outside an enclosing object",
                    )),
                }
            }
            word if word & BYTE_COUNT_FLAG != 0 => {
                // Inline object: the framing count word doubles as the
                // "object follows" marker.
                let start = cursor.pos();
                let header = cursor.read_versioned_header()?;
                let index = ctx.arena.push(Value::Null);
                ctx.refs.register(start as u32 + TAG_BASE, index)?;
                ctx.enclosing.push(index);
                ctx.enter(self.name.clone());
                let record = self.delegate.read_fields(header.version, cursor, ctx)?;
                ctx.leave();
                ctx.enclosing.pop();
                cursor.check_framed_length(start, &header, &ctx.trail)?;
                ctx.arena.set(index, Value::Record(record));
                Ok(Value::Ref(index))
            }
            word => {
                cursor.skip(4)?;
                match ctx.refs.resolve(word)? {
                    Reference::Object(index) => Ok(Value::Ref(index)),
                    Reference::Null | Reference::Enclosing => {
                        unreachable!("reserved tags handled above")
                    }
                }
            }
        }
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        row_offsets: Option<&treeline_sequence::offsets::Offsets>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        let mut rows = Vec::new();
        loop {
            match row_offsets {
                Some(bounds) => {
                    if rows.len() == bounds.item_count() {
                        break;
                    }
                    let expected = (bounds.as_slice()[rows.len()] - bounds.first()) as usize;
                    if cursor.pos() != expected {
                        return Err(Error::malformed_stream(
                            cursor.pos(),
                            ctx.wire_context(),
                            format!("row {} expected to start at byte {expected}", rows.len()),
                        ));
                    }
                }
                None => {
                    if cursor.remaining() == 0 {
                        break;
                    }
                }
            }
            let value = self.read_one(cursor, ctx)?;
            rows.push(value);
        }
        Ok(BasketArray::Records(RecordBatch {
            rows,
            arena: ObjectArena::new(),
        }))
    }

    pub(crate) fn read_bulk(
        &self,
        cursor: &mut Cursor<'_>,
        count: usize,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            rows.push(self.read_one(cursor, ctx)?);
        }
        Ok(BasketArray::Records(RecordBatch {
            rows,
            arena: ObjectArena::new(),
        }))
    }
}

impl std::fmt::Debug for AsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsRecord")
            .field("name", &self.name)
            .field("pointer", &self.pointer)
            .finish()
    }
}

impl PartialEq for AsRecord {
    fn eq(&self, other: &Self) -> bool {
        // Identity is the registered type name plus pointer-ness; delegates
        // come from one registry, so equal names decode identically.
        self.name == other.name && self.pointer == other.pointer
    }
}

impl Eq for AsRecord {}

impl Hash for AsRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.pointer.hash(state);
    }
}

/// Reads one value of any decoder dynamically; used for record members,
/// where values land in [`Value`] trees rather than flat buffers.
pub(crate) fn read_value(
    decoder: &Decoder,
    cursor: &mut Cursor<'_>,
    ctx: &mut DecodeContext,
) -> Result<Value> {
    match decoder {
        Decoder::Fixed(fixed) => {
            if fixed.dims().is_empty() {
                read_scalar_value(cursor, fixed.basic_type())
            } else {
                let count = fixed.items_per_row();
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(read_scalar_value(cursor, fixed.basic_type())?);
                }
                Ok(Value::List(items))
            }
        }
        Decoder::TruncatedFloat(truncated) => Ok(Value::F64(truncated.read_one(cursor)?)),
        Decoder::String(string) => Ok(Value::Str(string.read_one_string(cursor)?)),
        Decoder::Vector(vector) => {
            let items = read_value_elements(
                vector.inner(),
                vector.has_header(),
                vector.bitset_size(),
                cursor,
                ctx,
            )?;
            Ok(Value::List(items))
        }
        Decoder::Set(set) => {
            let mut items =
                read_value_elements(set.inner(), set.has_header(), None, cursor, ctx)?;
            items.sort_by(|a, b| a.total_cmp(b));
            items.dedup_by(|next, prev| prev.total_cmp(next) == std::cmp::Ordering::Equal);
            Ok(Value::List(items))
        }
        Decoder::Map(map) => {
            let start = cursor.pos();
            let header = if map.has_header() {
                Some(cursor.read_versioned_header()?)
            } else {
                None
            };
            let count = cursor.read_u32()? as usize;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(read_value(map.key(), cursor, ctx)?);
            }
            let mut pairs = Vec::with_capacity(count);
            for key in keys {
                pairs.push((key, read_value(map.value(), cursor, ctx)?));
            }
            if let Some(header) = &header {
                cursor.check_framed_length(start, header, &ctx.trail)?;
            }
            pairs.sort_by(|(a, _), (b, _)| a.total_cmp(b));
            // Stable sort keeps insertion order within equal-key runs; the
            // run's last pair is the last-written one and wins.
            let mut deduped: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
            for pair in pairs {
                match deduped.last() {
                    Some((last, _)) if last.total_cmp(&pair.0) == std::cmp::Ordering::Equal => {
                        *deduped.last_mut().expect("nonempty") = pair;
                    }
                    _ => deduped.push(pair),
                }
            }
            Ok(Value::Map(deduped))
        }
        Decoder::Record(record) => record.read_one(cursor, ctx),
        Decoder::Grouped(grouped) => Err(grouped.not_directly_readable()),
    }
}

fn read_value_elements(
    inner: &Decoder,
    header: bool,
    bitset: Option<usize>,
    cursor: &mut Cursor<'_>,
    ctx: &mut DecodeContext,
) -> Result<Vec<Value>> {
    let start = cursor.pos();
    let header = if header {
        Some(cursor.read_versioned_header()?)
    } else {
        None
    };
    let count = cursor.read_u32()? as usize;
    if let Some(size) = bitset {
        if count != size {
            return Err(Error::malformed_stream(
                start,
                ctx.wire_context(),
                format!("bitset declares {size} bits, stream carries {count}"),
            ));
        }
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read_value(inner, cursor, ctx)?);
    }
    if let Some(header) = &header {
        cursor.check_framed_length(start, header, &ctx.trail)?;
    }
    Ok(items)
}

fn read_scalar_value(cursor: &mut Cursor<'_>, basic_type: BasicType) -> Result<Value> {
    let value = match basic_type {
        BasicType::Bool => Value::Bool(cursor.read_bool()?),
        BasicType::Int8 => Value::I64(cursor.read_i8()? as i64),
        BasicType::UInt8 => Value::U64(cursor.read_u8()? as u64),
        BasicType::Int16 => Value::I64(cursor.read_i16()? as i64),
        BasicType::UInt16 => Value::U64(cursor.read_u16()? as u64),
        BasicType::Int32 => Value::I64(cursor.read_i32()? as i64),
        BasicType::UInt32 => Value::U64(cursor.read_u32()? as u64),
        BasicType::Int64 => Value::I64(cursor.read_i64()?),
        BasicType::UInt64 => Value::U64(cursor.read_u64()?),
        BasicType::Float32 => Value::F64(cursor.read_f32()? as f64),
        BasicType::Float64 => Value::F64(cursor.read_f64()?),
    };
    Ok(value)
}
