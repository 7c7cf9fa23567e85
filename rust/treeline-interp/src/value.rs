//! Dynamic values decoded from object columns.
//!
//! Record columns decode into [`Value`] trees rather than flat buffers.
//! Objects reached through pointers live in a per-decode-call [`ObjectArena`]
//! and are referenced by index ([`Value::Ref`]), so a shared or
//! self-referential object graph has exactly one owner: the arena.

use std::cmp::Ordering;

/// One decoded dynamic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    List(Vec<Value>),
    /// Key-sorted pairs; duplicate keys were resolved last-wins at decode.
    Map(Vec<(Value, Value)>),
    Record(Record),
    /// Index into the decode call's object arena.
    Ref(usize),
}

/// A decoded record: the type name and version it was written with, plus its
/// fields in declaration order. A decoded base class appears as a single
/// field named after the base type.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub version: u16,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl Value {
    /// Total order over values, used for set/map key sorting.
    ///
    /// Numeric variants compare by numeric value (floats via `total_cmp`);
    /// different non-numeric variants compare by a fixed variant rank.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (I64(a), I64(b)) => a.cmp(b),
            (U64(a), U64(b)) => a.cmp(b),
            (F64(a), F64(b)) => a.total_cmp(b),
            (I64(_) | U64(_) | F64(_), I64(_) | U64(_) | F64(_)) => self
                .as_f64()
                .expect("numeric")
                .total_cmp(&other.as_f64().expect("numeric")),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (List(a), List(b)) => cmp_seq(a.iter(), b.iter()),
            (Map(a), Map(b)) => cmp_seq(
                a.iter().flat_map(|(k, v)| [k, v]),
                b.iter().flat_map(|(k, v)| [k, v]),
            ),
            (Record(a), Record(b)) => cmp_seq(
                a.fields.iter().map(|(_, v)| v),
                b.fields.iter().map(|(_, v)| v),
            ),
            (Ref(a), Ref(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Numeric view of a scalar value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I64(_) | Value::U64(_) | Value::F64(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
            Value::Map(_) => 5,
            Value::Record(_) => 6,
            Value::Ref(_) => 7,
        }
    }

    /// Shifts every arena reference by `offset`; used when merging the
    /// arenas of two partitions' record batches.
    pub(crate) fn shift_refs(&mut self, offset: usize) {
        match self {
            Value::Ref(index) => *index += offset,
            Value::List(items) => items.iter_mut().for_each(|v| v.shift_refs(offset)),
            Value::Map(pairs) => pairs.iter_mut().for_each(|(k, v)| {
                k.shift_refs(offset);
                v.shift_refs(offset);
            }),
            Value::Record(record) => record
                .fields
                .iter_mut()
                .for_each(|(_, v)| v.shift_refs(offset)),
            _ => {}
        }
    }
}

fn cmp_seq<'a>(
    a: impl Iterator<Item = &'a Value>,
    b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    let mut a = a.fuse();
    let mut b = b.fuse();
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) => match x.total_cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Arena of objects decoded through pointers during one top-level decode
/// call. Pointer values hold indices into this arena; the arena, not the
/// graph edges, owns the memory, which makes cyclic references harmless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectArena {
    objects: Vec<Value>,
}

impl ObjectArena {
    pub fn new() -> ObjectArena {
        ObjectArena::default()
    }

    /// Appends an object and returns its slot index.
    pub fn push(&mut self, value: Value) -> usize {
        self.objects.push(value);
        self.objects.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.objects.get(index)
    }

    /// Replaces a slot, used to fill the placeholder reserved for an object
    /// before its own fields (which may point back at it) are decoded.
    pub(crate) fn set(&mut self, index: usize, value: Value) {
        self.objects[index] = value;
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Merges another arena into this one, returning the index offset that
    /// must be applied to references into the merged arena.
    pub(crate) fn merge(&mut self, other: ObjectArena) -> usize {
        let offset = self.objects.len();
        self.objects.extend(other.objects);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_order_across_kinds() {
        assert_eq!(Value::I64(-2).total_cmp(&Value::I64(5)), Ordering::Less);
        assert_eq!(Value::F64(1.5).total_cmp(&Value::I64(1)), Ordering::Greater);
        assert_eq!(Value::U64(7).total_cmp(&Value::F64(7.0)), Ordering::Equal);
    }

    #[test]
    fn strings_and_lists_order_lexicographically() {
        assert_eq!(
            Value::Str("one".into()).total_cmp(&Value::Str("two".into())),
            Ordering::Less
        );
        let short = Value::List(vec![Value::I64(1)]);
        let long = Value::List(vec![Value::I64(1), Value::I64(0)]);
        assert_eq!(short.total_cmp(&long), Ordering::Less);
    }

    #[test]
    fn shift_refs_reaches_nested_values() {
        let mut value = Value::List(vec![
            Value::Ref(0),
            Value::Record(Record {
                type_name: "hit".into(),
                version: 1,
                fields: vec![("next".into(), Value::Ref(2))],
            }),
        ]);
        value.shift_refs(10);
        match &value {
            Value::List(items) => {
                assert_eq!(items[0], Value::Ref(10));
                match &items[1] {
                    Value::Record(rec) => assert_eq!(rec.fields[0].1, Value::Ref(12)),
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
