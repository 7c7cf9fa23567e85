//! Parsed type descriptor tree.

use treeline_format::schema::BasicType;

/// One node of a parsed type descriptor.
///
/// Descriptors carry no wire-layout configuration (framing headers, value
/// ranges for truncated floats); that is attached when a descriptor is turned
/// into a decoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Fixed-width numeric leaf.
    Scalar(BasicType),
    /// Truncated-precision float leaf: the half-precision family
    /// (`Float16_t`) or the wide family (`Double32_t`).
    TruncatedFloat { half: bool },
    /// `string` / `basic_string<...>`.
    String,
    /// `T*`: a reference-tagged pointer to `T`.
    Pointer(Box<TypeDescriptor>),
    /// `vector<T>` and the sequence containers that share its wire layout
    /// (`list`, `deque`).
    Vector(Box<TypeDescriptor>),
    /// `set<T>`: like a vector on the wire, key-sorted on output.
    Set(Box<TypeDescriptor>),
    /// `map<K,V>`: all keys then all values per instance, key-sorted output.
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    /// `bitset<N>`.
    Bitset(usize),
    /// A named record type, resolved through the schema lookup.
    Named(String),
}

impl TypeDescriptor {
    /// Canonical descriptor text: canonical scalar aliases, `std::` stripped,
    /// extra template arguments dropped. Parsing the rendering reproduces the
    /// same tree.
    pub fn render(&self) -> String {
        match self {
            TypeDescriptor::Scalar(bt) => bt.canonical_name().to_string(),
            TypeDescriptor::TruncatedFloat { half: true } => "Float16_t".to_string(),
            TypeDescriptor::TruncatedFloat { half: false } => "Double32_t".to_string(),
            TypeDescriptor::String => "string".to_string(),
            TypeDescriptor::Pointer(inner) => format!("{}*", inner.render()),
            TypeDescriptor::Vector(inner) => format!("vector<{}>", inner.render()),
            TypeDescriptor::Set(inner) => format!("set<{}>", inner.render()),
            TypeDescriptor::Map(key, value) => {
                format!("map<{},{}>", key.render(), value.render())
            }
            TypeDescriptor::Bitset(n) => format!("bitset<{n}>"),
            TypeDescriptor::Named(name) => name.clone(),
        }
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
