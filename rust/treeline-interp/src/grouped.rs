//! Struct-of-columns grouping.

use treeline_common::error::Error;

use crate::decoder::Decoder;

/// A grouping of sibling columns sharing a name prefix.
///
/// Not a byte decoder: the grouped column has no storage of its own, and a
/// read request must go to the sub-columns individually. Any attempt to
/// decode it directly fails fast with `NotDirectlyReadable`, naming the
/// sub-columns to use instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsGrouped {
    name: String,
    sub_columns: Vec<(String, Decoder)>,
}

impl AsGrouped {
    pub fn new(name: impl Into<String>, sub_columns: Vec<(String, Decoder)>) -> AsGrouped {
        AsGrouped {
            name: name.into(),
            sub_columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sub_columns(&self) -> &[(String, Decoder)] {
        &self.sub_columns
    }

    pub fn sub_column_names(&self) -> impl Iterator<Item = &str> {
        self.sub_columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn cache_key(&self) -> String {
        let mut key = format!("grouped({}", self.name);
        for (name, decoder) in &self.sub_columns {
            key.push_str(&format!(",{name}={}", decoder.cache_key()));
        }
        key.push(')');
        key
    }

    /// The usage error every direct read path raises.
    pub(crate) fn not_directly_readable(&self) -> Error {
        Error::not_directly_readable(
            &self.name,
            self.sub_column_names().map(|name| name.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use treeline_format::schema::BasicType;

    use super::*;
    use crate::decoder::Decoder;
    use crate::fixed::AsFixed;

    #[test]
    fn error_names_the_sub_columns() {
        let grouped = AsGrouped::new(
            "muon",
            vec![
                ("muon.pt".to_string(), Decoder::Fixed(AsFixed::new(BasicType::Float32))),
                ("muon.eta".to_string(), Decoder::Fixed(AsFixed::new(BasicType::Float32))),
            ],
        );
        let err = grouped.not_directly_readable();
        let msg = err.to_string();
        assert!(msg.contains("'muon'"), "{msg}");
        assert!(msg.contains("muon.pt, muon.eta"), "{msg}");
    }
}
