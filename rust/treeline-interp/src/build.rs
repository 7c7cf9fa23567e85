//! Construction of decoders from parsed type descriptors.

use treeline_common::{Result, error::Error};
use treeline_format::schema::BasicType;
use treeline_typename::{TypeDescriptor, parse_with_lookup};

use crate::containers::{AsMap, AsSet, AsVector};
use crate::decoder::Decoder;
use crate::fixed::AsFixed;
use crate::record::{AsRecord, Registry};
use crate::strings::AsString;
use crate::truncated::AsTruncatedFloat;

/// Builds the decoder for a parsed descriptor, with top-level framing.
pub fn decoder_for(descriptor: &TypeDescriptor, registry: &Registry) -> Result<Decoder> {
    build(descriptor, registry, None, true)
}

/// Builds the decoder for a column from its declared type text and title.
///
/// The registry doubles as the parser's schema lookup, so the text can only
/// name record types the registry can decode. The title contributes fixed
/// trailing dimensions for numeric columns and the range specification for
/// truncated-float columns.
pub fn decoder_for_column(
    type_text: &str,
    title: &str,
    registry: &Registry,
) -> Result<Decoder> {
    let descriptor = parse_with_lookup(type_text, Some(registry))?;
    build(&descriptor, registry, Some(title), true)
}

/// Builds the decoder for a record member: nested position, so no framing
/// header of its own. Used when assembling record plans.
pub fn decoder_for_member(descriptor: &TypeDescriptor, registry: &Registry) -> Result<Decoder> {
    build(descriptor, registry, None, false)
}

/// Containers carry their own version/byte-count header only at the
/// outermost position; nested containers inside an already framed structure
/// omit theirs. The `outermost` flag propagates that rule.
fn build(
    descriptor: &TypeDescriptor,
    registry: &Registry,
    title: Option<&str>,
    outermost: bool,
) -> Result<Decoder> {
    let decoder = match descriptor {
        TypeDescriptor::Scalar(basic_type) => Decoder::Fixed(match title {
            Some(title) => AsFixed::from_title(*basic_type, title),
            None => AsFixed::new(*basic_type),
        }),
        TypeDescriptor::TruncatedFloat { half } => Decoder::TruncatedFloat(
            AsTruncatedFloat::from_title(*half, title.unwrap_or_default())?,
        ),
        TypeDescriptor::String => Decoder::String(AsString::new()),
        TypeDescriptor::Vector(inner) => {
            let inner = build(inner, registry, None, false)?;
            Decoder::Vector(AsVector::new(inner, outermost))
        }
        TypeDescriptor::Set(inner) => {
            let inner = build(inner, registry, None, false)?;
            Decoder::Set(AsSet::new(inner, outermost))
        }
        TypeDescriptor::Map(key, value) => {
            let key = build(key, registry, None, false)?;
            let value = build(value, registry, None, false)?;
            Decoder::Map(AsMap::new(key, value, outermost))
        }
        TypeDescriptor::Bitset(size) => Decoder::Vector(AsVector::bitset(
            *size,
            Decoder::Fixed(AsFixed::new(BasicType::Bool)),
            outermost,
        )),
        TypeDescriptor::Named(name) => Decoder::Record(AsRecord::new(
            registry
                .resolve(name)
                .ok_or_else(|| unregistered(name))?,
        )),
        TypeDescriptor::Pointer(inner) => match inner.as_ref() {
            TypeDescriptor::Named(name) => Decoder::Record(AsRecord::pointer(
                registry
                    .resolve(name)
                    .ok_or_else(|| unregistered(name))?,
            )),
            other => {
                return Err(Error::invalid_arg(
                    "descriptor",
                    format!("pointers to `{}` are not decodable", other.render()),
                ));
            }
        },
    };
    Ok(decoder)
}

fn unregistered(name: &str) -> Error {
    Error::invalid_arg("descriptor", format!("record type `{name}` is not registered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use treeline_typename::parse;

    #[test]
    fn nested_containers_share_one_outer_header() {
        let registry = Registry::new();
        let descriptor = parse("vector<map<int,vector<float>>>").unwrap();
        let decoder = decoder_for(&descriptor, &registry).unwrap();
        let Decoder::Vector(outer) = &decoder else {
            panic!("expected vector decoder");
        };
        assert!(outer.has_header());
        let Decoder::Map(map) = outer.inner() else {
            panic!("expected map element");
        };
        assert!(!map.has_header());
        let Decoder::Fixed(key) = map.key() else {
            panic!("expected fixed key");
        };
        assert_eq!(key.basic_type(), BasicType::Int32);
        let Decoder::Vector(inner) = map.value() else {
            panic!("expected vector value");
        };
        assert!(!inner.has_header());
        assert_eq!(
            decoder.type_name(),
            "vector<map<int32_t,vector<float>>>"
        );
    }

    #[test]
    fn member_decoders_have_no_header() {
        let registry = Registry::new();
        let descriptor = parse("vector<double>").unwrap();
        let member = decoder_for_member(&descriptor, &registry).unwrap();
        let Decoder::Vector(vector) = &member else {
            panic!("expected vector decoder");
        };
        assert!(!vector.has_header());
    }

    #[test]
    fn column_title_feeds_leaf_configuration() {
        let registry = Registry::new();
        let fixed = decoder_for_column("float", "cov[3][3]/F", &registry).unwrap();
        assert_eq!(fixed.item_width(), Some(36));

        let truncated = decoder_for_column("Double32_t", "phi[0,twopi,10]", &registry).unwrap();
        let Decoder::TruncatedFloat(t) = &truncated else {
            panic!("expected truncated decoder");
        };
        assert!(!t.is_default_fallback());
    }

    #[test]
    fn cache_keys_are_stable_and_content_addressed() {
        let registry = Registry::new();
        let a = decoder_for(&parse("vector<map<int,vector<float>>>").unwrap(), &registry).unwrap();
        let b = decoder_for(&parse("vector<map<Int_t,vector<Float_t>>>").unwrap(), &registry)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "vector(h=1,map(h=0,fixed(i4),vector(h=0,fixed(f4))))");
    }

    #[test]
    fn unregistered_records_are_rejected() {
        let mut registry = Registry::new();
        let err = decoder_for(&TypeDescriptor::Named("Hit".to_string()), &registry).unwrap_err();
        assert!(err.to_string().contains("not registered"));

        registry.register(crate::record::RecordDecoder::new("Hit"));
        let decoder = decoder_for(&TypeDescriptor::Named("Hit".to_string()), &registry).unwrap();
        assert_eq!(decoder.type_name(), "Hit");
    }
}
