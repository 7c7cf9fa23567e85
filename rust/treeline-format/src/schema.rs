//! Basic leaf types of the container format.

/// Fixed-width leaf type of a column, as stored on the wire.
///
/// All multi-byte values are big-endian on the wire and converted to native
/// byte order when decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl BasicType {
    /// Size in bytes of one value, both on the wire and in decoded storage.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            BasicType::Bool | BasicType::Int8 | BasicType::UInt8 => 1,
            BasicType::Int16 | BasicType::UInt16 => 2,
            BasicType::Int32 | BasicType::UInt32 | BasicType::Float32 => 4,
            BasicType::Int64 | BasicType::UInt64 | BasicType::Float64 => 8,
        }
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            BasicType::Int8 | BasicType::Int16 | BasicType::Int32 | BasicType::Int64
        )
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, BasicType::Float32 | BasicType::Float64)
    }

    /// Canonical C++ spelling used when re-rendering type descriptors.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            BasicType::Bool => "bool",
            BasicType::Int8 => "int8_t",
            BasicType::UInt8 => "uint8_t",
            BasicType::Int16 => "int16_t",
            BasicType::UInt16 => "uint16_t",
            BasicType::Int32 => "int32_t",
            BasicType::UInt32 => "uint32_t",
            BasicType::Int64 => "int64_t",
            BasicType::UInt64 => "uint64_t",
            BasicType::Float32 => "float",
            BasicType::Float64 => "double",
        }
    }

    /// Short stable code used in decoder cache keys.
    pub fn code(&self) -> &'static str {
        match self {
            BasicType::Bool => "b1",
            BasicType::Int8 => "i1",
            BasicType::UInt8 => "u1",
            BasicType::Int16 => "i2",
            BasicType::UInt16 => "u2",
            BasicType::Int32 => "i4",
            BasicType::UInt32 => "u4",
            BasicType::Int64 => "i8",
            BasicType::UInt64 => "u8",
            BasicType::Float32 => "f4",
            BasicType::Float64 => "f8",
        }
    }
}

/// Resolves a scalar type alias to its basic type.
///
/// Covers the sized C++ typedefs, the plain C spellings (including the
/// multi-word ones, normalized to single spaces) and the container format's
/// historic typedef family. `std::` qualification must already be stripped by
/// the caller. Returns `None` for anything that is not a known scalar, in
/// particular for the truncated-float families, which are not plain basic
/// types.
pub fn resolve_alias(name: &str) -> Option<BasicType> {
    let bt = match name {
        "bool" | "Bool_t" => BasicType::Bool,
        "char" | "signed char" | "int8_t" | "Char_t" => BasicType::Int8,
        "unsigned char" | "uint8_t" | "UChar_t" | "Byte_t" => BasicType::UInt8,
        "short" | "short int" | "int16_t" | "Short_t" | "Version_t" => BasicType::Int16,
        "unsigned short" | "unsigned short int" | "uint16_t" | "UShort_t" => BasicType::UInt16,
        "int" | "int32_t" | "Int_t" => BasicType::Int32,
        "unsigned" | "unsigned int" | "uint32_t" | "UInt_t" => BasicType::UInt32,
        "long" | "long int" | "long long" | "long long int" | "int64_t" | "Long_t"
        | "Long64_t" => BasicType::Int64,
        "unsigned long" | "unsigned long int" | "unsigned long long"
        | "unsigned long long int" | "uint64_t" | "size_t" | "ULong_t" | "ULong64_t" => {
            BasicType::UInt64
        }
        "float" | "Float_t" => BasicType::Float32,
        "double" | "Double_t" => BasicType::Float64,
        _ => return None,
    };
    Some(bt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_families_agree() {
        assert_eq!(resolve_alias("int"), Some(BasicType::Int32));
        assert_eq!(resolve_alias("Int_t"), Some(BasicType::Int32));
        assert_eq!(resolve_alias("int32_t"), Some(BasicType::Int32));
        assert_eq!(resolve_alias("unsigned long long"), Some(BasicType::UInt64));
        assert_eq!(resolve_alias("Double32_t"), None);
        assert_eq!(resolve_alias("MyClass"), None);
    }

    #[test]
    fn sizes_match_wire_widths() {
        assert_eq!(BasicType::Bool.size(), 1);
        assert_eq!(BasicType::UInt16.size(), 2);
        assert_eq!(BasicType::Float32.size(), 4);
        assert_eq!(BasicType::Int64.size(), 8);
    }
}
