//! Recursive-descent parser for type descriptor text.

use itertools::Itertools;

use treeline_common::{Result, error::Error};
use treeline_format::schema::resolve_alias;

use crate::descriptor::TypeDescriptor;
use crate::token::{Token, TokenKind, tokenize};

/// Resolves identifiers that are not scalars or known templates to named
/// record types. Typically backed by the decoder registry.
pub trait TypeLookup {
    fn contains(&self, name: &str) -> bool;
}

impl TypeLookup for std::collections::HashSet<String> {
    fn contains(&self, name: &str) -> bool {
        std::collections::HashSet::contains(self, name)
    }
}

/// Parses descriptor text with no schema lookup; any identifier that is not a
/// scalar or known template fails with `UnknownType`.
pub fn parse(text: &str) -> Result<TypeDescriptor> {
    parse_with_lookup::<std::collections::HashSet<String>>(text, None)
}

/// Parses descriptor text, resolving unknown leaf identifiers through
/// `lookup`. Deterministic, pure function of the text and the lookup.
pub fn parse_with_lookup<'a, L: TypeLookup>(
    text: &'a str,
    lookup: Option<&'a L>,
) -> Result<TypeDescriptor> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        text,
        tokens,
        index: 0,
        lookup: lookup.map(|l| l as &dyn TypeLookup),
    };
    let descriptor = parser.parse_type(false)?;
    if let Some(token) = parser.peek() {
        return Err(Error::unknown_type(
            token.pos,
            text,
            "unexpected trailing input",
        ));
    }
    Ok(descriptor)
}

/// Words that can open a multi-word C scalar spelling.
const SCALAR_WORDS: &[&str] = &["unsigned", "signed", "char", "short", "int", "long"];

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    index: usize,
    lookup: Option<&'a dyn TypeLookup>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.index).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind<'a>> {
        self.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn fail(&self, position: usize, detail: impl Into<String>) -> Error {
        Error::unknown_type(position, self.text, detail)
    }

    fn parse_type(&mut self, lenient: bool) -> Result<TypeDescriptor> {
        let mut descriptor = self.parse_base(lenient)?;
        while matches!(self.peek_kind(), Some(TokenKind::Star)) {
            self.index += 1;
            descriptor = TypeDescriptor::Pointer(Box::new(descriptor));
        }
        Ok(descriptor)
    }

    fn parse_base(&mut self, lenient: bool) -> Result<TypeDescriptor> {
        let Some(token) = self.next() else {
            return Err(self.fail(self.text.len(), "expected type name"));
        };
        let (pos, name) = match token.kind {
            TokenKind::Ident(name) => (token.pos, name),
            TokenKind::Number(n) if lenient => {
                // Non-type template argument of an ignored template parameter.
                return Ok(TypeDescriptor::Named(n.to_string()));
            }
            _ => return Err(self.fail(token.pos, "expected type name")),
        };

        // Multi-word C scalars (`unsigned long long`, `signed char`, ...).
        if SCALAR_WORDS.contains(&name) {
            let mut phrase = name.to_string();
            while let Some(TokenKind::Ident(word)) = self.peek_kind() {
                if !SCALAR_WORDS.contains(&word) {
                    break;
                }
                phrase.push(' ');
                phrase.push_str(word);
                self.index += 1;
            }
            return match resolve_alias(&phrase) {
                Some(bt) => Ok(TypeDescriptor::Scalar(bt)),
                None => Err(self.fail(pos, format!("unknown scalar type `{phrase}`"))),
            };
        }

        let base = name.strip_prefix("std::").unwrap_or(name);
        match base {
            "string" => {
                // `basic_string` carries char-traits/allocator arguments;
                // plain `string` never has any.
                Ok(TypeDescriptor::String)
            }
            "basic_string" => {
                if matches!(self.peek_kind(), Some(TokenKind::Open)) {
                    self.parse_template_args(pos, base, 0, true)?;
                }
                Ok(TypeDescriptor::String)
            }
            "vector" | "list" | "deque" => {
                let mut args = self.parse_template_args(pos, base, 1, false)?;
                Ok(TypeDescriptor::Vector(Box::new(args.remove(0))))
            }
            "set" => {
                let mut args = self.parse_template_args(pos, base, 1, false)?;
                Ok(TypeDescriptor::Set(Box::new(args.remove(0))))
            }
            "map" => {
                let mut args = self.parse_template_args(pos, base, 2, false)?;
                let value = args.remove(1);
                let key = args.remove(0);
                Ok(TypeDescriptor::Map(Box::new(key), Box::new(value)))
            }
            "bitset" => self.parse_bitset(pos),
            "Float16_t" => Ok(TypeDescriptor::TruncatedFloat { half: true }),
            "Double32_t" => Ok(TypeDescriptor::TruncatedFloat { half: false }),
            _ => {
                if let Some(bt) = resolve_alias(base) {
                    return Ok(TypeDescriptor::Scalar(bt));
                }
                self.parse_named(pos, base, lenient)
            }
        }
    }

    /// Template arguments. The first `needed` are parsed strictly; anything
    /// beyond (allocators, comparators, char traits) is parsed leniently and
    /// discarded by the caller.
    fn parse_template_args(
        &mut self,
        pos: usize,
        what: &str,
        needed: usize,
        all_lenient: bool,
    ) -> Result<Vec<TypeDescriptor>> {
        self.expect_open(what)?;
        let mut args = Vec::new();
        loop {
            let lenient = all_lenient || args.len() >= needed;
            args.push(self.parse_type(lenient)?);
            match self.next() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::Close,
                    ..
                }) => break,
                Some(token) => {
                    return Err(self.fail(token.pos, "expected `,` or `>`"));
                }
                None => return Err(self.fail(self.text.len(), "expected `>`")),
            }
        }
        if args.len() < needed {
            return Err(self.fail(
                pos,
                format!("`{what}` requires {needed} template argument(s), found {}", args.len()),
            ));
        }
        Ok(args)
    }

    fn parse_bitset(&mut self, pos: usize) -> Result<TypeDescriptor> {
        self.expect_open("bitset")?;
        let size = match self.next() {
            Some(Token {
                kind: TokenKind::Number(n),
                ..
            }) => n,
            Some(token) => {
                return Err(self.fail(token.pos, "`bitset` requires an integer argument"));
            }
            None => return Err(self.fail(self.text.len(), "expected `>`")),
        };
        loop {
            match self.next() {
                Some(Token {
                    kind: TokenKind::Close,
                    ..
                }) => break,
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => {
                    self.parse_type(true)?;
                }
                Some(token) => return Err(self.fail(token.pos, "expected `,` or `>`")),
                None => return Err(self.fail(self.text.len(), "expected `>`")),
            }
        }
        Ok(TypeDescriptor::Bitset(size))
    }

    fn parse_named(&mut self, pos: usize, base: &str, lenient: bool) -> Result<TypeDescriptor> {
        let full = if matches!(self.peek_kind(), Some(TokenKind::Open)) {
            // Unknown template: consume its arguments and canonicalize the
            // full spelling for the lookup.
            let args = self.parse_template_args(pos, base, 0, true)?;
            format!("{base}<{}>", args.iter().map(|a| a.render()).join(","))
        } else {
            base.to_string()
        };
        if lenient {
            return Ok(TypeDescriptor::Named(full));
        }
        match self.lookup {
            Some(lookup) if lookup.contains(&full) => Ok(TypeDescriptor::Named(full)),
            _ => Err(self.fail(pos, format!("unknown identifier `{full}`"))),
        }
    }

    fn expect_open(&mut self, what: &str) -> Result<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Open,
                ..
            }) => Ok(()),
            Some(token) => Err(self.fail(token.pos, format!("expected `<` after `{what}`"))),
            None => Err(self.fail(self.text.len(), format!("expected `<` after `{what}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use treeline_common::error::ErrorKind;
    use treeline_format::schema::BasicType;

    use super::*;

    fn lookup(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_three_level_nesting() {
        let descriptor = parse("vector<map<int,vector<float>>>").unwrap();
        let expected = TypeDescriptor::Vector(Box::new(TypeDescriptor::Map(
            Box::new(TypeDescriptor::Scalar(BasicType::Int32)),
            Box::new(TypeDescriptor::Vector(Box::new(TypeDescriptor::Scalar(
                BasicType::Float32,
            )))),
        )));
        assert_eq!(descriptor, expected);
        assert_eq!(descriptor.render(), "vector<map<int32_t,vector<float>>>");
        // Canonical rendering parses back to the identical tree.
        assert_eq!(parse(&descriptor.render()).unwrap(), descriptor);
    }

    #[test]
    fn allocator_arguments_are_discarded() {
        let plain = parse("vector<int>").unwrap();
        assert_eq!(parse("vector<int,alloc>").unwrap(), plain);
        assert_eq!(parse("vector<int, allocator<int> >").unwrap(), plain);
        assert_eq!(
            parse("map<string,double,less<string>,alloc>").unwrap(),
            parse("map<string,double>").unwrap()
        );
    }

    #[test]
    fn unterminated_template_points_at_expected_close() {
        let err = parse("vector<int").unwrap_err();
        match err.kind() {
            ErrorKind::UnknownType {
                position, rendered, ..
            } => {
                assert_eq!(*position, 10);
                assert!(rendered.ends_with("          ^"), "{rendered}");
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
        assert!(err.to_string().contains("expected `>`"));
    }

    #[test]
    fn multiword_scalars_resolve() {
        assert_eq!(
            parse("unsigned long long").unwrap(),
            TypeDescriptor::Scalar(BasicType::UInt64)
        );
        assert_eq!(
            parse("vector<unsigned short>").unwrap(),
            TypeDescriptor::Vector(Box::new(TypeDescriptor::Scalar(BasicType::UInt16)))
        );
        assert_eq!(
            parse("signed char").unwrap(),
            TypeDescriptor::Scalar(BasicType::Int8)
        );
    }

    #[test]
    fn std_prefix_and_string_forms() {
        assert_eq!(parse("std::string").unwrap(), TypeDescriptor::String);
        assert_eq!(
            parse("std::basic_string<char,std::char_traits<char>,std::allocator<char>>").unwrap(),
            TypeDescriptor::String
        );
        assert_eq!(
            parse("std::vector<std::string>").unwrap(),
            TypeDescriptor::Vector(Box::new(TypeDescriptor::String))
        );
    }

    #[test]
    fn named_types_require_lookup() {
        let err = parse("TrackHit").unwrap_err();
        assert!(err.to_string().contains("unknown identifier `TrackHit`"));

        let names = lookup(&["TrackHit"]);
        let descriptor = parse_with_lookup("vector<TrackHit>", Some(&names)).unwrap();
        assert_eq!(
            descriptor,
            TypeDescriptor::Vector(Box::new(TypeDescriptor::Named("TrackHit".to_string())))
        );
    }

    #[test]
    fn pointers_wrap_the_leaf() {
        let names = lookup(&["TrackHit"]);
        let descriptor = parse_with_lookup("vector<TrackHit*>", Some(&names)).unwrap();
        assert_eq!(
            descriptor,
            TypeDescriptor::Vector(Box::new(TypeDescriptor::Pointer(Box::new(
                TypeDescriptor::Named("TrackHit".to_string())
            ))))
        );
    }

    #[test]
    fn bitset_and_truncated_float_leaves() {
        assert_eq!(parse("bitset<24>").unwrap(), TypeDescriptor::Bitset(24));
        assert_eq!(
            parse("Float16_t").unwrap(),
            TypeDescriptor::TruncatedFloat { half: true }
        );
        assert_eq!(
            parse("vector<Double32_t>").unwrap(),
            TypeDescriptor::Vector(Box::new(TypeDescriptor::TruncatedFloat { half: false }))
        );
    }

    #[test]
    fn arity_and_trailing_input_are_rejected() {
        assert!(parse("map<int>").unwrap_err().to_string().contains("requires 2"));
        assert!(
            parse("vector<int> x")
                .unwrap_err()
                .to_string()
                .contains("trailing input")
        );
    }
}
