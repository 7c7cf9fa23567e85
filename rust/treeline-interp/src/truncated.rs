//! Truncated-precision float decoding.
//!
//! Columns in the half-precision family (`Float16_t`) and the wide family
//! (`Double32_t`) store 4 packed bytes per value. The decode configuration
//! (value range and bit width) is declared in the column title as a bracketed
//! expression triple, e.g. `[0, twopi, 12]`.

use ordered_float::OrderedFloat;

use treeline_common::{Result, error::Error};
use treeline_format::cursor::Cursor;
use treeline_format::schema::BasicType;
use treeline_sequence::values::Values;

use crate::basket::{BasketArray, DecodeContext, FixedBatch};

/// Storage mode of one truncated-float column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TruncMode {
    /// Unsigned integer of `bits` bits, linearly rescaled into `[low, high]`.
    Linear {
        low: OrderedFloat<f64>,
        high: OrderedFloat<f64>,
        bits: u32,
    },
    /// Mantissa-truncated IEEE float with `bits` mantissa bits.
    Mantissa { bits: u32 },
    /// Plain IEEE `f32`; the wide family's no-range storage.
    Wide,
}

/// Decoder for truncated-precision float columns. Output is always `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsTruncatedFloat {
    mode: TruncMode,
    half: bool,
    fallback: bool,
}

/// Default mantissa bit count of the half-precision family.
pub const HALF_DEFAULT_BITS: u32 = 12;
/// Default bit count of the wide family's linear mode.
pub const WIDE_DEFAULT_BITS: u32 = 32;

impl AsTruncatedFloat {
    pub fn linear(half: bool, low: f64, high: f64, bits: u32) -> AsTruncatedFloat {
        AsTruncatedFloat {
            mode: TruncMode::Linear {
                low: OrderedFloat(low),
                high: OrderedFloat(high),
                bits,
            },
            half,
            fallback: false,
        }
    }

    pub fn mantissa(half: bool, bits: u32) -> AsTruncatedFloat {
        AsTruncatedFloat {
            mode: TruncMode::Mantissa { bits },
            half,
            fallback: false,
        }
    }

    /// Builds the decoder from a column title.
    ///
    /// The bracketed specification is `[low, high]` or `[low, high, bits]`,
    /// each element a restricted arithmetic expression (numeric literals,
    /// `+ - * /`, unary minus, and the constants `pi` and `twopi`). A
    /// malformed specification is a hard error. A title with no bracketed
    /// specification at all degrades to the family default: mantissa
    /// truncation at 12 bits for the half family, plain `f32` for the wide
    /// family. The degradation is observable via
    /// [`is_default_fallback`](Self::is_default_fallback) as well as a
    /// warning log.
    pub fn from_title(half: bool, title: &str) -> Result<AsTruncatedFloat> {
        let Some(spec) = extract_bracket_spec(title) else {
            log::warn!(
                "truncated-float title {title:?} has no [low,high,bits] specification; \
                 falling back to the {} default",
                if half { "half-precision" } else { "wide" }
            );
            let mode = if half {
                TruncMode::Mantissa {
                    bits: HALF_DEFAULT_BITS,
                }
            } else {
                TruncMode::Wide
            };
            return Ok(AsTruncatedFloat {
                mode,
                half,
                fallback: true,
            });
        };

        let parts: Vec<&str> = spec.split(',').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(Error::invalid_arg(
                "title",
                format!("expected [low,high] or [low,high,bits], found [{spec}]"),
            ));
        }
        let low = expr::eval(parts[0])?;
        let high = expr::eval(parts[1])?;
        let bits = match parts.get(2) {
            Some(text) => {
                let value = expr::eval(text)?;
                if value.fract() != 0.0 || !(2.0..=32.0).contains(&value) {
                    return Err(Error::invalid_arg(
                        "title",
                        format!("bit count must be an integer in 2..=32, found {value}"),
                    ));
                }
                value as u32
            }
            None if half => HALF_DEFAULT_BITS,
            None => WIDE_DEFAULT_BITS,
        };

        if low == 0.0 && high == 0.0 {
            return Ok(AsTruncatedFloat::mantissa(half, bits));
        }
        if low >= high {
            return Err(Error::invalid_arg(
                "title",
                format!("value range [{low},{high}] is empty"),
            ));
        }
        Ok(AsTruncatedFloat::linear(half, low, high, bits))
    }

    pub fn mode(&self) -> TruncMode {
        self.mode
    }

    /// True when the decoder was built through the documented no-range
    /// fallback rather than an explicit title specification.
    pub fn is_default_fallback(&self) -> bool {
        self.fallback
    }

    pub fn type_name(&self) -> &'static str {
        if self.half { "Float16_t" } else { "Double32_t" }
    }

    pub fn cache_key(&self) -> String {
        let family = if self.half { "f16" } else { "d32" };
        let mut key = match self.mode {
            TruncMode::Linear { low, high, bits } => {
                format!("trunc({family},lin,{},{},{bits})", low.0, high.0)
            }
            TruncMode::Mantissa { bits } => format!("trunc({family},man,{bits})"),
            TruncMode::Wide => format!("trunc({family},wide)"),
        };
        if self.fallback {
            key.pop();
            key.push_str(",fb)");
        }
        key
    }

    /// Decodes one packed value.
    pub fn read_one(&self, cursor: &mut Cursor<'_>) -> Result<f64> {
        match self.mode {
            TruncMode::Linear { low, high, bits } => {
                cursor.read_truncated_float(low.0, high.0, bits, self.half)
            }
            TruncMode::Mantissa { bits } => cursor.read_truncated_float(0.0, 0.0, bits, self.half),
            TruncMode::Wide => Ok(cursor.read_f32()? as f64),
        }
    }

    pub(crate) fn decode_rows(
        &self,
        cursor: &mut Cursor<'_>,
        ctx: &mut DecodeContext,
    ) -> Result<BasketArray> {
        let remaining = cursor.remaining();
        if remaining % 4 != 0 {
            return Err(Error::malformed_stream(
                cursor.pos(),
                ctx.wire_context(),
                format!("{remaining} bytes do not divide into 4-byte packed floats"),
            ));
        }
        self.read_bulk(cursor, remaining / 4)
    }

    pub(crate) fn read_bulk(&self, cursor: &mut Cursor<'_>, count: usize) -> Result<BasketArray> {
        let mut values = Values::with_capacity::<f64>(count);
        for _ in 0..count {
            values.push(self.read_one(cursor)?);
        }
        Ok(BasketArray::Fixed(FixedBatch {
            values,
            basic_type: BasicType::Float64,
        }))
    }
}

/// Finds the bracketed range specification in a title, if any.
fn extract_bracket_spec(title: &str) -> Option<&str> {
    let open = title.find('[')?;
    let close = title[open..].find(']')?;
    let spec = &title[open + 1..open + close];
    // A bare counter name ([nhits]) is a jagged-length declaration, not a
    // range specification.
    if !spec.contains(',') {
        return None;
    }
    Some(spec)
}

/// Restricted arithmetic expressions for title range specifications:
/// literals, `+ - * /`, unary minus, parentheses, and the constants `pi` and
/// `twopi`. Anything else is a hard parse failure.
mod expr {
    use treeline_common::{Result, error::Error};

    pub fn eval(text: &str) -> Result<f64> {
        let mut parser = Parser {
            bytes: text.as_bytes(),
            text,
            pos: 0,
        };
        let value = parser.expr()?;
        parser.skip_spaces();
        if parser.pos != parser.bytes.len() {
            return Err(parser.fail("unexpected trailing input"));
        }
        Ok(value)
    }

    struct Parser<'a> {
        bytes: &'a [u8],
        text: &'a str,
        pos: usize,
    }

    impl Parser<'_> {
        fn fail(&self, detail: &str) -> Error {
            Error::invalid_arg(
                "title",
                format!("bad range expression `{}` at offset {}: {detail}", self.text, self.pos),
            )
        }

        fn skip_spaces(&mut self) {
            while self.bytes.get(self.pos) == Some(&b' ') {
                self.pos += 1;
            }
        }

        fn peek(&mut self) -> Option<u8> {
            self.skip_spaces();
            self.bytes.get(self.pos).copied()
        }

        fn expr(&mut self) -> Result<f64> {
            let mut value = self.term()?;
            while let Some(op @ (b'+' | b'-')) = self.peek() {
                self.pos += 1;
                let rhs = self.term()?;
                value = if op == b'+' { value + rhs } else { value - rhs };
            }
            Ok(value)
        }

        fn term(&mut self) -> Result<f64> {
            let mut value = self.factor()?;
            while let Some(op @ (b'*' | b'/')) = self.peek() {
                self.pos += 1;
                let rhs = self.factor()?;
                value = if op == b'*' { value * rhs } else { value / rhs };
            }
            Ok(value)
        }

        fn factor(&mut self) -> Result<f64> {
            match self.peek() {
                Some(b'-') => {
                    self.pos += 1;
                    Ok(-self.factor()?)
                }
                Some(b'(') => {
                    self.pos += 1;
                    let value = self.expr()?;
                    if self.peek() != Some(b')') {
                        return Err(self.fail("expected `)`"));
                    }
                    self.pos += 1;
                    Ok(value)
                }
                Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
                Some(c) if c.is_ascii_alphabetic() => self.constant(),
                _ => Err(self.fail("expected a number, constant or `(`")),
            }
        }

        fn number(&mut self) -> Result<f64> {
            let start = self.pos;
            while let Some(&c) = self.bytes.get(self.pos) {
                if c.is_ascii_digit() || c == b'.' || c == b'e' || c == b'E' {
                    self.pos += 1;
                } else if (c == b'+' || c == b'-')
                    && matches!(self.bytes.get(self.pos - 1), Some(b'e' | b'E'))
                {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            self.text[start..self.pos]
                .parse::<f64>()
                .map_err(|_| self.fail("malformed numeric literal"))
        }

        fn constant(&mut self) -> Result<f64> {
            let start = self.pos;
            while matches!(self.bytes.get(self.pos), Some(c) if c.is_ascii_alphanumeric() || *c == b'_')
            {
                self.pos += 1;
            }
            match &self.text[start..self.pos] {
                "pi" => Ok(std::f64::consts::PI),
                "twopi" => Ok(2.0 * std::f64::consts::PI),
                other => Err(self.fail(&format!("unknown constant `{other}`"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_triple_builds_linear_mode() {
        let decoder = AsTruncatedFloat::from_title(false, "phi/d[0, twopi, 12]").unwrap();
        match decoder.mode() {
            TruncMode::Linear { low, high, bits } => {
                assert_eq!(low.0, 0.0);
                assert!((high.0 - 2.0 * std::f64::consts::PI).abs() < 1e-12);
                assert_eq!(bits, 12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!decoder.is_default_fallback());
    }

    #[test]
    fn title_expressions_evaluate() {
        let decoder =
            AsTruncatedFloat::from_title(false, "eta[-2*pi, 2*pi + 1, 10]").unwrap();
        match decoder.mode() {
            TruncMode::Linear { low, high, bits } => {
                assert!((low.0 + 2.0 * std::f64::consts::PI).abs() < 1e-12);
                assert!((high.0 - (2.0 * std::f64::consts::PI + 1.0)).abs() < 1e-12);
                assert_eq!(bits, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_range_selects_mantissa_mode() {
        let decoder = AsTruncatedFloat::from_title(true, "x[0,0,14]").unwrap();
        assert_eq!(decoder.mode(), TruncMode::Mantissa { bits: 14 });
    }

    #[test]
    fn missing_spec_falls_back_observably() {
        let half = AsTruncatedFloat::from_title(true, "energy").unwrap();
        assert!(half.is_default_fallback());
        assert_eq!(
            half.mode(),
            TruncMode::Mantissa {
                bits: HALF_DEFAULT_BITS
            }
        );

        let wide = AsTruncatedFloat::from_title(false, "energy[nhits]").unwrap();
        assert!(wide.is_default_fallback());
        assert_eq!(wide.mode(), TruncMode::Wide);
    }

    #[test]
    fn malformed_specs_are_hard_errors() {
        assert!(AsTruncatedFloat::from_title(false, "x[0,1,junk]").is_err());
        assert!(AsTruncatedFloat::from_title(false, "x[3,1]").is_err());
        assert!(AsTruncatedFloat::from_title(false, "x[1,2,64]").is_err());
        assert!(AsTruncatedFloat::from_title(false, "x[0,1,2,3]").is_err());
    }

    #[test]
    fn linear_round_trip_stays_within_precision_bound() {
        let bits = 10u32;
        let (low, high) = (-1.0, 1.0);
        let decoder = AsTruncatedFloat::linear(false, low, high, bits);
        let scale = (1u64 << bits) as f64 / (high - low);
        let tolerance = (high - low) / (1u64 << bits) as f64;
        for i in 0..100 {
            let value = low + (high - low) * (i as f64) / 99.0;
            let raw = ((value - low) * scale).min((1u64 << bits) as f64 - 1.0) as u32;
            let data = raw.to_be_bytes();
            let mut cursor = Cursor::new(&data);
            let decoded = decoder.read_one(&mut cursor).unwrap();
            assert!(
                (decoded - value).abs() <= tolerance,
                "{value} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn wide_mode_reads_plain_f32() {
        let decoder = AsTruncatedFloat::from_title(false, "no spec").unwrap();
        let data = 2.5f32.to_be_bytes();
        let mut cursor = Cursor::new(&data);
        assert_eq!(decoder.read_one(&mut cursor).unwrap(), 2.5);
    }

    #[test]
    fn cache_keys_distinguish_modes() {
        let linear = AsTruncatedFloat::linear(false, 0.0, 1.0, 12);
        let fallback = AsTruncatedFloat::from_title(true, "x").unwrap();
        assert_eq!(linear.cache_key(), "trunc(d32,lin,0,1,12)");
        assert_eq!(fallback.cache_key(), "trunc(f16,man,12,fb)");
    }
}
