//! IEEE 754-2008 decimal128 in binary integer decimal (BID) encoding.

use std::fmt;
use std::str::FromStr;

use crate::BsonError;

const EXPONENT_BIAS: i32 = 6176;
const MAX_EXPONENT: i32 = 6111;
const MIN_EXPONENT: i32 = -6176;
const MAX_DIGITS: usize = 34;

const SIGN_BIT: u64 = 1 << 63;
const NAN_MASK: u64 = 0x7c00_0000_0000_0000;
const INFINITY_MASK: u64 = 0x7800_0000_0000_0000;
const COEFFICIENT_HIGH_MASK: u64 = 0x0001_ffff_ffff_ffff;

/// A decimal128 value, kept as its two 64-bit halves.
///
/// Equality is bitwise: `1.0` and `1.00` are different values here, as they
/// are on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal128 {
    high: u64,
    low: u64,
}

impl Decimal128 {
    pub const NAN: Decimal128 = Decimal128::from_parts(NAN_MASK, 0);
    pub const POSITIVE_INFINITY: Decimal128 = Decimal128::from_parts(INFINITY_MASK, 0);
    pub const NEGATIVE_INFINITY: Decimal128 = Decimal128::from_parts(INFINITY_MASK | SIGN_BIT, 0);

    pub const fn from_parts(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub const fn high(&self) -> u64 {
        self.high
    }

    pub const fn low(&self) -> u64 {
        self.low
    }

    /// Wire order: low qword then high qword, each little-endian.
    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.low.to_le_bytes());
        bytes[8..].copy_from_slice(&self.high.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        let mut low = [0u8; 8];
        let mut high = [0u8; 8];
        low.copy_from_slice(&bytes[..8]);
        high.copy_from_slice(&bytes[8..]);
        Self::from_parts(u64::from_le_bytes(high), u64::from_le_bytes(low))
    }

    pub fn is_nan(&self) -> bool {
        self.high & NAN_MASK == NAN_MASK
    }

    pub fn is_infinity(&self) -> bool {
        self.high & NAN_MASK == INFINITY_MASK
    }

    pub fn is_negative(&self) -> bool {
        self.high & SIGN_BIT != 0
    }

    /// Biased exponent and coefficient of a finite value. Non-canonical
    /// encodings (coefficient of 2^113 or more) read as zero.
    fn finite_parts(&self) -> (i32, u128) {
        if (self.high >> 61) & 0b11 == 0b11 {
            let exponent = ((self.high >> 47) & 0x3fff) as i32;
            (exponent, 0)
        } else {
            let exponent = ((self.high >> 49) & 0x3fff) as i32;
            let coefficient = (((self.high & COEFFICIENT_HIGH_MASK) as u128) << 64) | self.low as u128;
            (exponent, coefficient)
        }
    }

    fn encode(negative: bool, exponent: i32, coefficient: u128) -> Self {
        let biased = (exponent + EXPONENT_BIAS) as u64;
        let mut high = (biased << 49) | ((coefficient >> 64) as u64 & COEFFICIENT_HIGH_MASK);
        if negative {
            high |= SIGN_BIT;
        }
        Self::from_parts(high, coefficient as u64)
    }
}

impl From<i32> for Decimal128 {
    fn from(value: i32) -> Self {
        Decimal128::from(value as i64)
    }
}

impl From<i64> for Decimal128 {
    fn from(value: i64) -> Self {
        Decimal128::encode(value < 0, 0, value.unsigned_abs() as u128)
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nan() {
            return f.write_str("NaN");
        }
        let sign = if self.is_negative() { "-" } else { "" };
        if self.is_infinity() {
            return write!(f, "{sign}Infinity");
        }
        let (biased, coefficient) = self.finite_parts();
        let exponent = biased - EXPONENT_BIAS;
        let digits = coefficient.to_string();
        let adjusted = digits.len() as i32 - 1 + exponent;

        if exponent > 0 || adjusted < -6 {
            f.write_str(sign)?;
            f.write_str(&digits[..1])?;
            if digits.len() > 1 {
                write!(f, ".{}", &digits[1..])?;
            }
            let exponent_sign = if adjusted >= 0 { "+" } else { "" };
            write!(f, "E{exponent_sign}{adjusted}")
        } else if exponent == 0 {
            write!(f, "{sign}{digits}")
        } else {
            let point = digits.len() as i32 + exponent;
            if point > 0 {
                let (whole, fraction) = digits.split_at(point as usize);
                write!(f, "{sign}{whole}.{fraction}")
            } else {
                let zeros = "0".repeat((-point) as usize);
                write!(f, "{sign}0.{zeros}{digits}")
            }
        }
    }
}

impl FromStr for Decimal128 {
    type Err = BsonError;

    /// Parses decimal text. Values that cannot be represented without
    /// rounding are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BsonError::format(format!("Invalid Decimal128 string: '{s}'."));
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if body.eq_ignore_ascii_case("nan") {
            return Ok(Decimal128::NAN);
        }
        if body.eq_ignore_ascii_case("infinity") || body.eq_ignore_ascii_case("inf") {
            return Ok(if negative {
                Decimal128::NEGATIVE_INFINITY
            } else {
                Decimal128::POSITIVE_INFINITY
            });
        }

        let (mantissa, exponent_text) = match body.find(['e', 'E']) {
            Some(i) => (&body[..i], Some(&body[i + 1..])),
            None => (body, None),
        };
        let mut exponent: i32 = match exponent_text {
            Some(text) => {
                let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                // Huge exponents saturate and then fail the range checks below
                text.parse::<i64>()
                    .unwrap_or(if text.starts_with('-') { i64::MIN } else { i64::MAX })
                    .clamp(i32::MIN as i64 / 2, i32::MAX as i64 / 2) as i32
            }
            None => 0,
        };

        let mut digits = String::new();
        let mut seen_digit = false;
        let mut seen_point = false;
        for c in mantissa.chars() {
            match c {
                '0'..='9' => {
                    seen_digit = true;
                    if seen_point {
                        exponent -= 1;
                    }
                    if !(digits.is_empty() && c == '0') {
                        digits.push(c);
                    }
                }
                '.' if !seen_point => seen_point = true,
                _ => return Err(invalid()),
            }
        }
        if !seen_digit {
            return Err(invalid());
        }

        if digits.is_empty() {
            let exponent = exponent.clamp(MIN_EXPONENT, MAX_EXPONENT);
            return Ok(Decimal128::encode(negative, exponent, 0));
        }

        // Drop trailing zeros that do not fit, or that sit below the minimum exponent
        while digits.len() > MAX_DIGITS || exponent < MIN_EXPONENT {
            if !digits.ends_with('0') {
                return Err(BsonError::format(format!(
                    "Decimal128 value '{s}' cannot be represented without rounding."
                )));
            }
            digits.pop();
            exponent += 1;
        }
        // Clamp a large exponent by scaling the coefficient up
        while exponent > MAX_EXPONENT {
            if digits.len() >= MAX_DIGITS {
                return Err(BsonError::format(format!(
                    "Decimal128 value '{s}' is out of range."
                )));
            }
            digits.push('0');
            exponent -= 1;
        }

        let coefficient: u128 = digits.parse().map_err(|_| invalid())?;
        Ok(Decimal128::encode(negative, exponent, coefficient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        text.parse::<Decimal128>()
            .unwrap_or_else(|e| panic!("{text}: {e}"))
            .to_string()
    }

    #[test]
    fn formats_canonically() {
        let cases = [
            ("0", "0"),
            ("-0", "-0"),
            ("1", "1"),
            ("1.5", "1.5"),
            ("-1.50", "-1.50"),
            ("0.001", "0.001"),
            ("0.0000001", "1E-7"),
            ("1E+3", "1E+3"),
            ("1000", "1000"),
            ("12345678901234567890123456789012.34", "12345678901234567890123456789012.34"),
            ("0E+3", "0E+3"),
            ("NaN", "NaN"),
            ("-inf", "-Infinity"),
            ("Infinity", "Infinity"),
        ];
        for (input, expected) in cases {
            assert_eq!(round_trip(input), expected, "{input}");
        }
    }

    #[test]
    fn rejects_rounding_and_garbage() {
        for input in [
            "1234567890123456789012345678901234.5",
            "1E+7000",
            "1E-7000",
            "",
            "-",
            ".",
            "1.2.3",
            "1e",
            "abc",
        ] {
            assert!(input.parse::<Decimal128>().is_err(), "{input}");
        }
    }

    #[test]
    fn trims_and_clamps_exactly() {
        // 35 digits with a trailing zero fit after dropping it
        assert_eq!(
            round_trip("12345678901234567890123456789012340"),
            "1.234567890123456789012345678901234E+34"
        );
        assert_eq!(round_trip("1E+6112"), "1.0E+6112");
        assert_eq!(round_trip("0E-7000"), "0E-6176");
    }

    #[test]
    fn wire_order_is_low_then_high() {
        let one = Decimal128::from(1i64);
        assert_eq!(one.high(), 0x3040_0000_0000_0000);
        let bytes = one.to_le_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[15], 0x30);
        assert_eq!(Decimal128::from_le_bytes(bytes), one);
        assert_eq!(Decimal128::from(-5i32).to_string(), "-5");
    }
}
