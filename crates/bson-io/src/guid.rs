//! GUIDs and the byte orders different drivers historically used for them.

use std::fmt;
use std::str::FromStr;

use crate::values::BsonBinarySubType;
use crate::BsonError;

/// A 16-byte GUID held in RFC 4122 byte order (the order it is displayed in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid([u8; 16]);

impl Guid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Guid {
    type Err = BsonError;

    /// Accepts 32 hex digits, optionally hyphenated and optionally in braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);
        let digits: Vec<u8> = trimmed.bytes().filter(|&b| b != b'-').collect();
        let invalid = || BsonError::format(format!("Invalid GUID string: '{s}'."));
        if digits.len() != 32 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or_else(invalid)?;
            let lo = hex_value(pair[1]).ok_or_else(invalid)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Guid(bytes))
    }
}

pub(crate) fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// How a GUID is laid out in a binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GuidRepresentation {
    #[default]
    Unspecified,
    /// Subtype 4, RFC byte order.
    Standard,
    /// Subtype 3, native .NET layout.
    CSharpLegacy,
    /// Subtype 3, each 8-byte half reversed.
    JavaLegacy,
    /// Subtype 3, RFC byte order.
    PythonLegacy,
}

/// Conversions between logical GUIDs and payload bytes.
pub struct GuidConverter;

impl GuidConverter {
    /// The subtype a GUID written under `representation` is tagged with.
    pub fn sub_type_for(representation: GuidRepresentation) -> Result<BsonBinarySubType, BsonError> {
        match representation {
            GuidRepresentation::Unspecified => Err(unspecified()),
            GuidRepresentation::Standard => Ok(BsonBinarySubType::UuidStandard),
            _ => Ok(BsonBinarySubType::UuidLegacy),
        }
    }

    pub fn to_bytes(guid: Guid, representation: GuidRepresentation) -> Result<[u8; 16], BsonError> {
        if representation == GuidRepresentation::Unspecified {
            return Err(unspecified());
        }
        Ok(permute(guid.0, representation))
    }

    pub fn from_bytes(bytes: &[u8], representation: GuidRepresentation) -> Result<Guid, BsonError> {
        let raw = sixteen(bytes)?;
        if representation == GuidRepresentation::Unspecified {
            return Err(unspecified());
        }
        Ok(Guid(permute(raw, representation)))
    }

    /// Resolves a payload by subtype. Subtype 4 accepts only `Standard` or
    /// `Unspecified`; subtype 3 accepts only the legacy representations.
    pub fn from_binary(
        bytes: &[u8],
        sub_type: BsonBinarySubType,
        representation: GuidRepresentation,
    ) -> Result<Guid, BsonError> {
        let raw = sixteen(bytes)?;
        match (sub_type, representation) {
            (
                BsonBinarySubType::UuidStandard,
                GuidRepresentation::Standard | GuidRepresentation::Unspecified,
            ) => Ok(Guid(raw)),
            (
                BsonBinarySubType::UuidLegacy,
                GuidRepresentation::CSharpLegacy
                | GuidRepresentation::JavaLegacy
                | GuidRepresentation::PythonLegacy,
            ) => Ok(Guid(permute(raw, representation))),
            (BsonBinarySubType::UuidStandard | BsonBinarySubType::UuidLegacy, _) => {
                Err(BsonError::format(format!(
                    "Binary subtype {} cannot be read as a GUID with representation {representation:?}.",
                    sub_type.code()
                )))
            }
            _ => Err(BsonError::format(format!(
                "Binary subtype {} is not a UUID subtype.",
                sub_type.code()
            ))),
        }
    }
}

fn unspecified() -> BsonError {
    BsonError::format("GuidRepresentation Unspecified does not define a byte order.")
}

fn sixteen(bytes: &[u8]) -> Result<[u8; 16], BsonError> {
    <[u8; 16]>::try_from(bytes).map_err(|_| {
        BsonError::format(format!(
            "Length of binary subtype UUID must be 16, not {}.",
            bytes.len()
        ))
    })
}

/// Every permutation is its own inverse, so one function serves both directions.
fn permute(mut bytes: [u8; 16], representation: GuidRepresentation) -> [u8; 16] {
    match representation {
        GuidRepresentation::CSharpLegacy => {
            bytes[0..4].reverse();
            bytes[4..6].reverse();
            bytes[6..8].reverse();
        }
        GuidRepresentation::JavaLegacy => {
            bytes[0..8].reverse();
            bytes[8..16].reverse();
        }
        _ => {}
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential() -> Vec<u8> {
        (1..=16).collect()
    }

    #[test]
    fn legacy_permutations() {
        let bytes = sequential();
        let cases = [
            (GuidRepresentation::CSharpLegacy, "04030201-0605-0807-090a-0b0c0d0e0f10"),
            (GuidRepresentation::JavaLegacy, "08070605-0403-0201-100f-0e0d0c0b0a09"),
            (GuidRepresentation::PythonLegacy, "01020304-0506-0708-090a-0b0c0d0e0f10"),
        ];
        for (representation, expected) in cases {
            let guid =
                GuidConverter::from_binary(&bytes, BsonBinarySubType::UuidLegacy, representation)
                    .unwrap();
            assert_eq!(guid.to_string(), expected, "{representation:?}");
            assert_eq!(GuidConverter::to_bytes(guid, representation).unwrap().to_vec(), bytes);
        }
    }

    #[test]
    fn standard_subtype_accepts_unspecified() {
        let guid = GuidConverter::from_binary(
            &sequential(),
            BsonBinarySubType::UuidStandard,
            GuidRepresentation::Unspecified,
        )
        .unwrap();
        assert_eq!(guid.to_string(), "01020304-0506-0708-090a-0b0c0d0e0f10");
    }

    #[test]
    fn mismatched_pairs_fail() {
        let bytes = sequential();
        for representation in [
            GuidRepresentation::CSharpLegacy,
            GuidRepresentation::JavaLegacy,
            GuidRepresentation::PythonLegacy,
        ] {
            assert!(GuidConverter::from_binary(&bytes, BsonBinarySubType::UuidStandard, representation)
                .unwrap_err()
                .is_format());
        }
        for representation in [GuidRepresentation::Standard, GuidRepresentation::Unspecified] {
            assert!(GuidConverter::from_binary(&bytes, BsonBinarySubType::UuidLegacy, representation)
                .unwrap_err()
                .is_format());
        }
        assert!(GuidConverter::from_binary(&bytes, BsonBinarySubType::Binary, GuidRepresentation::Standard)
            .unwrap_err()
            .is_format());
    }

    #[test]
    fn wrong_length_fails_for_every_representation() {
        for representation in [
            GuidRepresentation::Standard,
            GuidRepresentation::CSharpLegacy,
            GuidRepresentation::Unspecified,
        ] {
            let err = GuidConverter::from_binary(&[1; 15], BsonBinarySubType::UuidLegacy, representation)
                .unwrap_err();
            assert!(err.to_string().contains("not 15"), "{err}");
        }
    }

    #[test]
    fn parses_common_spellings() {
        let expected: Guid = "01020304-0506-0708-090a-0b0c0d0e0f10".parse().unwrap();
        assert_eq!("0102030405060708090A0B0C0D0E0F10".parse::<Guid>().unwrap(), expected);
        assert_eq!("{01020304-0506-0708-090a-0b0c0d0e0f10}".parse::<Guid>().unwrap(), expected);
        assert!("0102".parse::<Guid>().is_err());
        assert!("zz020304-0506-0708-090a-0b0c0d0e0f10".parse::<Guid>().is_err());
    }

    #[test]
    fn unspecified_has_no_sub_type() {
        assert!(GuidConverter::sub_type_for(GuidRepresentation::Unspecified).is_err());
        assert_eq!(
            GuidConverter::sub_type_for(GuidRepresentation::JavaLegacy).unwrap(),
            BsonBinarySubType::UuidLegacy
        );
    }
}
