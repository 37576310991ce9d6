use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::guid::hex_value;
use crate::BsonError;

/// A 12-byte object id.
///
/// Layout (all fields big-endian): 4-byte timestamp in seconds, 3-byte
/// machine id, 2-byte process id, 3-byte increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; 12]);

struct ProcessSeed {
    machine: u32,
    pid: u16,
    counter: AtomicU32,
}

fn seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| {
        let mut rng = rand::thread_rng();
        ProcessSeed {
            machine: rng.gen::<u32>() & 0x00ff_ffff,
            pid: std::process::id() as u16,
            counter: AtomicU32::new(rng.gen::<u32>() & 0x00ff_ffff),
        }
    })
}

impl ObjectId {
    /// Generates a fresh id from the clock, a per-process random machine id
    /// and a wrapping 24-bit counter.
    pub fn new() -> Self {
        let seed = seed();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i32)
            .unwrap_or(0);
        let increment = seed.counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        Self::pack(timestamp, seed.machine, seed.pid, increment)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    /// Builds an id from its fields. `machine` and `increment` must fit in 24 bits.
    pub fn from_parts(timestamp: i32, machine: u32, pid: u16, increment: u32) -> Result<Self, BsonError> {
        if machine & 0xff00_0000 != 0 {
            return Err(BsonError::invalid_argument(
                "machine",
                "The machine value must be between 0 and 16777215 (it must fit in 3 bytes).",
            ));
        }
        if increment & 0xff00_0000 != 0 {
            return Err(BsonError::invalid_argument(
                "increment",
                "The increment value must be between 0 and 16777215 (it must fit in 3 bytes).",
            ));
        }
        Ok(Self::pack(timestamp, machine, pid, increment))
    }

    fn pack(timestamp: i32, machine: u32, pid: u16, increment: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..7].copy_from_slice(&machine.to_be_bytes()[1..]);
        bytes[7..9].copy_from_slice(&pid.to_be_bytes());
        bytes[9..12].copy_from_slice(&increment.to_be_bytes()[1..]);
        ObjectId(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn timestamp(&self) -> i32 {
        i32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn machine(&self) -> u32 {
        u32::from_be_bytes([0, self.0[4], self.0[5], self.0[6]])
    }

    pub fn pid(&self) -> u16 {
        u16::from_be_bytes([self.0[7], self.0[8]])
    }

    pub fn increment(&self) -> u32 {
        u32::from_be_bytes([0, self.0[9], self.0[10], self.0[11]])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BsonError::format(format!("'{s}' is not a valid 24 digit hex string."));
        let digits = s.as_bytes();
        if digits.len() != 24 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or_else(invalid)?;
            let lo = hex_value(pair[1]).ok_or_else(invalid)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(ObjectId(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_big_endian() {
        let id = ObjectId::from_parts(0x01020304, 0x050607, 0x0809, 0x0a0b0c).unwrap();
        assert_eq!(id.bytes(), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(id.timestamp(), 0x01020304);
        assert_eq!(id.machine(), 0x050607);
        assert_eq!(id.pid(), 0x0809);
        assert_eq!(id.increment(), 0x0a0b0c);
        assert_eq!(id.to_string(), "0102030405060708090a0b0c");
    }

    #[test]
    fn rejects_oversized_fields() {
        assert!(matches!(
            ObjectId::from_parts(0, 0x0100_0000, 0, 0),
            Err(BsonError::InvalidArgument { param: "machine", .. })
        ));
        assert!(matches!(
            ObjectId::from_parts(0, 0, 0, 0x0100_0000),
            Err(BsonError::InvalidArgument { param: "increment", .. })
        ));
    }

    #[test]
    fn parses_hex() {
        let id: ObjectId = "4D0A1B2C3D4E5F6A7B8C9D0E".parse().unwrap();
        assert_eq!(id.to_string(), "4d0a1b2c3d4e5f6a7b8c9d0e");
        assert!("4d0a".parse::<ObjectId>().is_err());
        assert!("4d0a1b2c3d4e5f6a7b8c9d0g".parse::<ObjectId>().is_err());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(a.machine(), b.machine());
    }
}
