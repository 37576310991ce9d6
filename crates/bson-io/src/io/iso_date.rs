//! The ISO-8601 shapes accepted by `ISODate(...)` and `$date`, and the
//! formatting used when writing dates back out.
//!
//! Accepted inputs are a fixed list of shapes rather than whatever a general
//! date parser will take: an extended (`yyyy-MM-dd`) or basic (`yyyyMMdd`)
//! date, the extended date possibly cut short after the year or month, an
//! optional time in the matching style down to up to seven fraction digits,
//! and an optional `Z` or numeric offset. Everything without an offset is UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};

use crate::BsonError;

const MILLIS_PER_MINUTE: i64 = 60_000;

struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn peek_digit(&self) -> bool {
        self.peek().is_some_and(|c| c.is_ascii_digit())
    }

    /// Exactly `count` digits.
    fn digits(&mut self, count: usize) -> Option<u32> {
        let end = self.position + count;
        let run = self.bytes.get(self.position..end)?;
        if !run.iter().all(u8::is_ascii_digit) {
            return None;
        }
        self.position = end;
        Some(run.iter().fold(0, |acc, &d| acc * 10 + u32::from(d - b'0')))
    }
}

#[derive(Default)]
struct Time {
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
}

/// Parses `value` to milliseconds since the Unix epoch.
pub(crate) fn parse_iso_date(value: &str) -> Result<i64, BsonError> {
    parse(value).ok_or_else(|| BsonError::format(format!("Invalid ISODate string: '{value}'.")))
}

fn parse(value: &str) -> Option<i64> {
    let mut cursor = Cursor {
        bytes: value.as_bytes(),
        position: 0,
    };

    let year = cursor.digits(4)? as i32;
    let (month, day, extended) = if cursor.eat(b'-') {
        let month = cursor.digits(2)?;
        if cursor.at_end() {
            (month, 1, true)
        } else {
            if !cursor.eat(b'-') {
                return None;
            }
            (month, cursor.digits(2)?, true)
        }
    } else if cursor.at_end() {
        (1, 1, true)
    } else {
        (cursor.digits(2)?, cursor.digits(2)?, false)
    };
    let full_date = cursor.position == if extended { 10 } else { 8 };

    let mut time = Time::default();
    let mut offset_minutes = 0i64;
    if !cursor.at_end() {
        if !full_date || !cursor.eat(b'T') {
            return None;
        }
        time = parse_time(&mut cursor, extended)?;
        offset_minutes = parse_zone(&mut cursor)?;
        if !cursor.at_end() {
            return None;
        }
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(time.hour, time.minute, time.second, time.millis)?;
    let millis = date.and_time(time).and_utc().timestamp_millis();
    Some(millis - offset_minutes * MILLIS_PER_MINUTE)
}

fn parse_time(cursor: &mut Cursor<'_>, extended: bool) -> Option<Time> {
    let mut time = Time {
        hour: cursor.digits(2)?,
        ..Time::default()
    };
    let next_field = |cursor: &mut Cursor<'_>| {
        if extended {
            cursor.eat(b':')
        } else {
            cursor.peek_digit()
        }
    };
    if !next_field(cursor) {
        return Some(time);
    }
    time.minute = cursor.digits(2)?;
    if !next_field(cursor) {
        return Some(time);
    }
    time.second = cursor.digits(2)?;
    if cursor.eat(b'.') {
        let start = cursor.position;
        while cursor.peek_digit() {
            cursor.position += 1;
        }
        let fraction = &cursor.bytes[start..cursor.position];
        if fraction.is_empty() || fraction.len() > 7 {
            return None;
        }
        // Milliseconds only; finer digits are dropped
        time.millis = fraction
            .iter()
            .chain(std::iter::repeat(&b'0'))
            .take(3)
            .fold(0, |acc, &d| acc * 10 + u32::from(d - b'0'));
    }
    Some(time)
}

/// The zone suffix as an offset in minutes east of UTC.
fn parse_zone(cursor: &mut Cursor<'_>) -> Option<i64> {
    if cursor.eat(b'Z') {
        return Some(0);
    }
    let sign = if cursor.eat(b'+') {
        1
    } else if cursor.eat(b'-') {
        -1
    } else {
        return Some(0);
    };
    let hours = cursor.digits(2)? as i64;
    let minutes = if cursor.eat(b':') || cursor.peek_digit() {
        cursor.digits(2)? as i64
    } else {
        0
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

/// `yyyy-MM-ddTHH:mm:ss[.fff]Z`, or `None` outside years 1 through 9999.
pub(crate) fn format_iso_date(millis: i64) -> Option<String> {
    let date = DateTime::<Utc>::from_timestamp_millis(millis)?;
    if !(1..=9999).contains(&date.year()) {
        return None;
    }
    let mut text = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        date.year(),
        date.month(),
        date.day(),
        date.hour(),
        date.minute(),
        date.second()
    );
    let fraction = date.timestamp_subsec_millis();
    if fraction != 0 {
        let digits = format!("{fraction:03}");
        text.push('.');
        text.push_str(digits.trim_end_matches('0'));
    }
    text.push('Z');
    Some(text)
}

/// What the shell's bare `Date()` returns: the current time as text.
pub(crate) fn format_date_string(now: DateTime<Utc>) -> String {
    now.format("%a %b %d %Y %H:%M:%S +00:00").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_shapes() {
        let cases = [
            ("1970", 0),
            ("1970-01", 0),
            ("1970-01-02", 86_400_000),
            ("1970-01-02T00", 86_400_000),
            ("1970-01-02T00:01", 86_460_000),
            ("1970-01-02T00:01:02", 86_462_000),
            ("1970-01-02T00:01:02.003", 86_462_003),
            ("1970-01-02T00:01:02.0030000Z", 86_462_003),
            ("1970-01-02T00Z", 86_400_000),
            ("1970-01-02T00:01:02.003+00:00", 86_462_003),
            ("19700102", 86_400_000),
            ("19700102T0001", 86_460_000),
            ("19700102T000102.003+00", 86_462_003),
            ("19700102T000102.003+0000", 86_462_003),
            ("1970-01-02T01:00+01", 86_400_000),
            ("1970-01-01T23:30-00:30", 86_400_000),
            ("0001-01-01T00:00:00Z", -62_135_596_800_000),
            ("9999-12-31T23:59:59.999Z", 253_402_300_799_999),
        ];
        for (text, expected) in cases {
            assert_eq!(
                parse_iso_date(text).unwrap_or_else(|e| panic!("{text}: {e}")),
                expected,
                "{text}"
            );
        }
    }

    #[test]
    fn rejected_shapes() {
        for text in [
            "",
            "197",
            "1970-1",
            "1970-01T00",
            "1970T00",
            "197001",
            "1970-01-02T",
            "1970-01-02T0001",
            "19700102T00:01",
            "1970-01-02T00:01:02.",
            "1970-01-02T00:01:02.12345678",
            "1970-01-02T00:01Zjunk",
            "1970-13-01",
            "1970-01-02T24:00",
        ] {
            let err = parse_iso_date(text).unwrap_err();
            assert!(err.is_format(), "{text}");
            assert!(err.to_string().contains(text), "{err}");
        }
    }

    #[test]
    fn formatting_trims_fraction() {
        assert_eq!(format_iso_date(0).as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(format_iso_date(86_462_003).as_deref(), Some("1970-01-02T00:01:02.003Z"));
        assert_eq!(format_iso_date(500).as_deref(), Some("1970-01-01T00:00:00.5Z"));
        assert_eq!(
            format_iso_date(253_402_300_799_999).as_deref(),
            Some("9999-12-31T23:59:59.999Z")
        );
        assert_eq!(format_iso_date(i64::MAX), None);
        assert_eq!(format_iso_date(-62_135_596_800_001), None);
    }
}
