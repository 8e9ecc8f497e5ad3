use bstr::{BStr, BString, ByteSlice, ByteVec};
use chrono::{Local, Offset};

use crate::ObjectError;

/// A commit or tag identity: `Name <email> timestamp tz`.
///
/// The timezone offset is stored in minutes from UTC; git's wire form
/// is the decimal `±hhmm` rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Offset from UTC in minutes.
    pub tz_offset: i32,
}

impl Signature {
    /// Create a signature stamped with the current local time.
    pub fn now(name: impl Into<BString>, email: impl Into<BString>) -> Self {
        let now = Local::now();
        Self {
            name: name.into(),
            email: email.into(),
            timestamp: now.timestamp(),
            tz_offset: now.offset().fix().local_minus_utc() / 60,
        }
    }

    /// Parse from git format: `Name <email> timestamp tz`.
    pub fn parse(input: &BStr) -> Result<Self, ObjectError> {
        let input = input.as_bytes();

        let gt_pos = input
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '>'".into()))?;
        let lt_pos = input[..gt_pos]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '<'".into()))?;

        let name = input[..lt_pos].trim();
        let email = &input[lt_pos + 1..gt_pos];

        let date_str = input[gt_pos + 1..].trim();
        let date_str = std::str::from_utf8(date_str)
            .map_err(|_| ObjectError::InvalidSignature("non-UTF-8 date".into()))?;
        let (timestamp, tz_offset) = parse_raw_date(date_str)?;

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            timestamp,
            tz_offset,
        })
    }

    /// Format in git's canonical form: `Name <email> timestamp ±hhmm`.
    pub fn to_bytes(&self) -> BString {
        let tz = minutes_to_tz(self.tz_offset);
        let mut out = BString::new(Vec::new());
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(b"> ");
        out.push_str(format!("{} {:+05}", self.timestamp, tz).as_bytes());
        out
    }
}

/// Parse `"<timestamp> ±hhmm"` into seconds and offset minutes.
fn parse_raw_date(s: &str) -> Result<(i64, i32), ObjectError> {
    let mut parts = s.split_whitespace();
    let ts_str = parts
        .next()
        .ok_or_else(|| ObjectError::InvalidSignature("missing timestamp".into()))?;
    let timestamp: i64 = ts_str
        .parse()
        .map_err(|_| ObjectError::InvalidSignature(format!("invalid timestamp: {ts_str}")))?;

    let tz_offset = match parts.next() {
        Some(tz_str) => {
            let tz: i32 = tz_str
                .parse()
                .map_err(|_| ObjectError::InvalidSignature(format!("invalid tz: {tz_str}")))?;
            tz_to_minutes(tz)
        }
        None => 0,
    };

    Ok((timestamp, tz_offset))
}

/// Git stores the tz as the decimal rendering of ±hhmm (-0500 => -500).
fn tz_to_minutes(tz: i32) -> i32 {
    let sign = if tz < 0 { -1 } else { 1 };
    let abs = tz.unsigned_abs() as i32;
    sign * ((abs / 100) * 60 + abs % 100)
}

fn minutes_to_tz(minutes: i32) -> i32 {
    let sign = if minutes < 0 { -1 } else { 1 };
    let abs = minutes.unsigned_abs() as i32;
    sign * ((abs / 60) * 100 + abs % 60)
}
