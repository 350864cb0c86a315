//! Conversion of stored UTC timestamps into the configured display zone.

use chrono::{DateTime, FixedOffset, Offset, Utc};

const MAX_OFFSET_SECONDS: i32 = 18 * 3600;

/// Display zone expressed as a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayZone {
    offset: FixedOffset,
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::utc()
    }
}

fn parse_offset(raw: &str) -> Option<i32> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h, m)
    } else if rest.len() == 4 {
        rest.split_at(2)
    } else {
        (rest, "0")
    };
    let hours: i32 = digits(hours)?;
    let minutes: i32 = digits(minutes)?;
    if hours > 18 || !(0..60).contains(&minutes) {
        return None;
    }
    let seconds = sign * (hours * 3600 + minutes * 60);
    (seconds.abs() <= MAX_OFFSET_SECONDS).then_some(seconds)
}

// At most two ASCII digits.
fn digits(part: &str) -> Option<i32> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl DisplayZone {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Accepts `UTC`, `Z`, `+02:00`, `-0530`, `UTC+3`, `GMT-04:30`.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        let upper = id.to_ascii_uppercase();
        if upper.is_empty() || upper == "UTC" || upper == "Z" || upper == "GMT" {
            return Some(Self::utc());
        }
        let offset_part = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .unwrap_or(&upper);
        let seconds = parse_offset(offset_part)?;
        FixedOffset::east_opt(seconds).map(|offset| Self { offset })
    }

    /// Resolves a zone id; unknown ids stay in UTC.
    pub fn resolve(id: &str) -> Self {
        Self::parse(id).unwrap_or_default()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn convert(&self, timestamp: DateTime<Utc>) -> DateTime<FixedOffset> {
        timestamp.with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_offsets_in_common_spellings() {
        assert_eq!(DisplayZone::parse("UTC").unwrap().offset().local_minus_utc(), 0);
        assert_eq!(DisplayZone::parse("+02:00").unwrap().offset().local_minus_utc(), 7200);
        assert_eq!(DisplayZone::parse("-0530").unwrap().offset().local_minus_utc(), -19800);
        assert_eq!(DisplayZone::parse("utc+3").unwrap().offset().local_minus_utc(), 10800);
        assert_eq!(DisplayZone::parse("GMT-04:30").unwrap().offset().local_minus_utc(), -16200);
    }

    #[test]
    fn unknown_zone_leaves_utc_unchanged() {
        assert!(DisplayZone::parse("Mars/Olympus_Mons").is_none());
        assert!(DisplayZone::parse("+25:00").is_none());
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let shown = DisplayZone::resolve("Mars/Olympus_Mons").convert(ts);
        assert_eq!(shown.offset().local_minus_utc(), 0);
        assert_eq!(shown, ts);
    }

    #[test]
    fn malformed_offsets_fall_back_to_utc() {
        for raw in ["+1\u{e9}2", "+9999999", "-99999:00", "+12:345", "+", "+:30", "+1:2:3"] {
            assert!(DisplayZone::parse(raw).is_none(), "{raw}");
            assert_eq!(DisplayZone::resolve(raw), DisplayZone::utc(), "{raw}");
        }
    }

    #[test]
    fn conversion_preserves_instant() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let shown = DisplayZone::resolve("+01:00").convert(ts);
        assert_eq!(shown.to_rfc3339(), "2024-01-02T00:30:00+01:00");
    }
}
