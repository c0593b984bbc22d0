//! Reference time zone and `HH:MM` time-of-day resolution.
//!
//! The bot works in one fixed-offset zone (UTC+9 by default, no DST).
//! A time of day is resolved against "today" in that zone and rolled
//! forward exactly one day when the result is not strictly in the future.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, TimeDelta, TimeZone, Utc};

/// Default reference offset in hours east of UTC.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

/// Display format for timestamps on the panel and in notifications.
pub const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Fixed-offset zone used for all user-facing time arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    offset: FixedOffset,
}

impl ReferenceZone {
    /// Zone `hours` east of UTC. `None` outside -23..=23.
    #[must_use]
    pub fn from_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Resolve `HH:MM` (or `H:MM`) to the next instant at that wall-clock time.
    ///
    /// Returns `None` for anything that is not a valid 24h time of day.
    #[must_use]
    pub fn resolve_time_of_day(&self, text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = parse_time_of_day(text)?;
        let local_now = now.with_timezone(&self.offset);
        let candidate = self
            .offset
            .from_local_datetime(&local_now.date_naive().and_time(time))
            .single()?
            .with_timezone(&Utc);
        if candidate <= now {
            candidate.checked_add_signed(TimeDelta::days(1))
        } else {
            Some(candidate)
        }
    }

    /// `YYYY/MM/DD HH:MM` in this zone.
    #[must_use]
    pub fn format(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset).format(DISPLAY_FORMAT).to_string()
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::from_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or(Self { offset: Utc.fix() })
    }
}

/// Strict `H:MM` / `HH:MM` parser. Surrounding whitespace is ignored.
#[must_use]
pub fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let (hh, mm) = text.trim().split_once(':')?;
    if hh.is_empty() || hh.len() > 2 || mm.len() != 2 {
        return None;
    }
    if !hh.bytes().all(|b| b.is_ascii_digit()) || !mm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = hh.parse().ok()?;
    let minute: u32 = mm.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Drop sub-second precision; stored timestamps are whole epoch seconds.
#[must_use]
pub fn whole_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid RFC3339 timestamp")
            .with_timezone(&Utc)
    }

    fn jst() -> ReferenceZone {
        ReferenceZone::default()
    }

    #[test]
    fn parses_one_and_two_digit_hours() {
        assert_eq!(parse_time_of_day("9:05"), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(parse_time_of_day("09:05"), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(parse_time_of_day(" 23:59 "), NaiveTime::from_hms_opt(23, 59, 0));
    }

    #[test]
    fn rejects_malformed_time() {
        for bad in ["", "9", "9:5", "123:00", "ab:cd", "24:00", "12:60", "12:00:00", "+1:00"] {
            assert_eq!(parse_time_of_day(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn later_today_is_not_rolled() {
        // 23:58 JST
        let now = ts("2026-03-01T23:58:00+09:00");
        let got = jst().resolve_time_of_day("23:59", now).unwrap();
        assert_eq!(got, ts("2026-03-01T23:59:00+09:00"));
    }

    #[test]
    fn just_after_midnight_resolves_to_same_day() {
        let now = ts("2026-03-02T00:01:00+09:00");
        let got = jst().resolve_time_of_day("23:59", now).unwrap();
        assert_eq!(got, ts("2026-03-02T23:59:00+09:00"));
    }

    #[test]
    fn earlier_today_rolls_forward_one_day() {
        let now = ts("2026-03-01T09:00:00+09:00");
        let got = jst().resolve_time_of_day("08:00", now).unwrap();
        assert_eq!(got, ts("2026-03-02T08:00:00+09:00"));
    }

    #[test]
    fn exactly_now_rolls_forward() {
        let now = ts("2026-03-01T09:00:00+09:00");
        let got = jst().resolve_time_of_day("09:00", now).unwrap();
        assert_eq!(got, ts("2026-03-02T09:00:00+09:00"));
    }

    #[test]
    fn reference_day_follows_zone_not_utc() {
        // 2026-03-01T16:00Z is already 01:00 on 03-02 in JST.
        let now = ts("2026-03-01T16:00:00Z");
        let got = jst().resolve_time_of_day("08:00", now).unwrap();
        assert_eq!(got, ts("2026-03-02T08:00:00+09:00"));
    }

    #[test]
    fn month_boundary_rollover() {
        let now = ts("2026-02-28T22:00:00+09:00");
        let got = jst().resolve_time_of_day("07:30", now).unwrap();
        assert_eq!(got, ts("2026-03-01T07:30:00+09:00"));
    }

    #[test]
    fn format_uses_reference_zone() {
        assert_eq!(jst().format(ts("2026-03-01T15:30:00Z")), "2026/03/02 00:30");
        let utc = ReferenceZone::from_hours(0).unwrap();
        assert_eq!(utc.format(ts("2026-03-01T15:30:00Z")), "2026/03/01 15:30");
    }

    #[test]
    fn from_hours_bounds() {
        assert!(ReferenceZone::from_hours(-23).is_some());
        assert!(ReferenceZone::from_hours(24).is_none());
    }

    #[test]
    fn whole_seconds_truncates() {
        let t = ts("2026-03-01T00:00:00.750Z");
        assert_eq!(whole_seconds(t), ts("2026-03-01T00:00:00Z"));
    }
}
