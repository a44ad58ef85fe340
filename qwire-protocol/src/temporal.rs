//! Temporal scalar types and epoch conversions.
//!
//! q counts every temporal kind from 2000-01-01. [`Month`], [`Minute`],
//! [`Second`] and [`Timespan`] have no natural `chrono` counterpart and are
//! kept as thin wrappers over their wire offset. Timestamps, dates, datetimes
//! and times map onto `chrono` types; the functions here convert between the
//! two representations and translate null sentinels.

use crate::error::ProtocolError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::fmt;

/// Null for 32-bit wire values (`0Ni`).
pub const NULL_INT: i32 = i32::MIN;

/// Null for 64-bit wire values (`0Nj`).
pub const NULL_LONG: i64 = i64::MIN;

/// Positive infinity for 32-bit wire values (`0Wi`). Negative infinity is
/// its negation.
pub const INF_INT: i32 = i32::MAX;

/// Seconds between the Unix epoch and 2000-01-01.
pub const EPOCH_2000_SECS: i64 = 946_684_800;

/// Days between 0001-01-01 (day 1 of the common era) and 2000-01-01.
const EPOCH_2000_CE_DAYS: i32 = 730_120;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const MILLIS_PER_DAY: i64 = 86_400_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SEC;

/// Null timestamp.
pub const NULL_TIMESTAMP: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// Null date.
pub const NULL_DATE: NaiveDate = NaiveDate::MIN;

/// Null datetime.
pub const NULL_DATETIME: NaiveDateTime = NaiveDateTime::MIN;

/// Infinite date (`0Wd`).
pub const INF_DATE: NaiveDate = NaiveDate::MAX;

/// Infinite datetime (`0wz`).
pub const INF_DATETIME: NaiveDateTime = NaiveDateTime::MAX;

/// Negative infinite date (`-0Wd`): the day after [`NULL_DATE`].
pub fn neg_inf_date() -> NaiveDate {
    NULL_DATE.succ_opt().unwrap_or(NULL_DATE)
}

/// Negative infinite datetime (`-0wz`): midnight of [`neg_inf_date`].
pub fn neg_inf_datetime() -> NaiveDateTime {
    neg_inf_date().and_time(NaiveTime::MIN)
}

/// Null time of day: one nanosecond past midnight, a value the millisecond
/// wire resolution can never produce.
pub fn null_time() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(0, 0, 0, 1).unwrap_or(NaiveTime::MIN)
}

fn out_of_range(kind: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::OutOfRange {
        kind,
        reason: reason.into(),
    }
}

/// Nanoseconds since 2000-01-01, or [`NULL_LONG`] for [`NULL_TIMESTAMP`].
pub fn timestamp_to_wire(ts: &DateTime<Utc>) -> Result<i64, ProtocolError> {
    if *ts == NULL_TIMESTAMP {
        return Ok(NULL_LONG);
    }
    let nanos = i128::from(ts.timestamp() - EPOCH_2000_SECS) * i128::from(NANOS_PER_SEC)
        + i128::from(ts.timestamp_subsec_nanos());
    i64::try_from(nanos)
        .ok()
        .filter(|n| *n != NULL_LONG)
        .ok_or_else(|| out_of_range("timestamp", ts.to_string()))
}

pub fn timestamp_from_wire(nanos: i64) -> Result<DateTime<Utc>, ProtocolError> {
    if nanos == NULL_LONG {
        return Ok(NULL_TIMESTAMP);
    }
    let secs = nanos.div_euclid(NANOS_PER_SEC) + EPOCH_2000_SECS;
    let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, subsec)
        .ok_or_else(|| out_of_range("timestamp", format!("{nanos}ns")))
}

/// Days since 2000-01-01. [`NULL_DATE`], [`INF_DATE`] and
/// [`neg_inf_date`] map to the null and infinity sentinels.
pub fn date_to_wire(date: &NaiveDate) -> i32 {
    if *date == NULL_DATE {
        return NULL_INT;
    }
    if *date == INF_DATE {
        return INF_INT;
    }
    if *date == neg_inf_date() {
        return -INF_INT;
    }
    // chrono dates span roughly +/-262,000 years, well inside i32 days.
    date.num_days_from_ce() - EPOCH_2000_CE_DAYS
}

/// Inverse of [`date_to_wire`]. Other values beyond chrono's range of
/// about 262,000 years are `OutOfRange`.
pub fn date_from_wire(days: i32) -> Result<NaiveDate, ProtocolError> {
    match days {
        NULL_INT => return Ok(NULL_DATE),
        INF_INT => return Ok(INF_DATE),
        d if d == -INF_INT => return Ok(neg_inf_date()),
        _ => {}
    }
    days.checked_add(EPOCH_2000_CE_DAYS)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| out_of_range("date", format!("{days} days")))
}

/// Fractional days since 2000-01-01 at millisecond precision. NaN for
/// [`NULL_DATETIME`], +/-infinity for [`INF_DATETIME`] and
/// [`neg_inf_datetime`].
pub fn datetime_to_wire(dt: &NaiveDateTime) -> f64 {
    if *dt == NULL_DATETIME {
        return f64::NAN;
    }
    if *dt == INF_DATETIME {
        return f64::INFINITY;
    }
    if *dt == neg_inf_datetime() {
        return f64::NEG_INFINITY;
    }
    let millis = dt.and_utc().timestamp_millis() - EPOCH_2000_SECS * 1000;
    millis as f64 / MILLIS_PER_DAY as f64
}

pub fn datetime_from_wire(days: f64) -> Result<NaiveDateTime, ProtocolError> {
    if days.is_nan() {
        return Ok(NULL_DATETIME);
    }
    if days == f64::INFINITY {
        return Ok(INF_DATETIME);
    }
    if days == f64::NEG_INFINITY {
        return Ok(neg_inf_datetime());
    }
    let millis = (days * MILLIS_PER_DAY as f64).round();
    if !millis.is_finite() || millis.abs() > (i64::MAX / 2) as f64 {
        return Err(out_of_range("datetime", format!("{days} days")));
    }
    let millis = millis as i64 + EPOCH_2000_SECS * 1000;
    let secs = millis.div_euclid(1000);
    let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| out_of_range("datetime", format!("{days} days")))
}

/// Milliseconds since midnight, or [`NULL_INT`] for [`null_time`].
pub fn time_to_wire(time: &NaiveTime) -> i32 {
    if *time == null_time() {
        return NULL_INT;
    }
    let millis = i64::from(time.num_seconds_from_midnight()) * 1000
        + i64::from(time.nanosecond() / 1_000_000);
    // Leap-second nanos (>= 1e9) fold back into the day.
    (millis % MILLIS_PER_DAY) as i32
}

/// Time of day for `millis` since midnight. Values outside one day,
/// including the infinities `0Wt` and `-0Wt`, wrap modulo 24 hours.
pub fn time_from_wire(millis: i32) -> NaiveTime {
    if millis == NULL_INT {
        return null_time();
    }
    let millis = i64::from(millis).rem_euclid(MILLIS_PER_DAY);
    let secs = (millis / 1000) as u32;
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).unwrap_or(NaiveTime::MIN)
}

/// Month offset from 2000-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(pub i32);

impl Month {
    pub const NULL: Month = Month(NULL_INT);

    /// Builds a month from a calendar year and 1-based month.
    pub fn from_year_month(year: i32, month: u32) -> Self {
        Month((year - 2000) * 12 + month as i32 - 1)
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_INT
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return Ok(());
        }
        let m = i64::from(self.0) + 24_000;
        let y = m.div_euclid(12);
        write!(f, "{:04}-{:02}", y, 1 + m.rem_euclid(12))
    }
}

/// Minute of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minute(pub i32);

impl Minute {
    pub const NULL: Minute = Minute(NULL_INT);

    pub fn is_null(&self) -> bool {
        self.0 == NULL_INT
    }
}

impl fmt::Display for Minute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return Ok(());
        }
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Second of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Second(pub i32);

impl Second {
    pub const NULL: Second = Second(NULL_INT);

    pub fn is_null(&self) -> bool {
        self.0 == NULL_INT
    }
}

impl fmt::Display for Second {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return Ok(());
        }
        write!(f, "{}:{:02}", Minute(self.0 / 60), self.0 % 60)
    }
}

/// Signed nanosecond span, possibly longer than a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespan(pub i64);

impl Timespan {
    pub const NULL: Timespan = Timespan(NULL_LONG);

    pub fn is_null(&self) -> bool {
        self.0 == NULL_LONG
    }

    /// Nanoseconds elapsed since midnight of `time`.
    pub fn from_time_of_day(time: &NaiveTime) -> Self {
        Timespan(
            i64::from(time.num_seconds_from_midnight()) * NANOS_PER_SEC
                + i64::from(time.nanosecond()),
        )
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return Ok(());
        }
        if self.0 < 0 {
            f.write_str("-")?;
        }
        let n = self.0.unsigned_abs();
        let day = NANOS_PER_DAY as u64;
        let hour = 3_600 * NANOS_PER_SEC as u64;
        let minute = 60 * NANOS_PER_SEC as u64;
        let second = NANOS_PER_SEC as u64;
        let days = n / day;
        if days != 0 {
            write!(f, "{days}D")?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}.{:09}",
            (n % day) / hour,
            (n % hour) / minute,
            (n % minute) / second,
            n % second
        )
    }
}
