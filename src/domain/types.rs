use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

// ============================================================================
// Interval readings
// ============================================================================

/// One canonical fixed-duration usage interval, keyed by
/// `(esiid, meter, interval_start_utc)`.
///
/// `filled` marks synthetic zero records inserted by gap filling; real meter
/// data always carries `filled = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalReading {
    pub esiid: Option<String>,
    pub meter: Option<String>,
    pub interval_start_utc: DateTime<Utc>,
    pub kwh: f64,
    #[serde(default)]
    pub filled: bool,
}

impl IntervalReading {
    /// Identity key; later writes at the same key overwrite earlier ones.
    pub fn dedup_key(&self) -> (Option<&str>, Option<&str>, DateTime<Utc>) {
        (
            self.esiid.as_deref(),
            self.meter.as_deref(),
            self.interval_start_utc,
        )
    }
}

// ============================================================================
// Bucket vocabulary
// ============================================================================

/// Day-type slice of a usage bucket. Wire form is lowercase; legacy uppercase
/// spellings are accepted on input.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    All,
    Weekday,
    Weekend,
}

impl DayType {
    /// Whether a zone-local date falls in this slice.
    pub fn contains(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().number_from_monday() <= 5;
        match self {
            DayType::All => true,
            DayType::Weekday => weekday,
            DayType::Weekend => !weekday,
        }
    }
}

/// Time-of-day slice of a usage bucket, in minutes from local midnight.
///
/// A `Range` with `start > end` wraps past midnight (free-nights windows such
/// as `2000-0600`). `end` is exclusive; `2400` closes a same-day window at
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketWindow {
    Total,
    Range { start_minute: u32, end_minute: u32 },
}

impl BucketWindow {
    pub fn contains_minute(&self, minute_of_day: u32) -> bool {
        match *self {
            BucketWindow::Total => true,
            BucketWindow::Range {
                start_minute,
                end_minute,
            } => {
                if start_minute <= end_minute {
                    minute_of_day >= start_minute && minute_of_day < end_minute
                } else {
                    minute_of_day >= start_minute || minute_of_day < end_minute
                }
            }
        }
    }

    fn parse_suffix(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("total") || s == "0000-2400" {
            return Some(BucketWindow::Total);
        }
        let (a, b) = s.split_once('-')?;
        if a.len() != 4 || b.len() != 4 {
            return None;
        }
        let hhmm = |t: &str| -> Option<u32> {
            let h: u32 = t[..2].parse().ok()?;
            let m: u32 = t[2..].parse().ok()?;
            if h > 24 || m > 59 || (h == 24 && m != 0) {
                return None;
            }
            Some(h * 60 + m)
        };
        Some(BucketWindow::Range {
            start_minute: hhmm(a)?,
            end_minute: hhmm(b)?,
        })
    }
}

impl fmt::Display for BucketWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BucketWindow::Total => write!(f, "total"),
            BucketWindow::Range {
                start_minute,
                end_minute,
            } => write!(
                f,
                "{:02}{:02}-{:02}{:02}",
                start_minute / 60,
                start_minute % 60,
                end_minute / 60,
                end_minute % 60
            ),
        }
    }
}

impl Serialize for BucketWindow {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BucketWindow {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        BucketWindow::parse_suffix(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid bucket window: {raw}")))
    }
}

/// Canonical usage-bucket identifier: `kwh.m.<dayType>.<suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub day_type: DayType,
    pub window: BucketWindow,
}

impl BucketKey {
    pub const fn total() -> Self {
        BucketKey {
            day_type: DayType::All,
            window: BucketWindow::Total,
        }
    }

    pub fn new(day_type: DayType, window: BucketWindow) -> Self {
        BucketKey { day_type, window }
    }

    /// Canonical wire string, always lowercase.
    pub fn canonical(&self) -> String {
        format!("kwh.m.{}.{}", self.day_type, self.window)
    }

    /// Fixed-priority probe list for looking this key up in externally stored
    /// bucket maps. Canonical spelling first, then legacy uppercase day
    /// types, then the historical `0000-2400` spelling of `total`.
    pub fn alias_candidates(&self) -> Vec<String> {
        let upper = self.day_type.to_string().to_uppercase();
        let mut out = vec![self.canonical(), format!("kwh.m.{}.{}", upper, self.window)];
        if self.window == BucketWindow::Total {
            out.push(format!("kwh.m.{}.0000-2400", self.day_type));
            out.push(format!("kwh.m.{upper}.0000-2400"));
        }
        out
    }

    /// Whether a zone-local instant (date + minute of day) belongs to this
    /// bucket.
    pub fn matches_local(&self, date: NaiveDate, minute_of_day: u32) -> bool {
        self.day_type.contains(date) && self.window.contains_minute(minute_of_day)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl FromStr for BucketKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("kwh.m.")
            .ok_or_else(|| format!("bucket key missing kwh.m. prefix: {s}"))?;
        let (day, suffix) = rest
            .split_once('.')
            .ok_or_else(|| format!("bucket key missing suffix: {s}"))?;
        let day_type: DayType = day
            .parse()
            .map_err(|_| format!("unknown day type in bucket key: {s}"))?;
        let window = BucketWindow::parse_suffix(suffix)
            .ok_or_else(|| format!("unknown window in bucket key: {s}"))?;
        Ok(BucketKey { day_type, window })
    }
}

// ============================================================================
// Months
// ============================================================================

/// Calendar month in the billing timezone, ordered and displayed `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        MonthKey { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            MonthKey {
                year: self.year + 1,
                month: 1,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First day of the month; always a valid date.
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("month keys hold valid months")
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// Delivery charges
// ============================================================================

/// TDSP delivery-charge snapshot, owned by the external tariff feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdspCharge {
    pub per_kwh_delivery_charge_cents: f64,
    pub monthly_customer_charge_dollars: f64,
    pub effective_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_round_trips_canonical_form() {
        let key = BucketKey::new(
            DayType::Weekday,
            BucketWindow::Range {
                start_minute: 6 * 60,
                end_minute: 22 * 60,
            },
        );
        assert_eq!(key.canonical(), "kwh.m.weekday.0600-2200");
        assert_eq!("kwh.m.weekday.0600-2200".parse::<BucketKey>().unwrap(), key);
    }

    #[test]
    fn legacy_aliases_parse_to_canonical_total() {
        let a: BucketKey = "kwh.m.ALL.total".parse().unwrap();
        let b: BucketKey = "kwh.m.all.0000-2400".parse().unwrap();
        assert_eq!(a, BucketKey::total());
        assert_eq!(b, BucketKey::total());
    }

    #[test]
    fn alias_candidates_keep_fixed_priority() {
        let aliases = BucketKey::total().alias_candidates();
        assert_eq!(
            aliases,
            vec![
                "kwh.m.all.total",
                "kwh.m.ALL.total",
                "kwh.m.all.0000-2400",
                "kwh.m.ALL.0000-2400",
            ]
        );
    }

    #[test]
    fn wrapping_window_covers_overnight_minutes() {
        let night = BucketWindow::Range {
            start_minute: 20 * 60,
            end_minute: 6 * 60,
        };
        assert!(night.contains_minute(23 * 60));
        assert!(night.contains_minute(0));
        assert!(!night.contains_minute(12 * 60));
    }

    #[test]
    fn month_key_orders_and_displays() {
        let jan = MonthKey::new(2024, 1);
        let dec = MonthKey::new(2023, 12);
        assert!(dec < jan);
        assert_eq!(jan.to_string(), "2024-01");
        assert_eq!(dec.next(), jan);
        assert_eq!(jan.first_day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn weekday_classification_uses_iso_weekday() {
        // 2024-06-01 is a Saturday.
        let sat = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mon = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert!(DayType::Weekend.contains(sat));
        assert!(DayType::Weekday.contains(mon));
        assert!(DayType::All.contains(sat));
    }
}
