use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{AmbiguousDstPolicy, EngineConfig};
use crate::domain::IntervalReading;

/// Raw meter-reading row as it arrives from the external usage store.
///
/// Two shapes exist in the wild: range-stamped rows with an explicit start
/// (and usually end), and end-stamped rows whose single timestamp marks the
/// interval *end*. Timestamps are strings because upstream exports mix
/// offset-bearing and naive wall-clock forms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawIntervalRow {
    Range {
        #[serde(default)]
        esiid: Option<String>,
        #[serde(default)]
        meter: Option<String>,
        start: String,
        #[serde(default)]
        end: Option<String>,
        kwh: Option<f64>,
    },
    EndStamped {
        #[serde(default)]
        esiid: Option<String>,
        #[serde(default)]
        meter: Option<String>,
        timestamp: String,
        kwh: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub tz: Tz,
    pub strict_timezone_parsing: bool,
    pub ambiguous_dst_policy: AmbiguousDstPolicy,
    pub interval_minutes: u32,
}

impl NormalizeOptions {
    pub fn from_config(cfg: &EngineConfig) -> anyhow::Result<Self> {
        // A zero-length interval cannot tile any range.
        anyhow::ensure!(
            cfg.interval_minutes > 0,
            "interval_minutes must be positive"
        );
        Ok(NormalizeOptions {
            tz: cfg.tz()?,
            strict_timezone_parsing: cfg.strict_timezone_parsing,
            ambiguous_dst_policy: cfg.ambiguous_dst_policy,
            interval_minutes: cfg.interval_minutes,
        })
    }

    fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            tz: chrono_tz::America::Chicago,
            strict_timezone_parsing: false,
            ambiguous_dst_policy: AmbiguousDstPolicy::Earlier,
            interval_minutes: 15,
        }
    }
}

/// Counters for rows dropped during normalization. Malformed rows never
/// abort a batch; they are counted so callers can alert on data quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub bad_timestamp: u64,
    pub bad_kwh: u64,
    pub nonexistent_local_time: u64,
}

impl SkipCounts {
    pub fn total(&self) -> u64 {
        self.bad_timestamp + self.bad_kwh + self.nonexistent_local_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutcome {
    pub readings: Vec<IntervalReading>,
    pub skipped: SkipCounts,
}

enum TimestampIssue {
    Unparsable,
    NonexistentLocalTime,
    OffsetMismatch,
}

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S %:z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse one raw timestamp into a UTC instant.
///
/// Offset-bearing forms are trusted as given unless strict parsing is on, in
/// which case the offset must agree with the configured zone at that
/// instant. Naive forms are interpreted in the configured zone under the
/// ambiguous-DST policy.
fn parse_timestamp(raw: &str, opts: &NormalizeOptions) -> Result<DateTime<Utc>, TimestampIssue> {
    let raw = raw.trim();

    let with_offset: Option<DateTime<FixedOffset>> =
        DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|f| DateTime::parse_from_str(raw, f).ok())
        });
    if let Some(dt) = with_offset {
        if opts.strict_timezone_parsing {
            let expected = opts.tz.offset_from_utc_datetime(&dt.naive_utc()).fix();
            if *dt.offset() != expected {
                return Err(TimestampIssue::OffsetMismatch);
            }
        }
        return Ok(dt.with_timezone(&Utc));
    }

    let naive: Option<NaiveDateTime> = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok());
    let Some(naive) = naive else {
        return Err(TimestampIssue::Unparsable);
    };

    match opts.tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, later) => {
            let dt = match opts.ambiguous_dst_policy {
                AmbiguousDstPolicy::Earlier => earlier,
                AmbiguousDstPolicy::Later => later,
            };
            Ok(dt.with_timezone(&Utc))
        }
        // Spring-forward gap: the wall-clock time never existed. Fabricating
        // an instant would be a silent approximation, so the row is skipped.
        LocalResult::None => Err(TimestampIssue::NonexistentLocalTime),
    }
}

/// Convert raw rows into sorted, deduplicated canonical interval readings.
///
/// End-stamped rows become intervals starting at `timestamp - interval`;
/// range-stamped rows use their explicit start. Later rows overwrite
/// earlier ones at the same `(esiid, meter, start)` key.
pub fn normalize(rows: &[RawIntervalRow], opts: &NormalizeOptions) -> NormalizeOutcome {
    let mut skipped = SkipCounts::default();
    let mut by_key: BTreeMap<(Option<String>, Option<String>, DateTime<Utc>), IntervalReading> =
        BTreeMap::new();

    for row in rows {
        let (esiid, meter, raw_ts, kwh, end_stamped) = match row {
            RawIntervalRow::Range {
                esiid,
                meter,
                start,
                kwh,
                ..
            } => (esiid, meter, start, kwh, false),
            RawIntervalRow::EndStamped {
                esiid,
                meter,
                timestamp,
                kwh,
            } => (esiid, meter, timestamp, kwh, true),
        };

        let Some(kwh) = *kwh else {
            skipped.bad_kwh += 1;
            continue;
        };
        if !kwh.is_finite() || kwh < 0.0 {
            skipped.bad_kwh += 1;
            continue;
        }

        let start = match parse_timestamp(raw_ts, opts) {
            Ok(instant) => {
                if end_stamped {
                    instant - opts.interval()
                } else {
                    instant
                }
            }
            Err(TimestampIssue::NonexistentLocalTime) => {
                skipped.nonexistent_local_time += 1;
                continue;
            }
            Err(_) => {
                skipped.bad_timestamp += 1;
                continue;
            }
        };

        let reading = IntervalReading {
            esiid: esiid.clone(),
            meter: meter.clone(),
            interval_start_utc: start,
            kwh,
            filled: false,
        };
        by_key.insert((esiid.clone(), meter.clone(), start), reading);
    }

    if skipped.total() > 0 {
        warn!(
            bad_timestamp = skipped.bad_timestamp,
            bad_kwh = skipped.bad_kwh,
            nonexistent_local_time = skipped.nonexistent_local_time,
            "skipped malformed interval rows"
        );
    }
    debug!(readings = by_key.len(), "normalized interval batch");

    NormalizeOutcome {
        readings: by_key.into_values().collect(),
        skipped,
    }
}

/// Emit one record per fixed-duration slot in `[start, end)`.
///
/// Real readings pass through untouched; slots with no real reading at their
/// exact start get a synthetic `kwh = 0, filled = true` record carrying the
/// stream's esiid/meter identity.
pub fn fill_missing(
    points: &[IntervalReading],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval_minutes: u32,
) -> Vec<IntervalReading> {
    let interval = Duration::minutes(i64::from(interval_minutes));
    let covered: std::collections::BTreeSet<DateTime<Utc>> =
        points.iter().map(|p| p.interval_start_utc).collect();
    let identity = points
        .first()
        .map(|p| (p.esiid.clone(), p.meter.clone()))
        .unwrap_or((None, None));

    let mut out: Vec<IntervalReading> = points.to_vec();
    let mut slot = start;
    while slot < end {
        if !covered.contains(&slot) {
            out.push(IntervalReading {
                esiid: identity.0.clone(),
                meter: identity.1.clone(),
                interval_start_utc: slot,
                kwh: 0.0,
                filled: true,
            });
        }
        slot += interval;
    }
    out.sort_by(|a, b| a.interval_start_utc.cmp(&b.interval_start_utc));
    out
}

/// UTC instant of a zone-local midnight, DST-correct.
pub(crate) fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        // Midnight skipped by a DST transition (not a US rule); the day
        // starts at the first instant after the gap.
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .expect("hour after a DST gap exists")
            .with_timezone(&Utc),
    }
}

/// Number of interval slots in one zone-local calendar day.
///
/// Computed from the actual local day length so US DST transition days come
/// out as 92 or 100 slots at 15 minutes, never hardcoded to 96.
pub fn expected_slots_for_day(date: NaiveDate, tz: Tz, interval_minutes: u32) -> u32 {
    let day_minutes = (local_midnight_utc(date + Duration::days(1), tz)
        - local_midnight_utc(date, tz))
    .num_minutes();
    (day_minutes / i64::from(interval_minutes)) as u32
}
