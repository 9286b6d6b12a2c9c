use chrono::Timelike;
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::domain::{BucketKey, IntervalReading, MonthKey};

/// Result of probing an external bucket map through the alias table. The
/// alias that satisfied the lookup is recorded as an audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBucket {
    pub kwh: f64,
    pub alias_used: String,
}

/// Probe `map` for a canonical bucket key through its fixed-priority alias
/// list. This probe order is part of the aggregator's public contract.
pub fn resolve_bucket(map: &BTreeMap<String, f64>, key: &BucketKey) -> Option<ResolvedBucket> {
    key.alias_candidates().into_iter().find_map(|alias| {
        map.get(&alias).map(|&kwh| ResolvedBucket {
            kwh,
            alias_used: alias,
        })
    })
}

/// Month-by-bucket usage sums with completeness tracking.
///
/// Bucket values are stored under canonical key strings; lookups go through
/// the alias table so maps ingested from older storage still resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyUsage {
    months: BTreeMap<MonthKey, BTreeMap<String, f64>>,
    incomplete: BTreeSet<MonthKey>,
}

impl MonthlyUsage {
    /// Wrap an externally stored month → bucket-key → kWh map. Every month
    /// is presumed complete; callers with completeness metadata should mark
    /// months incomplete themselves.
    pub fn from_bucket_maps(months: BTreeMap<MonthKey, BTreeMap<String, f64>>) -> Self {
        MonthlyUsage {
            months,
            incomplete: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, month: MonthKey, key: &BucketKey, kwh: f64) {
        *self
            .months
            .entry(month)
            .or_default()
            .entry(key.canonical())
            .or_insert(0.0) += kwh;
    }

    pub fn mark_incomplete(&mut self, month: MonthKey) {
        self.incomplete.insert(month);
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn month_count(&self) -> usize {
        self.months.len()
    }

    pub fn months(&self) -> impl Iterator<Item = MonthKey> + '_ {
        self.months.keys().copied()
    }

    pub fn is_incomplete(&self, month: MonthKey) -> bool {
        self.incomplete.contains(&month)
    }

    /// Months safe to bill against: present and not marked incomplete.
    pub fn fully_covered_months(&self) -> Vec<MonthKey> {
        self.months
            .keys()
            .copied()
            .filter(|m| !self.incomplete.contains(m))
            .collect()
    }

    /// Alias-resolving bucket lookup for one month.
    pub fn bucket(&self, month: MonthKey, key: &BucketKey) -> Option<ResolvedBucket> {
        self.months.get(&month).and_then(|m| resolve_bucket(m, key))
    }

    /// Monthly total through the canonical total bucket and its aliases.
    pub fn total_kwh(&self, month: MonthKey) -> Option<f64> {
        self.bucket(month, &BucketKey::total()).map(|r| r.kwh)
    }

    pub fn bucket_map(&self, month: MonthKey) -> Option<&BTreeMap<String, f64>> {
        self.months.get(&month)
    }
}

/// Sum normalized intervals into the requested buckets, classifying each
/// interval by its zone-local month, day type, and minute of day.
///
/// A month that contributed intervals but left any requested bucket empty is
/// marked incomplete and excluded from `fully_covered_months`; the billing
/// default is fail-closed.
pub fn aggregate(
    intervals: &[IntervalReading],
    bucket_keys: &[BucketKey],
    tz: Tz,
) -> MonthlyUsage {
    let mut usage = MonthlyUsage::default();
    let mut hit_counts: BTreeMap<(MonthKey, String), u64> = BTreeMap::new();
    let mut seen_months: BTreeSet<MonthKey> = BTreeSet::new();

    for interval in intervals {
        let local = interval.interval_start_utc.with_timezone(&tz);
        let date = local.date_naive();
        let minute = local.hour() * 60 + local.minute();
        let month = MonthKey::from_date(date);
        seen_months.insert(month);

        for key in bucket_keys {
            if key.matches_local(date, minute) {
                usage.insert(month, key, interval.kwh);
                *hit_counts.entry((month, key.canonical())).or_insert(0) += 1;
            }
        }
    }

    for month in &seen_months {
        // Zero-fill requested buckets the month never touched and flag the
        // month so billing callers refuse it by default.
        for key in bucket_keys {
            if hit_counts.get(&(*month, key.canonical())).copied().unwrap_or(0) == 0 {
                usage.insert(*month, key, 0.0);
                usage.mark_incomplete(*month);
            }
        }
    }

    debug!(
        months = usage.month_count(),
        incomplete = usage.incomplete.len(),
        "aggregated usage buckets"
    );
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BucketWindow, DayType};
    use chrono::{DateTime, Utc};
    use chrono_tz::America::Chicago;

    fn reading(ts: &str, kwh: f64) -> IntervalReading {
        IntervalReading {
            esiid: None,
            meter: None,
            interval_start_utc: ts.parse::<DateTime<Utc>>().unwrap(),
            kwh,
            filled: false,
        }
    }

    fn day_window(start_h: u32, end_h: u32) -> BucketWindow {
        BucketWindow::Range {
            start_minute: start_h * 60,
            end_minute: end_h * 60,
        }
    }

    #[test]
    fn intervals_bucket_by_local_month_and_window() {
        // 2024-06-30 23:30 Chicago = 2024-07-01 04:30 UTC; must land in June.
        let intervals = vec![
            reading("2024-07-01T04:30:00Z", 1.5),
            reading("2024-07-01T17:00:00Z", 2.0), // July 1 noon local
        ];
        let total = BucketKey::total();
        let usage = aggregate(&intervals, &[total], Chicago);
        assert_eq!(usage.total_kwh(MonthKey::new(2024, 6)), Some(1.5));
        assert_eq!(usage.total_kwh(MonthKey::new(2024, 7)), Some(2.0));
    }

    #[test]
    fn day_type_windows_split_weekday_and_weekend() {
        // Sat 2024-06-01 noon local and Mon 2024-06-03 noon local.
        let intervals = vec![
            reading("2024-06-01T17:00:00Z", 1.0),
            reading("2024-06-03T17:00:00Z", 3.0),
        ];
        let keys = vec![
            BucketKey::total(),
            BucketKey::new(DayType::Weekday, day_window(6, 22)),
            BucketKey::new(DayType::Weekend, day_window(6, 22)),
        ];
        let usage = aggregate(&intervals, &keys, Chicago);
        let june = MonthKey::new(2024, 6);
        assert_eq!(usage.total_kwh(june), Some(4.0));
        assert_eq!(
            usage.bucket(june, &keys[1]).unwrap().kwh,
            3.0,
            "weekday bucket"
        );
        assert_eq!(
            usage.bucket(june, &keys[2]).unwrap().kwh,
            1.0,
            "weekend bucket"
        );
    }

    #[test]
    fn month_missing_a_required_bucket_is_incomplete() {
        // Only weekend intervals; weekday bucket stays empty.
        let intervals = vec![reading("2024-06-01T17:00:00Z", 1.0)];
        let keys = vec![
            BucketKey::new(DayType::Weekday, day_window(6, 22)),
            BucketKey::new(DayType::Weekend, day_window(6, 22)),
        ];
        let usage = aggregate(&intervals, &keys, Chicago);
        let june = MonthKey::new(2024, 6);
        assert!(usage.is_incomplete(june));
        assert!(usage.fully_covered_months().is_empty());
        // The empty bucket is still present, zeroed.
        assert_eq!(usage.bucket(june, &keys[0]).unwrap().kwh, 0.0);
    }

    #[test]
    fn alias_resolution_records_which_alias_hit() {
        let mut legacy = BTreeMap::new();
        legacy.insert("kwh.m.ALL.0000-2400".to_string(), 812.0);
        let resolved = resolve_bucket(&legacy, &BucketKey::total()).unwrap();
        assert_eq!(resolved.kwh, 812.0);
        assert_eq!(resolved.alias_used, "kwh.m.ALL.0000-2400");

        let mut canonical = BTreeMap::new();
        canonical.insert("kwh.m.all.total".to_string(), 5.0);
        canonical.insert("kwh.m.ALL.0000-2400".to_string(), 99.0);
        // Canonical spelling outranks the legacy alias.
        let resolved = resolve_bucket(&canonical, &BucketKey::total()).unwrap();
        assert_eq!(resolved.kwh, 5.0);
        assert_eq!(resolved.alias_used, "kwh.m.all.total");
    }

    #[test]
    fn external_maps_resolve_through_aliases() {
        let mut month = BTreeMap::new();
        month.insert("kwh.m.WEEKDAY.0600-2200".to_string(), 410.0);
        let mut months = BTreeMap::new();
        months.insert(MonthKey::new(2024, 6), month);
        let usage = MonthlyUsage::from_bucket_maps(months);
        let key = BucketKey::new(DayType::Weekday, day_window(6, 22));
        assert_eq!(
            usage.bucket(MonthKey::new(2024, 6), &key).unwrap().kwh,
            410.0
        );
    }
}
