//! Synthesize interval records from manually entered usage totals.
//!
//! Households without smart-meter history enter monthly or annual kWh
//! totals; spreading them flat across the period's fixed-duration slots
//! yields records the aggregator and estimator consume exactly like metered
//! data. Synthetic records carry `filled = true` so downstream consumers
//! can tell them from real readings.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::domain::{IntervalReading, MonthKey};
use crate::usage::normalize::local_midnight_utc;

fn flat_slots(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total_kwh: f64,
    interval_minutes: u32,
) -> Vec<IntervalReading> {
    if interval_minutes == 0 || !total_kwh.is_finite() || total_kwh < 0.0 || end <= start {
        warn!(total_kwh, interval_minutes, "unusable manual entry, producing no intervals");
        return Vec::new();
    }
    let interval = Duration::minutes(i64::from(interval_minutes));
    let slots = ((end - start).num_minutes() / i64::from(interval_minutes)) as usize;
    let per_slot = total_kwh / slots as f64;
    (0..slots)
        .map(|i| IntervalReading {
            esiid: None,
            meter: None,
            interval_start_utc: start + interval * i as i32,
            kwh: per_slot,
            filled: true,
        })
        .collect()
}

/// Spread one manually entered monthly total flat across every slot of that
/// zone-local calendar month. DST months get their actual slot count, so
/// the records always sum back to the entered total.
pub fn monthly_total_to_intervals(
    month: MonthKey,
    total_kwh: f64,
    tz: Tz,
    interval_minutes: u32,
) -> Vec<IntervalReading> {
    let start = local_midnight_utc(month.first_day(), tz);
    let end = local_midnight_utc(month.next().first_day(), tz);
    flat_slots(start, end, total_kwh, interval_minutes)
}

/// Spread a manually entered annual total flat across `[start_date,
/// end_date]` (both inclusive, zone-local days).
pub fn annual_total_to_intervals(
    annual_kwh: f64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    tz: Tz,
    interval_minutes: u32,
) -> Vec<IntervalReading> {
    if end_date < start_date {
        warn!(%start_date, %end_date, "inverted manual entry period");
        return Vec::new();
    }
    let start = local_midnight_utc(start_date, tz);
    let end = local_midnight_utc(end_date + Duration::days(1), tz);
    flat_slots(start, end, annual_kwh, interval_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BucketKey;
    use crate::usage::aggregate;
    use chrono_tz::America::Chicago;

    #[test]
    fn monthly_total_spreads_flat_and_sums_back() {
        let june = MonthKey::new(2024, 6);
        let out = monthly_total_to_intervals(june, 300.0, Chicago, 15);
        assert_eq!(out.len(), 2880);
        let sum: f64 = out.iter().map(|r| r.kwh).sum();
        assert!((sum - 300.0).abs() < 1e-6);
        assert!(out.iter().all(|r| r.filled));
        assert!(out.windows(2).all(|w| w[0].kwh == w[1].kwh));
    }

    #[test]
    fn dst_months_get_their_actual_slot_count() {
        // November 2024 contains the fall-back day: 29 * 96 + 100 slots.
        let nov = monthly_total_to_intervals(MonthKey::new(2024, 11), 288.4, Chicago, 15);
        assert_eq!(nov.len(), 2884);
        // March 2024 contains the spring-forward day: 30 * 96 + 92 slots.
        let mar = monthly_total_to_intervals(MonthKey::new(2024, 3), 100.0, Chicago, 15);
        assert_eq!(mar.len(), 2972);
        let sum: f64 = mar.iter().map(|r| r.kwh).sum();
        assert!((sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn annual_total_covers_the_billing_span() {
        let out = annual_total_to_intervals(
            12000.0,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            Chicago,
            15,
        );
        let sum: f64 = out.iter().map(|r| r.kwh).sum();
        assert!((sum - 12000.0).abs() < 1e-6);

        let usage = aggregate(&out, &[BucketKey::total()], Chicago);
        assert_eq!(usage.month_count(), 12);
        assert!(usage.fully_covered_months().len() == 12);
    }

    #[test]
    fn unusable_entries_produce_no_intervals() {
        let june = MonthKey::new(2024, 6);
        assert!(monthly_total_to_intervals(june, f64::NAN, Chicago, 15).is_empty());
        assert!(monthly_total_to_intervals(june, -5.0, Chicago, 15).is_empty());
        assert!(monthly_total_to_intervals(june, 300.0, Chicago, 0).is_empty());
        assert!(annual_total_to_intervals(
            12000.0,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Chicago,
            15
        )
        .is_empty());
    }
}
