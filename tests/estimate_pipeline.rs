//! End-to-end scenarios: raw meter rows through normalization, aggregation,
//! and estimation, plus cache-key stability across input orderings.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use retail_plan_engine::{
    aggregate, estimate, make_estimate_cache_key, normalize, BucketKey, EstimateFailure,
    MonthKey, MonthlyUsage, NormalizeOptions, RateStructure, RawIntervalRow, TdspCharge,
};
use std::collections::BTreeMap;

fn oncor_snapshot() -> TdspCharge {
    TdspCharge {
        per_kwh_delivery_charge_cents: 4.5,
        monthly_customer_charge_dollars: 4.39,
        effective_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    }
}

/// One end-stamped row per 15-minute slot for all of June 2024 (Chicago
/// local), totalling exactly 1000 kWh.
fn june_rows() -> Vec<RawIntervalRow> {
    let start: DateTime<Utc> = "2024-06-01T05:00:00Z".parse().unwrap();
    let end: DateTime<Utc> = "2024-07-01T05:00:00Z".parse().unwrap();
    let slots = ((end - start).num_minutes() / 15) as usize;
    let per_slot = 1000.0 / slots as f64;
    (0..slots)
        .map(|i| RawIntervalRow::EndStamped {
            esiid: Some("1044372000000000001".to_string()),
            meter: None,
            timestamp: (start + Duration::minutes(15 * (i as i64 + 1))).to_rfc3339(),
            kwh: Some(per_slot),
        })
        .collect()
}

#[test]
fn fixed_plan_pipeline_produces_the_expected_bill() {
    let opts = NormalizeOptions::default();
    let outcome = normalize(&june_rows(), &opts);
    assert_eq!(outcome.skipped.total(), 0);
    assert_eq!(outcome.readings.len(), 2880);

    let usage = aggregate(&outcome.readings, &[BucketKey::total()], opts.tz);
    let june = MonthKey::new(2024, 6);
    let total = usage.total_kwh(june).unwrap();
    assert!((total - 1000.0).abs() < 1e-6);

    // 12.5c/kWh energy + 99.5c base fee, Oncor delivery on top.
    let rs = RateStructure::fixed(12.5, 995.0);
    let est = estimate(&rs, &usage, Some(&oncor_snapshot()), 1).unwrap();
    // 12500 energy + 4500 delivery + 995 base + 439 customer charge
    assert!((est.total_cents - 18434.0).abs() < 1e-6);
    assert!((est.effective_cents_per_kwh - 18.434).abs() < 1e-6);
    assert_eq!(est.months.len(), 1);
}

#[test]
fn plans_that_cannot_be_estimated_surface_reason_codes() {
    let mut usage = MonthlyUsage::default();
    usage.insert(MonthKey::new(2024, 6), &BucketKey::total(), 1000.0);

    let rs = RateStructure::fixed(12.5, 995.0);
    let missing_tdsp = estimate(&rs, &usage, None, 1).unwrap_err();
    assert_eq!(missing_tdsp.code(), "MISSING_DELIVERY_CHARGES");

    let indexed = RateStructure {
        rate_type: retail_plan_engine::RateType::Indexed,
        energy_rate_cents: None,
        ..RateStructure::fixed(0.0, 0.0)
    };
    let missing_anchors = estimate(&indexed, &usage, Some(&oncor_snapshot()), 1).unwrap_err();
    assert_eq!(missing_anchors, EstimateFailure::MissingEflAnchors);
    assert_eq!(missing_anchors.code(), "MISSING_EFL_ANCHORS");
}

#[test]
fn cache_key_ignores_construction_order() {
    let rs = RateStructure::fixed(12.5, 995.0);
    let tdsp = oncor_snapshot();
    let june = MonthKey::new(2024, 6);
    let weekday: BucketKey = "kwh.m.weekday.0600-2200".parse().unwrap();

    let mut forward = MonthlyUsage::default();
    forward.insert(june, &BucketKey::total(), 1000.0);
    forward.insert(june, &weekday, 640.0);

    let mut reversed = MonthlyUsage::default();
    reversed.insert(june, &weekday, 640.0);
    reversed.insert(june, &BucketKey::total(), 1000.0);

    let a = make_estimate_cache_key("v3", 1, 12000.0, &tdsp, &rs, &forward, "actual");
    let b = make_estimate_cache_key("v3", 1, 12000.0, &tdsp, &rs, &reversed, "actual");
    assert_eq!(a, b);
    assert_eq!(a.inputs_sha256.len(), 64);
}

#[test]
fn legacy_bucket_maps_estimate_through_aliases() {
    // A month stored years ago under uppercase day types and 0000-2400.
    let mut month = BTreeMap::new();
    month.insert("kwh.m.ALL.0000-2400".to_string(), 1000.0);
    let mut months = BTreeMap::new();
    months.insert(MonthKey::new(2024, 6), month);
    let usage = MonthlyUsage::from_bucket_maps(months);

    let rs = RateStructure::fixed(12.5, 995.0);
    let est = estimate(&rs, &usage, Some(&oncor_snapshot()), 1).unwrap();
    assert!((est.total_cents - 18434.0).abs() < 1e-6);
}

#[test]
fn time_of_use_plan_prices_sub_buckets() {
    let rs = RateStructure::from_json(serde_json::json!({
        "rate_type": "TIME_OF_USE",
        "base_monthly_fee_cents": 495.0,
        "tou_periods": [
            {"label": "nights", "day_type": "all", "window": "2000-0600", "rate_cents": 0.0},
            {"label": "days", "day_type": "all", "window": "0600-2000", "rate_cents": 18.0}
        ]
    }))
    .unwrap();

    let june = MonthKey::new(2024, 6);
    let mut usage = MonthlyUsage::default();
    usage.insert(june, &BucketKey::total(), 1000.0);
    usage.insert(june, &"kwh.m.all.2000-0600".parse().unwrap(), 400.0);
    usage.insert(june, &"kwh.m.all.0600-2000".parse().unwrap(), 600.0);

    let est = estimate(&rs, &usage, Some(&oncor_snapshot()), 1).unwrap();
    // 600 * 18 energy + 4939 delivery + 495 base
    assert!((est.total_cents - (10800.0 + 4939.0 + 495.0)).abs() < 1e-6);

    // Missing the nights bucket fails closed rather than estimating.
    let mut partial = MonthlyUsage::default();
    partial.insert(june, &BucketKey::total(), 1000.0);
    partial.insert(june, &"kwh.m.all.0600-2000".parse().unwrap(), 600.0);
    assert_eq!(
        estimate(&rs, &partial, Some(&oncor_snapshot()), 1).unwrap_err(),
        EstimateFailure::MissingRequiredBuckets(june)
    );
}
