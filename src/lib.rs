//! Deterministic calculation core for a Texas retail electricity-plan
//! comparison service.
//!
//! Everything here is a pure, synchronous transformation over
//! caller-supplied data: raw smart-meter rows become canonical usage
//! buckets, rate structures are evaluated against those buckets into bill
//! estimates, and unreliable marketplace offer identifiers are matched to
//! canonical plan records. The core performs no I/O and fails closed
//! wherever plan semantics are ambiguous; financial outputs are either
//! exactly right or explicitly refused.

pub mod config;
pub mod domain;
pub mod error;
pub mod matcher;
pub mod pricing;
pub mod telemetry;
pub mod usage;

pub use config::{AmbiguousDstPolicy, EngineConfig, ENGINE_VERSION};
pub use domain::*;
pub use error::{CreditFailure, EstimateFailure, RateStructureError};
pub use matcher::{match_offers_to_plans, MatcherOptions};
pub use pricing::{
    apply_bill_credits_to_month, choose_effective_cents_per_kwh, detect_indexed_or_variable,
    estimate, extract_deterministic_bill_credits, extract_efl_average_price_anchors,
    make_estimate_cache_key, AnchorSet, BillCreditRule, BillEstimate, EstimateCacheKey,
    IndexedDetection, MonthBreakdown,
};
pub use usage::{
    aggregate, annual_total_to_intervals, expected_slots_for_day, fill_missing,
    monthly_total_to_intervals, normalize, MonthlyUsage, NormalizeOptions, NormalizeOutcome,
    RawIntervalRow, ResolvedBucket, SkipCounts,
};
