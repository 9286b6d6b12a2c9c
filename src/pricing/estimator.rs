use serde::Serialize;
use tracing::debug;

use crate::domain::{BucketKey, MonthKey, RateStructure, RateTier, TdspCharge};
use crate::error::{CreditFailure, EstimateFailure};
use crate::pricing::credits::{
    apply_bill_credits_to_month, extract_deterministic_bill_credits, BillCreditRule,
};
use crate::pricing::indexed::{
    choose_effective_cents_per_kwh, detect_indexed_or_variable, extract_efl_average_price_anchors,
};
use crate::usage::MonthlyUsage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthBreakdown {
    pub month: MonthKey,
    pub kwh: f64,
    pub energy_cents: f64,
    pub delivery_cents: f64,
    /// `<= 0`; bill credits only reduce the month.
    pub credit_cents: f64,
    pub base_fee_cents: f64,
    pub total_cents: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillEstimate {
    pub total_cents: f64,
    pub total_kwh: f64,
    /// Blended rate: total cost over total usage, delivery included.
    pub effective_cents_per_kwh: f64,
    pub months: Vec<MonthBreakdown>,
}

/// How the month's energy charge is computed, resolved once up front so the
/// per-month loop is an exhaustive match instead of optional chaining.
enum PricingMode<'a> {
    Flat(f64),
    Tiered(&'a [RateTier]),
    TimeOfUse,
    EffectiveRate(f64),
}

fn tiered_energy_cents(tiers: &[RateTier], monthly_kwh: f64) -> Result<f64, EstimateFailure> {
    let mut sorted: Vec<&RateTier> = tiers.iter().collect();
    sorted.sort_by(|a, b| {
        a.min_kwh
            .partial_cmp(&b.min_kwh)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Blocks must tile [0, ∞) without gaps; anything else is an extraction
    // defect and the estimate fails closed.
    let mut expected_min = 0.0;
    let mut cents = 0.0;
    for (i, tier) in sorted.iter().enumerate() {
        if (tier.min_kwh - expected_min).abs() > 1e-6 {
            return Err(EstimateFailure::UnsupportedRateStructure(
                "tier blocks do not tile usage".to_string(),
            ));
        }
        let max = match tier.max_kwh {
            Some(max) => max,
            None if i == sorted.len() - 1 => f64::INFINITY,
            None => {
                return Err(EstimateFailure::UnsupportedRateStructure(
                    "open-ended tier before the last block".to_string(),
                ))
            }
        };
        let portion = (monthly_kwh.min(max) - tier.min_kwh).max(0.0);
        cents += portion * tier.rate_cents;
        expected_min = max;
    }
    if monthly_kwh > expected_min {
        return Err(EstimateFailure::UnsupportedRateStructure(
            "usage exceeds the final tier block".to_string(),
        ));
    }
    Ok(cents)
}

fn tou_energy_cents(
    rs: &RateStructure,
    usage: &MonthlyUsage,
    month: MonthKey,
) -> Result<f64, EstimateFailure> {
    let periods = rs
        .tou_periods
        .as_ref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            EstimateFailure::UnsupportedRateStructure(
                "time-of-use plan without periods".to_string(),
            )
        })?;
    let mut cents = 0.0;
    for period in periods {
        let key = BucketKey::new(period.day_type, period.window);
        let bucket = usage
            .bucket(month, &key)
            .ok_or(EstimateFailure::MissingRequiredBuckets(month))?;
        cents += bucket.kwh * period.rate_cents;
    }
    Ok(cents)
}

fn resolve_pricing_mode<'a>(
    rs: &'a RateStructure,
    usage: &MonthlyUsage,
    covered: &[MonthKey],
) -> Result<PricingMode<'a>, EstimateFailure> {
    let detection = detect_indexed_or_variable(rs);
    if detection.is_indexed {
        // Annualize observed usage to pick the anchor bracket.
        let monthly_sum: f64 = covered
            .iter()
            .filter_map(|m| usage.total_kwh(*m))
            .sum();
        let annual_kwh = monthly_sum / covered.len() as f64 * 12.0;
        let anchors = extract_efl_average_price_anchors(rs);
        let rate = if anchors.is_empty() {
            // A variable plan's disclosed current-bill rate is an acceptable
            // stand-in; anything less is a fabricated number.
            rs.current_bill_rate_cents
                .ok_or(EstimateFailure::MissingEflAnchors)?
        } else {
            choose_effective_cents_per_kwh(annual_kwh, &anchors)?
        };
        return Ok(PricingMode::EffectiveRate(rate));
    }

    if rs.tou_periods.as_ref().is_some_and(|p| !p.is_empty()) {
        return Ok(PricingMode::TimeOfUse);
    }
    if let Some(tiers) = rs.tiers.as_ref().filter(|t| !t.is_empty()) {
        return Ok(PricingMode::Tiered(tiers));
    }
    if let Some(rate) = rs.energy_rate_cents {
        return Ok(PricingMode::Flat(rate));
    }
    Err(EstimateFailure::UnsupportedRateStructure(format!(
        "no pricing shape for {} plan",
        rs.rate_type
    )))
}

/// Estimate the total cost of a plan over the supplied usage months.
///
/// Deterministic and fail-closed: any missing bucket, ambiguous credit,
/// missing anchor, or missing delivery snapshot returns an enumerated
/// failure instead of an approximate number.
pub fn estimate(
    rs: &RateStructure,
    usage: &MonthlyUsage,
    tdsp: Option<&TdspCharge>,
    months_count: u32,
) -> Result<BillEstimate, EstimateFailure> {
    let tdsp = tdsp.ok_or(EstimateFailure::MissingDeliveryCharges)?;
    if usage.is_empty() {
        return Err(EstimateFailure::NoUsage);
    }
    if usage.month_count() as u32 != months_count {
        return Err(EstimateFailure::UsageMonthsMismatch {
            expected: months_count,
            actual: usage.month_count() as u32,
        });
    }
    if let Some(month) = usage.months().find(|m| usage.is_incomplete(*m)) {
        return Err(EstimateFailure::MissingRequiredBuckets(month));
    }

    let covered = usage.fully_covered_months();
    let mode = resolve_pricing_mode(rs, usage, &covered)?;

    let credit_rules: Vec<BillCreditRule> = match extract_deterministic_bill_credits(rs) {
        Ok(rules) => rules,
        Err(CreditFailure::NoCredits) => Vec::new(),
        Err(reason) => return Err(EstimateFailure::CreditAmbiguity(reason)),
    };

    let mut months = Vec::with_capacity(covered.len());
    let mut total_cents = 0.0;
    let mut total_kwh = 0.0;
    for month in covered {
        let kwh = usage
            .total_kwh(month)
            .ok_or(EstimateFailure::MissingRequiredBuckets(month))?;

        let energy_cents = match mode {
            PricingMode::Flat(rate) | PricingMode::EffectiveRate(rate) => kwh * rate,
            PricingMode::Tiered(tiers) => tiered_energy_cents(tiers, kwh)?,
            PricingMode::TimeOfUse => tou_energy_cents(rs, usage, month)?,
        };
        let delivery_cents = tdsp.per_kwh_delivery_charge_cents * kwh
            + tdsp.monthly_customer_charge_dollars * 100.0;
        let credit_cents = apply_bill_credits_to_month(kwh, &credit_rules).credit_cents_total;
        let base_fee_cents = rs.base_monthly_fee_cents;
        let month_total = energy_cents + delivery_cents + credit_cents + base_fee_cents;

        debug!(%month, kwh, energy_cents, delivery_cents, credit_cents, "estimated month");
        total_cents += month_total;
        total_kwh += kwh;
        months.push(MonthBreakdown {
            month,
            kwh,
            energy_cents,
            delivery_cents,
            credit_cents,
            base_fee_cents,
            total_cents: month_total,
        });
    }

    let effective_cents_per_kwh = if total_kwh > 0.0 {
        total_cents / total_kwh
    } else {
        0.0
    };
    Ok(BillEstimate {
        total_cents,
        total_kwh,
        effective_cents_per_kwh,
        months,
    })
}
