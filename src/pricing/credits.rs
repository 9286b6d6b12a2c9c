use serde::Serialize;

use crate::domain::{RateStructure, RawBillCredit};
use crate::error::CreditFailure;

/// Deterministic, normalized bill-credit rule. Ranges are half-open:
/// `[min_kwh_inclusive, max_kwh_exclusive)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillCreditRule {
    FlatMonthlyCredit {
        credit_dollars: f64,
    },
    UsageRangeCredit {
        credit_dollars: f64,
        min_kwh_inclusive: f64,
        max_kwh_exclusive: Option<f64>,
    },
}

impl BillCreditRule {
    fn qualifies(&self, monthly_kwh: f64) -> bool {
        match *self {
            BillCreditRule::FlatMonthlyCredit { .. } => true,
            BillCreditRule::UsageRangeCredit {
                min_kwh_inclusive,
                max_kwh_exclusive,
                ..
            } => {
                monthly_kwh >= min_kwh_inclusive
                    && max_kwh_exclusive.map_or(true, |max| monthly_kwh < max)
            }
        }
    }

    fn credit_dollars(&self) -> f64 {
        match *self {
            BillCreditRule::FlatMonthlyCredit { credit_dollars }
            | BillCreditRule::UsageRangeCredit { credit_dollars, .. } => credit_dollars,
        }
    }
}

/// Per-rule audit entry from applying credits to one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditTraceEntry {
    pub rule: BillCreditRule,
    pub qualified: bool,
    /// Negative when applied, zero otherwise.
    pub credit_cents: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditApplication {
    /// Always `<= 0`; credits only ever reduce a bill.
    pub credit_cents_total: f64,
    pub trace: Vec<CreditTraceEntry>,
}

fn normalize_rule(raw: &RawBillCredit) -> Result<BillCreditRule, CreditFailure> {
    // Seasonal or otherwise month-gated credits depend on the calendar, not
    // on usage; refusing them keeps the evaluator deterministic.
    if raw.months.as_ref().is_some_and(|m| !m.is_empty()) {
        return Err(CreditFailure::UnsupportedCreditDimension);
    }
    if let Some(per) = raw.per.as_deref() {
        let per = per.trim().to_ascii_lowercase();
        if per != "month" && per != "monthly" && per != "billing_cycle" {
            return Err(CreditFailure::NonDeterministicCredit);
        }
    }
    let Some(credit_dollars) = raw.credit_dollars else {
        return Err(CreditFailure::UnsupportedCreditShape);
    };
    if !credit_dollars.is_finite() || credit_dollars <= 0.0 {
        return Err(CreditFailure::UnsupportedCreditShape);
    }

    match (raw.min_kwh, raw.max_kwh) {
        (None, None) => Ok(BillCreditRule::FlatMonthlyCredit { credit_dollars }),
        (min, max) => {
            let min_kwh_inclusive = min.unwrap_or(0.0);
            if !min_kwh_inclusive.is_finite()
                || min_kwh_inclusive < 0.0
                || max.is_some_and(|m| !m.is_finite() || m <= min_kwh_inclusive)
            {
                return Err(CreditFailure::UnsupportedCreditShape);
            }
            Ok(BillCreditRule::UsageRangeCredit {
                credit_dollars,
                min_kwh_inclusive,
                max_kwh_exclusive: max,
            })
        }
    }
}

fn ranges_overlap(a: &BillCreditRule, b: &BillCreditRule) -> bool {
    let (
        BillCreditRule::UsageRangeCredit {
            min_kwh_inclusive: a_min,
            max_kwh_exclusive: a_max,
            ..
        },
        BillCreditRule::UsageRangeCredit {
            min_kwh_inclusive: b_min,
            max_kwh_exclusive: b_max,
            ..
        },
    ) = (a, b)
    else {
        return false;
    };
    let a_max = a_max.unwrap_or(f64::INFINITY);
    let b_max = b_max.unwrap_or(f64::INFINITY);
    *a_min < b_max && *b_min < a_max
}

/// Extract the deterministic bill-credit rules a plan discloses, or refuse
/// with an enumerated reason.
///
/// Identical duplicate rules (same range, same amount) collapse to one;
/// overlapping non-identical ranges are ambiguous and fail closed.
pub fn extract_deterministic_bill_credits(
    rs: &RateStructure,
) -> Result<Vec<BillCreditRule>, CreditFailure> {
    let Some(credits) = rs.bill_credits.as_ref() else {
        return Err(CreditFailure::NoCredits);
    };
    if !credits.has_bill_credit {
        return Err(CreditFailure::NoCredits);
    }
    if credits.rules.is_empty() {
        // The EFL discloses a credit but extraction produced nothing usable.
        return Err(CreditFailure::NonDeterministicCredit);
    }

    let mut rules: Vec<BillCreditRule> = Vec::with_capacity(credits.rules.len());
    for raw in &credits.rules {
        let rule = normalize_rule(raw)?;
        if rules.contains(&rule) {
            continue;
        }
        if rules.iter().any(|kept| ranges_overlap(kept, &rule)) {
            return Err(CreditFailure::UnsupportedCreditCombination);
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// Apply extracted rules to one month of usage. Multiple qualifying rules
/// sum; the trace records every rule either way.
pub fn apply_bill_credits_to_month(
    monthly_kwh: f64,
    rules: &[BillCreditRule],
) -> CreditApplication {
    let mut total = 0.0;
    let trace = rules
        .iter()
        .map(|rule| {
            let qualified = rule.qualifies(monthly_kwh);
            let credit_cents = if qualified {
                -rule.credit_dollars() * 100.0
            } else {
                0.0
            };
            total += credit_cents;
            CreditTraceEntry {
                rule: rule.clone(),
                qualified,
                credit_cents,
            }
        })
        .collect();
    CreditApplication {
        credit_cents_total: total,
        trace,
    }
}
