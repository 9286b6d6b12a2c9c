use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::domain::{BucketWindow, DayType};
use crate::error::RateStructureError;

/// Declared pricing family of a plan, as extracted from its EFL.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateType {
    Fixed,
    Variable,
    Indexed,
    TimeOfUse,
    Other,
}

/// One marginal pricing block: the rate applies to the kWh between
/// `min_kwh` (inclusive) and `max_kwh` (exclusive; `None` = open-ended).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub min_kwh: f64,
    pub max_kwh: Option<f64>,
    pub rate_cents: f64,
}

/// One time-of-use pricing period, addressed by the usage bucket it prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouPeriod {
    pub label: String,
    pub day_type: DayType,
    pub window: BucketWindow,
    pub rate_cents: f64,
}

/// Raw bill-credit disclosure as the extraction pipeline produced it.
///
/// This shape is deliberately loose; the credit evaluator is the component
/// that either normalizes it into a deterministic rule or refuses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBillCredit {
    pub credit_dollars: Option<f64>,
    pub min_kwh: Option<f64>,
    pub max_kwh: Option<f64>,
    /// Calendar months (1-12) the credit is gated on, if any. Seasonal
    /// gating is an unsupported dimension.
    pub months: Option<Vec<u32>>,
    /// Application cadence the extractor saw ("month" is the only
    /// deterministic one).
    pub per: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillCredits {
    pub has_bill_credit: bool,
    #[serde(default)]
    pub rules: Vec<RawBillCredit>,
}

/// EFL-published average price at one disclosure usage level.
///
/// `supply_cost_dollars` is the published total supply cost at the level;
/// dividing it by the level yields a supply-only cents/kWh that excludes
/// delivery charges. `avg_price_cents` is a pre-baked modeled average that
/// may already include delivery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AveragePriceAnchor {
    pub avg_price_cents: Option<f64>,
    pub supply_cost_dollars: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AveragePriceAnchors {
    #[serde(rename = "500")]
    pub k500: Option<AveragePriceAnchor>,
    #[serde(rename = "1000")]
    pub k1000: Option<AveragePriceAnchor>,
    #[serde(rename = "2000")]
    pub k2000: Option<AveragePriceAnchor>,
}

impl AveragePriceAnchors {
    pub fn is_empty(&self) -> bool {
        self.k500.is_none() && self.k1000.is_none() && self.k2000.is_none()
    }
}

/// Tagged-union rate model, validated at the system boundary so the
/// estimator can match exhaustively instead of optional-chaining through
/// untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStructure {
    pub rate_type: RateType,
    pub base_monthly_fee_cents: f64,
    pub energy_rate_cents: Option<f64>,
    pub tiers: Option<Vec<RateTier>>,
    pub tou_periods: Option<Vec<TouPeriod>>,
    pub bill_credits: Option<BillCredits>,
    pub average_price_anchors: Option<AveragePriceAnchors>,
    /// Explicit current-bill rate disclosed by variable plans.
    pub current_bill_rate_cents: Option<f64>,
    /// Explicit index formula disclosed by market-indexed plans.
    pub index_formula: Option<String>,
    /// Free-text disclosures; weakest classification signal only.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl RateStructure {
    /// Parse and validate a rate structure arriving as JSON from the
    /// extraction pipeline.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RateStructureError> {
        let rs: RateStructure = serde_json::from_value(value)?;
        rs.validate()?;
        Ok(rs)
    }

    /// Boundary validation: exactly one pricing shape may be authoritative,
    /// and every number must be finite.
    pub fn validate(&self) -> Result<(), RateStructureError> {
        if !self.base_monthly_fee_cents.is_finite() {
            return Err(RateStructureError::NonFiniteNumber("base_monthly_fee_cents"));
        }
        if let Some(r) = self.energy_rate_cents {
            if !r.is_finite() {
                return Err(RateStructureError::NonFiniteNumber("energy_rate_cents"));
            }
        }
        for tier in self.tiers.iter().flatten() {
            if !tier.min_kwh.is_finite()
                || !tier.rate_cents.is_finite()
                || tier.max_kwh.is_some_and(|m| !m.is_finite())
            {
                return Err(RateStructureError::NonFiniteNumber("tiers"));
            }
        }
        for period in self.tou_periods.iter().flatten() {
            if !period.rate_cents.is_finite() {
                return Err(RateStructureError::NonFiniteNumber("tou_periods"));
            }
        }

        let mut shapes = Vec::new();
        if self.energy_rate_cents.is_some() {
            shapes.push("energy_rate_cents");
        }
        if self.tiers.as_ref().is_some_and(|t| !t.is_empty()) {
            shapes.push("tiers");
        }
        if self.tou_periods.as_ref().is_some_and(|t| !t.is_empty()) {
            shapes.push("tou_periods");
        }
        if shapes.len() > 1 {
            return Err(RateStructureError::ContradictoryShapes(shapes.join("+")));
        }

        match self.rate_type {
            RateType::Fixed if shapes.is_empty() => {
                Err(RateStructureError::MissingShape(self.rate_type.to_string()))
            }
            RateType::TimeOfUse
                if !self.tou_periods.as_ref().is_some_and(|t| !t.is_empty()) =>
            {
                Err(RateStructureError::MissingShape(self.rate_type.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Convenience constructor for the common flat fixed-rate plan.
    pub fn fixed(energy_rate_cents: f64, base_monthly_fee_cents: f64) -> Self {
        RateStructure {
            rate_type: RateType::Fixed,
            base_monthly_fee_cents,
            energy_rate_cents: Some(energy_rate_cents),
            tiers: None,
            tou_periods: None,
            bill_credits: None,
            average_price_anchors: None,
            current_bill_rate_cents: None,
            index_formula: None,
            notes: Vec::new(),
        }
    }
}
