use serde::Serialize;
use strum_macros::Display;

use crate::domain::{RateStructure, RateType};
use crate::error::EstimateFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexedKind {
    Indexed,
    Variable,
}

/// Which signal classified the plan, strongest first. Exposed so callers can
/// see when only the weak free-text scan fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DetectionSignal {
    ExplicitType,
    ExplicitFields,
    KeywordText,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexedDetection {
    pub is_indexed: bool,
    pub kind: Option<IndexedKind>,
    pub signal: Option<DetectionSignal>,
}

impl IndexedDetection {
    fn none() -> Self {
        IndexedDetection {
            is_indexed: false,
            kind: None,
            signal: None,
        }
    }

    fn hit(kind: IndexedKind, signal: DetectionSignal) -> Self {
        IndexedDetection {
            is_indexed: true,
            kind: Some(kind),
            signal: Some(signal),
        }
    }
}

const INDEXED_TOKENS: &[&str] = &["indexed", "index", "mcpe", "market rate", "pass-through", "passthrough"];
const VARIABLE_TOKENS: &[&str] = &["variable", "month-to-month rate"];

/// Classify a plan as market-indexed or variable.
///
/// Signal order: explicit type field, then explicit index/current-bill-rate
/// fields, then keyword tokens in free-text disclosures. The keyword scan is
/// inherently fuzzy and stays the lowest-priority signal. A plan with an
/// explicit time-of-use structure is never classified as indexed, and an
/// explicit FIXED type or a disclosed flat/tier shape settles the plan
/// before any weaker signal is consulted.
pub fn detect_indexed_or_variable(rs: &RateStructure) -> IndexedDetection {
    if rs.tou_periods.as_ref().is_some_and(|p| !p.is_empty()) {
        return IndexedDetection::none();
    }

    match rs.rate_type {
        RateType::Indexed => {
            return IndexedDetection::hit(IndexedKind::Indexed, DetectionSignal::ExplicitType)
        }
        RateType::Variable => {
            return IndexedDetection::hit(IndexedKind::Variable, DetectionSignal::ExplicitType)
        }
        // An explicit FIXED declaration settles the plan; stray index or
        // current-bill fields alongside it are extraction noise and must
        // not reprice the contract.
        RateType::Fixed => return IndexedDetection::none(),
        RateType::TimeOfUse | RateType::Other => {}
    }

    // A disclosed flat rate or tier table settles the plan the same way; no
    // weaker signal is allowed to override an authoritative pricing shape.
    if rs.energy_rate_cents.is_some() || rs.tiers.as_ref().is_some_and(|t| !t.is_empty()) {
        return IndexedDetection::none();
    }

    if rs.index_formula.is_some() {
        return IndexedDetection::hit(IndexedKind::Indexed, DetectionSignal::ExplicitFields);
    }
    if rs.current_bill_rate_cents.is_some() {
        return IndexedDetection::hit(IndexedKind::Variable, DetectionSignal::ExplicitFields);
    }

    for note in &rs.notes {
        let lower = note.to_lowercase();
        if INDEXED_TOKENS.iter().any(|t| lower.contains(t)) {
            return IndexedDetection::hit(IndexedKind::Indexed, DetectionSignal::KeywordText);
        }
        if VARIABLE_TOKENS.iter().any(|t| lower.contains(t)) {
            return IndexedDetection::hit(IndexedKind::Variable, DetectionSignal::KeywordText);
        }
    }
    IndexedDetection::none()
}

/// Usable cents/kWh anchors at the EFL disclosure usage levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnchorSet {
    pub k500: Option<f64>,
    pub k1000: Option<f64>,
    pub k2000: Option<f64>,
}

impl AnchorSet {
    fn points(&self) -> Vec<(f64, f64)> {
        [(500.0, self.k500), (1000.0, self.k1000), (2000.0, self.k2000)]
            .into_iter()
            .filter_map(|(level, price)| price.map(|p| (level, p)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }
}

fn anchor_cents(
    anchor: Option<&crate::domain::AveragePriceAnchor>,
    level_kwh: f64,
) -> Option<f64> {
    let anchor = anchor?;
    // A supply-only derivation (published supply cost over usage) is
    // preferred: the modeled average may already bake in delivery charges,
    // which the estimator adds separately.
    if let Some(cost) = anchor.supply_cost_dollars {
        if cost.is_finite() && cost > 0.0 {
            return Some(cost * 100.0 / level_kwh);
        }
    }
    anchor
        .avg_price_cents
        .filter(|c| c.is_finite() && *c > 0.0)
}

/// Pull usable cents/kWh anchors out of a rate structure's EFL disclosures.
pub fn extract_efl_average_price_anchors(rs: &RateStructure) -> AnchorSet {
    let Some(anchors) = rs.average_price_anchors.as_ref() else {
        return AnchorSet::default();
    };
    AnchorSet {
        k500: anchor_cents(anchors.k500.as_ref(), 500.0),
        k1000: anchor_cents(anchors.k1000.as_ref(), 1000.0),
        k2000: anchor_cents(anchors.k2000.as_ref(), 2000.0),
    }
}

/// Choose the effective cents/kWh for an indexed plan from its anchors.
///
/// Exact hit on an anchor level wins; between two anchors the price is
/// linearly interpolated; outside the anchored range the nearest anchor is
/// used. The provider's own disclosed average price is the best available
/// proxy for settlement-time pricing; nothing is ever fabricated.
pub fn choose_effective_cents_per_kwh(
    annual_kwh: f64,
    anchors: &AnchorSet,
) -> Result<f64, EstimateFailure> {
    let points = anchors.points();
    if points.is_empty() {
        return Err(EstimateFailure::MissingEflAnchors);
    }
    let monthly_kwh = annual_kwh / 12.0;

    if let Some((_, price)) = points.iter().find(|(level, _)| *level == monthly_kwh) {
        return Ok(*price);
    }
    for pair in points.windows(2) {
        let (lo_level, lo_price) = pair[0];
        let (hi_level, hi_price) = pair[1];
        if monthly_kwh > lo_level && monthly_kwh < hi_level {
            let t = (monthly_kwh - lo_level) / (hi_level - lo_level);
            return Ok(lo_price + t * (hi_price - lo_price));
        }
    }
    // Outside the anchored range: nearest anchor, lower level on ties.
    let (_, price) = points
        .iter()
        .min_by(|(a, _), (b, _)| {
            let da = (monthly_kwh - a).abs();
            let db = (monthly_kwh - b).abs();
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        })
        .copied()
        .expect("points is non-empty");
    Ok(price)
}
