use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

use crate::domain::RateStructure;

/// Canonical rate-plan record owned by the external ingestion pipeline.
/// Read-only to this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPlanRecord {
    pub id: String,
    pub supplier_slug: String,
    pub tdsp: String,
    pub term_months: u32,
    pub plan_id: Option<String>,
    pub name_id: Option<String>,
    pub product_code: Option<String>,
    pub rate_id: Option<String>,
    pub display_name: String,
    pub efl_url: String,
    pub rate_structure: RateStructure,
}

/// A live marketplace offer with whatever identifiers the third-party feed
/// happened to include. All identity fields are unreliable individually;
/// the matcher cascades across them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOffer {
    pub offer_id: String,
    pub supplier_name: String,
    pub tdsp_name: String,
    pub plan_id: Option<String>,
    pub name_id: Option<String>,
    pub rate_id: Option<String>,
    pub term_months: Option<u32>,
    pub display_name: String,
    pub efl_url: Option<String>,
}

/// Which cascade stage produced a match, strongest first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    PlanId,
    NameId,
    EflCode,
    RateId,
    FuzzyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
}

/// Ranked candidate offered when no cascade stage matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSuggestion {
    pub plan_record_id: String,
    pub display_name: String,
    pub term_months: u32,
    pub score: f64,
}

/// Per-offer matching outcome. Ephemeral, recomputed per request; an
/// unmatched offer is a first-class value, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub offer_id: String,
    pub status: MatchStatus,
    pub method: Option<MatchMethod>,
    pub confidence: f64,
    pub plan_record_id: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<PlanSuggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub by_method: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub decisions: Vec<MatchDecision>,
    pub summary: MatchSummary,
}
