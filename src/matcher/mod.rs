pub mod index;
pub mod text;

pub use index::{efl_product_code, Facet, PlanIndex};
pub use text::{
    bigram_jaccard, efl_hostname, normalize_plan_name, normalize_supplier, normalize_tdsp,
    slugify, term_proximity,
};

use itertools::Itertools;
use tracing::debug;

use crate::domain::{
    CanonicalPlanRecord, MarketOffer, MatchDecision, MatchReport, MatchStatus, MatchSummary,
    PlanSuggestion,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherOptions {
    /// Require exact-key hits to match the offer's TDSP; without this the
    /// TDSP-scoped key is still preferred but an unscoped hit is accepted.
    pub prefer_tdsp_strict: bool,
}

/// Minimum bigram-Jaccard similarity before a fuzzy name match is even
/// considered; below this the offer goes to suggestions instead.
const FUZZY_MIN_SIMILARITY: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 5;

fn tdsp_matches(offer_tdsp: &str, plan: &CanonicalPlanRecord) -> bool {
    offer_tdsp == normalize_tdsp(&plan.tdsp)
}

/// Composite used to disambiguate key collisions: TDSP match first, then
/// term proximity, then name similarity.
fn collision_rank(offer: &MarketOffer, offer_tdsp: &str, offer_name: &str, plan: &CanonicalPlanRecord) -> f64 {
    let tdsp = if tdsp_matches(offer_tdsp, plan) { 1.0 } else { 0.0 };
    let term = term_proximity(offer.term_months, plan.term_months);
    let sim = bigram_jaccard(offer_name, &normalize_plan_name(&plan.display_name));
    tdsp * 4.0 + term * 2.0 + sim
}

fn pick_best<'a>(
    offer: &MarketOffer,
    offer_tdsp: &str,
    offer_name: &str,
    index: &'a PlanIndex<'_>,
    hits: &[usize],
) -> &'a CanonicalPlanRecord {
    let best = hits
        .iter()
        .map(|&i| index.plan(i))
        .max_by(|a, b| {
            collision_rank(offer, offer_tdsp, offer_name, a)
                .partial_cmp(&collision_rank(offer, offer_tdsp, offer_name, b))
                .unwrap_or(std::cmp::Ordering::Equal)
                // Deterministic tiebreak: stable record id order.
                .then_with(|| b.id.cmp(&a.id))
        })
        .expect("hits is non-empty");
    best
}

/// Confidence refinements shared by every cascade stage: exact term-month
/// agreement and a matching EFL document hostname each add a little.
fn refine_confidence(base: f64, offer: &MarketOffer, plan: &CanonicalPlanRecord) -> f64 {
    let mut confidence = base;
    if offer.term_months == Some(plan.term_months) {
        confidence += 0.05;
    }
    let hosts_match = offer
        .efl_url
        .as_deref()
        .and_then(efl_hostname)
        .zip(efl_hostname(&plan.efl_url))
        .is_some_and(|(a, b)| a == b);
    if hosts_match {
        confidence += 0.02;
    }
    confidence.clamp(0.0, 1.0)
}

fn suggestions_for(
    offer: &MarketOffer,
    offer_name: &str,
    index: &PlanIndex<'_>,
    supplier: &str,
) -> Vec<PlanSuggestion> {
    index
        .supplier_plans(supplier)
        .into_iter()
        .map(|i| {
            let plan = index.plan(i);
            let sim = bigram_jaccard(offer_name, &normalize_plan_name(&plan.display_name));
            let term = term_proximity(offer.term_months, plan.term_months);
            PlanSuggestion {
                plan_record_id: plan.id.clone(),
                display_name: plan.display_name.clone(),
                term_months: plan.term_months,
                score: 0.7 * sim + 0.3 * term,
            }
        })
        .sorted_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.plan_record_id.cmp(&b.plan_record_id))
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn decide(offer: &MarketOffer, index: &PlanIndex<'_>, opts: &MatcherOptions) -> MatchDecision {
    let supplier = normalize_supplier(&offer.supplier_name);
    let tdsp = normalize_tdsp(&offer.tdsp_name);
    let offer_name = normalize_plan_name(&offer.display_name);

    // Exact-key cascade, strongest facet first, short-circuiting at the
    // first facet that produces any hit.
    let cascade = [
        (Facet::PlanId, offer.plan_id.clone()),
        (Facet::NameId, offer.name_id.clone()),
        (
            Facet::EflCode,
            offer.efl_url.as_deref().and_then(efl_product_code),
        ),
        (Facet::RateId, offer.rate_id.clone()),
    ];
    for (facet, value) in cascade {
        let Some(value) = value else { continue };
        let hits = index.lookup(facet, &supplier, &value, &tdsp, opts.prefer_tdsp_strict);
        if hits.is_empty() {
            continue;
        }
        let plan = pick_best(offer, &tdsp, &offer_name, index, hits);
        return MatchDecision {
            offer_id: offer.offer_id.clone(),
            status: MatchStatus::Matched,
            method: Some(facet.method()),
            confidence: refine_confidence(facet.base_confidence(), offer, plan),
            plan_record_id: Some(plan.id.clone()),
            suggestions: Vec::new(),
        };
    }

    // Fuzzy name stage: bigram similarity blended with term proximity and a
    // TDSP bonus, nudging the 0.7 base by at most ±0.07. An exact
    // normalized-name hit in the index narrows the candidate set; otherwise
    // every same-supplier plan is scored.
    let exact = index.lookup(Facet::NormName, &supplier, &offer_name, &tdsp, false);
    let candidates: Vec<usize> = if exact.is_empty() {
        index.supplier_plans(&supplier)
    } else {
        exact.to_vec()
    };
    let best = candidates
        .iter()
        .map(|&i| {
            let plan = index.plan(i);
            let sim = bigram_jaccard(&offer_name, &normalize_plan_name(&plan.display_name));
            let term = term_proximity(offer.term_months, plan.term_months);
            let tdsp_bonus = if tdsp_matches(&tdsp, plan) { 1.0 } else { 0.0 };
            let blend = 0.6 * sim + 0.25 * term + 0.15 * tdsp_bonus;
            (plan, sim, blend)
        })
        .filter(|(_, sim, _)| *sim >= FUZZY_MIN_SIMILARITY)
        .max_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.id.cmp(&a.0.id))
        });
    if let Some((plan, _, blend)) = best {
        let base = Facet::NormName.base_confidence() + 0.07 * (2.0 * blend - 1.0);
        return MatchDecision {
            offer_id: offer.offer_id.clone(),
            status: MatchStatus::Matched,
            method: Some(Facet::NormName.method()),
            confidence: refine_confidence(base, offer, plan),
            plan_record_id: Some(plan.id.clone()),
            suggestions: Vec::new(),
        };
    }

    // No stage matched: never auto-select, surface ranked suggestions.
    MatchDecision {
        offer_id: offer.offer_id.clone(),
        status: MatchStatus::Unmatched,
        method: None,
        confidence: 0.0,
        plan_record_id: None,
        suggestions: suggestions_for(offer, &offer_name, index, &supplier),
    }
}

/// Match live marketplace offers against canonical plan records.
///
/// Builds one inverted index over the plans, then walks each offer through
/// the identity cascade. Pure and deterministic: identical inputs produce
/// identical decisions regardless of offer order.
pub fn match_offers_to_plans(
    offers: &[MarketOffer],
    plans: &[CanonicalPlanRecord],
    opts: &MatcherOptions,
) -> MatchReport {
    let index = PlanIndex::build(plans);
    let mut summary = MatchSummary::default();
    let decisions: Vec<MatchDecision> = offers
        .iter()
        .map(|offer| {
            let decision = decide(offer, &index, opts);
            match decision.status {
                MatchStatus::Matched => {
                    summary.matched += 1;
                    if let Some(method) = decision.method {
                        *summary.by_method.entry(method.to_string()).or_insert(0) += 1;
                    }
                }
                MatchStatus::Unmatched => summary.unmatched += 1,
            }
            debug!(
                offer = %decision.offer_id,
                status = %decision.status,
                confidence = decision.confidence,
                "matched offer"
            );
            decision
        })
        .collect();
    MatchReport { decisions, summary }
}
