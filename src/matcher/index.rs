use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::domain::{CanonicalPlanRecord, MatchMethod};
use crate::matcher::text::{normalize_plan_name, normalize_supplier, normalize_tdsp};

/// Identity facets a plan can be looked up by, strongest first. The four id
/// facets form the exact cascade; `NormName` backs the exact-name fast path
/// of the fuzzy stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    PlanId,
    NameId,
    EflCode,
    RateId,
    NormName,
}

impl Facet {
    pub fn method(self) -> MatchMethod {
        match self {
            Facet::PlanId => MatchMethod::PlanId,
            Facet::NameId => MatchMethod::NameId,
            Facet::EflCode => MatchMethod::EflCode,
            Facet::RateId => MatchMethod::RateId,
            Facet::NormName => MatchMethod::FuzzyName,
        }
    }

    pub fn base_confidence(self) -> f64 {
        match self {
            Facet::PlanId => 1.0,
            Facet::NameId => 0.95,
            Facet::EflCode | Facet::RateId => 0.9,
            Facet::NormName => 0.7,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Facet::PlanId => "plan",
            Facet::NameId => "name",
            Facet::EflCode => "efl",
            Facet::RateId => "rate",
            Facet::NormName => "norm",
        }
    }
}

/// EFL hosts whose document URLs carry the product code in a query
/// parameter rather than the path.
static QUERY_PARAM_HOSTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("signup.txu.com", "offercode"),
        ("www.reliant.com", "planid"),
        ("docs.gexaenergy.com", "rateid"),
    ])
});

const GENERIC_CODE_PARAMS: &[&str] = &["rateid", "planid", "productid", "offercode", "code"];

fn query_param(url: &str, name: &str) -> Option<String> {
    let query = url.split('?').nth(1)?.split('#').next()?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.eq_ignore_ascii_case(name) && !v.is_empty()).then(|| v.to_lowercase())
    })
}

fn looks_like_date(token: &str) -> bool {
    (6..=8).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit())
}

/// Derive a product code from an EFL document URL.
///
/// Providers with a known query-parameter scheme are handled per host; the
/// generic path takes the final path segment's stem and drops extension,
/// language, and date-stamp tokens that vary between republications of the
/// same document.
pub fn efl_product_code(url: &str) -> Option<String> {
    let host = crate::matcher::text::efl_hostname(url)?;
    if let Some(param) = QUERY_PARAM_HOSTS.get(host.as_str()) {
        if let Some(code) = query_param(url, param) {
            return Some(code);
        }
    }
    for param in GENERIC_CODE_PARAMS {
        if let Some(code) = query_param(url, param) {
            return Some(code);
        }
    }

    let rest = url.split("://").nth(1).unwrap_or(url);
    let rest = rest.split(['?', '#']).next()?;
    // Everything after the host; a bare host has no code to derive.
    let path = rest.split_once('/').map(|(_, p)| p)?;
    let segment = path.split('/').filter(|s| !s.is_empty()).last()?;
    let stem = segment.rsplit_once('.').map_or(segment, |(s, _)| s);
    let tokens: Vec<&str> = stem
        .split(['-', '_'])
        .filter(|t| !t.is_empty())
        .filter(|t| !looks_like_date(t))
        .filter(|t| !matches!(t.to_lowercase().as_str(), "efl" | "en" | "es" | "pdf"))
        .collect();
    let code = tokens.join("-").to_lowercase();
    (code.len() >= 3).then_some(code)
}

/// Inverted index over canonical plans: every derivable facet value maps to
/// the plans that carry it, each key duplicated with and without a TDSP
/// scope. Built fresh per matcher invocation; nothing is shared globally.
#[derive(Debug)]
pub struct PlanIndex<'a> {
    plans: &'a [CanonicalPlanRecord],
    by_key: HashMap<String, Vec<usize>>,
}

impl<'a> PlanIndex<'a> {
    pub fn build(plans: &'a [CanonicalPlanRecord]) -> Self {
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, plan) in plans.iter().enumerate() {
            let supplier = normalize_supplier(&plan.supplier_slug);
            let tdsp = normalize_tdsp(&plan.tdsp);
            let mut add = |facet: Facet, value: &str| {
                let value = value.to_lowercase();
                let unscoped = format!("{}:{}:{}", facet.tag(), supplier, value);
                by_key
                    .entry(format!("{unscoped}@{tdsp}"))
                    .or_default()
                    .push(i);
                by_key.entry(unscoped).or_default().push(i);
            };

            if let Some(v) = plan.plan_id.as_deref() {
                add(Facet::PlanId, v);
            }
            if let Some(v) = plan.name_id.as_deref() {
                add(Facet::NameId, v);
            }
            // Prefer the ingestion pipeline's extracted product code; fall
            // back to deriving one from the EFL URL the same way offers do.
            if let Some(v) = plan
                .product_code
                .clone()
                .or_else(|| efl_product_code(&plan.efl_url))
            {
                add(Facet::EflCode, &v);
            }
            if let Some(v) = plan.rate_id.as_deref() {
                add(Facet::RateId, v);
            }
            add(Facet::NormName, &normalize_plan_name(&plan.display_name));
        }
        PlanIndex { plans, by_key }
    }

    /// Look a facet value up, TDSP-scoped key first. With strict TDSP
    /// preference the unscoped fallback is skipped.
    pub fn lookup(
        &self,
        facet: Facet,
        supplier: &str,
        value: &str,
        tdsp: &str,
        tdsp_strict: bool,
    ) -> &[usize] {
        let unscoped = format!("{}:{}:{}", facet.tag(), supplier, value.to_lowercase());
        let scoped = format!("{unscoped}@{tdsp}");
        if let Some(hits) = self.by_key.get(&scoped) {
            return hits;
        }
        if !tdsp_strict {
            if let Some(hits) = self.by_key.get(&unscoped) {
                return hits;
            }
        }
        &[]
    }

    pub fn plan(&self, idx: usize) -> &'a CanonicalPlanRecord {
        &self.plans[idx]
    }

    /// All plans for one normalized supplier, for fuzzy matching and
    /// suggestions.
    pub fn supplier_plans(&self, supplier: &str) -> Vec<usize> {
        self.plans
            .iter()
            .enumerate()
            .filter(|(_, p)| normalize_supplier(&p.supplier_slug) == supplier)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateStructure;
    use rstest::rstest;

    fn plan(id: &str, supplier: &str, tdsp: &str, plan_id: Option<&str>) -> CanonicalPlanRecord {
        CanonicalPlanRecord {
            id: id.to_string(),
            supplier_slug: supplier.to_string(),
            tdsp: tdsp.to_string(),
            term_months: 12,
            plan_id: plan_id.map(str::to_string),
            name_id: None,
            product_code: None,
            rate_id: None,
            display_name: format!("{id} plan"),
            efl_url: format!("https://example.com/efl/{id}.pdf"),
            rate_structure: RateStructure::fixed(12.0, 0.0),
        }
    }

    #[rstest]
    #[case("https://example.com/efl/free-nights-12_20240601_en.pdf", Some("free-nights-12"))]
    #[case("https://signup.txu.com/efl?offercode=FN12X&lang=en", Some("fn12x"))]
    #[case("https://docs.host.com/view?rateId=RT-9", Some("rt-9"))]
    #[case("https://example.com/", None)]
    fn efl_code_heuristics(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(efl_product_code(url).as_deref(), expected);
    }

    #[test]
    fn lookup_prefers_tdsp_scoped_keys() {
        let plans = vec![
            plan("a", "txu-energy", "oncor", Some("P100")),
            plan("b", "txu-energy", "centerpoint", Some("P100")),
        ];
        let index = PlanIndex::build(&plans);
        let hits = index.lookup(Facet::PlanId, "txu-energy", "P100", "centerpoint", false);
        assert_eq!(hits.to_vec(), vec![1]);
        // Unknown TDSP falls back to the unscoped key unless strict.
        let hits = index.lookup(Facet::PlanId, "txu-energy", "P100", "tnmp", false);
        assert_eq!(hits.to_vec(), vec![0, 1]);
        let hits = index.lookup(Facet::PlanId, "txu-energy", "P100", "tnmp", true);
        assert!(hits.is_empty());
    }

    #[test]
    fn supplier_plans_filters_by_normalized_supplier() {
        let plans = vec![
            plan("a", "txu-energy", "oncor", None),
            plan("b", "reliant", "oncor", None),
        ];
        let index = PlanIndex::build(&plans);
        assert_eq!(index.supplier_plans("txu-energy"), vec![0]);
    }
}
