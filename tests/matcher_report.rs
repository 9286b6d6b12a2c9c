//! Matcher behavior at the report level: determinism, TDSP strictness, and
//! the unmatched path.

use retail_plan_engine::{
    match_offers_to_plans, CanonicalPlanRecord, MarketOffer, MatchMethod, MatchStatus,
    MatcherOptions, RateStructure,
};

fn plan(id: &str, supplier: &str, tdsp: &str, term: u32, display: &str) -> CanonicalPlanRecord {
    CanonicalPlanRecord {
        id: id.to_string(),
        supplier_slug: supplier.to_string(),
        tdsp: tdsp.to_string(),
        term_months: term,
        plan_id: Some(format!("pid-{id}")),
        name_id: None,
        product_code: None,
        rate_id: None,
        display_name: display.to_string(),
        efl_url: format!("https://docs.{supplier}.com/efl/{id}-20240401.pdf"),
        rate_structure: RateStructure::fixed(12.0, 0.0),
    }
}

fn offer(id: &str, supplier: &str, display: &str) -> MarketOffer {
    MarketOffer {
        offer_id: id.to_string(),
        supplier_name: supplier.to_string(),
        tdsp_name: "Oncor Electric Delivery".to_string(),
        plan_id: None,
        name_id: None,
        rate_id: None,
        term_months: Some(12),
        display_name: display.to_string(),
        efl_url: None,
    }
}

fn fixture_plans() -> Vec<CanonicalPlanRecord> {
    vec![
        plan("a", "gexa-energy", "oncor", 12, "Eco Saver Plus 12"),
        plan("b", "gexa-energy", "centerpoint", 12, "Eco Saver Plus 12"),
        plan("c", "gexa-energy", "oncor", 24, "Eco Saver Plus 24"),
        plan("d", "reliant", "oncor", 12, "Truly Free Weekends 12"),
    ]
}

#[test]
fn decisions_do_not_depend_on_offer_order() {
    let plans = fixture_plans();
    let o1 = offer("o1", "Gexa Energy LP", "Eco Saver Plus 12");
    let o2 = offer("o2", "Reliant Energy", "Truly Free Weekends 12");

    let forward = match_offers_to_plans(&[o1.clone(), o2.clone()], &plans, &MatcherOptions::default());
    let reversed = match_offers_to_plans(&[o2, o1], &plans, &MatcherOptions::default());

    let find = |report: &retail_plan_engine::MatchReport, id: &str| {
        report
            .decisions
            .iter()
            .find(|d| d.offer_id == id)
            .cloned()
            .unwrap()
    };
    assert_eq!(find(&forward, "o1"), find(&reversed, "o1"));
    assert_eq!(find(&forward, "o2"), find(&reversed, "o2"));
}

#[test]
fn fuzzy_collisions_resolve_by_tdsp_then_term() {
    let plans = fixture_plans();
    // Same display name exists on Oncor and CenterPoint; the Oncor offer
    // must land on the Oncor record.
    let report = match_offers_to_plans(
        &[offer("o1", "Gexa Energy LP", "Eco Saver Plus 12")],
        &plans,
        &MatcherOptions::default(),
    );
    let d = &report.decisions[0];
    assert_eq!(d.status, MatchStatus::Matched);
    assert_eq!(d.plan_record_id.as_deref(), Some("a"));
}

#[test]
fn strict_tdsp_blocks_cross_tdsp_key_hits() {
    let plans = vec![plan("b", "gexa-energy", "centerpoint", 12, "Eco Saver Plus 12")];
    let mut o = offer("o1", "Gexa Energy LP", "Eco Saver Plus 12");
    o.plan_id = Some("pid-b".to_string());
    o.display_name = "Something Else Entirely".to_string();

    let lenient = match_offers_to_plans(
        std::slice::from_ref(&o),
        &plans,
        &MatcherOptions {
            prefer_tdsp_strict: false,
        },
    );
    assert_eq!(lenient.decisions[0].method, Some(MatchMethod::PlanId));

    let strict = match_offers_to_plans(
        &[o],
        &plans,
        &MatcherOptions {
            prefer_tdsp_strict: true,
        },
    );
    assert_eq!(strict.decisions[0].status, MatchStatus::Unmatched);
}

#[test]
fn unmatched_offers_report_suggestions_not_errors() {
    let plans = fixture_plans();
    let report = match_offers_to_plans(
        &[offer("o1", "Gexa Energy LP", "Midnight Arbitrage Special 6")],
        &plans,
        &MatcherOptions::default(),
    );
    let d = &report.decisions[0];
    assert_eq!(d.status, MatchStatus::Unmatched);
    assert!(d.suggestions.len() <= 5);
    assert!(!d.suggestions.is_empty());
    // Suggestions come from the same supplier only.
    assert!(d
        .suggestions
        .iter()
        .all(|s| s.plan_record_id != "d"));
    assert_eq!(report.summary.unmatched, 1);
}
