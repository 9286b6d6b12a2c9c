use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Curated supplier-name synonyms, keyed by the cleaned lowercase form the
/// marketplace feeds actually send. Anything not listed falls back to
/// slugify.
static SUPPLIER_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("txu", "txu-energy"),
        ("txu energy retail company", "txu-energy"),
        ("reliant energy retail services", "reliant"),
        ("reliant energy", "reliant"),
        ("green mountain energy company", "green-mountain-energy"),
        ("green mountain", "green-mountain-energy"),
        ("gexa", "gexa-energy"),
        ("gexa energy lp", "gexa-energy"),
        ("direct energy lp", "direct-energy"),
        ("4change", "4change-energy"),
        ("first choice power", "first-choice-power"),
        ("frontier utilities llc", "frontier-utilities"),
        ("discount power inc", "discount-power"),
        ("rhythm ops llc", "rhythm-energy"),
        ("rhythm", "rhythm-energy"),
        ("chariot energy holdings llc", "chariot-energy"),
    ])
});

/// Curated TDSP synonyms; the five Texas utilities go by many legal names.
static TDSP_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("oncor", "oncor"),
        ("oncor electric delivery", "oncor"),
        ("oncor electric delivery company llc", "oncor"),
        ("centerpoint", "centerpoint"),
        ("centerpoint energy", "centerpoint"),
        ("centerpoint energy houston electric llc", "centerpoint"),
        ("aep texas central", "aep-central"),
        ("aep texas central company", "aep-central"),
        ("aep texas north", "aep-north"),
        ("aep texas north company", "aep-north"),
        ("texas-new mexico power", "tnmp"),
        ("texas new mexico power company", "tnmp"),
        ("tnmp", "tnmp"),
        ("lubbock power and light", "lpl"),
    ])
});

/// Lowercase, strip punctuation to spaces, collapse runs of whitespace.
fn clean(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '-' {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Generic slugify fallback: lowercase alphanumeric runs joined by `-`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn normalize_supplier(name: &str) -> String {
    let cleaned = clean(name);
    SUPPLIER_SYNONYMS
        .get(cleaned.as_str())
        .map(|s| (*s).to_string())
        .unwrap_or_else(|| slugify(&cleaned))
}

pub fn normalize_tdsp(name: &str) -> String {
    let cleaned = clean(name);
    TDSP_SYNONYMS
        .get(cleaned.as_str())
        .map(|s| (*s).to_string())
        .unwrap_or_else(|| slugify(&cleaned))
}

/// Normalized display-name form used for both the exact name facet and the
/// fuzzy comparison: cleaned words joined by single spaces.
pub fn normalize_plan_name(name: &str) -> String {
    clean(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Character-bigram Jaccard similarity over normalized names, in [0, 1].
pub fn bigram_jaccard(a: &str, b: &str) -> f64 {
    let (sa, sb) = (bigrams(a), bigrams(b));
    if sa.is_empty() && sb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Closeness of an offer's contract term to a plan's, in [0, 1].
/// 1.0 on exact match, linearly down to 0 at 24 months apart; a missing
/// offer term is neutral.
pub fn term_proximity(offer_term: Option<u32>, plan_term: u32) -> f64 {
    match offer_term {
        None => 0.5,
        Some(t) => {
            let diff = t.abs_diff(plan_term) as f64;
            (1.0 - diff / 24.0).max(0.0)
        }
    }
}

/// Hostname of an EFL document URL, lowercased; no URL crate needed for the
/// comparison the matcher makes.
pub fn efl_hostname(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').last()?.split(':').next()?;
    if host.contains('.') && !host.contains(' ') {
        Some(host.to_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("TXU Energy Retail Company", "txu-energy")]
    #[case("Reliant Energy", "reliant")]
    #[case("Brand New Power Co.", "brand-new-power-co")]
    fn supplier_synonyms_with_slug_fallback(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_supplier(raw), expected);
    }

    #[rstest]
    #[case("ONCOR ELECTRIC DELIVERY", "oncor")]
    #[case("Texas-New Mexico Power", "tnmp")]
    #[case("Some Rural Coop", "some-rural-coop")]
    fn tdsp_synonyms_with_slug_fallback(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_tdsp(raw), expected);
    }

    #[test]
    fn plan_name_normalization_strips_punctuation() {
        assert_eq!(
            normalize_plan_name("Free Nights & Weekends 12!"),
            "free nights weekends 12"
        );
    }

    #[test]
    fn bigram_jaccard_orders_similarity_sensibly() {
        let target = normalize_plan_name("Free Nights 12");
        let close = bigram_jaccard(&target, &normalize_plan_name("Free Nights 24"));
        let far = bigram_jaccard(&target, &normalize_plan_name("Solar Saver Plus"));
        assert!(close > far);
        assert_eq!(bigram_jaccard(&target, &target), 1.0);
    }

    #[test]
    fn term_proximity_peaks_at_exact_match() {
        assert_eq!(term_proximity(Some(12), 12), 1.0);
        assert!(term_proximity(Some(12), 24) < 1.0);
        assert_eq!(term_proximity(None, 12), 0.5);
        assert_eq!(term_proximity(Some(1), 36), 0.0);
    }

    #[test]
    fn efl_hostname_extraction() {
        assert_eq!(
            efl_hostname("https://docs.txu.com/efl/plan-12.pdf?lang=en").as_deref(),
            Some("docs.txu.com")
        );
        assert_eq!(efl_hostname("not a url"), None);
        assert_eq!(efl_hostname(""), None);
    }
}
