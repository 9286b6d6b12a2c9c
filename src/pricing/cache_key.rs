use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{RateStructure, TdspCharge};
use crate::usage::MonthlyUsage;

/// Content hashes over all estimate inputs, for caller-side memoization.
/// Any input change yields a different `inputs_sha256`; bumping the engine
/// version invalidates everything at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateCacheKey {
    pub inputs_sha256: String,
    pub rs_sha: String,
    pub usage_sha: String,
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fixed 6-decimal rendering so float representation differences never leak
/// into hashes.
fn fmt_num(n: f64) -> String {
    format!("{n:.6}")
}

/// Render a JSON value deterministically: object keys sorted, numbers in
/// fixed 6-decimal form. serde_json map order and float formatting are
/// otherwise not canonical.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => fmt_num(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => {
            serde_json::to_string(s).expect("strings always serialize")
        }
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).expect("strings always serialize"),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
    }
}

fn canonical_usage(usage: &MonthlyUsage) -> String {
    // BTreeMap ordering makes months and bucket keys already sorted.
    let mut out = String::new();
    for month in usage.months() {
        out.push_str(&month.to_string());
        if usage.is_incomplete(month) {
            out.push('!');
        }
        out.push('{');
        if let Some(buckets) = usage.bucket_map(month) {
            for (key, kwh) in buckets {
                out.push_str(key);
                out.push('=');
                out.push_str(&fmt_num(*kwh));
                out.push(';');
            }
        }
        out.push('}');
    }
    out
}

/// Derive the stable cache key for one estimate request.
///
/// Inputs are canonicalized before hashing, so semantically identical inputs
/// hash identically regardless of key ordering or float representation.
pub fn make_estimate_cache_key(
    engine_version: &str,
    months_count: u32,
    annual_kwh: f64,
    tdsp: &TdspCharge,
    rs: &RateStructure,
    usage: &MonthlyUsage,
    estimate_mode: &str,
) -> EstimateCacheKey {
    let rs_value = serde_json::to_value(rs).expect("rate structure serializes");
    let rs_sha = sha256_hex(&canonical_json(&rs_value));
    let usage_sha = sha256_hex(&canonical_usage(usage));

    let tdsp_part = format!(
        "tdsp:{}|{}|{}",
        fmt_num(tdsp.per_kwh_delivery_charge_cents),
        fmt_num(tdsp.monthly_customer_charge_dollars),
        tdsp.effective_date
    );
    let inputs = format!(
        "v={engine_version}|months={months_count}|annual={}|{tdsp_part}|rs={rs_sha}|usage={usage_sha}|mode={estimate_mode}",
        fmt_num(annual_kwh)
    );
    EstimateCacheKey {
        inputs_sha256: sha256_hex(&inputs),
        rs_sha,
        usage_sha,
    }
}
