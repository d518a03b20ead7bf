//! VRAM estimation
//!
//! The rule table maps model-id substrings to conservative megabyte costs.
//! It is intentionally coarse and kept in one place so operators can tune it;
//! selection only needs the estimates to rank models, not to be exact.

/// Conservative default budget for an 8 GB card (2 GB reserved for the host).
pub const DEFAULT_MAX_VRAM_MB: u64 = 7000;

/// Estimate used when no size pattern matches.
const FALLBACK_ESTIMATE_MB: u64 = 3000;

/// Substring rules, longest patterns first so that "13b" never matches the
/// embedded "3b" and "72b" never matches "2b".
const RULES: &[(&[&str], u64)] = &[
    (&["1.5b"], 1500),
    (&["12b", "13b"], 7000),
    (&["22b", "24b"], 12000),
    (&["70b", "72b"], 40000),
    (&["1b"], 1500),
    (&["2b", "3b"], 2500),
    (&["7b"], 4500),
    (&["8b"], 5000),
];

/// Estimate the VRAM cost of a model in MB from its id, taking the larger of
/// the rule-table estimate and the provider-reported size when one exists.
pub fn estimate_vram_mb(model_id: &str, reported_size_bytes: Option<u64>) -> u64 {
    let lower = model_id.to_lowercase();
    let rule = RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(_, mb)| *mb)
        .unwrap_or(FALLBACK_ESTIMATE_MB);

    match reported_size_bytes {
        Some(bytes) => rule.max(bytes / (1024 * 1024)),
        None => rule,
    }
}
