//! Static per-model cost estimation.
//!
//! Rates are USD per 1,000 tokens, matched by model-name prefix. The table
//! is an estimate surface only; provider pricing drift is not reconciled.

/// (model prefix, input USD per 1k tokens, output USD per 1k tokens).
const MODEL_RATES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.000_15, 0.000_6),
    ("gpt-4o", 0.002_5, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.000_25, 0.001_25),
    ("mistral-large", 0.002, 0.006),
    ("llama-3.1-70b", 0.000_9, 0.000_9),
    ("llama-3.1-8b", 0.000_2, 0.000_2),
];

/// Fallback rates for unknown models (input, output), deliberately
/// conservative so budget gating errs toward stopping early.
const FALLBACK_RATES: (f64, f64) = (0.005, 0.015);

/// Estimate the USD cost of one LLM call.
///
/// The model is matched by longest-prefix against the static table; unknown
/// models use a conservative fallback rate.
pub fn estimate_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let model = model.to_lowercase();
    let (input_rate, output_rate) = MODEL_RATES
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or(FALLBACK_RATES);

    f64::from(input_tokens) / 1_000.0 * input_rate
        + f64::from(output_tokens) / 1_000.0 * output_rate
}
