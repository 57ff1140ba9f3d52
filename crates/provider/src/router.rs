use warden_config::CostPreference;

use crate::types::ModelInfo;
use crate::types::ModelTier;

/// Weights for the complexity score, summing to 1.0.
const WEIGHT_TOKEN_LENGTH: f64 = 0.40;
const WEIGHT_STRUCTURAL_DEPTH: f64 = 0.25;
const WEIGHT_LANGUAGE_FEATURES: f64 = 0.20;
const WEIGHT_TASK_TYPE: f64 = 0.15;

/// Signals extracted from a prompt that feed the complexity score. Each
/// field is already normalized to 0-100 by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexitySignals {
    pub token_length: f64,
    pub structural_depth: f64,
    pub language_features: f64,
    pub task_type: f64,
}

pub fn complexity_score(signals: ComplexitySignals) -> f64 {
    let score = signals.token_length * WEIGHT_TOKEN_LENGTH
        + signals.structural_depth * WEIGHT_STRUCTURAL_DEPTH
        + signals.language_features * WEIGHT_LANGUAGE_FEATURES
        + signals.task_type * WEIGHT_TASK_TYPE;
    score.clamp(0.0, 100.0)
}

/// Derives normalized complexity signals from a raw prompt text using
/// cheap structural heuristics (no tokenizer call).
pub fn signals_from_prompt(prompt: &str, has_code_fence: bool, step_count: usize) -> ComplexitySignals {
    let token_length = ((prompt.len() as f64 / 20.0).min(100.0)).max(0.0);

    let depth_markers = prompt
        .chars()
        .filter(|c| matches!(c, '{' | '(' | '['))
        .count();
    let structural_depth = ((depth_markers as f64 * 2.0).min(100.0)).max(0.0);

    let feature_markers = ["async", "trait", "impl", "generic", "unsafe", "macro"];
    let feature_hits = feature_markers
        .iter()
        .filter(|m| prompt.to_lowercase().contains(*m))
        .count();
    let language_features = if has_code_fence {
        ((feature_hits as f64 * 15.0).min(100.0)).max(20.0)
    } else {
        (feature_hits as f64 * 10.0).min(100.0)
    };

    let task_type = ((step_count as f64 * 12.0).min(100.0)).max(0.0);

    ComplexitySignals {
        token_length,
        structural_depth,
        language_features,
        task_type,
    }
}

pub fn tier_for_score(score: f64) -> ModelTier {
    if score < 30.0 {
        ModelTier::Light
    } else if score <= 70.0 {
        ModelTier::Standard
    } else {
        ModelTier::Advanced
    }
}

/// Picks a tier given a complexity score and the operator's cost
/// preference. `minimize` always downgrades to light regardless of score;
/// other preferences defer to the score-derived tier unless the score is
/// already low enough that light is the natural pick.
pub fn tier_for(score: f64, cost_preference: CostPreference) -> ModelTier {
    match cost_preference {
        CostPreference::Minimize => ModelTier::Light,
        _ if score < 30.0 => ModelTier::Light,
        _ => tier_for_score(score),
    }
}

/// Among candidate models in the requested tier, picks the cheapest one,
/// breaking ties by lower max output latency proxy (here: smaller context
/// window, as a stand-in for p95 latency which the router doesn't measure
/// directly).
pub fn select_model<'a>(candidates: &'a [ModelInfo], tier: ModelTier) -> Option<&'a ModelInfo> {
    candidates
        .iter()
        .filter(|m| m.tier == tier)
        .min_by(|a, b| {
            let cost_a = a.input_price_per_m;
            let cost_b = b.input_price_per_m;
            cost_a
                .partial_cmp(&cost_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.context_window.cmp(&b.context_window))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, tier: ModelTier, input_price: f64, context: u32) -> ModelInfo {
        ModelInfo {
            id: id.into(),
            name: id.into(),
            provider: "test".into(),
            context_window: context,
            max_output_tokens: 4096,
            supports_tools: true,
            supports_streaming: true,
            supports_vision: false,
            input_price_per_m: input_price,
            output_price_per_m: input_price * 4.0,
            cache_read_price_per_m: 0.0,
            cache_write_price_per_m: 0.0,
            tier,
            thinking: None,
        }
    }

    #[test]
    fn tier_boundaries_match_thresholds() {
        assert_eq!(tier_for_score(29.9), ModelTier::Light);
        assert_eq!(tier_for_score(30.0), ModelTier::Standard);
        assert_eq!(tier_for_score(70.0), ModelTier::Standard);
        assert_eq!(tier_for_score(70.1), ModelTier::Advanced);
    }

    #[test]
    fn minimize_preference_always_picks_light() {
        assert_eq!(tier_for(95.0, CostPreference::Minimize), ModelTier::Light);
    }

    #[test]
    fn low_score_overrides_performance_preference() {
        assert_eq!(tier_for(10.0, CostPreference::Performance), ModelTier::Light);
    }

    #[test]
    fn select_model_breaks_ties_by_cost_then_context() {
        let models = vec![
            model("a", ModelTier::Standard, 3.0, 200_000),
            model("b", ModelTier::Standard, 1.0, 500_000),
            model("c", ModelTier::Standard, 1.0, 100_000),
            model("d", ModelTier::Advanced, 0.1, 50_000),
        ];
        let picked = select_model(&models, ModelTier::Standard).unwrap();
        assert_eq!(picked.id, "c");
    }

    #[test]
    fn complexity_score_weights_sum_correctly() {
        let signals = ComplexitySignals {
            token_length: 100.0,
            structural_depth: 100.0,
            language_features: 100.0,
            task_type: 100.0,
        };
        assert!((complexity_score(signals) - 100.0).abs() < 1e-9);
    }
}
