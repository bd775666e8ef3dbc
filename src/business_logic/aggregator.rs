//! Blends pattern hits, indicator readings and an optional AI view into one
//! recommendation.
//!
//! Stage one scores patterns and indicators. Stage two folds in the AI key
//! points, but only once stage one is already confident. Stage three maps the
//! final (score, confidence) through the action table.

use crate::business_logic::config::AggregatorConfig;
use crate::business_logic::patterns::PatternSet;
use crate::models::indicators::{IndicatorSnapshot, TREND_STRONG_DOWN, TREND_STRONG_UP};
use crate::models::key_points::{AiInsight, KeyPoints};
use crate::models::recommendation::{clamp_confidence, Action, Recommendation};

const PATTERN_WEIGHT: f64 = 2.0;
const STRONG_TREND_WEIGHT: f64 = 3.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

const BASE_CONFIDENCE_WEIGHT: f64 = 0.7;
const AI_CONFIDENCE_WEIGHT: f64 = 0.3;
const AGREEMENT_BONUS: f64 = 10.0;
const DISAGREEMENT_PENALTY: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    fn of(value: f64) -> Self {
        if value > 0.0 {
            Direction::Bullish
        } else if value < 0.0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.ai_confidence_threshold
    }

    /// Whether a stage-one result is confident enough to be worth an AI call.
    pub fn wants_ai(&self, base: &Recommendation) -> bool {
        base.confidence >= self.threshold()
    }

    /// Full three-stage recommendation.
    ///
    /// `ai` is `None` (or `Skipped`) when the AI was not consulted, which is
    /// reported the same way as a failed call once the gate is open.
    pub fn aggregate(
        &self,
        patterns: &PatternSet,
        indicators: &IndicatorSnapshot,
        ai: Option<&AiInsight>,
    ) -> Recommendation {
        let base = self.base_recommendation(patterns, indicators);

        if matches!(ai, Some(AiInsight::Disabled)) {
            return with_reason(
                base,
                "AI analysis disabled, using technical signals only".to_string(),
            );
        }

        if !self.wants_ai(&base) {
            let reason = format!(
                "Base confidence {:.1}% below AI threshold {:.1}%, AI view not blended",
                base.confidence,
                self.threshold()
            );
            return with_reason(base, reason);
        }

        match ai {
            Some(AiInsight::Ready { key_points, .. }) => blend(base, key_points),
            Some(AiInsight::Failed { error }) => {
                with_reason(base, format!("AI analysis unavailable: {}", error))
            }
            _ => with_reason(base, "AI analysis unavailable".to_string()),
        }
    }

    /// Stage one: patterns, trend, RSI and MACD.
    pub fn base_recommendation(
        &self,
        patterns: &PatternSet,
        indicators: &IndicatorSnapshot,
    ) -> Recommendation {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let mut signal_count = patterns.len();

        for pattern in &patterns.bullish {
            score += PATTERN_WEIGHT;
            reasons.push(format!("Bullish pattern: {}", pattern));
        }
        for pattern in &patterns.bearish {
            score -= PATTERN_WEIGHT;
            reasons.push(format!("Bearish pattern: {}", pattern));
        }

        // Any trend label counts as a signal; only the strong ones score
        if let Some(trend) = indicators.trend() {
            signal_count += 1;
            match trend {
                TREND_STRONG_UP => {
                    score += STRONG_TREND_WEIGHT;
                    reasons.push("Indicators show a strong uptrend".to_string());
                }
                TREND_STRONG_DOWN => {
                    score -= STRONG_TREND_WEIGHT;
                    reasons.push("Indicators show a strong downtrend".to_string());
                }
                _ => {}
            }
        }

        // RSI only counts outside the neutral band

        if let Some(rsi) = indicators.rsi() {
            if rsi > RSI_OVERBOUGHT {
                signal_count += 1;
                score -= 1.0;
                reasons.push(format!("RSI overbought: {:.2}", rsi));
            } else if rsi < RSI_OVERSOLD {
                signal_count += 1;
                score += 1.0;
                reasons.push(format!("RSI oversold: {:.2}", rsi));
            }
        }

        if let Some((macd, signal)) = indicators.macd() {
            signal_count += 1;
            if macd > signal {
                score += 1.0;
                reasons.push("MACD above signal line (bullish cross)".to_string());
            } else {
                score -= 1.0;
                reasons.push("MACD below signal line (bearish cross)".to_string());
            }
        }

        let confidence = if signal_count == 0 {
            0.0
        } else {
            (score.abs() / signal_count as f64 * 100.0).min(100.0)
        };

        Recommendation::new(score, confidence, reasons)
    }
}

fn with_reason(mut recommendation: Recommendation, reason: String) -> Recommendation {
    recommendation.reasons.push(reason);
    recommendation
}

/// Stage two: fold the AI key points into a confident stage-one result.
fn blend(base: Recommendation, key_points: &KeyPoints) -> Recommendation {
    let trend_score = f64::from(key_points.trend_score);
    let ai_confidence = clamp_confidence(key_points.confidence);
    let mut reasons = base.reasons.clone();

    let trend_delta = if trend_score.abs() >= 2.0 {
        trend_score * 2.0
    } else {
        trend_score
    };
    let score = base.score + trend_delta;
    reasons.push(format!(
        "AI trend: {} (trend score {:+}, score {:+})",
        key_points.trend, key_points.trend_score, trend_delta
    ));

    let mut confidence = clamp_confidence(
        base.confidence * BASE_CONFIDENCE_WEIGHT + ai_confidence * AI_CONFIDENCE_WEIGHT,
    );

    match (Direction::of(base.score), Direction::of(trend_score)) {
        (Direction::Neutral, _) | (_, Direction::Neutral) => {}
        (technical, ai) if technical == ai => {
            confidence = clamp_confidence(confidence + AGREEMENT_BONUS);
            reasons.push(format!(
                "AI agrees with technical direction, confidence +{}",
                AGREEMENT_BONUS
            ));
        }
        _ => {
            confidence = clamp_confidence(confidence - DISAGREEMENT_PENALTY);
            reasons.push(format!(
                "AI contradicts technical direction, confidence -{}",
                DISAGREEMENT_PENALTY
            ));
        }
    }

    if !key_points.support_levels.is_empty() {
        reasons.push(format!(
            "AI support levels: {}",
            format_levels(&key_points.support_levels)
        ));
    }
    if !key_points.resistance_levels.is_empty() {
        reasons.push(format!(
            "AI resistance levels: {}",
            format_levels(&key_points.resistance_levels)
        ));
    }
    reasons.push(format!("AI risk level: {}/5", key_points.risk_level));
    reasons.push(format!(
        "Blended confidence: {:.1}% technical x {} + {:.1}% AI x {} = {:.1}%",
        base.confidence, BASE_CONFIDENCE_WEIGHT, ai_confidence, AI_CONFIDENCE_WEIGHT, confidence
    ));

    let mut recommendation = Recommendation::new(score, confidence, reasons);
    recommendation.ai_confidence = Some(ai_confidence);
    recommendation.ai_action = Some(Action::from_signal(trend_delta, ai_confidence));
    recommendation.base = Some(Box::new(base));
    recommendation
}

fn format_levels(levels: &[f64]) -> String {
    levels
        .iter()
        .map(|level| format!("{:.2}", level))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::patterns::CandlePattern;
    use crate::models::indicators::{MACD, MACD_SIGNAL, RSI, TREND};

    fn aggregator() -> Aggregator {
        Aggregator::new(AggregatorConfig::default())
    }

    fn ready(trend_score: i8, confidence: f64) -> AiInsight {
        AiInsight::Ready {
            analysis: String::new(),
            key_points: KeyPoints {
                trend: "test".to_string(),
                trend_score,
                confidence,
                support_levels: vec![90.0, 95.0],
                resistance_levels: vec![110.0],
                risk_level: 2,
                ..KeyPoints::default()
            },
        }
    }

    fn bullish_macd() -> IndicatorSnapshot {
        IndicatorSnapshot::new()
            .with_number(MACD, 1.0)
            .with_number(MACD_SIGNAL, 0.5)
    }

    #[test]
    fn test_strong_buy_scenario() {
        let patterns = PatternSet {
            bullish: vec![
                CandlePattern::Hammer,
                CandlePattern::MorningStar,
                CandlePattern::TweezerBottom,
            ],
            bearish: Vec::new(),
        };
        let indicators = bullish_macd()
            .with_label(TREND, TREND_STRONG_UP)
            .with_number(RSI, 25.0);

        let rec = aggregator().base_recommendation(&patterns, &indicators);

        assert_eq!(rec.score, 11.0);
        assert_eq!(rec.confidence, 100.0);
        assert_eq!(rec.action, Action::StrongBuy);
        assert_eq!(
            rec.reasons,
            vec![
                "Bullish pattern: Hammer",
                "Bullish pattern: Morning Star",
                "Bullish pattern: Tweezer Bottom",
                "Indicators show a strong uptrend",
                "RSI oversold: 25.00",
                "MACD above signal line (bullish cross)",
            ]
        );
    }

    #[test]
    fn test_lone_bearish_macd_is_neutral_hold() {
        let indicators = IndicatorSnapshot::new()
            .with_number(RSI, 50.0)
            .with_number(MACD, -1.0)
            .with_number(MACD_SIGNAL, 0.0);

        let rec = aggregator().base_recommendation(&PatternSet::default(), &indicators);

        // neutral RSI neither scores nor counts
        assert_eq!(rec.score, -1.0);
        assert_eq!(rec.confidence, 100.0);
        assert_eq!(rec.reasons, vec!["MACD below signal line (bearish cross)"]);
        assert_eq!(rec.action, Action::NeutralHold);
    }

    #[test]
    fn test_weak_trend_label_counts_without_scoring() {
        let indicators = bullish_macd().with_label(TREND, "up");
        let rec = aggregator().base_recommendation(&PatternSet::default(), &indicators);

        assert_eq!(rec.score, 1.0);
        assert_eq!(rec.confidence, 50.0);
        assert_eq!(rec.reasons, vec!["MACD above signal line (bullish cross)"]);

        let indicators = bullish_macd().with_label(TREND, "down");
        let rec = aggregator().base_recommendation(&PatternSet::default(), &indicators);
        assert_eq!(rec.confidence, 50.0);
        assert!(!aggregator().wants_ai(&rec));
    }

    #[test]
    fn test_no_signals_means_zero_confidence() {
        let rec =
            aggregator().base_recommendation(&PatternSet::default(), &IndicatorSnapshot::new());
        assert_eq!(rec.score, 0.0);
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.action, Action::HoldUnclear);
        assert!(rec.reasons.is_empty());
    }

    #[test]
    fn test_blend_gate_at_threshold() {
        // one bullish pattern, bullish MACD and a plain "up" trend: 3 / 3 signals
        let patterns = PatternSet {
            bullish: vec![CandlePattern::Hammer],
            bearish: Vec::new(),
        };
        let indicators = bullish_macd().with_label(TREND, "up");
        let ai = ready(2, 80.0);

        let just_below = Aggregator::new(AggregatorConfig {
            ai_confidence_threshold: 100.1,
        });
        let rec = just_below.aggregate(&patterns, &indicators, Some(&ai));
        assert!(rec.base.is_none());
        assert!(!rec.reasons.iter().any(|r| r.starts_with("Blended confidence")));
        assert!(rec.reasons.last().unwrap().contains("below AI threshold"));

        let at = Aggregator::new(AggregatorConfig {
            ai_confidence_threshold: 100.0,
        });
        let rec = at.aggregate(&patterns, &indicators, Some(&ai));
        assert!(rec.base.is_some());
        assert!(rec.reasons.iter().any(|r| r.starts_with("Blended confidence")));
    }

    #[test]
    fn test_blend_gate_with_fractional_confidence() {
        let base = Recommendation::new(2.0, 79.9, Vec::new());
        assert!(!aggregator().wants_ai(&base));
        let base = Recommendation::new(2.0, 80.0, Vec::new());
        assert!(aggregator().wants_ai(&base));
    }

    #[test]
    fn test_agreement_bonus() {
        let base = Recommendation::new(3.0, 100.0, Vec::new());
        let key_points = ready(2, 60.0);
        let rec = blend(base, key_points.key_points().unwrap());

        // 3 + 2*2
        assert_eq!(rec.score, 7.0);
        // 100*0.7 + 60*0.3 = 88, +10 = 98
        assert!((rec.confidence - 98.0).abs() < 1e-9);
        assert!(rec.reasons.iter().any(|r| r.contains("confidence +10")));
        assert_eq!(rec.action, Action::StrongBuy);
        assert_eq!(rec.ai_confidence, Some(60.0));
        assert_eq!(rec.base.as_ref().unwrap().score, 3.0);
    }

    #[test]
    fn test_disagreement_penalty() {
        let base = Recommendation::new(3.0, 100.0, Vec::new());
        let key_points = ready(-3, 50.0);
        let rec = blend(base, key_points.key_points().unwrap());

        // 3 - 3*2
        assert_eq!(rec.score, -3.0);
        // 70 + 15 - 15 = 70
        assert!((rec.confidence - 70.0).abs() < 1e-9);
        assert!(rec.reasons.iter().any(|r| r.contains("confidence -15")));
        assert_eq!(rec.action, Action::Sell);
    }

    #[test]
    fn test_neutral_direction_leaves_confidence() {
        let base = Recommendation::new(3.0, 100.0, Vec::new());
        let key_points = ready(0, 50.0);
        let rec = blend(base, key_points.key_points().unwrap());

        assert_eq!(rec.score, 3.0);
        assert!((rec.confidence - 85.0).abs() < 1e-9);
        assert!(!rec.reasons.iter().any(|r| r.contains("confidence +") || r.contains("confidence -")));
    }

    #[test]
    fn test_weak_ai_trend_adds_unscaled() {
        let base = Recommendation::new(-2.0, 100.0, Vec::new());
        let key_points = ready(-1, 50.0);
        let rec = blend(base, key_points.key_points().unwrap());
        assert_eq!(rec.score, -3.0);
    }

    #[test]
    fn test_blend_reason_order() {
        let base = Recommendation::new(3.0, 100.0, vec!["technical".to_string()]);
        let key_points = ready(2, 60.0);
        let rec = blend(base, key_points.key_points().unwrap());

        assert_eq!(rec.reasons[0], "technical");
        let position = |prefix: &str| rec.reasons.iter().position(|r| r.starts_with(prefix)).unwrap();
        assert!(position("AI support levels") < position("AI resistance levels"));
        assert!(position("AI resistance levels") < position("AI risk level"));
        assert!(position("AI risk level") < position("Blended confidence"));
        assert_eq!(rec.reasons.last().unwrap(), &rec.reasons[position("Blended confidence")]);
    }

    #[test]
    fn test_disabled_ai_is_reported() {
        let rec = aggregator().aggregate(
            &PatternSet::default(),
            &bullish_macd(),
            Some(&AiInsight::Disabled),
        );
        assert_eq!(rec.confidence, 100.0);
        assert!(rec.base.is_none());
        assert!(rec.reasons.last().unwrap().contains("disabled"));
    }

    #[test]
    fn test_failed_ai_never_blocks_recommendation() {
        let failed = AiInsight::Failed {
            error: "AI endpoint returned 503: busy".to_string(),
        };
        let rec = aggregator().aggregate(&PatternSet::default(), &bullish_macd(), Some(&failed));
        assert_eq!(rec.score, 1.0);
        assert_eq!(rec.confidence, 100.0);
        assert!(rec.reasons.last().unwrap().starts_with("AI analysis unavailable"));
    }

    #[test]
    fn test_confidence_always_bounded() {
        let aggregator = Aggregator::new(AggregatorConfig {
            ai_confidence_threshold: 0.0,
        });
        let pattern_sets = [
            PatternSet::default(),
            PatternSet {
                bullish: vec![CandlePattern::Hammer; 5],
                bearish: Vec::new(),
            },
            PatternSet {
                bullish: Vec::new(),
                bearish: vec![CandlePattern::EveningStar; 4],
            },
        ];
        let snapshots = [
            IndicatorSnapshot::new(),
            bullish_macd().with_number(RSI, 80.0).with_label(TREND, TREND_STRONG_DOWN),
            IndicatorSnapshot::new().with_number(RSI, 10.0),
        ];

        for patterns in &pattern_sets {
            for indicators in &snapshots {
                for trend_score in -3..=3 {
                    for ai_confidence in [-50.0, 0.0, 55.0, 100.0, 400.0] {
                        let ai = ready(trend_score, ai_confidence);
                        let rec = aggregator.aggregate(patterns, indicators, Some(&ai));
                        assert!((0.0..=100.0).contains(&rec.confidence));
                        assert_eq!(rec.action, Action::from_signal(rec.score, rec.confidence));
                    }
                }
            }
        }
    }
}
