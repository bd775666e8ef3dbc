use regex::Regex;

use crate::models::key_points::{
    KeyPoints, DEFAULT_CONFIDENCE, DEFAULT_RISK_LEVEL, DEFAULT_TREND,
};

/// Turns free-text AI commentary into structured key points.
pub trait KeyPointExtractor: Send + Sync {
    fn extract(&self, text: &str) -> KeyPoints;
}

struct TrendEntry {
    label: &'static str,
    phrases: &'static [&'static str],
    score: i8,
}

/// Strongest bearish first, strongest bullish last
const TREND_TABLE: &[TrendEntry] = &[
    TrendEntry {
        label: "strong bearish",
        phrases: &["strong downtrend", "strongly bearish", "strong bearish"],
        score: -3,
    },
    TrendEntry {
        label: "bearish",
        phrases: &["downtrend", "bearish"],
        score: -2,
    },
    TrendEntry {
        label: "leaning bearish",
        phrases: &["downside bias", "slightly lower"],
        score: -1,
    },
    TrendEntry {
        label: DEFAULT_TREND,
        phrases: &["sideways", "range-bound", "consolidation"],
        score: 0,
    },
    TrendEntry {
        label: "leaning bullish",
        phrases: &["upside bias", "slightly higher"],
        score: 1,
    },
    TrendEntry {
        label: "bullish",
        phrases: &["uptrend", "bullish"],
        score: 2,
    },
    TrendEntry {
        label: "strong bullish",
        phrases: &["strong uptrend", "strongly bullish", "strong bullish"],
        score: 3,
    },
];

/// Equal-strength matches resolve to the earlier label; bearish reads win ties.
const TREND_TIE_PRIORITY: &[&str] = &[
    "strong bearish",
    "strong bullish",
    "bearish",
    "bullish",
    "leaning bearish",
    "leaning bullish",
    DEFAULT_TREND,
];

const CONFIDENCE_TABLE: &[(&str, f64)] = &[
    ("very likely", 90.0),
    ("highly likely", 90.0),
    ("high confidence", 85.0),
    ("strong", 85.0),
    ("clear", 80.0),
    ("high probability", 75.0),
    ("likely", 60.0),
    ("possibly", 55.0),
    ("uncertain", 40.0),
];

const RISK_TABLE: &[(&str, u8)] = &[
    ("high risk", 5),
    ("significant risk", 4),
    ("elevated risk", 4),
    ("caution", 3),
    ("cautious", 3),
    ("moderate risk", 3),
    ("limited risk", 2),
    ("low risk", 1),
];

const PREPOSITION: &str = r"(?:at|near|around|of|is|are)\b";

fn level_regex(label: &str) -> Result<Regex, regex::Error> {
    // label, optional "levels", then an ordinal ("1:" or "1 at") or a bare preposition, then the number
    let pattern = format!(
        r"(?i)\b(?:{label})(?:\s+(?:levels?|prices?|zones?))?(?:\s+#?\d\s*[:：]|\s+#?\d\s+{PREPOSITION}|\s+{PREPOSITION})?\s*[:：]?\s*\$?(\d[\d,]*(?:\.\d+)?)"
    );
    Regex::new(&pattern)
}

/// Phrase-table extractor. Fields with no match keep their defaults.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    support: Regex,
    resistance: Regex,
    stop_loss: Regex,
    target: Regex,
}

impl HeuristicExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            support: level_regex("supports?")?,
            resistance: level_regex("resistances?")?,
            stop_loss: level_regex(r"stop[\s-]?loss")?,
            target: level_regex(r"targets?|take[\s-]?profits?")?,
        })
    }
}

impl KeyPointExtractor for HeuristicExtractor {
    fn extract(&self, text: &str) -> KeyPoints {
        let lowered = text.to_lowercase();
        let (trend, trend_score) = extract_trend(&lowered);

        let mut stop_losses = price_levels(&self.stop_loss, text);
        stop_losses.sort_by(f64::total_cmp);

        KeyPoints {
            trend: trend.to_string(),
            trend_score,
            confidence: extract_confidence(&lowered),
            support_levels: sorted_levels(&self.support, text),
            resistance_levels: sorted_levels(&self.resistance, text),
            stop_loss: stop_losses.first().copied(),
            take_profit_levels: sorted_levels(&self.target, text),
            risk_level: extract_risk_level(&lowered),
        }
    }
}

fn tie_rank(label: &str) -> usize {
    TREND_TIE_PRIORITY
        .iter()
        .position(|candidate| *candidate == label)
        .unwrap_or(TREND_TIE_PRIORITY.len())
}

fn extract_trend(lowered: &str) -> (&'static str, i8) {
    let mut best: (&'static str, i8) = (DEFAULT_TREND, 0);

    for entry in TREND_TABLE {
        if !entry.phrases.iter().any(|phrase| lowered.contains(phrase)) {
            continue;
        }
        let stronger = entry.score.abs() > best.1.abs();
        let wins_tie = entry.score.abs() == best.1.abs() && tie_rank(entry.label) < tie_rank(best.0);
        if stronger || wins_tie {
            best = (entry.label, entry.score);
        }
    }

    best
}

fn extract_confidence(lowered: &str) -> f64 {
    CONFIDENCE_TABLE
        .iter()
        .filter(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, value)| *value)
        .fold(DEFAULT_CONFIDENCE, f64::max)
}

fn extract_risk_level(lowered: &str) -> u8 {
    RISK_TABLE
        .iter()
        .filter(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, level)| *level)
        .fold(DEFAULT_RISK_LEVEL, u8::max)
        .clamp(1, 5)
}

fn price_levels(re: &Regex, text: &str) -> Vec<f64> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .collect()
}

fn sorted_levels(re: &Regex, text: &str) -> Vec<f64> {
    let mut levels = price_levels(re, text);
    levels.sort_by(f64::total_cmp);
    levels
}
