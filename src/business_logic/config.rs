use std::fmt;
use std::time::Duration;

use validator::Validate;

use crate::errors::AppError;
use crate::services::retry::RetryPolicy;

/// Ratio thresholds for candlestick pattern rules
#[derive(Debug, Clone, Validate)]
pub struct PatternConfig {
    /// Fraction of a candle's range under which two prices count as equal (tweezer lows)
    #[validate(range(min = 0.0, max = 1.0))]
    pub doji_size: f64,
    /// Min shadow share of the total range for hammer-like shapes
    #[validate(range(min = 0.0, max = 1.0))]
    pub hammer_ratio: f64,
    /// Min body growth of the engulfing candle over the engulfed one
    #[validate(range(min = 0.0))]
    pub engulfing_ratio: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            doji_size: 0.1,
            hammer_ratio: 0.6,
            engulfing_ratio: 1.2,
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct AggregatorConfig {
    /// Base confidence at or above which the AI view is blended in
    #[validate(range(min = 0.0, max = 100.0))]
    pub ai_confidence_threshold: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            ai_confidence_threshold: 80.0,
        }
    }
}

/// Settings for the chat-completion endpoint
#[derive(Clone, Validate)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    #[validate(url)]
    pub api_base: String,
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    #[validate(range(min = 1))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f64,
    pub frequency_penalty: f64,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            api_base: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.5,
            max_tokens: 4096,
            top_p: 0.9,
            frequency_penalty: 0.5,
            request_timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

// Keep the key out of logs
impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("frequency_penalty", &self.frequency_penalty)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Watch-list and pacing for the monitor loop
#[derive(Debug, Clone, Validate)]
pub struct MonitorConfig {
    #[validate(length(min = 1))]
    pub symbols: Vec<String>,
    #[validate(length(min = 1))]
    pub intervals: Vec<String>,
    /// Sleep between full passes
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    /// Pause after a failed pair
    pub error_backoff_secs: u64,
    /// Candles fetched per pair (exchange caps this at 1500)
    #[validate(range(min = 3, max = 1500))]
    pub klines_limit: usize,
    /// Feed the still-forming candle into detection
    pub include_open_candle: bool,
}

impl MonitorConfig {
    /// Every (symbol, interval) pair, symbol-major.
    pub fn watch_list(&self) -> Vec<(String, String)> {
        self.symbols
            .iter()
            .flat_map(|symbol| {
                self.intervals
                    .iter()
                    .map(move |interval| (symbol.clone(), interval.clone()))
            })
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            intervals: vec!["15m".to_string(), "1h".to_string(), "4h".to_string()],
            poll_interval_secs: 60,
            error_backoff_secs: 5,
            klines_limit: 250,
            include_open_candle: false,
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub patterns: PatternConfig,
    #[validate(nested)]
    pub aggregator: AggregatorConfig,
    #[validate(nested)]
    pub ai: AiConfig,
    #[validate(nested)]
    pub monitor: MonitorConfig,
    /// Directory for daily-rolling log files, stdout only when unset
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Load from the environment (and `.env` when present), then validate.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let defaults = AppConfig::default();
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let config = Self {
            patterns: PatternConfig {
                doji_size: env_var_parse("PATTERN_DOJI_SIZE", defaults.patterns.doji_size),
                hammer_ratio: env_var_parse("PATTERN_HAMMER_RATIO", defaults.patterns.hammer_ratio),
                engulfing_ratio: env_var_parse(
                    "PATTERN_ENGULFING_RATIO",
                    defaults.patterns.engulfing_ratio,
                ),
            },
            aggregator: AggregatorConfig {
                ai_confidence_threshold: env_var_parse(
                    "AI_CONFIDENCE_THRESHOLD",
                    defaults.aggregator.ai_confidence_threshold,
                ),
            },
            ai: AiConfig {
                enabled: env_var_bool("ENABLE_AI_ANALYSIS", defaults.ai.enabled),
                api_key,
                api_base: std::env::var("AI_API_BASE").unwrap_or(defaults.ai.api_base),
                model: std::env::var("AI_MODEL").unwrap_or(defaults.ai.model),
                request_timeout_secs: env_var_parse(
                    "AI_REQUEST_TIMEOUT_SECS",
                    defaults.ai.request_timeout_secs,
                ),
                ..defaults.ai
            },
            monitor: MonitorConfig {
                symbols: env_var_list("WATCH_SYMBOLS").unwrap_or(defaults.monitor.symbols),
                intervals: env_var_list("WATCH_INTERVALS").unwrap_or(defaults.monitor.intervals),
                poll_interval_secs: env_var_parse(
                    "POLL_INTERVAL_SECS",
                    defaults.monitor.poll_interval_secs,
                ),
                error_backoff_secs: env_var_parse(
                    "ERROR_BACKOFF_SECS",
                    defaults.monitor.error_backoff_secs,
                ),
                klines_limit: env_var_parse("KLINES_LIMIT", defaults.monitor.klines_limit),
                include_open_candle: env_var_bool(
                    "INCLUDE_OPEN_CANDLE",
                    defaults.monitor.include_open_candle,
                ),
            },
            log_dir: std::env::var("LOG_DIR").ok(),
        };

        config
            .validate()
            .map_err(|err| AppError::Config(err.to_string()))?;

        Ok(config)
    }
}

/// Parse an env var, falling back to the default when unset or malformed
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

/// Comma separated list; `None` when unset or empty
fn env_var_list(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = std::env::var(key)
        .ok()?
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    (!items.is_empty()).then_some(items)
}
