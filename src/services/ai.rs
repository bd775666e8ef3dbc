use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::business_logic::config::AiConfig;
use crate::business_logic::extraction::KeyPointExtractor;
use crate::business_logic::patterns::{CandlePattern, PatternSet};
use crate::errors::AiError;
use crate::models::candle::Candle;
use crate::models::indicators::IndicatorSnapshot;
use crate::models::key_points::AiInsight;
use crate::services::retry::{with_retry, RetryPolicy};

const SYSTEM_PROMPT: &str = "You are a professional cryptocurrency trading analyst \
skilled in technical analysis and market structure.";
/// Longest error body we keep in a message
const ERROR_BODY_LIMIT: usize = 200;
const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

/// One chat-completion call, no retries.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (DeepSeek by default)
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: AiConfig,
}

impl ChatCompletionClient {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AiError> {
        let api_key = self.config.api_key.as_deref().ok_or(AiError::MissingApiKey)?;

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
        };

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body: redact_secrets(&text, api_key)
                    .chars()
                    .take(ERROR_BODY_LIMIT)
                    .collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| AiError::Malformed(error.without_url().to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::Malformed("response has no message content".to_string()))
    }
}

/// Strip the configured key and anything shaped like an `sk-` key from an
/// upstream error body. Providers echo masked keys on 401s.
fn redact_secrets(text: &str, api_key: &str) -> String {
    let text = if api_key.is_empty() {
        text.to_string()
    } else {
        text.replace(api_key, REDACTED)
    };

    let mut redacted = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(pos) = rest.find("sk-") {
        let (head, tail) = rest.split_at(pos);
        redacted.push_str(head);
        let tail = &tail[3..];
        if head.chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric()) {
            redacted.push_str("sk-");
            rest = tail;
            continue;
        }
        let end = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | '_')))
            .unwrap_or(tail.len());
        redacted.push_str(REDACTED);
        rest = &tail[end..];
    }
    redacted.push_str(rest);
    redacted
}

/// Market data the prompt is rendered from
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub symbol: &'a str,
    pub interval: &'a str,
    pub latest: &'a Candle,
    pub indicators: &'a IndicatorSnapshot,
    pub patterns: &'a PatternSet,
}

/// Asks the AI for commentary on one pair and reduces it to key points.
///
/// Never fails: every problem comes back as [`AiInsight::Failed`].
#[derive(Clone)]
pub struct AiInsightAdapter {
    backend: Arc<dyn CompletionBackend>,
    extractor: Arc<dyn KeyPointExtractor>,
    retry: RetryPolicy,
    enabled: bool,
}

impl AiInsightAdapter {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        extractor: Arc<dyn KeyPointExtractor>,
        retry: RetryPolicy,
        enabled: bool,
    ) -> Self {
        Self {
            backend,
            extractor,
            retry,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn analyze(&self, context: &MarketContext<'_>) -> AiInsight {
        if !self.enabled {
            return AiInsight::Disabled;
        }

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: render_prompt(context),
        };
        let label = format!("AI analysis {} {}", context.symbol, context.interval);

        match with_retry(&self.retry, &label, || self.backend.complete(&request)).await {
            Ok(analysis) if analysis.trim().is_empty() => {
                tracing::warn!("{}: empty response", label);
                AiInsight::Failed {
                    error: "empty AI response".to_string(),
                }
            }
            Ok(analysis) => {
                let key_points = self.extractor.extract(&analysis);
                tracing::debug!(
                    "{}: trend {} ({}), confidence {}",
                    label,
                    key_points.trend,
                    key_points.trend_score,
                    key_points.confidence
                );
                AiInsight::Ready {
                    analysis,
                    key_points,
                }
            }
            Err(error) => {
                tracing::warn!("{} failed: {}", label, error);
                AiInsight::Failed {
                    error: error.to_string(),
                }
            }
        }
    }
}

fn reading(indicators: &IndicatorSnapshot, name: &str) -> String {
    indicators
        .number(name)
        .map(|value| format!("{:.2}", value))
        .unwrap_or_else(|| "N/A".to_string())
}

fn render_prompt(context: &MarketContext<'_>) -> String {
    let latest = context.latest;
    let ind = context.indicators;
    let r = |name: &str| reading(ind, name);

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Analyze the following market data.\n");
    let _ = writeln!(prompt, "Symbol: {} ({})", context.symbol, context.interval);
    let _ = writeln!(prompt, "Price: {:.4}", latest.close);
    let _ = writeln!(
        prompt,
        "Change: {:.4} ({:.2}%)",
        latest.price_change, latest.price_change_percent
    );
    let _ = writeln!(prompt, "Volume: {:.2}", latest.volume);
    let _ = writeln!(prompt, "Taker buy ratio: {:.2}\n", latest.buy_ratio);

    let _ = writeln!(prompt, "Trend indicators:");
    let _ = writeln!(prompt, "- SMA 20/50/200: {}/{}/{}", r("sma_20"), r("sma_50"), r("sma_200"));
    let _ = writeln!(prompt, "- EMA 20/50: {}/{}", r("ema_20"), r("ema_50"));
    let _ = writeln!(prompt, "- MACD: {} (signal {})", r("macd"), r("macd_signal"));
    let _ = writeln!(prompt, "Momentum indicators:");
    let _ = writeln!(prompt, "- RSI: {}", r("rsi"));
    let _ = writeln!(prompt, "- MFI: {}", r("mfi"));
    let _ = writeln!(prompt, "Volatility indicators:");
    let _ = writeln!(
        prompt,
        "- Bollinger Bands: {}/{}/{}",
        r("bb_upper"),
        r("bb_middle"),
        r("bb_lower")
    );
    let _ = writeln!(prompt, "- ATR: {}", r("atr"));
    let _ = writeln!(prompt, "Volume indicators:");
    let _ = writeln!(prompt, "- OBV: {}\n", r("obv"));

    let names = |patterns: &[CandlePattern]| {
        if patterns.is_empty() {
            "none".to_string()
        } else {
            patterns.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        }
    };
    let _ = writeln!(prompt, "Bullish candlestick patterns: {}", names(&context.patterns.bullish));
    let _ = writeln!(prompt, "Bearish candlestick patterns: {}\n", names(&context.patterns.bearish));

    prompt.push_str(
        "Please cover:\n\
         1. Trend: short, medium and long term direction (bullish, bearish or sideways).\n\
         2. Key levels: at least three support and resistance levels, written as \
         \"support at <price>\" and \"resistance at <price>\".\n\
         3. Trade plan: direction, entry zone, a stop-loss written as \"stop-loss at <price>\" \
         and at least two targets written as \"target 1: <price>\".\n\
         4. Risk: overall risk (low risk, moderate risk or high risk), invalidation conditions \
         and how confident you are.\n",
    );

    prompt
}
