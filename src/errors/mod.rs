use thiserror::Error;

/// Failures that stop one pair's cycle or the startup sequence.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("fetch failed for {symbol} {interval}: {message}")]
    Fetch {
        symbol: String,
        interval: String,
        message: String,
    },
    #[error("no closed candles for {symbol} {interval}")]
    NoCandles { symbol: String, interval: String },
    #[error("indicator error: {0}")]
    Indicator(String),
}

/// Failures talking to the AI completion endpoint.
///
/// Messages carry status codes and response snippets, never request headers.
#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    MissingApiKey,
    #[error("AI request failed: {0}")]
    Transport(String),
    #[error("AI endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed AI response: {0}")]
    Malformed(String),
    #[error("AI request gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AiError> },
}

impl AiError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::MissingApiKey | AiError::RetriesExhausted { .. } => false,
            AiError::Status { status, .. } => *status == 429 || *status >= 500,
            AiError::Transport(_) | AiError::Malformed(_) => true,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(error: reqwest::Error) -> Self {
        // without_url drops query strings from the message
        AiError::Transport(error.without_url().to_string())
    }
}
