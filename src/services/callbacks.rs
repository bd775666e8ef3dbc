use async_trait::async_trait;

use crate::models::market_info::MarketInfo;

/// Receives every market update the monitor produces.
///
/// Implementations apply their own confidence filtering; the monitor hands
/// over every update regardless of the recommendation.
#[async_trait]
pub trait MarketCallback: Send + Sync {
    async fn on_update(&self, info: &MarketInfo) -> anyhow::Result<()>;
}

/// Writes recommendations to the log. Updates below `min_confidence` are
/// logged at debug level only.
#[derive(Debug, Clone)]
pub struct LoggingCallback {
    min_confidence: f64,
}

impl LoggingCallback {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }
}

#[async_trait]
impl MarketCallback for LoggingCallback {
    async fn on_update(&self, info: &MarketInfo) -> anyhow::Result<()> {
        let rec = &info.signals.recommendation;

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!("{} {} update: {}", info.symbol, info.interval, to_json(info)?);
        }

        if rec.confidence < self.min_confidence {
            tracing::debug!(
                "{} {} @ {:.4}: {} ({:.1}% below {:.1}%)",
                info.symbol,
                info.interval,
                info.price,
                rec.action,
                rec.confidence,
                self.min_confidence
            );
            return Ok(());
        }

        tracing::info!(
            "{} {} @ {:.4} ({:+.2}%): {} | score {:+.1}, confidence {:.1}%",
            info.symbol,
            info.interval,
            info.price,
            info.price_change_percent,
            rec.action,
            rec.score,
            rec.confidence
        );
        for reason in &rec.reasons {
            tracing::info!("  - {}", reason);
        }

        Ok(())
    }
}

/// Compact JSON form of an update, as a downstream notifier would send it.
fn to_json(info: &MarketInfo) -> serde_json::Result<String> {
    serde_json::to_string(info)
}
