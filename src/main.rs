use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalwatch::business_logic::aggregator::Aggregator;
use signalwatch::business_logic::config::{AiConfig, AppConfig};
use signalwatch::business_logic::extraction::HeuristicExtractor;
use signalwatch::business_logic::indicators::TaIndicators;
use signalwatch::business_logic::patterns::PatternDetector;
use signalwatch::services::ai::{AiInsightAdapter, ChatCompletionClient};
use signalwatch::services::binance::BinanceFuturesClient;
use signalwatch::services::callbacks::LoggingCallback;
use signalwatch::services::monitor::MonitorService;
use signalwatch::services::pipeline::SignalPipeline;

/// Recommendations below this confidence are only logged at debug level
const NOTIFY_MIN_CONFIDENCE: f64 = 60.0;

fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "signalwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn build_ai(config: &AiConfig) -> anyhow::Result<Option<AiInsightAdapter>> {
    if !config.enabled {
        tracing::info!("AI analysis disabled");
        return Ok(None);
    }

    if config.api_key.is_none() {
        tracing::warn!("AI analysis disabled: DEEPSEEK_API_KEY is not set");
        return Ok(None);
    }

    let extractor = HeuristicExtractor::new().context("failed to build key point extractor")?;

    match ChatCompletionClient::new(config.clone()) {
        Ok(client) => {
            tracing::info!("AI analysis enabled with model {}", config.model);
            Ok(Some(AiInsightAdapter::new(
                Arc::new(client),
                Arc::new(extractor),
                config.retry.clone(),
                true,
            )))
        }
        Err(e) => {
            tracing::warn!("AI analysis disabled: {}", e);
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let _guard = init_tracing(config.log_dir.as_deref());

    tracing::info!(
        "Watching {:?} on {:?}, AI blend threshold {:.1}%",
        config.monitor.symbols,
        config.monitor.intervals,
        config.aggregator.ai_confidence_threshold
    );

    let pipeline = SignalPipeline::new(
        PatternDetector::new(config.patterns.clone()),
        Arc::new(TaIndicators::default()),
        build_ai(&config.ai)?,
        Aggregator::new(config.aggregator.clone()),
    );

    let monitor = Arc::new(MonitorService::new(
        Arc::new(BinanceFuturesClient::new()),
        pipeline,
        config.monitor.clone(),
    ));
    monitor
        .add_callback(Arc::new(LoggingCallback::new(NOTIFY_MIN_CONFIDENCE)))
        .await;

    tokio::spawn({
        let monitor = monitor.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    monitor.stop();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            }
        }
    });

    monitor.run().await;

    Ok(())
}
