use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio::time::Duration;

use crate::business_logic::config::MonitorConfig;
use crate::errors::AppError;
use crate::models::market_info::MarketInfo;
use crate::services::binance::{closed_candles, CandleSource};
use crate::services::callbacks::MarketCallback;
use crate::services::pipeline::SignalPipeline;

/// Handle returned by [`MonitorService::add_callback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Polls every (symbol, interval) pair of the watch-list, runs the signal
/// pipeline and fans the result out to the registered callbacks.
pub struct MonitorService {
    source: Arc<dyn CandleSource>,
    pipeline: SignalPipeline,
    config: MonitorConfig,
    callbacks: RwLock<Vec<(CallbackId, Arc<dyn MarketCallback>)>>,
    next_callback_id: AtomicU64,
    running: AtomicBool,
    shutdown: Notify,
}

impl MonitorService {
    pub fn new(
        source: Arc<dyn CandleSource>,
        pipeline: SignalPipeline,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            pipeline,
            config,
            callbacks: RwLock::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Register a callback. Takes effect from the next pass.
    pub async fn add_callback(&self, callback: Arc<dyn MarketCallback>) -> CallbackId {
        let id = CallbackId(self.next_callback_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().await.push((id, callback));
        id
    }

    /// Unregister a callback. Returns false if `id` was not registered.
    pub async fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write().await;
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to finish. The pair in progress completes first; a pending
    /// sleep is cut short.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping monitor");
        }
        self.shutdown.notify_waiters();
    }

    /// Run passes over the watch-list until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Monitor is already running");
            return;
        }
        // Cleared on every exit path, including a panicking callback
        let _running = RunningGuard(&self.running);

        let watch_list = self.config.watch_list();
        tracing::info!(
            "Monitoring {} pairs every {}s",
            watch_list.len(),
            self.config.poll_interval_secs
        );

        'passes: while self.is_running() {
            let callbacks: Vec<Arc<dyn MarketCallback>> = self
                .callbacks
                .read()
                .await
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect();

            for (symbol, interval) in &watch_list {
                if !self.is_running() {
                    break 'passes;
                }

                match self.process_pair(symbol, interval).await {
                    Ok(info) => dispatch(&callbacks, &info).await,
                    Err(e) => {
                        tracing::error!("Error processing {} {}: {}", symbol, interval, e);
                        if !self.pause(self.config.error_backoff()).await {
                            break 'passes;
                        }
                    }
                }
            }

            if !self.pause(self.config.poll_interval()).await {
                break;
            }
        }

        tracing::info!("Monitor stopped");
    }

    async fn process_pair(&self, symbol: &str, interval: &str) -> Result<MarketInfo, AppError> {
        let mut candles = self
            .source
            .fetch_candles(symbol, interval, self.config.klines_limit)
            .await?;

        if !self.config.include_open_candle {
            let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
            candles = closed_candles(candles, now_ms);
        }

        self.pipeline.evaluate(symbol, interval, &candles).await
    }

    /// Sleep for `duration` unless stopped first. Returns whether the monitor
    /// is still running.
    async fn pause(&self, duration: Duration) -> bool {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent stop is not missed
        notified.as_mut().enable();

        if !self.is_running() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = &mut notified => {}
        }

        self.is_running()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn dispatch(callbacks: &[Arc<dyn MarketCallback>], info: &MarketInfo) {
    for callback in callbacks {
        if let Err(e) = callback.on_update(info).await {
            tracing::error!(
                "Callback failed for {} {}: {:#}",
                info.symbol,
                info.interval,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::aggregator::Aggregator;
    use crate::business_logic::config::{AggregatorConfig, PatternConfig};
    use crate::business_logic::indicators::TaIndicators;
    use crate::business_logic::patterns::PatternDetector;
    use crate::models::candle::Candle;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Serves a fixed window for every pair except `failing`.
    struct ScriptedSource {
        failing: Option<&'static str>,
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        async fn fetch_candles(
            &self,
            symbol: &str,
            interval: &str,
            _limit: usize,
        ) -> Result<Vec<Candle>, AppError> {
            if self.failing == Some(symbol) {
                return Err(AppError::Fetch {
                    symbol: symbol.to_string(),
                    interval: interval.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            Ok((0..5u64)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    Candle::new(
                        i * 60_000,
                        i * 60_000 + 59_999,
                        close - 0.5,
                        close + 1.0,
                        close - 1.5,
                        close,
                        10.0,
                        10.0 * close,
                        5,
                        5.0,
                    )
                })
                .collect())
        }
    }

    /// Records "<name>:<symbol>" for every update it sees.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl MarketCallback for Recorder {
        async fn on_update(&self, info: &MarketInfo) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, info.symbol));
            if self.fail {
                anyhow::bail!("{} refused the update", self.name);
            }
            Ok(())
        }
    }

    fn monitor(symbols: &[&str], failing: Option<&'static str>) -> Arc<MonitorService> {
        let pipeline = SignalPipeline::new(
            PatternDetector::new(PatternConfig::default()),
            Arc::new(TaIndicators::default()),
            None,
            Aggregator::new(AggregatorConfig::default()),
        );
        let config = MonitorConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            intervals: vec!["1h".to_string()],
            poll_interval_secs: 60,
            error_backoff_secs: 5,
            ..MonitorConfig::default()
        };
        Arc::new(MonitorService::new(
            Arc::new(ScriptedSource { failing }),
            pipeline,
            config,
        ))
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_pair_does_not_stop_the_loop() {
        let monitor = monitor(&["AAAUSDT", "BBBUSDT", "CCCUSDT"], Some("BBBUSDT"));
        let log = Arc::new(Mutex::new(Vec::new()));
        monitor.add_callback(recorder("rec", &log, false)).await;

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });

        // first pass, then the 5s backoff and into the 60s sleep
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(monitor.is_running());
        assert_eq!(*log.lock().unwrap(), vec!["rec:AAAUSDT", "rec:CCCUSDT"]);

        // second pass
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(monitor.is_running());
        assert_eq!(log.lock().unwrap().len(), 4);

        monitor.stop();
        handle.await.unwrap();
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_run_in_registration_order() {
        let monitor = monitor(&["AAAUSDT"], None);
        let log = Arc::new(Mutex::new(Vec::new()));
        monitor.add_callback(recorder("first", &log, true)).await;
        monitor.add_callback(recorder("second", &log, false)).await;

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.stop();
        handle.await.unwrap();

        // a failing callback does not keep the next one from running
        assert_eq!(*log.lock().unwrap(), vec!["first:AAAUSDT", "second:AAAUSDT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_callback_no_longer_receives_updates() {
        let monitor = monitor(&["AAAUSDT"], None);
        let log = Arc::new(Mutex::new(Vec::new()));
        let kept = monitor.add_callback(recorder("kept", &log, false)).await;
        let dropped = monitor.add_callback(recorder("dropped", &log, false)).await;
        assert_ne!(kept, dropped);

        assert!(monitor.remove_callback(dropped).await);
        assert!(!monitor.remove_callback(dropped).await);

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.stop();
        handle.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["kept:AAAUSDT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_poll_sleep() {
        let monitor = monitor(&["AAAUSDT"], None);
        let started = Instant::now();

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        monitor.stop();
        handle.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(!monitor.is_running());
    }

    struct PanickingCallback;

    #[async_trait]
    impl MarketCallback for PanickingCallback {
        async fn on_update(&self, _info: &MarketInfo) -> anyhow::Result<()> {
            panic!("callback blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_clears_running_flag() {
        let monitor = monitor(&["AAAUSDT"], None);
        let id = monitor.add_callback(Arc::new(PanickingCallback)).await;

        let result = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        })
        .await;
        assert!(result.unwrap_err().is_panic());
        assert!(!monitor.is_running());

        // the monitor can be started again
        assert!(monitor.remove_callback(id).await);
        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.is_running());
        monitor.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_run_is_harmless() {
        let monitor = monitor(&["AAAUSDT"], None);
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
