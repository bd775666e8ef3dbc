use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::AiError;

/// Exponential backoff schedule for a fallible async call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Wall-clock budget across all attempts and waits
    pub total_budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            total_budget: Some(Duration::from_secs(180)),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor.max(1.0));
        delay.min(self.max_delay)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts or budget.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut call: F) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        // An attempt may only use what is left of the budget
        let outcome = match policy.total_budget {
            Some(budget) => {
                let remaining = budget.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, call()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(
                            "{}: attempt {} ran past the {:?} budget",
                            label,
                            attempt,
                            budget
                        );
                        return Err(AiError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(AiError::Transport(format!(
                                "attempt exceeded the {:?} retry budget",
                                budget
                            ))),
                        });
                    }
                }
            }
            None => call().await,
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(error);
        }

        if attempt >= max_attempts {
            return Err(AiError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.delay_for(attempt);
        if let Some(budget) = policy.total_budget {
            if started.elapsed() + delay > budget {
                tracing::warn!("{}: retry budget of {:?} spent", label, budget);
                return Err(AiError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }
        }

        tracing::warn!(
            "{}: attempt {}/{} failed ({}), retrying in {:?}",
            label,
            attempt,
            max_attempts,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
    }
}
