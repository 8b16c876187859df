// ABOUTME: Bounded-retry polling primitive with a fixed interval between attempts.
// ABOUTME: Reports attempts consumed, elapsed time and a distinct cancelled outcome.

use super::cancel::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;

/// Interval and attempt budget for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(rename = "attempts")]
    pub max_attempts: NonZeroU32,

    /// Upper bound on a single probe invocation. A timed-out attempt counts as failed.
    #[serde(default, with = "humantime_serde")]
    pub attempt_timeout: Option<Duration>,
}

impl PollSettings {
    /// Create settings; an attempt budget of zero is raised to one.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: NonZeroU32::new(max_attempts).unwrap_or(NonZeroU32::MIN),
            attempt_timeout: None,
        }
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Worst-case wall-clock time of a poll loop, when every attempt is bounded.
    ///
    /// Without an attempt timeout this only covers the sleeps between attempts.
    pub fn budget(&self) -> Duration {
        let attempts = self.max_attempts.get();
        let sleeps = self.interval * (attempts - 1);
        match self.attempt_timeout {
            Some(t) => sleeps + t * attempts,
            None => sleeps,
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollOutcome {
    /// A probe attempt succeeded.
    Ready,
    /// Every attempt failed.
    Exhausted,
    /// The loop was aborted by a cancellation signal.
    Cancelled,
}

/// Outcome of one poll loop, kept for the health gate and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub outcome: PollOutcome,
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Error from the final attempt, if it failed with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ProbeResult {
    pub fn success(&self) -> bool {
        self.outcome == PollOutcome::Ready
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == PollOutcome::Cancelled
    }
}

impl std::fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = match self.outcome {
            PollOutcome::Ready => "ready",
            PollOutcome::Exhausted => "exhausted",
            PollOutcome::Cancelled => "cancelled",
        };
        write!(
            f,
            "{} {} after {} attempt(s) in {:.1}s",
            self.name,
            outcome,
            self.attempts,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(ref err) = self.last_error {
            write!(f, " (last error: {err})")?;
        }
        Ok(())
    }
}

/// A probe result together with the value the successful attempt produced.
#[derive(Debug)]
pub struct Polled<T> {
    pub result: ProbeResult,
    pub value: Option<T>,
}

/// Repeatedly invokes a probe until it succeeds, the budget runs out, or the run is
/// cancelled.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    settings: PollSettings,
    cancel: CancellationToken,
}

impl ReadinessPoller {
    pub fn new(settings: PollSettings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Poll a boolean probe. Errors count as failed attempts.
    pub async fn poll<F, Fut, E>(&self, name: &str, mut probe: F) -> ProbeResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: Display,
    {
        self.poll_for(name, move || {
            let attempt = probe();
            async move { attempt.await.map(|ready| ready.then_some(())) }
        })
        .await
        .result
    }

    /// Poll a probe that yields a value once ready.
    pub async fn poll_for<T, F, Fut, E>(&self, name: &str, mut probe: F) -> Polled<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let start = Instant::now();
        let max_attempts = self.settings.max_attempts.get();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return self.finish(name, PollOutcome::Cancelled, attempt - 1, start, last_error);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.finish(name, PollOutcome::Cancelled, attempt, start, last_error);
                }
                result = self.attempt(&mut probe) => result,
            };

            match result {
                Ok(Some(value)) => {
                    tracing::debug!(probe = name, attempt, "ready");
                    let mut polled = self.finish(name, PollOutcome::Ready, attempt, start, None);
                    polled.value = Some(value);
                    return polled;
                }
                Ok(None) => {
                    tracing::debug!(probe = name, attempt, max_attempts, "not ready");
                    last_error = None;
                }
                Err(e) => {
                    tracing::debug!(probe = name, attempt, max_attempts, error = %e, "attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return self.finish(name, PollOutcome::Cancelled, attempt, start, last_error);
                    }
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
            }
        }

        self.finish(name, PollOutcome::Exhausted, max_attempts, start, last_error)
    }

    async fn attempt<T, F, Fut, E>(&self, probe: &mut F) -> Result<Option<T>, String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Display,
    {
        let fut = probe();
        match self.settings.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("attempt timed out after {limit:?}")),
            },
            None => fut.await.map_err(|e| e.to_string()),
        }
    }

    fn finish<T>(
        &self,
        name: &str,
        outcome: PollOutcome,
        attempts: u32,
        start: Instant,
        last_error: Option<String>,
    ) -> Polled<T> {
        Polled {
            result: ProbeResult {
                name: name.to_string(),
                outcome,
                attempts,
                elapsed: start.elapsed(),
                last_error,
            },
            value: None,
        }
    }
}
