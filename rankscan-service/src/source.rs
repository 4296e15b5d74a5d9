//! Market snapshot source boundary.
//!
//! The upstream brokerage client lives behind `MarketSnapshotSource`;
//! the coordinator only sees quotes or a `SourceError`. Transient
//! failures are retried with jittered exponential backoff inside the
//! cycle deadline; authentication failures abort the cycle immediately.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

use rankscan_core::Quote;

use crate::config::RetrySettings;
use crate::error::SourceError;

/// Supplies a batch of current per-instrument quotes on demand.
pub trait MarketSnapshotSource: Send + Sync {
    fn fetch(&self, codes: &[String]) -> Result<Vec<Quote>, SourceError>;
}

/// Fetches with bounded retries. Backoff doubles per attempt with a
/// jitter of up to half the base delay, and an attempt is never started
/// past `deadline`.
pub fn fetch_with_retry(
    source: &dyn MarketSnapshotSource,
    codes: &[String],
    retry: &RetrySettings,
    deadline: Instant,
) -> Result<Vec<Quote>, SourceError> {
    let mut last_err = SourceError::Transient("no attempts made".into());
    for attempt in 0..retry.max_attempts {
        match source.fetch(codes) {
            Ok(quotes) => return Ok(quotes),
            Err(err @ SourceError::Auth(_)) => return Err(err),
            Err(err) => {
                warn!(attempt, error = %err, "snapshot fetch failed");
                last_err = err;
            }
        }

        if attempt + 1 < retry.max_attempts {
            let backoff = backoff_delay(retry.base_backoff_ms, attempt);
            if Instant::now() + backoff >= deadline {
                break;
            }
            std::thread::sleep(backoff);
        }
    }
    Err(last_err)
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let base = base_ms.saturating_mul(1 << attempt.min(10));
    let jitter = if base_ms > 1 { rand::thread_rng().gen_range(0..base_ms / 2 + 1) } else { 0 };
    Duration::from_millis(base + jitter)
}

/// Scripted in-memory source for tests and the demo CLI.
///
/// Each `fetch` pops the next scripted response; once the script is
/// exhausted the last snapshot repeats.
pub struct StaticSource {
    script: Mutex<Vec<Result<Vec<Quote>, SourceError>>>,
    last: Mutex<Vec<Quote>>,
}

impl StaticSource {
    /// A source that always returns the same snapshot.
    pub fn fixed(quotes: Vec<Quote>) -> Self {
        Self { script: Mutex::new(Vec::new()), last: Mutex::new(quotes) }
    }

    /// A source that replays `responses` in order, then repeats the
    /// last successful snapshot.
    pub fn scripted(responses: Vec<Result<Vec<Quote>, SourceError>>) -> Self {
        let mut script = responses;
        script.reverse(); // pop from the back in order
        Self { script: Mutex::new(script), last: Mutex::new(Vec::new()) }
    }
}

impl MarketSnapshotSource for StaticSource {
    fn fetch(&self, _codes: &[String]) -> Result<Vec<Quote>, SourceError> {
        let next = self.script.lock().expect("source lock poisoned").pop();
        match next {
            Some(Ok(quotes)) => {
                *self.last.lock().expect("source lock poisoned") = quotes.clone();
                Ok(quotes)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().expect("source lock poisoned").clone()),
        }
    }
}
