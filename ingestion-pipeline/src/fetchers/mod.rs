pub mod arxiv;
pub mod github;
pub mod semantic_scholar;
pub mod youtube;

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Serializes calls to a polite upstream: at most one request per
/// `min_interval`. Waiters queue on the mutex, so the spacing holds across
/// concurrent jobs.
pub struct RateGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
