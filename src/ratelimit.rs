//! Global token-bucket rate limiter for the probe pool (§5). Every probe
//! consumes exactly one token before opening a connection; a dedicated
//! refiller task tops the bucket back up on a fixed schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Clone)]
pub struct TokenBucket {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl TokenBucket {
    /// Initialized full, as in the original.
    pub fn new(capacity: usize) -> Self {
        TokenBucket {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Blocks until one token is available, then consumes it.
    pub async fn acquire(&self) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");
        permit.forget();
    }

    /// Spawns the periodic refiller: when `query_rate >= 500` it deposits
    /// `ceil(query_rate/1000)` tokens per millisecond; otherwise one token
    /// per `1/query_rate` second. The bucket is never topped up past its
    /// capacity.
    pub fn spawn_refiller(&self, query_rate: usize) -> JoinHandle<()> {
        let semaphore = self.semaphore.clone();
        let capacity = self.capacity;
        let (deposit, period) = if query_rate >= 500 {
            let tokens_per_ms = ((query_rate as f64) / 1000.0).ceil() as usize;
            (tokens_per_ms.max(1), Duration::from_millis(1))
        } else {
            (1usize, Duration::from_secs_f64(1.0 / query_rate.max(1) as f64))
        };

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            loop {
                interval.tick().await;
                let available = semaphore.available_permits();
                let room = capacity.saturating_sub(available);
                let to_add = deposit.min(room);
                if to_add > 0 {
                    semaphore.add_permits(to_add);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_drains_and_refiller_tops_back_up() {
        let bucket = TokenBucket::new(2);
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(bucket.semaphore.available_permits(), 0);

        let handle = bucket.spawn_refiller(1000);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(bucket.semaphore.available_permits() > 0);
        handle.abort();
    }
}
