//! Cached random numbers with graceful degradation.
//!
//! Numbers are drawn from the OS generator in batches and served from a
//! cache until the batch is used up or expires. If the OS source fails the
//! cache is refilled from `fastrand` instead and reports the degraded source.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::EntropyConfig;
use crate::observability::metrics;

/// Where the current batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropySource {
    Os,
    Fallback,
}

impl EntropySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntropySource::Os => "os",
            EntropySource::Fallback => "fallback",
        }
    }
}

/// Something that can fill a buffer with random bytes.
pub trait ByteSource: Send {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), rand::Error>;
}

impl ByteSource for OsRng {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), rand::Error> {
        self.try_fill_bytes(buf)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntropyStatus {
    pub source: EntropySource,
    pub remaining: usize,
    pub batch_size: usize,
    pub age_ms: u64,
    pub refills: u64,
    pub fallbacks: u64,
}

struct Batch {
    values: Vec<u64>,
    next: usize,
    filled_at: Option<Instant>,
    source: EntropySource,
    refills: u64,
    fallbacks: u64,
}

pub struct RandomCache {
    primary: Mutex<Box<dyn ByteSource>>,
    batch: Mutex<Batch>,
    batch_size: usize,
    ttl: Duration,
}

impl RandomCache {
    pub fn new(config: &EntropyConfig) -> Self {
        Self::with_source(config, Box::new(OsRng))
    }

    pub fn with_source(config: &EntropyConfig, source: Box<dyn ByteSource>) -> Self {
        Self {
            primary: Mutex::new(source),
            batch: Mutex::new(Batch {
                values: Vec::new(),
                next: 0,
                filled_at: None,
                source: EntropySource::Os,
                refills: 0,
                fallbacks: 0,
            }),
            batch_size: config.batch_size.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn next_u64(&self) -> u64 {
        let mut batch = self.lock_batch();
        let expired = batch
            .filled_at
            .map_or(true, |at| at.elapsed() >= self.ttl);
        if expired || batch.next >= batch.values.len() {
            self.refill(&mut batch);
        }
        let value = batch.values[batch.next];
        batch.next += 1;
        value
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in `[0, bound)`. Returns 0 when `bound` is 0.
    pub fn next_below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        // Rejection sampling to avoid modulo bias.
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let v = self.next_u64();
            if v < zone {
                return v % bound;
            }
        }
    }

    pub fn status(&self) -> EntropyStatus {
        let batch = self.lock_batch();
        EntropyStatus {
            source: batch.source,
            remaining: batch.values.len().saturating_sub(batch.next),
            batch_size: self.batch_size,
            age_ms: batch
                .filled_at
                .map_or(0, |at| at.elapsed().as_millis() as u64),
            refills: batch.refills,
            fallbacks: batch.fallbacks,
        }
    }

    /// Drop the current batch so the next draw refills.
    pub fn invalidate(&self) {
        let mut batch = self.lock_batch();
        batch.values.clear();
        batch.next = 0;
    }

    fn refill(&self, batch: &mut Batch) {
        let mut bytes = vec![0u8; self.batch_size * 8];
        let filled = self
            .primary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill(&mut bytes);

        let source = match filled {
            Ok(()) => EntropySource::Os,
            Err(e) => {
                tracing::warn!(error = %e, "OS random source failed, using fallback generator");
                fastrand::fill(&mut bytes);
                batch.fallbacks += 1;
                EntropySource::Fallback
            }
        };

        batch.values = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();
        batch.next = 0;
        batch.filled_at = Some(Instant::now());
        batch.source = source;
        batch.refills += 1;
        metrics::record_entropy_refill(source.as_str());
    }

    fn lock_batch(&self) -> MutexGuard<'_, Batch> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RandomCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomCache")
            .field("batch_size", &self.batch_size)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSource;

    impl ByteSource for BrokenSource {
        fn fill(&mut self, _buf: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("no entropy device")))
        }
    }

    fn small() -> EntropyConfig {
        EntropyConfig {
            batch_size: 4,
            ttl_secs: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_reused_until_exhausted() {
        let cache = RandomCache::new(&small());

        cache.next_u64();
        let status = cache.status();
        assert_eq!(status.source, EntropySource::Os);
        assert_eq!(status.refills, 1);
        assert_eq!(status.remaining, 3);

        for _ in 0..3 {
            cache.next_u64();
        }
        assert_eq!(cache.status().refills, 1);
        cache.next_u64();
        assert_eq!(cache.status().refills, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_batch_is_refilled() {
        let cache = RandomCache::new(&small());
        cache.next_u64();

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.next_u64();
        let status = cache.status();
        assert_eq!(status.refills, 2);
        assert_eq!(status.remaining, 3);
    }

    #[test]
    fn test_falls_back_when_os_source_fails() {
        let cache = RandomCache::with_source(&small(), Box::new(BrokenSource));
        cache.next_u64();

        let status = cache.status();
        assert_eq!(status.source, EntropySource::Fallback);
        assert_eq!(status.fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refill() {
        let cache = RandomCache::new(&small());
        cache.next_u64();
        cache.invalidate();
        assert_eq!(cache.status().remaining, 0);

        cache.next_u64();
        let status = cache.status();
        assert_eq!(status.refills, 2);
        assert_eq!(status.remaining, 3);
    }

    #[test]
    fn test_ranges() {
        let cache = RandomCache::new(&EntropyConfig::default());
        for _ in 0..1000 {
            let f = cache.next_f64();
            assert!((0.0..1.0).contains(&f));
            assert!(cache.next_below(6) < 6);
        }
        assert_eq!(cache.next_below(0), 0);
    }
}
