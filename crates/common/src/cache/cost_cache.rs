use crate::cache::config::CacheConfig;
use crate::cache::sketch::{hash_key, FrequencySketch};
use crate::domain::{DomainError, DomainResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

const NUM_SHARDS: usize = 16;

/// Cache counters, readable at any time without locking
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    /// Writes refused by admission or because they exceed the whole budget
    pub rejected: AtomicU64,
    /// Writes lost because the write buffer was full
    pub dropped: AtomicU64,
    pub evicted: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub used_cost: u64,
}

struct Entry<V> {
    value: V,
    cost: u64,
    stored_at: Instant,
}

struct Victim {
    shard: usize,
    key: String,
    cost: u64,
}

struct Shard<V> {
    entries: LruCache<String, Entry<V>>,
    cost: u64,
}

enum Write<V> {
    Set {
        key: String,
        value: V,
        cost: u64,
        stored_at: Instant,
    },
    Flush(oneshot::Sender<()>),
}

struct Inner<V> {
    shards: Vec<Mutex<Shard<V>>>,
    sketch: Mutex<FrequencySketch>,
    used_cost: AtomicU64,
    max_cost: u64,
    stats: CacheStats,
}

/// Cost-bounded in-memory cache with frequency-based admission.
///
/// Reads go straight to a shard. Writes are queued on a bounded buffer and
/// applied in order by a background task; [`CostCache::wait`] resolves once
/// every write queued before it has been applied.
pub struct CostCache<V> {
    inner: Arc<Inner<V>>,
    writes: mpsc::Sender<Write<V>>,
}

impl<V> Clone for CostCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            writes: self.writes.clone(),
        }
    }
}

impl<V> CostCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Must be called from within a tokio runtime, the write buffer is
    /// drained by a task spawned here.
    pub fn new(config: &CacheConfig) -> DomainResult<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            DomainError::CacheInitError(format!("no async runtime available: {}", e))
        })?;

        let inner = Arc::new(Inner {
            shards: (0..NUM_SHARDS)
                .map(|_| {
                    Mutex::new(Shard {
                        entries: LruCache::unbounded(),
                        cost: 0,
                    })
                })
                .collect(),
            sketch: Mutex::new(FrequencySketch::new(config.num_counters)),
            used_cost: AtomicU64::new(0),
            max_cost: config.max_cost,
            stats: CacheStats::default(),
        });

        let (writes, mut pending) = mpsc::channel(config.buffer_items);
        let applier = Arc::clone(&inner);
        runtime.spawn(async move {
            while let Some(write) = pending.recv().await {
                match write {
                    Write::Set {
                        key,
                        value,
                        cost,
                        stored_at,
                    } => applier.apply(key, value, cost, stored_at),
                    Write::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            trace!("cache write buffer closed");
        });

        debug!(
            max_cost = config.max_cost,
            num_counters = config.num_counters,
            buffer_items = config.buffer_items,
            "cache initialized"
        );

        Ok(Self { inner, writes })
    }

    /// Returns the stored value and the instant it was stored.
    pub fn get(&self, key: &str) -> Option<(V, Instant)> {
        let hash = hash_key(key);
        self.inner.sketch.lock().increment(hash);

        let found = {
            let mut shard = self.inner.shard(hash).lock();
            shard
                .entries
                .get(key)
                .map(|entry| (entry.value.clone(), entry.stored_at))
        };

        match &found {
            Some(_) => self.inner.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.inner.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Queues a write. Returns false when the buffer is full and the write was
    /// dropped. A queued write can still be refused by admission.
    pub fn set(&self, key: impl Into<String>, value: V, cost: u64) -> bool {
        let write = Write::Set {
            key: key.into(),
            value,
            cost,
            stored_at: Instant::now(),
        };

        match self.writes.try_send(write) {
            Ok(()) => true,
            Err(_) => {
                self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Resolves once every write queued before this call has been applied.
    pub async fn wait(&self) {
        let (done, applied) = oneshot::channel();
        if self.writes.send(Write::Flush(done)).await.is_err() {
            warn!("cache write buffer is closed");
            return;
        }
        let _ = applied.await;
    }

    /// Returns a live entry for `key`, or runs `compute` and stores its result.
    ///
    /// An entry is live while it is younger than `ttl`. Errors from `compute`
    /// are returned as-is and leave the cache untouched.
    pub async fn get_or_compute<F, Fut, W>(
        &self,
        key: &str,
        ttl: Duration,
        cost: W,
        compute: F,
    ) -> DomainResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<V>>,
        W: FnOnce(&V) -> u64,
    {
        if let Some((value, stored_at)) = self.get(key) {
            if stored_at.elapsed() < ttl {
                trace!(key = %key, "cache hit");
                return Ok(value);
            }
            trace!(key = %key, "cache entry expired");
        }

        let value = compute().await?;
        let weight = cost(&value);
        if self.set(key, value.clone(), weight) {
            self.wait().await;
        }

        Ok(value)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let stats = &self.inner.stats;
        CacheStatsSnapshot {
            hits: stats.hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            rejected: stats.rejected.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            evicted: stats.evicted.load(Ordering::Relaxed),
            used_cost: self.inner.used_cost.load(Ordering::Relaxed),
        }
    }

    pub fn max_cost(&self) -> u64 {
        self.inner.max_cost
    }
}

impl<V> Inner<V> {
    fn shard(&self, hash: u64) -> &Mutex<Shard<V>> {
        &self.shards[(hash as usize) % self.shards.len()]
    }

    /// Only ever called from the single write task, so shard costs cannot
    /// change between victim selection and removal.
    fn apply(&self, key: String, value: V, cost: u64, stored_at: Instant) {
        if cost > self.max_cost {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, cost, max_cost = self.max_cost, "entry exceeds cache budget");
            return;
        }

        let hash = hash_key(&key);
        let previous = {
            let mut shard = self.shard(hash).lock();
            let previous = shard.entries.pop(&key).map(|entry| entry.cost);
            if let Some(old_cost) = previous {
                shard.cost -= old_cost;
            }
            previous
        };
        if let Some(old_cost) = previous {
            self.used_cost.fetch_sub(old_cost, Ordering::Relaxed);
        }

        let victims = self.select_victims(cost);
        if previous.is_none() && !victims.is_empty() {
            let candidate_frequency = self.sketch.lock().estimate(hash);
            let hottest = {
                let sketch = self.sketch.lock();
                victims
                    .iter()
                    .map(|victim| (victim, sketch.estimate(hash_key(&victim.key))))
                    .max_by_key(|(_, frequency)| *frequency)
            };
            if let Some((victim, victim_frequency)) = hottest {
                if candidate_frequency < victim_frequency {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        key = %key,
                        victim = %victim.key,
                        candidate_frequency,
                        victim_frequency,
                        "cache admission rejected"
                    );
                    return;
                }
            }
        }

        for victim in victims {
            let mut shard = self.shards[victim.shard].lock();
            if shard.entries.pop(&victim.key).is_some() {
                shard.cost -= victim.cost;
                self.used_cost.fetch_sub(victim.cost, Ordering::Relaxed);
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                trace!(victim = %victim.key, victim_cost = victim.cost, "cache entry evicted");
            }
        }

        let mut shard = self.shard(hash).lock();
        shard.cost += cost;
        shard.entries.put(
            key,
            Entry {
                value,
                cost,
                stored_at,
            },
        );
        self.used_cost.fetch_add(cost, Ordering::Relaxed);
    }

    /// Entries that would have to go for `cost` to fit, taking the least
    /// recent entry of the currently fullest shard each time. Nothing is
    /// removed here.
    fn select_victims(&self, cost: u64) -> Vec<Victim> {
        let mut shard_costs: Vec<u64> =
            self.shards.iter().map(|shard| shard.lock().cost).collect();
        let mut taken = vec![0usize; self.shards.len()];
        let mut remaining = self.used_cost.load(Ordering::Relaxed);
        let mut victims = Vec::new();

        while remaining + cost > self.max_cost {
            let Some(index) = shard_costs
                .iter()
                .enumerate()
                .filter(|(_, shard_cost)| **shard_cost > 0)
                .max_by_key(|(_, shard_cost)| **shard_cost)
                .map(|(index, _)| index)
            else {
                break;
            };

            let shard = self.shards[index].lock();
            let Some((victim_key, entry)) = shard.entries.iter().rev().nth(taken[index]) else {
                break;
            };

            taken[index] += 1;
            shard_costs[index] = shard_costs[index].saturating_sub(entry.cost);
            remaining = remaining.saturating_sub(entry.cost);
            victims.push(Victim {
                shard: index,
                key: victim_key.clone(),
                cost: entry.cost,
            });
        }

        victims
    }
}
