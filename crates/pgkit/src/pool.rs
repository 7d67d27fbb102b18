//! Connection pool utilities

use crate::dsn::PgConfig;
use crate::error::{KitError, KitResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;

/// Connection pool sizing and connection lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept after pruning.
    pub max_idle_conns: usize,
    /// Upper bound on open connections (the pool size).
    pub max_open_conns: usize,
    /// Connections older than this are closed when next pruned.
    pub conn_max_lifetime: Duration,
    /// Connections unused for longer than this are closed when next pruned.
    pub conn_max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_conns: 10,
            max_open_conns: 100,
            conn_max_lifetime: Duration::from_secs(60 * 60),
            conn_max_idle_time: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_idle_conns(mut self, n: usize) -> Self {
        self.max_idle_conns = n;
        self
    }

    pub fn max_open_conns(mut self, n: usize) -> Self {
        self.max_open_conns = n;
        self
    }

    pub fn conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    pub fn conn_max_idle_time(mut self, idle: Duration) -> Self {
        self.conn_max_idle_time = idle;
        self
    }

    /// How often [`spawn_reaper`] should prune: half the tighter of the two
    /// limits, kept between 1s and 60s.
    pub fn reap_interval(&self) -> Duration {
        (self.conn_max_lifetime.min(self.conn_max_idle_time) / 2)
            .clamp(MIN_REAP_INTERVAL, MAX_REAP_INTERVAL)
    }
}

const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Build a pool for `config`, sized by `pool_config.max_open_conns`.
///
/// No connection is opened here; the first checkout connects.
pub fn create_pool(config: &PgConfig, pool_config: &PoolConfig) -> KitResult<Pool> {
    let pg_config = config.to_pg_config()?;
    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(mgr)
        .max_size(pool_config.max_open_conns.max(1))
        .build()
        .map_err(|e| KitError::Pool(e.to_string()))
}

/// Close idle connections that are too old, unused for too long, or beyond
/// `max_idle_conns`. Returns how many were closed.
///
/// Only idle connections are inspected; checked-out ones are untouched.
pub fn prune_idle(pool: &Pool, config: &PoolConfig) -> usize {
    let mut kept = 0;
    let mut removed = 0;
    let _ = pool.retain(|_, metrics| {
        let keep = kept < config.max_idle_conns
            && metrics.age() < config.conn_max_lifetime
            && metrics.last_used() < config.conn_max_idle_time;
        if keep {
            kept += 1;
        } else {
            removed += 1;
        }
        keep
    });
    removed
}

/// Apply `config` to an existing pool: resize it, then prune.
pub fn apply_pool_config(pool: &Pool, config: &PoolConfig) -> usize {
    pool.resize(config.max_open_conns.max(1));
    prune_idle(pool, config)
}

/// Prune the pool every `every` (at least 1s) until the pool is closed.
pub fn spawn_reaper(pool: Pool, config: PoolConfig, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(MIN_REAP_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                tracing::debug!(target: "pgkit.pool", "pool closed, reaper exiting");
                break;
            }
            let removed = prune_idle(&pool, &config);
            if removed > 0 {
                let status = pool.status();
                tracing::debug!(
                    target: "pgkit.pool",
                    removed,
                    size = status.size,
                    available = status.available,
                    "pruned idle connections"
                );
            }
        }
    })
}
