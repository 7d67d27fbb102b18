//! Pooled database handle with SQL logging.

use crate::client::GenericClient;
use crate::dsn::PgConfig;
use crate::error::{KitError, KitResult};
use crate::pool::{PoolConfig, apply_pool_config, create_pool, spawn_reaper};
use crate::scope::Scope;
use deadpool_postgres::Pool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::Level;

/// How statements run through [`Db`] are logged.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the per-statement event.
    pub level: Level,
    /// Statements at least this slow are also logged at `WARN`.
    pub slow_threshold: Duration,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            slow_threshold: Duration::from_secs(1),
            max_sql_length: Some(200),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end]).into()
            }
            _ => sql.into(),
        }
    }

    fn record(&self, sql: &str, param_count: usize, elapsed: Duration, ok: bool) {
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate(sql);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        emit_at_level!(
            self.level,
            target: "pgkit.sql",
            param_count,
            elapsed_ms,
            ok,
            sql = %sql,
        );
        if elapsed >= self.slow_threshold {
            tracing::warn!(
                target: "pgkit.sql",
                param_count,
                elapsed_ms,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                sql = %sql,
                "slow query"
            );
        }
    }
}

/// A pooled PostgreSQL handle.
///
/// Cloning is cheap; clones share the pool and its reaper task, which prunes
/// idle connections per [`PoolConfig`] until [`Db::close`].
#[derive(Clone)]
pub struct Db {
    pool: Pool,
    pool_config: PoolConfig,
    log: LogConfig,
    reaper: Arc<JoinHandle<()>>,
}

impl Db {
    fn start(pool: Pool, pool_config: PoolConfig, log: LogConfig) -> Self {
        let reaper = spawn_reaper(
            pool.clone(),
            pool_config.clone(),
            pool_config.reap_interval(),
        );
        Self {
            pool,
            pool_config,
            log,
            reaper: Arc::new(reaper),
        }
    }

    /// Connect using a `key=value` DSN and verify the connection.
    ///
    /// `pool_config` defaults to [`PoolConfig::default`]. Host resolution runs
    /// on the blocking thread pool.
    pub async fn connect(
        dsn: &str,
        log: LogConfig,
        pool_config: Option<PoolConfig>,
    ) -> KitResult<Self> {
        let owned = dsn.to_string();
        let config = tokio::task::spawn_blocking(move || PgConfig::parse_dsn(&owned))
            .await
            .map_err(|e| KitError::Connection(format!("DSN parsing task failed: {e}")))??;
        let pool_config = pool_config.unwrap_or_default();
        let pool = create_pool(&config, &pool_config)?;

        let db = Self::start(pool, pool_config, log);
        if let Err(e) = db.ping().await {
            db.close();
            return Err(KitError::Connection(format!(
                "failed to connect to {}: {e}",
                config.target()
            )));
        }

        tracing::info!(
            target: "pgkit.db",
            target_db = %config.target(),
            max_open = db.pool_config.max_open_conns,
            "connected"
        );
        Ok(db)
    }

    /// Wrap an existing pool, verify it, then apply `pool_config`.
    pub async fn from_pool(
        pool: Pool,
        log: LogConfig,
        pool_config: Option<PoolConfig>,
    ) -> KitResult<Self> {
        let pool_config = pool_config.unwrap_or_default();
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| KitError::Connection(format!("failed to ping database: {e}")))?;
        drop(client);

        apply_pool_config(&pool, &pool_config);
        Ok(Self::start(pool, pool_config, log))
    }

    /// Run `SELECT 1` on a pooled connection.
    pub async fn ping(&self) -> KitResult<()> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Close the pool and stop the reaper. Checked-out connections are
    /// dropped when returned.
    pub fn close(self) {
        tracing::debug!(target: "pgkit.db", "closing pool");
        self.reaper.abort();
        self.pool.close();
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log
    }

    /// Start a filter scope over `table`.
    pub fn scope(&self, table: &str) -> Scope {
        Scope::new(table)
    }
}

/// Close an optional handle; `None` is a no-op.
pub fn close(db: Option<Db>) {
    if let Some(db) = db {
        db.close();
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("status", &self.pool.status())
            .field("pool_config", &self.pool_config)
            .field("log", &self.log)
            .finish()
    }
}

impl GenericClient for Db {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> KitResult<Vec<Row>> {
        let client = self.pool.get().await?;
        let start = Instant::now();
        let result = GenericClient::query(&client, sql, params).await;
        self.log.record(sql, params.len(), start.elapsed(), result.is_ok());
        result
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> KitResult<u64> {
        let client = self.pool.get().await?;
        let start = Instant::now();
        let result = GenericClient::execute(&client, sql, params).await;
        self.log.record(sql, params.len(), start.elapsed(), result.is_ok());
        result
    }
}
