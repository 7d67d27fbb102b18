//! # pgkit
//!
//! Small PostgreSQL helpers for report and list endpoints.
//!
//! ## Features
//!
//! - **Fragment builder**: [`QueryBuilder`] appends optional `WHERE` filters,
//!   `GROUP BY` and `ORDER BY` to a hand-written base statement
//! - **Empty-string sentinel**: a filter whose value is `""` is skipped, so
//!   optional request parameters need no `if` around them. Values are bound by
//!   ownership: pass an owned `String` (or a `&'static str`), not a borrow
//! - **Filter scopes**: [`Scope`] chains date ranges, ILIKE search, IN lists and
//!   NULL checks over one table, with [`Paginated`] results
//! - **Connection setup**: `key=value` DSN parsing and a tuned pool behind [`Db`]
//!
//! ## Fragment builder
//!
//! ```ignore
//! use pgkit::QueryBuilder;
//!
//! let mut qb = QueryBuilder::new("SELECT doctor, SUM(total_amount) AS total FROM income");
//! qb.filter("doctor=?", doctor)          // skipped when doctor == ""
//!     .filter("billable_type=?", category)
//!     .group_by(["doctor"])
//!     .order_by(["total DESC"]);
//!
//! let (query, args) = qb.build();        // "... WHERE doctor=? GROUP BY doctor ORDER BY total DESC"
//! let rows = qb.fetch_all(&db).await?;   // runs with $1, $2 ...
//! ```
//!
//! ## Connecting
//!
//! ```ignore
//! use pgkit::{Db, LogConfig};
//!
//! let db = Db::connect(
//!     "dbname=app user=postgres password=postgres host=localhost TimeZone=UTC",
//!     LogConfig::default(),
//!     None,
//! )
//! .await?;
//! ```

pub mod client;
pub mod dsn;
pub mod error;
pub mod param;
pub mod placeholder;
pub mod query_builder;
pub mod row;
pub mod scope;

pub use client::GenericClient;
pub use dsn::PgConfig;
pub use error::{DsnError, KitError, KitResult};
pub use param::{FilterValue, Param, ParamList};
pub use placeholder::render_placeholders;
pub use query_builder::QueryBuilder;
pub use row::{FromRow, RowExt};
pub use scope::{Paginated, Scope};

#[cfg(feature = "pool")]
pub mod db;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use db::{Db, LogConfig, close};

#[cfg(feature = "pool")]
pub use pool::{PoolConfig, apply_pool_config, create_pool, prune_idle, spawn_reaper};
