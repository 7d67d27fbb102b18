//! Fragment builder for hand-written report queries.
//!
//! Start from a complete base statement and append optional filters, then
//! `GROUP BY` / `ORDER BY`. Filters whose value is an empty string are
//! skipped, so optional request parameters (as owned `String`s) need no
//! surrounding `if`.
//!
//! # Example
//!
//! ```ignore
//! use pgkit::QueryBuilder;
//!
//! let mut qb = QueryBuilder::new(
//!     "SELECT DATE_TRUNC('year', date) AS date, billable_type, doctor, \
//!      SUM(total_amount) AS total_amount FROM income_per_billable",
//! );
//!
//! qb.filter("doctor=?", doctor)
//!     .filter("billable_type=?", category)
//!     .filter("DATE_PART('year', date)=?", period)
//!     .group_by(["DATE_TRUNC('year', date)", "billable_type", "doctor"])
//!     .order_by(["total_amount DESC", "DATE_TRUNC('year', date)", "billable_type"]);
//!
//! let (query, args) = qb.build();
//! let rows = qb.fetch_all(&db).await?;
//! ```

use crate::client::GenericClient;
use crate::error::KitResult;
use crate::param::{FilterValue, ParamList};
use crate::placeholder::render_placeholders;
use crate::row::FromRow;
use tokio_postgres::Row;

/// Accumulates a SQL statement and its positional arguments.
///
/// Every method is infallible. Nothing checks that a condition contains a
/// placeholder or that `group_by` is called only once; misuse produces
/// malformed SQL, which the database reports when the query runs.
#[derive(Clone, Debug)]
#[must_use]
pub struct QueryBuilder {
    query: String,
    args: ParamList,
}

impl QueryBuilder {
    /// Start from a base statement, e.g. `SELECT ... FROM table`.
    pub fn new(base_query: impl Into<String>) -> Self {
        Self {
            query: base_query.into(),
            args: ParamList::new(),
        }
    }

    /// Append a condition with a single `?` placeholder bound to `value`.
    ///
    /// The first accepted condition is joined with `WHERE`, later ones with
    /// `AND`. If `value` is an empty string the call does nothing.
    pub fn filter<T: FilterValue>(&mut self, condition: &str, value: T) -> &mut Self {
        if value.is_empty_sentinel() {
            return self;
        }

        self.query.push_str(if self.args.is_empty() {
            " WHERE "
        } else {
            " AND "
        });
        self.query.push_str(condition);
        self.args.push(value);
        self
    }

    /// Append `GROUP BY` with the columns joined by `", "`. No-op when empty.
    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_column_clause(" GROUP BY ", columns)
    }

    /// Append `ORDER BY` with the columns joined by `", "`. No-op when empty.
    pub fn order_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_column_clause(" ORDER BY ", columns)
    }

    fn push_column_clause<I, S>(&mut self, keyword: &str, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns = columns.into_iter();
        let Some(first) = columns.next() else {
            return self;
        };

        self.query.push_str(keyword);
        self.query.push_str(first.as_ref());
        for column in columns {
            self.query.push_str(", ");
            self.query.push_str(column.as_ref());
        }
        self
    }

    /// Snapshot of the query text and its arguments.
    ///
    /// Placeholders are returned exactly as written; see [`QueryBuilder::to_sql`]
    /// for the PostgreSQL rendering.
    pub fn build(&self) -> (String, ParamList) {
        (self.query.clone(), self.args.clone())
    }

    /// The query text as accumulated so far.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The arguments accepted so far, in placeholder order.
    pub fn args(&self) -> &ParamList {
        &self.args
    }

    /// Consume the builder into its query text and arguments.
    pub fn into_parts(self) -> (String, ParamList) {
        (self.query, self.args)
    }

    /// Render the query with `$1, $2, ...` in place of `?`.
    pub fn to_sql(&self) -> String {
        render_placeholders(&self.query, 0).0
    }

    // ==================== Execution ====================

    /// Execute the query and return all rows.
    pub async fn fetch_all(&self, conn: &impl GenericClient) -> KitResult<Vec<Row>> {
        let sql = self.to_sql();
        conn.query(&sql, &self.args.as_refs()).await
    }

    /// Execute the query and map every row to `T`.
    pub async fn fetch_all_as<T: FromRow>(&self, conn: &impl GenericClient) -> KitResult<Vec<T>> {
        let rows = self.fetch_all(conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Execute the query and return the first row (`NotFound` if none).
    pub async fn fetch_one(&self, conn: &impl GenericClient) -> KitResult<Row> {
        let sql = self.to_sql();
        conn.query_one(&sql, &self.args.as_refs()).await
    }

    /// Execute the query and map the first row to `T`.
    pub async fn fetch_one_as<T: FromRow>(&self, conn: &impl GenericClient) -> KitResult<T> {
        let row = self.fetch_one(conn).await?;
        T::from_row(&row)
    }

    /// Execute the query and return the first row, if any.
    pub async fn fetch_opt(&self, conn: &impl GenericClient) -> KitResult<Option<Row>> {
        let sql = self.to_sql();
        conn.query_opt(&sql, &self.args.as_refs()).await
    }

    /// Execute the query and map the first row, if any, to `T`.
    pub async fn fetch_opt_as<T: FromRow>(
        &self,
        conn: &impl GenericClient,
    ) -> KitResult<Option<T>> {
        let row = self.fetch_opt(conn).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Execute the statement and return the affected row count.
    pub async fn execute(&self, conn: &impl GenericClient) -> KitResult<u64> {
        let sql = self.to_sql();
        conn.execute(&sql, &self.args.as_refs()).await
    }
}
