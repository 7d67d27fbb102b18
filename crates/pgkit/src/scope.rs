//! Chainable filters over a single table.
//!
//! `Scope` collects the filters that list endpoints keep re-implementing: date
//! ranges from query strings, case-insensitive search, optional equality, IN
//! lists, NULL checks, then sorting and paging. Optional inputs are skipped
//! when empty, so handlers can chain every filter unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use pgkit::Scope;
//!
//! let page = Scope::new("visits")
//!     .date_range("DATE(created_at)", &params.start, &params.end)
//!     .ilike("patient_name", &params.q)
//!     .eq("doctor", params.doctor.clone())
//!     .is_null("cancelled_at", true)
//!     .order("created_at DESC")
//!     .paginate::<Visit>(&db, params.page, 25)
//!     .await?;
//! ```
//!
//! Conditions use `?` placeholders (write `??` for the JSON `?` operator).
//! They are joined in call order with `AND` (or `OR` for [`Scope::or_where`])
//! without extra parentheses.

use crate::client::GenericClient;
use crate::error::{KitError, KitResult};
use crate::param::{FilterValue, Param, ParamList};
use crate::placeholder::render_placeholders;
use crate::row::FromRow;
use serde::Serialize;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Clone, Debug)]
struct Clause {
    connector: Connector,
    sql: String,
    params: Vec<Param>,
}

/// What the SELECT list of a rendered statement contains.
#[derive(Clone, Copy, Debug)]
enum Projection<'a> {
    Rows,
    Count,
    Sum(&'a str),
    Avg(&'a str),
}

/// A set of filters and options over one table.
#[derive(Clone, Debug)]
#[must_use]
pub struct Scope {
    table: String,
    select_cols: Vec<String>,
    distinct: bool,
    joins: Vec<Clause>,
    conditions: Vec<Clause>,
    order_clauses: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Scope {
    /// Start a scope over `table` (any FROM expression, e.g. `"users u"`).
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select_cols: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            conditions: Vec::new(),
            order_clauses: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    fn push_condition(mut self, connector: Connector, sql: String, params: Vec<Param>) -> Self {
        self.conditions.push(Clause {
            connector,
            sql,
            params,
        });
        self
    }

    fn and(self, sql: String, params: Vec<Param>) -> Self {
        self.push_condition(Connector::And, sql, params)
    }

    // ==================== Filters ====================

    /// `column = ?`, skipped when `value` is an empty string.
    pub fn eq<T: FilterValue>(self, column: &str, value: T) -> Self {
        if value.is_empty_sentinel() {
            return self;
        }
        self.and(format!("{column} = ?"), vec![Param::new(value)])
    }

    /// `column != ?`, skipped when `value` is an empty string.
    pub fn not_eq<T: FilterValue>(self, column: &str, value: T) -> Self {
        if value.is_empty_sentinel() {
            return self;
        }
        self.and(format!("{column} != ?"), vec![Param::new(value)])
    }

    /// Case-insensitive substring match: `column ILIKE '%value%'`.
    ///
    /// Skipped when `value` is empty.
    pub fn ilike(self, column: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.and(
            format!("{column} ILIKE ?"),
            vec![Param::new(format!("%{value}%"))],
        )
    }

    /// Match a key of a JSON/JSONB column: `column->>? = ?`.
    pub fn json_filter<T>(self, column: &str, key: &str, value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.and(
            format!("{column}->>? = ?"),
            vec![Param::new(key.to_string()), Param::new(value)],
        )
    }

    /// Date range over `column` (e.g. `"DATE(created_at)"`).
    ///
    /// Bounds are `YYYY-MM-DD` strings, cast to `DATE` by the server.
    /// Both bounds give `BETWEEN`, one bound gives `>=` / `<=`, and two empty
    /// strings leave the scope unchanged.
    pub fn date_range(self, column: &str, start: &str, end: &str) -> Self {
        self.bounded(column, "?::TEXT::DATE", non_empty(start), non_empty(end))
    }

    /// Range over a numeric or date column; `None` means unbounded.
    pub fn in_range<T>(self, column: &str, start: Option<T>, end: Option<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.bounded(column, "?", start, end)
    }

    /// Like [`Scope::date_range`] with both bounds truncated to the month.
    pub fn month_range(self, column: &str, start: &str, end: &str) -> Self {
        self.bounded(
            column,
            "DATE_TRUNC('month', ?::TEXT::DATE)",
            non_empty(start),
            non_empty(end),
        )
    }

    /// Like [`Scope::date_range`] with both bounds truncated to the year.
    pub fn year_range(self, column: &str, start: &str, end: &str) -> Self {
        self.bounded(
            column,
            "DATE_TRUNC('year', ?::TEXT::DATE)",
            non_empty(start),
            non_empty(end),
        )
    }

    fn bounded<T>(self, column: &str, bound: &str, start: Option<T>, end: Option<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        match (start, end) {
            (Some(start), Some(end)) => self.and(
                format!("{column} BETWEEN {bound} AND {bound}"),
                vec![Param::new(start), Param::new(end)],
            ),
            (Some(start), None) => {
                self.and(format!("{column} >= {bound}"), vec![Param::new(start)])
            }
            (None, Some(end)) => self.and(format!("{column} <= {bound}"), vec![Param::new(end)]),
            (None, None) => self,
        }
    }

    /// `column IN (?, ?, ...)`, skipped when `values` is empty.
    pub fn in_list<T>(self, column: &str, values: Vec<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.list(column, "IN", values)
    }

    /// `column NOT IN (?, ?, ...)`, skipped when `values` is empty.
    pub fn not_in<T>(self, column: &str, values: Vec<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.list(column, "NOT IN", values)
    }

    fn list<T>(self, column: &str, op: &str, values: Vec<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        if values.is_empty() {
            return self;
        }
        let marks = vec!["?"; values.len()].join(", ");
        let params = values.into_iter().map(Param::new).collect();
        self.and(format!("{column} {op} ({marks})"), params)
    }

    /// `column IS NULL` when `is_null`, otherwise `column IS NOT NULL`.
    pub fn is_null(self, column: &str, is_null: bool) -> Self {
        let check = if is_null { "IS NULL" } else { "IS NOT NULL" };
        self.and(format!("{column} {check}"), Vec::new())
    }

    /// `column = ?` for every entry, in iteration order.
    ///
    /// Values are bound as given; empty strings are **not** skipped here.
    pub fn complex_filter<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (S, Param)>,
        S: AsRef<str>,
    {
        for (column, value) in conditions {
            self = self.and(format!("{} = ?", column.as_ref()), vec![value]);
        }
        self
    }

    /// Arbitrary `?` template joined with `AND`.
    pub fn raw(self, sql: &str, values: impl IntoIterator<Item = Param>) -> Self {
        self.and(sql.to_string(), values.into_iter().collect())
    }

    /// Arbitrary `?` template joined with `OR`. Skipped when `values` is empty.
    pub fn or_where(self, sql: &str, values: impl IntoIterator<Item = Param>) -> Self {
        let params: Vec<Param> = values.into_iter().collect();
        if params.is_empty() {
            return self;
        }
        self.push_condition(Connector::Or, sql.to_string(), params)
    }

    // ==================== Shape ====================

    /// `SELECT DISTINCT column`. Skipped when `column` is empty.
    pub fn distinct(mut self, column: &str) -> Self {
        if column.is_empty() {
            return self;
        }
        self.distinct = true;
        self.select_cols = vec![column.to_string()];
        self
    }

    /// Replace the SELECT list. Skipped when `columns` is empty.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cols: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        if !cols.is_empty() {
            self.select_cols = cols;
        }
        self
    }

    /// Add a JOIN clause verbatim, e.g. `"LEFT JOIN orders o ON o.user_id = u.id AND o.status = ?"`.
    pub fn joins(mut self, clause: &str, values: impl IntoIterator<Item = Param>) -> Self {
        self.joins.push(Clause {
            connector: Connector::And,
            sql: clause.to_string(),
            params: values.into_iter().collect(),
        });
        self
    }

    /// Add an ORDER BY item, e.g. `"created_at DESC"`. Skipped when empty.
    pub fn order(mut self, clause: &str) -> Self {
        if !clause.is_empty() {
            self.order_clauses.push(clause.to_string());
        }
        self
    }

    /// Set LIMIT. Values `<= 0` are ignored.
    pub fn limit(mut self, n: i64) -> Self {
        if n > 0 {
            self.limit = Some(n);
        }
        self
    }

    /// Set OFFSET. Values `<= 0` are ignored.
    pub fn offset(mut self, n: i64) -> Self {
        if n > 0 {
            self.offset = Some(n);
        }
        self
    }

    /// Whether any WHERE condition has been added.
    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    // ==================== Build helpers ====================

    fn push_clauses(sql: &mut String, params: &mut ParamList, clauses: &[Clause], where_: bool) {
        for (i, clause) in clauses.iter().enumerate() {
            let sep = match (where_, i, clause.connector) {
                (false, _, _) => " ",
                (true, 0, _) => " WHERE ",
                (true, _, Connector::And) => " AND ",
                (true, _, Connector::Or) => " OR ",
            };
            sql.push_str(sep);
            sql.push_str(&clause.sql);
            for p in &clause.params {
                params.push_param(p.clone());
            }
        }
    }

    fn build_select(&self, projection: Projection<'_>) -> (String, ParamList) {
        let mut params = ParamList::new();

        let cols = if self.select_cols.is_empty() {
            "*".to_string()
        } else {
            self.select_cols.join(", ")
        };
        let select_part = match projection {
            Projection::Rows if self.distinct => format!("DISTINCT {cols}"),
            Projection::Rows => cols,
            Projection::Count if self.distinct => format!("COUNT(DISTINCT {cols})"),
            Projection::Count => "COUNT(*)".to_string(),
            Projection::Sum(column) => format!("COALESCE(SUM({column}), 0)::BIGINT"),
            Projection::Avg(column) => format!("COALESCE(AVG({column}), 0)::DOUBLE PRECISION"),
        };

        let mut sql = format!("SELECT {select_part} FROM {}", self.table);
        Self::push_clauses(&mut sql, &mut params, &self.joins, false);
        Self::push_clauses(&mut sql, &mut params, &self.conditions, true);

        if matches!(projection, Projection::Rows) {
            if !self.order_clauses.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&self.order_clauses.join(", "));
            }
            if let Some(limit) = self.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        (sql, params)
    }

    fn build_delete(&self) -> (String, ParamList) {
        let mut params = ParamList::new();
        let mut sql = format!("DELETE FROM {}", self.table);
        Self::push_clauses(&mut sql, &mut params, &self.conditions, true);
        (sql, params)
    }

    /// Render `?` markers and check they line up with the bound values.
    fn prepare(&self, (sql, params): (String, ParamList)) -> KitResult<(String, ParamList)> {
        let (rendered, count) = render_placeholders(&sql, 0);
        if count != params.len() {
            return Err(KitError::validation(format!(
                "Scope({}): placeholders({count}) != params({})",
                self.table,
                params.len()
            )));
        }
        Ok((rendered, params))
    }

    /// The SELECT statement with `$n` placeholders.
    pub fn to_sql(&self) -> String {
        render_placeholders(&self.build_select(Projection::Rows).0, 0).0
    }

    /// The COUNT statement with `$n` placeholders.
    pub fn to_count_sql(&self) -> String {
        render_placeholders(&self.build_select(Projection::Count).0, 0).0
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> ParamList {
        self.build_select(Projection::Rows).1
    }

    // ==================== Execution ====================

    /// Fetch all matching rows.
    pub async fn find(&self, conn: &impl GenericClient) -> KitResult<Vec<Row>> {
        let (sql, params) = self.prepare(self.build_select(Projection::Rows))?;
        conn.query(&sql, &params.as_refs()).await
    }

    /// Fetch all matching rows mapped to `T`.
    pub async fn find_as<T: FromRow>(&self, conn: &impl GenericClient) -> KitResult<Vec<T>> {
        let rows = self.find(conn).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Fetch the first matching row (`NotFound` if none).
    ///
    /// Rows come back in the scope's ORDER BY; add one for a stable "first".
    pub async fn first(&self, conn: &impl GenericClient) -> KitResult<Row> {
        let scoped = self.clone().limit(1);
        let (sql, params) = scoped.prepare(scoped.build_select(Projection::Rows))?;
        conn.query_one(&sql, &params.as_refs()).await
    }

    /// Fetch the first matching row mapped to `T`.
    pub async fn first_as<T: FromRow>(&self, conn: &impl GenericClient) -> KitResult<T> {
        let row = self.first(conn).await?;
        T::from_row(&row)
    }

    /// Count matching rows. ORDER BY, LIMIT and OFFSET are ignored.
    pub async fn count(&self, conn: &impl GenericClient) -> KitResult<i64> {
        let (sql, params) = self.prepare(self.build_select(Projection::Count))?;
        let row = conn.query_one(&sql, &params.as_refs()).await?;
        Ok(row.try_get(0)?)
    }

    /// Sum of `column` over matching rows; `0` when nothing matches.
    pub async fn sum(&self, conn: &impl GenericClient, column: &str) -> KitResult<i64> {
        let (sql, params) = self.prepare(self.build_select(Projection::Sum(column)))?;
        let row = conn.query_one(&sql, &params.as_refs()).await?;
        Ok(row.try_get(0)?)
    }

    /// Average of `column` over matching rows; `0.0` when nothing matches.
    pub async fn avg(&self, conn: &impl GenericClient, column: &str) -> KitResult<f64> {
        let (sql, params) = self.prepare(self.build_select(Projection::Avg(column)))?;
        let row = conn.query_one(&sql, &params.as_refs()).await?;
        Ok(row.try_get(0)?)
    }

    /// Delete matching rows and return how many were removed.
    ///
    /// Refuses to run without a condition, and with joins.
    pub async fn delete(&self, conn: &impl GenericClient) -> KitResult<u64> {
        if self.conditions.is_empty() {
            return Err(KitError::validation(format!(
                "refusing to DELETE FROM {} without conditions",
                self.table
            )));
        }
        if !self.joins.is_empty() {
            return Err(KitError::validation("DELETE does not support joins"));
        }
        let (sql, params) = self.prepare(self.build_delete())?;
        conn.execute(&sql, &params.as_refs()).await
    }

    /// Fetch one page of results together with the total count.
    ///
    /// `page` is 1-based; values below 1 are treated as 1. `page_size` is
    /// clamped to at least 1. Any LIMIT/OFFSET already on the scope is replaced.
    pub async fn paginate<T: FromRow>(
        &self,
        conn: &impl GenericClient,
        page: i64,
        page_size: i64,
    ) -> KitResult<Paginated<T>> {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let count = self.count(conn).await?;

        let mut scoped = self.clone();
        scoped.limit = Some(page_size);
        scoped.offset = page_offset(page, page_size);
        let results = scoped.find_as::<T>(conn).await?;

        Ok(Paginated::new(page, page_size, count, results))
    }
}

/// OFFSET for a 1-based page; `None` for the first page.
fn page_offset(page: i64, page_size: i64) -> Option<i64> {
    Some((page - 1).saturating_mul(page_size)).filter(|&o| o > 0)
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// One page of results plus paging metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_prev: bool,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Derive the paging metadata for `results` taken from `count` rows.
    pub fn new(page: i64, page_size: i64, count: i64, results: Vec<T>) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        Self {
            page,
            page_size,
            total_pages: count / page_size + i64::from(count % page_size != 0),
            count,
            has_next: page.saturating_mul(page_size) < count,
            has_prev: page > 1,
            results,
        }
    }

    /// Map the page's results, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            count: self.count,
            has_next: self.has_next,
            has_prev: self.has_prev,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
