//! Bound values shared by the fragment builder and `Scope`.

use std::fmt;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A clone-friendly bound value.
///
/// Builders can be cloned (and `build()` snapshots taken) without copying the
/// underlying values.
#[derive(Clone)]
pub struct Param(Arc<dyn ToSql + Send + Sync>);

impl Param {
    /// Wrap any `ToSql` value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Borrow as the trait object `tokio-postgres` expects.
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Ordered bound values. Position `i` binds placeholder `$i+1`.
#[derive(Clone, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a value and return its 1-based index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.push_param(Param::new(value))
    }

    /// Add a pre-wrapped value and return its 1-based index.
    pub fn push_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(Param::as_sql).collect()
    }

    /// Append another list, keeping order.
    pub fn extend(&mut self, other: &ParamList) {
        self.params.extend(other.params.iter().cloned());
    }
}

impl fmt::Debug for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.params.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a ParamList {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

/// A value that can be used as an optional filter.
///
/// Filters skip a value when [`is_empty_sentinel`](FilterValue::is_empty_sentinel)
/// returns `true`. Only an empty string is the sentinel: `0`, `false` and
/// `None` are real values and are always bound.
///
/// Values are moved into the query, so they must be `'static`: pass an owned
/// `String` (e.g. `params.doctor.clone()`) rather than `&params.doctor`.
pub trait FilterValue: ToSql + Send + Sync + 'static {
    fn is_empty_sentinel(&self) -> bool {
        false
    }
}

impl FilterValue for String {
    fn is_empty_sentinel(&self) -> bool {
        self.is_empty()
    }
}

impl FilterValue for &'static str {
    fn is_empty_sentinel(&self) -> bool {
        self.is_empty()
    }
}

impl FilterValue for Box<str> {
    fn is_empty_sentinel(&self) -> bool {
        self.is_empty()
    }
}

impl FilterValue for std::borrow::Cow<'static, str> {
    fn is_empty_sentinel(&self) -> bool {
        self.is_empty()
    }
}

impl<T: FilterValue> FilterValue for Option<T> {
    fn is_empty_sentinel(&self) -> bool {
        self.as_ref().is_some_and(FilterValue::is_empty_sentinel)
    }
}

macro_rules! never_sentinel {
    ($($ty:ty),* $(,)?) => {
        $(impl FilterValue for $ty {})*
    };
}

never_sentinel!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    std::net::IpAddr,
    std::time::SystemTime,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::DateTime<chrono::Local>,
    uuid::Uuid,
    serde_json::Value,
);

impl<T: ToSql + Send + Sync + 'static> FilterValue for Vec<T> where Vec<T>: ToSql {}
