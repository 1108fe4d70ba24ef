use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::db::DbPool;
use crate::error::FarmHubResult;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE: i64 = 1_000_000;

/// Query parameters every list endpoint accepts.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).max(0).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

impl ListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page.unwrap_or(1).clamp(1, MAX_PAGE),
            page_size: self
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Builds an ORDER BY list from `ordering=a,-b`. Only names in `allowed`
    /// (public name, column) are honoured; unknown names are ignored.
    pub fn order_by(&self, allowed: &[(&str, &str)], default: &str, tiebreak: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(raw) = self.ordering.as_deref() {
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (name, desc) = match item.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (item, false),
                };
                if let Some((_, column)) = allowed.iter().find(|(public, _)| *public == name) {
                    parts.push(format!("{} {}", column, if desc { "DESC" } else { "ASC" }));
                }
            }
        }
        if parts.is_empty() {
            parts.push(default.to_string());
        }
        parts.push(tiebreak.to_string());
        parts.join(", ")
    }
}

/// Quotes LIKE wildcards so the term matches literally under `ESCAPE '\'`.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Appends ` AND (col ILIKE $n ESCAPE '\' OR ...)` for a free-text search.
pub fn push_search(qb: &mut QueryBuilder<'_, Postgres>, term: Option<&str>, columns: &[&str]) {
    let Some(term) = term else {
        return;
    };
    if columns.is_empty() {
        return;
    }
    let pattern = like_pattern(term);
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column)
            .push(" ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    qb.push(")");
}

/// Appends ` AND <column> = $n` when a filter value was given.
pub fn push_eq<T>(qb: &mut QueryBuilder<'_, Postgres>, column: &str, value: Option<T>)
where
    T: 'static + Send + for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres>,
{
    if let Some(value) = value {
        qb.push(" AND ").push(column).push(" = ").push_bind(value);
    }
}

/// Runs a scoped, filtered listing twice: once for the total and once for the page.
///
/// `filter` must start with ` WHERE ` and is replayed onto both queries, so it
/// may only bind owned values.
pub async fn fetch_page<T, F>(
    pool: &DbPool,
    select: &str,
    from: &str,
    filter: F,
    order_by: &str,
    pagination: Pagination,
) -> FarmHubResult<Page<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    F: Fn(&mut QueryBuilder<'static, Postgres>),
{
    let mut count_qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("SELECT COUNT(*) ");
    count_qb.push(from);
    filter(&mut count_qb);
    let count: i64 = count_qb.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(select);
    qb.push(" ").push(from);
    filter(&mut qb);
    qb.push(" ORDER BY ").push(order_by);
    qb.push(" LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let results = qb.build_query_as::<T>().fetch_all(pool).await?;

    Ok(Page {
        count,
        page: pagination.page,
        page_size: pagination.page_size,
        results,
    })
}
