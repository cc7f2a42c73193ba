//! Offset pagination over a projected SELECT.
//!
//! A page is read with two statements, a count and a window, run in one
//! session under a read-consistent transaction so `total_count` and `items`
//! describe the same snapshot.

use crate::db::Session;
use crate::error::{DbError, DbResult};
use crate::models::{PageRequest, PageResult, Shape};
use crate::sql::{Executable, Select};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Fetch page `page` (1-based) of `size` rows of `base`, converted into `T`.
///
/// The request is validated before any I/O. Pages past the end are empty
/// and still carry the correct `total_count`.
pub async fn fetch_page<T: Shape>(
    session: &mut Session,
    base: &Select,
    page: i64,
    size: i64,
) -> DbResult<PageResult<T>> {
    let request = PageRequest::new(page, size)?;

    let db = session.db_type();
    let count = base.count().compile(db)?;
    let window = base.window(request.offset(), request.size()).compile(db)?;

    let (total_count, rows) = session
        .read_consistent(move |s| {
            Box::pin(async move {
                let total = count_value(s.execute_compiled(&count).await?.scalar())?;
                if request.page() > total.div_ceil(request.size()) {
                    return Ok((total, None));
                }
                let rows = s.execute_compiled(&window).await?;
                Ok((total, Some(rows)))
            })
        })
        .await?;

    let items = match rows {
        Some(rows) => rows.into_shapes::<T>()?,
        None => Vec::new(),
    };
    debug!(
        table = base.table(),
        page = request.page(),
        size = request.size(),
        total_count,
        items = items.len(),
        "Fetched page"
    );
    Ok(PageResult::new(items, total_count, request))
}

/// Read a COUNT(*) result. Drivers report it as an integer, but some
/// decimal-returning setups hand back a string.
fn count_value(value: Option<JsonValue>) -> DbResult<u64> {
    let parsed = match &value {
        Some(JsonValue::Number(n)) => n.as_u64(),
        Some(JsonValue::String(s)) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        DbError::decode(
            "COUNT(*)",
            format!("expected a non-negative integer, got {value:?}"),
        )
    })
}
