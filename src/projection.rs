//! Schema-driven projection.
//!
//! Narrows a full-entity query to exactly the columns a result shape needs.
//! The intersection is computed fresh on every call and always follows the
//! entity's declaration order, so the same entity and shape always produce
//! the same SQL.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnDef, EntityDescription, Shape, ShapeDescription};
use crate::sql::Select;

/// Columns of `entity` that `shape` asks for, in entity declaration order.
///
/// Every shape field must exist on the entity; unknown fields are reported
/// together. An empty intersection is an error rather than a fallback to
/// all columns.
pub fn resolve_columns<'e>(
    entity: &'e EntityDescription,
    shape: &ShapeDescription,
) -> DbResult<Vec<&'e ColumnDef>> {
    let unknown: Vec<&str> = shape
        .fields()
        .iter()
        .filter(|field| entity.field(field).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(DbError::schema_mismatch(
            entity.table(),
            format!(
                "shape '{}' has fields not present on the entity: {}",
                shape.name(),
                unknown.join(", ")
            ),
        ));
    }

    let columns: Vec<&ColumnDef> = entity
        .columns()
        .iter()
        .filter(|c| shape.contains(&c.field))
        .collect();
    if columns.is_empty() {
        return Err(DbError::schema_mismatch(
            entity.table(),
            format!("shape '{}' selects no columns", shape.name()),
        ));
    }
    Ok(columns)
}

/// SELECT over `columns` of `entity`, with no filters yet.
pub fn build_projection<'e>(
    entity: &EntityDescription,
    columns: impl IntoIterator<Item = &'e ColumnDef>,
) -> Select {
    Select::new(entity.table(), columns)
}

/// Projected SELECT for an explicit shape description.
pub fn select_for(entity: &EntityDescription, shape: &ShapeDescription) -> DbResult<Select> {
    let columns = resolve_columns(entity, shape)?;
    tracing::debug!(
        table = entity.table(),
        shape = shape.name(),
        columns = columns.len(),
        "Resolved projection"
    );
    Ok(build_projection(entity, columns))
}

/// Projected SELECT for the shape described by `T`.
pub fn select_for_shape<T: Shape>(entity: &EntityDescription) -> DbResult<Select> {
    select_for(entity, &T::describe())
}
