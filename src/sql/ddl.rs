//! `CREATE TABLE` rendering for entity descriptions.

use crate::models::{ColumnDef, ColumnType, DatabaseType, EntityDescription};

/// Render `CREATE TABLE IF NOT EXISTS` for one entity.
///
/// A single autoincrement primary key is declared inline using each
/// backend's native form. Composite keys become a table constraint.
pub fn create_table_sql(entity: &EntityDescription, db: DatabaseType) -> String {
    let pk_count = entity.primary_key().count();
    let mut parts: Vec<String> = entity
        .columns()
        .iter()
        .map(|column| column_sql(column, db, pk_count == 1))
        .collect();

    if pk_count > 1 {
        let keys: Vec<String> = entity
            .primary_key()
            .map(|c| db.quote_ident(&c.name))
            .collect();
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        db.quote_ident(entity.table()),
        parts.join(", ")
    )
}

fn column_sql(column: &ColumnDef, db: DatabaseType, inline_pk: bool) -> String {
    let name = db.quote_ident(&column.name);
    let inline_pk = inline_pk && column.primary_key;

    if inline_pk && column.autoincrement {
        return match db {
            // must be exactly INTEGER to alias the rowid
            DatabaseType::SQLite => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
            DatabaseType::PostgreSQL => match column.column_type {
                ColumnType::Integer => format!("{name} SERIAL PRIMARY KEY"),
                _ => format!("{name} BIGSERIAL PRIMARY KEY"),
            },
            DatabaseType::MySQL => format!(
                "{name} {} NOT NULL AUTO_INCREMENT PRIMARY KEY",
                column.column_type.sql_type(db)
            ),
        };
    }

    let mut sql = format!("{name} {}", column.column_type.sql_type(db));
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if inline_pk {
        sql.push_str(" PRIMARY KEY");
    }
    sql
}
