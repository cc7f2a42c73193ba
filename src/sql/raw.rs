//! Raw SQL statements and fragments.
//!
//! Raw text always uses `?` placeholders, whatever the backend. They are
//! renumbered to `$n` for PostgreSQL at compile time. Placeholders inside
//! string literals, quoted identifiers and comments are left alone.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) to decide whether a statement
//! produces rows and to check that filter fragments are a single expression.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Param};
use crate::sql::{Compiled, Executable, SqlWriter};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// Whether a statement is fetched for rows or executed for a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, SHOW, EXPLAIN, PRAGMA, or any write with RETURNING
    Rows,
    /// INSERT, UPDATE, DELETE, DDL and everything else
    Write,
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Classify raw SQL text.
///
/// With several statements the last one decides. Text the parser rejects
/// (vendor syntax it does not know) falls back to its leading keyword; the
/// database remains the judge of whether it is valid.
pub fn classify(sql: &str, db_type: DatabaseType) -> StatementKind {
    let dialect = get_dialect(db_type);
    let returns_rows = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => statements.last().is_some_and(statement_returns_rows),
        Err(_) => leading_keyword_returns_rows(sql),
    };

    if returns_rows || has_returning_clause(sql, db_type) {
        StatementKind::Rows
    } else {
        StatementKind::Write
    }
}

fn statement_returns_rows(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::Query(_)
            | Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowDatabases { .. }
            | Statement::ShowSchemas { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowFunctions { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowVariables { .. }
            | Statement::ShowStatus { .. }
            | Statement::ShowCollation { .. }
            | Statement::ExplainTable { .. }
            | Statement::Explain { .. }
            | Statement::Pragma { .. }
    )
}

fn leading_keyword_returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first.as_str(),
        "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" | "PRAGMA" | "DESCRIBE" | "DESC"
    )
}

fn has_returning_clause(sql: &str, db_type: DatabaseType) -> bool {
    let mut word = String::new();
    let mut found = false;
    scan_code(sql, db_type == DatabaseType::MySQL, |_, c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            found |= word.eq_ignore_ascii_case("RETURNING");
            word.clear();
        }
    });
    found || word.eq_ignore_ascii_case("RETURNING")
}

/// Call `on_code` for every character outside literals, quoted identifiers
/// and comments. Quoted regions are reported as a single space so they still
/// separate words.
fn scan_code(sql: &str, backslash_escapes: bool, mut on_code: impl FnMut(usize, char)) {
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                // a doubled quote re-enters the literal on the next iteration
                while let Some((_, d)) = chars.next() {
                    if backslash_escapes && c == '\'' && d == '\\' {
                        chars.next();
                    } else if d == c {
                        break;
                    }
                }
                on_code(i, ' ');
            }
            '-' if chars.peek().is_some_and(|&(_, d)| d == '-') => {
                for (_, d) in chars.by_ref() {
                    if d == '\n' {
                        break;
                    }
                }
                on_code(i, ' ');
            }
            '/' if chars.peek().is_some_and(|&(_, d)| d == '*') => {
                chars.next();
                let mut prev = '\0';
                for (_, d) in chars.by_ref() {
                    if prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
                on_code(i, ' ');
            }
            _ => on_code(i, c),
        }
    }
}

/// Byte offsets of `?` placeholders.
fn placeholder_offsets(sql: &str, backslash_escapes: bool) -> Vec<usize> {
    let mut offsets = Vec::new();
    scan_code(sql, backslash_escapes, |i, c| {
        if c == '?' {
            offsets.push(i);
        }
    });
    offsets
}

fn check_param_count(sql: &str, expected: usize, found: usize) -> DbResult<()> {
    if expected != found {
        return Err(DbError::invalid_input(format!(
            "SQL has {expected} placeholder(s) but {found} parameter(s) were given: {sql}"
        )));
    }
    Ok(())
}

/// Check that `sql` is one well-formed boolean expression with exactly
/// `param_count` placeholders.
pub(crate) fn validate_fragment(sql: &str, param_count: usize) -> DbResult<()> {
    if sql.trim().is_empty() {
        return Err(DbError::invalid_input("Empty SQL fragment"));
    }

    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(sql)
        .map_err(|e| DbError::invalid_input(format!("Failed to parse SQL fragment: {e}")))?;
    parser
        .parse_expr()
        .map_err(|e| DbError::invalid_input(format!("Failed to parse SQL fragment: {e}")))?;
    if parser.peek_token().token != Token::EOF {
        return Err(DbError::invalid_input(format!(
            "SQL fragment must be a single expression: {sql}"
        )));
    }

    check_param_count(sql, placeholder_offsets(sql, false).len(), param_count)
}

/// Append a validated fragment, binding its parameters in order.
pub(crate) fn write_fragment(w: &mut SqlWriter, sql: &str, params: &[Param]) -> DbResult<()> {
    let offsets = placeholder_offsets(sql, w.db() == DatabaseType::MySQL);
    check_param_count(sql, offsets.len(), params.len())?;

    let mut start = 0;
    for (offset, param) in offsets.into_iter().zip(params) {
        w.push(&sql[start..offset]);
        w.push_param(param.clone());
        start = offset + 1;
    }
    w.push(&sql[start..]);
    Ok(())
}

/// A complete SQL statement supplied as text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    sql: String,
    params: Vec<Param>,
    kind: Option<StatementKind>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: None,
        }
    }

    pub fn with_params<P: Into<Param>>(
        sql: impl Into<String>,
        params: impl IntoIterator<Item = P>,
    ) -> Self {
        Self {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
            kind: None,
        }
    }

    /// Bind the next `?` placeholder.
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Skip classification and treat the statement as `kind`.
    pub fn kind(mut self, kind: StatementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl Executable for RawSql {
    fn compile(&self, db: DatabaseType) -> DbResult<Compiled> {
        let kind = self.kind.unwrap_or_else(|| classify(&self.sql, db));
        let mut w = SqlWriter::new(db);
        write_fragment(&mut w, &self.sql, &self.params)?;
        Ok(w.finish(kind == StatementKind::Rows))
    }
}
