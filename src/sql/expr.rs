//! Filter and ordering expressions.

use crate::error::DbResult;
use crate::models::Param;
use crate::sql::SqlWriter;
use crate::sql::raw;

/// Binary operators supported in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    And,
    Or,
}

impl BinaryOp {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::NotEq => " <> ",
            Self::Lt => " < ",
            Self::LtEq => " <= ",
            Self::Gt => " > ",
            Self::GtEq => " >= ",
            Self::Like => " LIKE ",
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// A boolean or scalar SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Value(Param),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Param>,
        negated: bool,
    },
    /// Validated SQL fragment using `?` placeholders.
    Raw { sql: String, params: Vec<Param> },
}

/// Reference a column by its SQL name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// A bound literal value.
pub fn val(value: impl Into<Param>) -> Expr {
    Expr::Value(value.into())
}

impl Expr {
    /// A raw SQL fragment, e.g. `Expr::raw("lower(email) = ?", ["a@b.c"])`.
    ///
    /// The fragment must parse as a single expression and its `?`
    /// placeholders must match `params` one to one.
    pub fn raw<P: Into<Param>>(
        sql: impl Into<String>,
        params: impl IntoIterator<Item = P>,
    ) -> DbResult<Self> {
        let sql = sql.into();
        let params: Vec<Param> = params.into_iter().map(Into::into).collect();
        raw::validate_fragment(&sql, params.len())?;
        Ok(Self::Raw { sql, params })
    }

    /// Compare against another expression, e.g. a second column.
    pub fn compare(self, op: BinaryOp, other: Expr) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::Eq, val(value))
    }

    pub fn ne(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::NotEq, val(value))
    }

    pub fn lt(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::Lt, val(value))
    }

    pub fn le(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::LtEq, val(value))
    }

    pub fn gt(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::Gt, val(value))
    }

    pub fn ge(self, value: impl Into<Param>) -> Self {
        self.compare(BinaryOp::GtEq, val(value))
    }

    pub fn like(self, pattern: impl Into<Param>) -> Self {
        self.compare(BinaryOp::Like, val(pattern))
    }

    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list<P: Into<Param>>(self, values: impl IntoIterator<Item = P>) -> Self {
        Self::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<P: Into<Param>>(self, values: impl IntoIterator<Item = P>) -> Self {
        Self::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn and(self, other: Expr) -> Self {
        self.compare(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.compare(BinaryOp::Or, other)
    }

    pub fn asc(self) -> OrderBy {
        OrderBy {
            expr: self,
            descending: false,
        }
    }

    pub fn desc(self) -> OrderBy {
        OrderBy {
            expr: self,
            descending: true,
        }
    }

    pub(crate) fn write(&self, w: &mut SqlWriter) -> DbResult<()> {
        match self {
            Expr::Column(name) => w.push_ident(name),
            Expr::Value(param) => w.push_value(param),
            Expr::Binary { left, op, right } => {
                let grouped = matches!(op, BinaryOp::And | BinaryOp::Or);
                if grouped {
                    w.push("(");
                }
                left.write(w)?;
                w.push(op.as_sql());
                right.write(w)?;
                if grouped {
                    w.push(")");
                }
            }
            Expr::Not(inner) => {
                w.push("NOT (");
                inner.write(w)?;
                w.push(")");
            }
            Expr::IsNull { expr, negated } => {
                expr.write(w)?;
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                // `x IN ()` is not valid SQL
                if list.is_empty() {
                    w.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                expr.write(w)?;
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                w.push_list(list, ", ", |w, p| {
                    w.push_value(p);
                    Ok(())
                })?;
                w.push(")");
            }
            Expr::Raw { sql, params } => {
                w.push("(");
                raw::write_fragment(w, sql, params)?;
                w.push(")");
            }
        }
        Ok(())
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Not(Box::new(self))
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

impl From<Expr> for OrderBy {
    fn from(expr: Expr) -> Self {
        expr.asc()
    }
}

impl OrderBy {
    pub(crate) fn write(&self, w: &mut SqlWriter) -> DbResult<()> {
        self.expr.write(w)?;
        w.push(if self.descending { " DESC" } else { " ASC" });
        Ok(())
    }
}
