//! The expression tree the executor evaluates against rows.
//!
//! Callers hand the engine already-parsed expressions; there is no SQL text
//! parser at this layer. Evaluation runs through an [`EvalContext`], which
//! carries the row under inspection plus, during
//! `INSERT ... ON DUPLICATE KEY UPDATE`, the row that would have been
//! inserted (read by `VALUES(col)`).

use core::cmp::Ordering;
use core::fmt;

use itertools::Itertools;

use crate::error::LibError;
use crate::row::Row;
use crate::value::Value;

/// A (possibly table-qualified) column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        ColumnRef {
            table: None,
            column: column.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        match &self.table {
            Some(table) => format!("{table}.{}", self.column),
            None => self.column.clone(),
        }
    }

    fn resolve(&self, ctx: &EvalContext<'_>) -> Result<Value, LibError> {
        if let Some(table) = &self.table {
            let qualified = format!("{table}.{}", self.column);
            if let Some(v) = ctx.row.get(&qualified).or_else(|| ctx.row.get(&self.column)) {
                return Ok(v.clone());
            }
        } else {
            if let Some(v) = ctx.row.get(&self.column) {
                return Ok(v.clone());
            }
            if ctx.fallthrough {
                // Reach across joined tables: any `other_table.column` key
                // satisfies a bare reference.
                let suffix = format!(".{}", self.column);
                if let Some(v) = ctx
                    .row
                    .iter()
                    .find_map(|(name, v)| name.ends_with(&suffix).then_some(v))
                {
                    return Ok(v.clone());
                }
            }
        }
        Err(LibError::UnknownColumn(self.qualified_name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Mul,
    Div,
    And,
    Or,
}

impl BinOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(ColumnRef),
    BinaryOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `VALUES(col)` — valid only inside `ON DUPLICATE KEY UPDATE`.
    Values(ColumnRef),
}

/// Everything an expression can read while being evaluated against one row.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub row: &'a Row,
    /// The row that would have been inserted, exposed to `VALUES(col)`.
    pub values: Option<&'a Row>,
    /// Lets bare column references resolve against qualified keys of joined
    /// rows.
    pub fallthrough: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(row: &'a Row) -> Self {
        EvalContext {
            row,
            values: None,
            fallthrough: false,
        }
    }

    pub fn with_values(row: &'a Row, values: Option<&'a Row>) -> Self {
        EvalContext {
            row,
            values,
            fallthrough: false,
        }
    }

    pub fn with_fallthrough(mut self) -> Self {
        self.fallthrough = true;
        self
    }
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn col(column: impl Into<String>) -> Expr {
        Expr::Column(ColumnRef::new(column))
    }

    pub fn values(column: impl Into<String>) -> Expr {
        Expr::Values(ColumnRef::new(column))
    }

    pub fn binary(self, op: BinOp, rhs: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinOp::Eq, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinOp::Lt, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinOp::Gt, rhs)
    }

    pub fn add(self, rhs: Expr) -> Expr {
        self.binary(BinOp::Plus, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinOp::Or, rhs)
    }

    pub fn in_list(self, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, LibError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(col) => col.resolve(ctx),
            Expr::Values(col) => {
                let values = ctx.values.ok_or(LibError::ValuesOutsideUpsert)?;
                values
                    .get(&col.column)
                    .cloned()
                    .ok_or_else(|| LibError::UnknownColumn(col.qualified_name()))
            }
            Expr::BinaryOp { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx),
            Expr::Not(inner) => {
                let v = inner.evaluate(ctx)?;
                if v.is_null() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Bool(!v.is_truthy()))
                }
            }
            Expr::IsNull { expr, negated } => {
                Ok(Value::Bool(expr.evaluate(ctx)?.is_null() ^ negated))
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let needle = expr.evaluate(ctx)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for candidate in list {
                    let v = candidate.evaluate(ctx)?;
                    if !v.is_null() && needle.compare(&v) == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found ^ negated))
            }
        }
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &EvalContext<'_>,
) -> Result<Value, LibError> {
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = lhs.evaluate(ctx)?.is_truthy();
        // No short-circuit: the fake surfaces evaluation errors from either
        // side, matching a full-scan executor.
        let r = rhs.evaluate(ctx)?.is_truthy();
        return Ok(Value::Bool(match op {
            BinOp::And => l && r,
            _ => l || r,
        }));
    }

    let l = lhs.evaluate(ctx)?;
    let r = rhs.evaluate(ctx)?;
    if l.is_null() || r.is_null() {
        // Three-valued logic collapses to NULL, which is falsy downstream.
        return Ok(Value::Null);
    }

    if op.is_comparison() {
        let ord = l.compare(&r);
        return Ok(Value::Bool(match op {
            BinOp::Eq => ord == Ordering::Equal,
            BinOp::NotEq => ord != Ordering::Equal,
            BinOp::Lt => ord == Ordering::Less,
            BinOp::LtEq => ord != Ordering::Greater,
            BinOp::Gt => ord == Ordering::Greater,
            BinOp::GtEq => ord != Ordering::Less,
            _ => unreachable!(),
        }));
    }

    // Arithmetic. Integer pairs stay integral except for division, which is
    // floating as in MySQL.
    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        match op {
            BinOp::Plus => return Ok(Value::Int(a.wrapping_add(*b))),
            BinOp::Minus => return Ok(Value::Int(a.wrapping_sub(*b))),
            BinOp::Mul => return Ok(Value::Int(a.wrapping_mul(*b))),
            _ => {}
        }
    }
    let a = l.numeric().unwrap_or(0.0);
    let b = r.numeric().unwrap_or(0.0);
    Ok(match op {
        BinOp::Plus => Value::Float(a + b),
        BinOp::Minus => Value::Float(a - b),
        BinOp::Mul => Value::Float(a * b),
        BinOp::Div => {
            if b == 0.0 {
                Value::Null
            } else {
                Value::Float(a / b)
            }
        }
        _ => unreachable!(),
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Null) => f.write_str("NULL"),
            Expr::Literal(Value::Str(s)) => write!(f, "'{s}'"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Column(c) => f.write_str(&c.qualified_name()),
            Expr::BinaryOp { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Not(e) => write!(f, "(NOT {e})"),
            Expr::IsNull { expr, negated } => {
                write!(f, "({expr} IS {}NULL)", if *negated { "NOT " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => write!(
                f,
                "({expr} {}IN ({}))",
                if *negated { "NOT " } else { "" },
                list.iter().format(", ")
            ),
            Expr::Values(c) => write!(f, "VALUES({})", c.qualified_name()),
        }
    }
}
