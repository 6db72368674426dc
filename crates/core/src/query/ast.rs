//! Parsed statements. Callers build these directly — the engine's boundary
//! is the AST, not SQL text. Each statement renders back to SQL via
//! `Display` so error messages can carry the query being executed.

use core::fmt;

use itertools::Itertools;
use sqlfake_lib::expr::{ColumnRef, Expr};
use sqlfake_lib::row::Row;

/// One `SET` assignment: `column = expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnRef,
    pub value: Expr,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: Expr) -> Self {
        Assignment {
            column: ColumnRef::new(column),
            value,
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column.qualified_name(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByRule {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl OrderByRule {
    pub fn asc(expr: Expr) -> Self {
        OrderByRule {
            expr,
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        OrderByRule {
            expr,
            direction: OrderDirection::Desc,
        }
    }
}

impl fmt::Display for OrderByRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        write!(f, "{} {dir}", self.expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: usize,
    pub row_count: usize,
}

impl Limit {
    pub fn new(row_count: usize) -> Self {
        Limit {
            offset: 0,
            row_count,
        }
    }

    pub fn with_offset(offset: usize, row_count: usize) -> Self {
        Limit { offset, row_count }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "LIMIT {}", self.row_count)
        } else {
            write!(f, "LIMIT {}, {}", self.offset, self.row_count)
        }
    }
}

fn fmt_tail(
    f: &mut fmt::Formatter<'_>,
    where_clause: &Option<Expr>,
    order_by: &[OrderByRule],
    limit: &Option<Limit>,
) -> fmt::Result {
    if let Some(clause) = where_clause {
        write!(f, " WHERE {clause}")?;
    }
    if !order_by.is_empty() {
        write!(f, " ORDER BY {}", order_by.iter().format(", "))?;
    }
    if let Some(limit) = limit {
        write!(f, " {limit}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByRule>,
    pub limit: Option<Limit>,
}

impl SelectStatement {
    pub fn new(table: impl Into<String>) -> Self {
        SelectStatement {
            table: table.into(),
            ..SelectStatement::default()
        }
    }

    pub fn filter(mut self, clause: Expr) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn order_by(mut self, rule: OrderByRule) -> Self {
        self.order_by.push(rule);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT * FROM {}", self.table)?;
        fmt_tail(f, &self.where_clause, &self.order_by, &self.limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByRule>,
    pub limit: Option<Limit>,
    /// `UPDATE IGNORE`: rows that would violate a unique key are skipped.
    pub ignore: bool,
}

impl UpdateStatement {
    pub fn new(table: impl Into<String>, assignments: Vec<Assignment>) -> Self {
        UpdateStatement {
            table: table.into(),
            assignments,
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            ignore: false,
        }
    }

    pub fn filter(mut self, clause: Expr) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn order_by(mut self, rule: OrderByRule) -> Self {
        self.order_by.push(rule);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }
}

impl fmt::Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UPDATE {}{} SET {}",
            if self.ignore { "IGNORE " } else { "" },
            self.table,
            self.assignments.iter().format(", ")
        )?;
        fmt_tail(f, &self.where_clause, &self.order_by, &self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByRule>,
    pub limit: Option<Limit>,
}

impl DeleteStatement {
    pub fn new(table: impl Into<String>) -> Self {
        DeleteStatement {
            table: table.into(),
            ..DeleteStatement::default()
        }
    }

    pub fn filter(mut self, clause: Expr) -> Self {
        self.where_clause = Some(clause);
        self
    }

    pub fn order_by(mut self, rule: OrderByRule) -> Self {
        self.order_by.push(rule);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl fmt::Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;
        fmt_tail(f, &self.where_clause, &self.order_by, &self.limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub rows: Vec<Row>,
    /// `INSERT IGNORE`: conflicting rows are skipped.
    pub ignore: bool,
    /// `ON DUPLICATE KEY UPDATE` assignments; `VALUES(col)` inside them
    /// reads the row that would have been inserted.
    pub on_duplicate: Option<Vec<Assignment>>,
}

impl InsertStatement {
    pub fn new(table: impl Into<String>, rows: Vec<Row>) -> Self {
        InsertStatement {
            table: table.into(),
            rows,
            ignore: false,
            on_duplicate: None,
        }
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn on_duplicate(mut self, assignments: Vec<Assignment>) -> Self {
        self.on_duplicate = Some(assignments);
        self
    }
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "INSERT {}INTO {} ({} rows)",
            if self.ignore { "IGNORE " } else { "" },
            self.table,
            self.rows.len()
        )?;
        if let Some(assignments) = &self.on_duplicate {
            write!(
                f,
                " ON DUPLICATE KEY UPDATE {}",
                assignments.iter().format(", ")
            )?;
        }
        Ok(())
    }
}
