//! Statements, statement batches and result-shape classification

use crate::Value;

/// Leading keywords of statements that produce a row set.
const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "SHOW", "VALUES", "TABLE", "EXPLAIN"];

/// How the result of a statement should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Rows are fetched and normalized
    Read,
    /// Only the affected row count is reported
    Write,
}

impl StatementKind {
    /// Classify a statement by its text.
    ///
    /// A statement is a read when its first keyword is one of `SELECT`, `WITH`,
    /// `SHOW`, `VALUES`, `TABLE`, `EXPLAIN`, or when it carries a `RETURNING`
    /// clause anywhere in its body.
    pub fn classify(sql: &str) -> Self {
        let upper = sql.to_uppercase();
        let first_word = upper
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("");

        if READ_KEYWORDS.contains(&first_word) || upper.contains("RETURNING") {
            StatementKind::Read
        } else {
            StatementKind::Write
        }
    }

    pub fn returns_rows(&self) -> bool {
        matches!(self, StatementKind::Read)
    }
}

/// Render a statement for log lines, collapsed to one line and truncated to 100 characters.
pub fn preview(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > 100 {
        let truncated: String = collapsed.chars().take(100).collect();
        format!("{}...", truncated)
    } else {
        collapsed
    }
}

/// A single SQL statement with positional parameters (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn kind(&self) -> StatementKind {
        StatementKind::classify(&self.sql)
    }
}

/// Ordered statements executed as one unit of work
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementBatch {
    statements: Vec<Statement>,
}

impl StatementBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement, returning the batch for chaining
    pub fn push(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.statements.push(Statement::new(sql, params));
        self
    }

    pub fn add(&mut self, sql: impl Into<String>, params: Vec<Value>) {
        self.statements.push(Statement::new(sql, params));
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Statement> {
        self.statements.iter()
    }
}

impl FromIterator<Statement> for StatementBatch {
    fn from_iter<I: IntoIterator<Item = Statement>>(iter: I) -> Self {
        Self {
            statements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StatementBatch {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}
