//! Safety gate between generation and execution.
//!
//! Every candidate statement is classified against the request's
//! [`QueryMode`]. A rejected candidate is never raised as an error; it is
//! replaced by a harmless denial `SELECT` so the request still completes
//! with an advisory result.
//!
//! Read mode keeps the keyword blocklist, which denies any statement
//! mentioning a mutating keyword anywhere in its text, and adds a structural
//! check on the parsed statement. Read-write mode relies on the parser alone.

use crate::models::{GeneratedStatement, QueryMode};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Keywords that deny a read-mode statement wherever they appear.
pub const READ_MODE_BLOCKLIST: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE",
];

/// Advisory returned for read-mode denials.
pub const READ_ONLY_ADVISORY: &str = "Only SELECT queries are allowed for read operations";

/// Validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorPolicy {
    /// Deny `UPDATE` and `DELETE` without a `WHERE` clause in read-write mode
    pub require_where_on_mutation: bool,
}

impl Default for ValidatorPolicy {
    fn default() -> Self {
        Self {
            require_where_on_mutation: true,
        }
    }
}

/// Why a candidate statement was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Read mode: the statement does not begin with `SELECT`
    NotSelect,
    /// Read mode: a blocklisted keyword appears in the text
    BlockedKeyword(String),
    /// More than one statement was generated
    MultipleStatements,
    /// The statement kind is not permitted in this mode
    DisallowedStatement(String),
    /// `UPDATE` or `DELETE` without a `WHERE` clause
    MissingWhereClause,
    /// Read-write mode: the statement could not be parsed
    Unparseable,
}

impl DenialReason {
    /// Advisory text placed in the denial statement.
    pub fn advisory(&self) -> &'static str {
        match self {
            Self::NotSelect | Self::BlockedKeyword(_) => READ_ONLY_ADVISORY,
            Self::MultipleStatements => "Only one statement may run per request",
            Self::DisallowedStatement(_) => "This statement type is not allowed in the requested mode",
            Self::MissingWhereClause => "UPDATE and DELETE statements must include a WHERE clause",
            Self::Unparseable => "The generated statement could not be verified as safe",
        }
    }

    /// The harmless statement executed in place of the rejected one.
    pub fn denial_statement(&self) -> String {
        format!("SELECT 1 AS message, '{}' AS note", self.advisory())
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSelect => write!(f, "statement does not start with SELECT"),
            Self::BlockedKeyword(keyword) => write!(f, "blocked keyword {}", keyword),
            Self::MultipleStatements => write!(f, "multiple statements"),
            Self::DisallowedStatement(kind) => write!(f, "{} statements are not allowed", kind),
            Self::MissingWhereClause => write!(f, "mutation without WHERE clause"),
            Self::Unparseable => write!(f, "statement could not be parsed"),
        }
    }
}

/// Outcome of validation. Both variants continue to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(GeneratedStatement),
    Denied {
        reason: DenialReason,
        /// Denial statement to execute instead
        statement: String,
        original: GeneratedStatement,
    },
}

impl ValidationVerdict {
    /// The SQL that must be executed for this verdict.
    pub fn executable_sql(&self) -> &str {
        match self {
            Self::Accepted(statement) => &statement.sql_text,
            Self::Denied { statement, .. } => statement,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Denied { reason, .. } => Some(reason),
        }
    }
}

/// Classifies candidate statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator {
    policy: ValidatorPolicy,
}

impl SqlValidator {
    pub fn new(policy: ValidatorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ValidatorPolicy {
        self.policy
    }

    /// Validates `statement` against the mode of its source request.
    pub fn validate(&self, statement: GeneratedStatement) -> ValidationVerdict {
        let sql = statement.sql_text.trim();
        let check = match statement.source_request.mode {
            QueryMode::ReadOnly => check_read_only(sql),
            QueryMode::ReadWrite => self.check_read_write(sql),
        };

        match check {
            Ok(()) => {
                let sql_text = sql.to_string();
                ValidationVerdict::Accepted(GeneratedStatement {
                    sql_text,
                    ..statement
                })
            }
            Err(reason) => {
                tracing::warn!(
                    "Denied {} statement: {}",
                    statement.source_request.mode,
                    reason
                );
                ValidationVerdict::Denied {
                    statement: reason.denial_statement(),
                    reason,
                    original: statement,
                }
            }
        }
    }

    fn check_read_write(&self, sql: &str) -> Result<(), DenialReason> {
        let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
            tracing::debug!("Read-write statement failed to parse: {}", e);
            DenialReason::Unparseable
        })?;
        if statements.len() != 1 {
            return Err(DenialReason::MultipleStatements);
        }
        let Some(parsed) = statements.pop() else {
            return Err(DenialReason::Unparseable);
        };

        match parsed {
            Statement::Query(query) => {
                if query_writes(&query) {
                    Err(DenialReason::DisallowedStatement(
                        "data-modifying query".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            Statement::Insert(_) => Ok(()),
            Statement::Update { selection, .. } => self.require_where(selection.is_some()),
            Statement::Delete(delete) => self.require_where(delete.selection.is_some()),
            _ => Err(DenialReason::DisallowedStatement(leading_keyword(sql))),
        }
    }

    fn require_where(&self, has_where: bool) -> Result<(), DenialReason> {
        if self.policy.require_where_on_mutation && !has_where {
            Err(DenialReason::MissingWhereClause)
        } else {
            Ok(())
        }
    }
}

fn check_read_only(sql: &str) -> Result<(), DenialReason> {
    let upper = sql.to_ascii_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(DenialReason::NotSelect);
    }
    if let Some(keyword) = READ_MODE_BLOCKLIST.iter().find(|k| upper.contains(*k)) {
        return Err(DenialReason::BlockedKeyword((*keyword).to_string()));
    }

    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) if statements.len() > 1 => Err(DenialReason::MultipleStatements),
        Ok(statements) => match statements.first() {
            Some(Statement::Query(query)) if query_writes(query) => Err(
                DenialReason::DisallowedStatement("SELECT INTO".to_string()),
            ),
            Some(Statement::Query(_)) | None => Ok(()),
            Some(_) => Err(DenialReason::DisallowedStatement(leading_keyword(sql))),
        },
        Err(e) => {
            // The executor still runs this inside a READ ONLY transaction.
            tracing::warn!("Accepting read statement the parser rejected: {}", e);
            Ok(())
        }
    }
}

/// True when a query creates tables or modifies data.
fn query_writes(query: &Query) -> bool {
    let cte_writes = query
        .with
        .as_ref()
        .is_some_and(|with| with.cte_tables.iter().any(|cte| query_writes(&cte.query)));
    cte_writes || set_expr_writes(&query.body)
}

fn set_expr_writes(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => query_writes(query),
        SetExpr::SetOperation { left, right, .. } => set_expr_writes(left) || set_expr_writes(right),
        SetExpr::Values(_) | SetExpr::Table(_) => false,
        _ => true,
    }
}

fn leading_keyword(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphabetic)
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|word| !word.is_empty())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
