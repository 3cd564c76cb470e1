// crates/sqlgate-core/src/query.rs
// ============================================================================
// Module: Compiled Queries and Results
// Description: Query envelopes consumed by drivers and the results they yield.
// Purpose: Decouple the query builder from statement execution.
// Dependencies: serde, crate::value
// ============================================================================

//! ## Overview
//! A [`CompiledQuery`] is the output of an external query builder: SQL text,
//! positional parameters and a [`QueryKind`] tag. Drivers consume it read-only
//! and answer with an [`ExecutionResult`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::value::Row;
use crate::value::Value;

// ============================================================================
// SECTION: Query Kind
// ============================================================================

/// Declared kind of a compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// `SELECT` (reader).
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// Anything else: transaction control, DDL, pragmas, hand-written SQL.
    #[default]
    Raw,
}

impl QueryKind {
    /// Returns true for kinds that declare themselves as readers.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Select)
    }

    /// Returns true for kinds that declare themselves as writers.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Compiled Query
// ============================================================================

/// SQL text plus positional parameters, as produced by a query builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// SQL text with positional placeholders.
    pub sql: String,
    /// Positional parameters in placeholder order.
    #[serde(default)]
    pub parameters: Vec<Value>,
    /// Declared query kind.
    #[serde(default)]
    pub kind: QueryKind,
}

impl CompiledQuery {
    /// Builds a compiled query.
    #[must_use]
    pub fn new(sql: impl Into<String>, parameters: Vec<Value>, kind: QueryKind) -> Self {
        Self {
            sql: sql.into(),
            parameters,
            kind,
        }
    }

    /// Builds a parameterless [`QueryKind::Raw`] query.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new(), QueryKind::Raw)
    }

    /// Builds a [`QueryKind::Select`] query.
    #[must_use]
    pub fn select(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::new(sql, parameters, QueryKind::Select)
    }

    /// Builds a [`QueryKind::Insert`] query.
    #[must_use]
    pub fn insert(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::new(sql, parameters, QueryKind::Insert)
    }

    /// Builds a [`QueryKind::Update`] query.
    #[must_use]
    pub fn update(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::new(sql, parameters, QueryKind::Update)
    }

    /// Builds a [`QueryKind::Delete`] query.
    #[must_use]
    pub fn delete(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self::new(sql, parameters, QueryKind::Delete)
    }
}

// ============================================================================
// SECTION: Execution Result
// ============================================================================

/// Outcome of executing one statement.
///
/// # Invariants
/// - Reader statements produce [`ExecutionResult::Rows`]; writer statements
///   produce [`ExecutionResult::Mutation`]. A result is never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    /// Rows returned by a reader statement (or one streamed chunk).
    Rows {
        /// Result rows in engine order.
        rows: Vec<Row>,
    },
    /// Mutation summary returned by a writer statement.
    Mutation {
        /// Number of rows changed.
        rows_affected: u64,
        /// Rowid of the inserted row, when the statement inserted one.
        insert_id: Option<i64>,
    },
}

impl ExecutionResult {
    /// Returns the rows of a reader result, or an empty slice.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows {
                rows,
            } => rows,
            Self::Mutation {
                ..
            } => &[],
        }
    }

    /// Consumes the result and returns its rows, or an empty vector.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows {
                rows,
            } => rows,
            Self::Mutation {
                ..
            } => Vec::new(),
        }
    }

    /// Returns the affected row count of a writer result.
    #[must_use]
    pub const fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Rows {
                ..
            } => None,
            Self::Mutation {
                rows_affected,
                ..
            } => Some(*rows_affected),
        }
    }

    /// Returns the inserted rowid of a writer result, when present.
    #[must_use]
    pub const fn insert_id(&self) -> Option<i64> {
        match self {
            Self::Rows {
                ..
            } => None,
            Self::Mutation {
                insert_id,
                ..
            } => *insert_id,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
