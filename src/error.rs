//! Error types for condition compilation and persistence.

use std::fmt;

use thiserror::Error;

/// Identifies the condition row an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    /// Generated id, absent for rows that were never persisted.
    pub id: Option<i64>,
    pub batch_id: i64,
    pub order_position: i32,
}

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(
                f,
                "row {} (batch {}, position {})",
                id, self.batch_id, self.order_position
            ),
            None => write!(
                f,
                "unsaved row (batch {}, position {})",
                self.batch_id, self.order_position
            ),
        }
    }
}

/// Errors raised while turning condition rows into SQL.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A range or list value could not be split into the arity its operator needs.
    #[error("Malformed value {value:?} for {operator} at {row}: {reason}")]
    MalformedConditionValue {
        row: RowLocation,
        operator: String,
        value: String,
        reason: String,
    },

    #[error("{row} references parent {parent_id}, which is not part of the condition set")]
    UnresolvedParentReference { row: RowLocation, parent_id: i64 },

    #[error("Unsupported condition operator {operator:?} at {row}")]
    UnsupportedOperator { row: RowLocation, operator: String },

    #[error("Unsupported logical operator {combinator:?} at {row}")]
    UnsupportedCombinator { row: RowLocation, combinator: String },

    #[error("No conditions to compile")]
    NoConditions,
}

/// Errors raised by condition repositories.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Statement error: {0}")]
    Statement(#[from] sea_query::error::Error),

    #[error("Parent condition {0} does not exist")]
    UnresolvedParentReference(i64),

    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_location_display() {
        let saved = RowLocation {
            id: Some(7),
            batch_id: 2,
            order_position: 1,
        };
        assert_eq!(saved.to_string(), "row 7 (batch 2, position 1)");

        let unsaved = RowLocation {
            id: None,
            batch_id: 3,
            order_position: 0,
        };
        assert_eq!(unsaved.to_string(), "unsaved row (batch 3, position 0)");
    }

    #[test]
    fn test_malformed_value_display_names_row() {
        let err = CompileError::MalformedConditionValue {
            row: RowLocation {
                id: Some(4),
                batch_id: 1,
                order_position: 2,
            },
            operator: "BETWEEN".to_string(),
            value: "1,2,3".to_string(),
            reason: "expected exactly 2 bounds, found 3".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("row 4"));
        assert!(message.contains("BETWEEN"));
        assert!(message.contains("\"1,2,3\""));
    }

    #[test]
    fn test_repository_error_from_sqlx() {
        let err: RepositoryError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RepositoryError::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }
}
