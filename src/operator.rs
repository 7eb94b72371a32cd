//! Maps domain condition names to SQL operator tokens.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, RowLocation};

/// How names outside the lookup table are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorPolicy {
    /// Unknown names are emitted verbatim, so callers may supply raw SQL operators.
    /// The text reaches the generated SQL unchecked.
    #[default]
    PassThrough,
    /// Unknown names are reported as `UnsupportedOperator`.
    Reject,
}

/// A resolved SQL operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlOperator {
    Eq,
    Gt,
    Lt,
    Between,
    In,
    NotIn,
    Like,
    IsNull,
    IsNotNull,
    /// Passed through unchanged from the stored row.
    Raw(String),
}

/// Domain names, matched case-insensitively.
const DOMAIN_NAMES: &[(&str, SqlOperator)] = &[
    ("equals", SqlOperator::Eq),
    ("greater_than", SqlOperator::Gt),
    ("less_than", SqlOperator::Lt),
    ("between", SqlOperator::Between),
    ("in", SqlOperator::In),
    ("not_in", SqlOperator::NotIn),
    ("like", SqlOperator::Like),
    ("is_null", SqlOperator::IsNull),
    ("is_not_null", SqlOperator::IsNotNull),
];

impl SqlOperator {
    /// Looks up a domain name, falling back to the SQL tokens this mapper emits.
    pub fn lookup(name: &str) -> Option<SqlOperator> {
        let trimmed = name.trim();
        DOMAIN_NAMES
            .iter()
            .find(|(domain, _)| domain.eq_ignore_ascii_case(trimmed))
            .map(|(_, op)| op.clone())
            .or_else(|| Self::from_token(trimmed))
    }

    fn from_token(token: &str) -> Option<SqlOperator> {
        // Collapse inner whitespace so "IS  NOT NULL" still matches.
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => SqlOperator::Eq,
            ">" => SqlOperator::Gt,
            "<" => SqlOperator::Lt,
            "BETWEEN" => SqlOperator::Between,
            "IN" => SqlOperator::In,
            "NOT IN" => SqlOperator::NotIn,
            "LIKE" => SqlOperator::Like,
            "IS NULL" => SqlOperator::IsNull,
            "IS NOT NULL" => SqlOperator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    pub fn token(&self) -> &str {
        match self {
            SqlOperator::Eq => "=",
            SqlOperator::Gt => ">",
            SqlOperator::Lt => "<",
            SqlOperator::Between => "BETWEEN",
            SqlOperator::In => "IN",
            SqlOperator::NotIn => "NOT IN",
            SqlOperator::Like => "LIKE",
            SqlOperator::IsNull => "IS NULL",
            SqlOperator::IsNotNull => "IS NOT NULL",
            SqlOperator::Raw(raw) => raw,
        }
    }

    /// True when the operator is complete without a right-hand value.
    pub fn is_nullary(&self) -> bool {
        matches!(self, SqlOperator::IsNull | SqlOperator::IsNotNull)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorMapper {
    policy: OperatorPolicy,
}

impl OperatorMapper {
    pub fn new(policy: OperatorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OperatorPolicy {
        self.policy
    }

    /// Maps a domain name to its SQL operator for the row at `row`.
    pub fn map(&self, name: &str, row: RowLocation) -> Result<SqlOperator, CompileError> {
        if let Some(op) = SqlOperator::lookup(name) {
            return Ok(op);
        }
        match self.policy {
            OperatorPolicy::PassThrough => Ok(SqlOperator::Raw(name.to_string())),
            OperatorPolicy::Reject => Err(CompileError::UnsupportedOperator {
                row,
                operator: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> RowLocation {
        RowLocation {
            id: Some(1),
            batch_id: 1,
            order_position: 0,
        }
    }

    #[test]
    fn test_domain_table() {
        let mapper = OperatorMapper::default();
        let expected = [
            ("equals", "="),
            ("greater_than", ">"),
            ("less_than", "<"),
            ("between", "BETWEEN"),
            ("in", "IN"),
            ("not_in", "NOT IN"),
            ("like", "LIKE"),
            ("is_null", "IS NULL"),
            ("is_not_null", "IS NOT NULL"),
        ];
        for (name, token) in expected {
            assert_eq!(mapper.map(name, here()).unwrap().token(), token, "{}", name);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mapper = OperatorMapper::default();
        assert_eq!(mapper.map("GREATER_THAN", here()).unwrap(), SqlOperator::Gt);
        assert_eq!(mapper.map("Not_In", here()).unwrap(), SqlOperator::NotIn);
    }

    #[test]
    fn test_sql_tokens_resolve_to_known_operators() {
        assert_eq!(SqlOperator::lookup("is not null"), Some(SqlOperator::IsNotNull));
        assert_eq!(SqlOperator::lookup("NOT  IN"), Some(SqlOperator::NotIn));
        assert_eq!(SqlOperator::lookup("="), Some(SqlOperator::Eq));
    }

    #[test]
    fn test_unknown_name_passes_through_unchanged() {
        let mapper = OperatorMapper::new(OperatorPolicy::PassThrough);
        let op = mapper.map(">=", here()).unwrap();
        assert_eq!(op, SqlOperator::Raw(">=".to_string()));
        assert_eq!(op.token(), ">=");

        let op = mapper.map("ILike", here()).unwrap();
        assert_eq!(op.token(), "ILike");
    }

    #[test]
    fn test_reject_policy_refuses_unknown_names() {
        let mapper = OperatorMapper::new(OperatorPolicy::Reject);
        assert_eq!(mapper.map("equals", here()).unwrap(), SqlOperator::Eq);
        let err = mapper.map("; DROP TABLE x", here()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_nullary_operators() {
        assert!(SqlOperator::IsNull.is_nullary());
        assert!(SqlOperator::IsNotNull.is_nullary());
        assert!(!SqlOperator::Eq.is_nullary());
        assert!(!SqlOperator::Raw("IS NULL".to_string()).is_nullary());
    }
}
