//! Stored filter fragments, one per row of the conditions table.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, RowLocation};

/// A persisted condition row, as read back from a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConditionRow {
    pub id: i64,
    pub batch_id: i64,
    pub parent_query_id: Option<i64>,
    pub condition_column: String,
    /// Domain operator name such as `greater_than`, or a raw SQL operator.
    pub condition_operator: String,
    /// Raw literal, comma-delimited list or range, or a column name for column comparisons.
    pub condition_value: Option<String>,
    /// Tables without the optional `is_column_comparison` column read as false.
    #[serde(default)]
    #[sqlx(default)]
    pub is_column_comparison: bool,
    pub logical_operator: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub order_position: i32,
    pub aggregate_function: Option<String>,
    pub query_group_id: Option<i64>,
    pub constant_clause: Option<String>,
}

/// A condition row that has not been assigned an id yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewConditionRow {
    pub batch_id: i64,
    #[serde(default)]
    pub parent_query_id: Option<i64>,
    pub condition_column: String,
    pub condition_operator: String,
    #[serde(default)]
    pub condition_value: Option<String>,
    #[serde(default)]
    pub is_column_comparison: bool,
    #[serde(default)]
    pub logical_operator: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub order_position: i32,
    #[serde(default)]
    pub aggregate_function: Option<String>,
    #[serde(default)]
    pub query_group_id: Option<i64>,
    #[serde(default)]
    pub constant_clause: Option<String>,
}

fn default_active() -> bool {
    true
}

impl NewConditionRow {
    pub fn new(
        batch_id: i64,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: Option<&str>,
    ) -> Self {
        Self {
            batch_id,
            condition_column: column.into(),
            condition_operator: operator.into(),
            condition_value: value.map(str::to_string),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn with_logical_operator(mut self, combinator: impl Into<String>) -> Self {
        self.logical_operator = Some(combinator.into());
        self
    }

    pub fn with_order_position(mut self, position: i32) -> Self {
        self.order_position = position;
        self
    }

    pub fn with_column_comparison(mut self) -> Self {
        self.is_column_comparison = true;
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_query_id = Some(parent_id);
        self
    }

    /// Attaches the generated id, producing the stored form of the row.
    pub fn into_row(self, id: i64) -> ConditionRow {
        ConditionRow {
            id,
            batch_id: self.batch_id,
            parent_query_id: self.parent_query_id,
            condition_column: self.condition_column,
            condition_operator: self.condition_operator,
            condition_value: self.condition_value,
            is_column_comparison: self.is_column_comparison,
            logical_operator: self.logical_operator,
            is_active: self.is_active,
            is_parent: self.is_parent,
            order_position: self.order_position,
            aggregate_function: self.aggregate_function,
            query_group_id: self.query_group_id,
            constant_clause: self.constant_clause,
        }
    }
}

impl ConditionRow {
    pub fn location(&self) -> RowLocation {
        RowLocation {
            id: Some(self.id),
            batch_id: self.batch_id,
            order_position: self.order_position,
        }
    }

    /// Resolves the combinator joining this row to the previous one in its batch.
    pub fn combinator(&self) -> Result<Combinator, CompileError> {
        match self.logical_operator.as_deref().map(str::trim) {
            None | Some("") => Ok(Combinator::And),
            Some(text) if text.eq_ignore_ascii_case("and") => Ok(Combinator::And),
            Some(text) if text.eq_ignore_ascii_case("or") => Ok(Combinator::Or),
            Some(text) => Err(CompileError::UnsupportedCombinator {
                row: self.location(),
                combinator: text.to_string(),
            }),
        }
    }
}

/// Logical operator joining a condition to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}
