//! Persistence of condition rows.
//!
//! The compiler only needs two things from storage: an insert that hands back
//! the id of the row it just wrote, and a bulk read of every stored row.
//! Both implementations generate the id inside the insert itself, so a
//! dependent row can never be linked to another writer's parent.

mod memory;
mod sql;

pub use memory::InMemoryConditionRepository;
pub use sql::{Backend, SqlConditionRepository};

use async_trait::async_trait;
use sea_query::{Alias, IntoTableRef, TableRef};
use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::row::{ConditionRow, NewConditionRow};

/// Ids produced by [`ConditionRepository::insert_linked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIds {
    pub parent_id: i64,
    pub dependent_ids: Vec<i64>,
}

#[async_trait]
pub trait ConditionRepository: Send + Sync {
    /// Insert a row and return its generated id.
    ///
    /// Fails with `UnresolvedParentReference` when `parent_query_id` names a
    /// row that does not exist.
    async fn insert(&self, row: &NewConditionRow) -> Result<i64, RepositoryError>;

    /// All stored rows, in insertion order.
    async fn fetch_all(&self) -> Result<Vec<ConditionRow>, RepositoryError>;

    /// Insert a parent and its dependents as one unit. Each dependent's
    /// `parent_query_id` is replaced with the parent's generated id.
    async fn insert_linked(
        &self,
        parent: &NewConditionRow,
        dependents: &[NewConditionRow],
    ) -> Result<LinkedIds, RepositoryError>;
}

/// Parent first, flagged as a parent, followed by its dependents.
pub(crate) fn linked_rows(
    parent: &NewConditionRow,
    dependents: &[NewConditionRow],
) -> Vec<NewConditionRow> {
    let mut rows = Vec::with_capacity(dependents.len() + 1);
    rows.push(NewConditionRow {
        is_parent: true,
        ..parent.clone()
    });
    rows.extend(dependents.iter().cloned());
    rows
}

/// Location of the conditions table, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionsTable {
    #[serde(default)]
    pub schema: Option<String>,
    pub table: String,
    /// Whether the table carries the optional `is_column_comparison`
    /// column. Off by default; rows then read back with the flag unset.
    #[serde(default)]
    pub column_comparison: bool,
}

impl ConditionsTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            column_comparison: false,
        }
    }

    pub fn in_schema(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
            column_comparison: false,
        }
    }

    pub fn with_column_comparison(mut self) -> Self {
        self.column_comparison = true;
        self
    }

    pub fn table_ref(&self) -> TableRef {
        let table = Alias::new(self.table.as_str());
        match &self.schema {
            Some(schema) => (Alias::new(schema.as_str()), table).into_table_ref(),
            None => table.into_table_ref(),
        }
    }
}

impl Default for ConditionsTable {
    fn default() -> Self {
        Self::in_schema("ui_table", "input_table")
    }
}

impl std::fmt::Display for ConditionsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}
