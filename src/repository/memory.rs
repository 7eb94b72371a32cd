//! In-process repository used for offline sessions and tests.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{linked_rows, ConditionRepository, LinkedIds};
use crate::error::RepositoryError;
use crate::row::{ConditionRow, NewConditionRow};

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    rows: Vec<ConditionRow>,
}

impl State {
    fn contains(&self, id: i64) -> bool {
        self.rows.iter().any(|row| row.id == id)
    }

    fn push(&mut self, row: NewConditionRow) -> i64 {
        self.last_id += 1;
        let id = self.last_id;
        self.rows.push(row.into_row(id));
        id
    }
}

/// Rows held in memory. Id generation and insert share one lock.
#[derive(Debug, Default)]
pub struct InMemoryConditionRepository {
    state: Mutex<State>,
}

impl InMemoryConditionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConditionRepository for InMemoryConditionRepository {
    async fn insert(&self, row: &NewConditionRow) -> Result<i64, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(parent_id) = row.parent_query_id {
            if !state.contains(parent_id) {
                return Err(RepositoryError::UnresolvedParentReference(parent_id));
            }
        }
        let id = state.push(row.clone());
        tracing::info!(id, batch_id = row.batch_id, "Inserted condition");
        Ok(id)
    }

    async fn fetch_all(&self) -> Result<Vec<ConditionRow>, RepositoryError> {
        Ok(self.state.lock().await.rows.clone())
    }

    async fn insert_linked(
        &self,
        parent: &NewConditionRow,
        dependents: &[NewConditionRow],
    ) -> Result<LinkedIds, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(grandparent) = parent.parent_query_id {
            if !state.contains(grandparent) {
                return Err(RepositoryError::UnresolvedParentReference(grandparent));
            }
        }

        let mut rows = linked_rows(parent, dependents).into_iter();
        let mut ids = LinkedIds {
            parent_id: 0,
            dependent_ids: Vec::with_capacity(dependents.len()),
        };
        if let Some(first) = rows.next() {
            ids.parent_id = state.push(first);
        }
        for mut dependent in rows {
            dependent.parent_query_id = Some(ids.parent_id);
            ids.dependent_ids.push(state.push(dependent));
        }
        tracing::info!(
            parent_id = ids.parent_id,
            dependents = ids.dependent_ids.len(),
            "Inserted linked conditions"
        );
        Ok(ids)
    }
}
