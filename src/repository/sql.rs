//! sqlx-backed repository for PostgreSQL and SQLite.
//!
//! Statements are built with sea-query and rendered for the pool's dialect.
//! Every write runs in a transaction and reads its id back through
//! `INSERT ... RETURNING id`.

use async_trait::async_trait;
use sea_query::{
    Expr, Iden, InsertStatement, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, SqliteQueryBuilder,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use super::{linked_rows, ConditionRepository, ConditionsTable, LinkedIds};
use crate::error::RepositoryError;
use crate::row::{ConditionRow, NewConditionRow};

/// Column identifiers of the conditions table
#[derive(Debug, Clone, Copy)]
enum Column {
    Id,
    BatchId,
    ParentQueryId,
    ConditionColumn,
    ConditionOperator,
    ConditionValue,
    IsColumnComparison,
    LogicalOperator,
    IsActive,
    IsParent,
    OrderPosition,
    AggregateFunction,
    QueryGroupId,
    ConstantClause,
}

impl Iden for Column {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let name = match self {
            Column::Id => "id",
            Column::BatchId => "batch_id",
            Column::ParentQueryId => "parent_query_id",
            Column::ConditionColumn => "condition_column",
            Column::ConditionOperator => "condition_operator",
            Column::ConditionValue => "condition_value",
            Column::IsColumnComparison => "is_column_comparison",
            Column::LogicalOperator => "logical_operator",
            Column::IsActive => "is_active",
            Column::IsParent => "is_parent",
            Column::OrderPosition => "order_position",
            Column::AggregateFunction => "aggregate_function",
            Column::QueryGroupId => "query_group_id",
            Column::ConstantClause => "constant_clause",
        };
        let _ = s.write_str(name);
    }
}

/// Columns every conditions table has. `is_column_comparison` is optional
/// and only touched when [`ConditionsTable::column_comparison`] is set.
const DATA_COLUMNS: [Column; 12] = [
    Column::BatchId,
    Column::ParentQueryId,
    Column::ConditionColumn,
    Column::ConditionOperator,
    Column::ConditionValue,
    Column::LogicalOperator,
    Column::IsActive,
    Column::IsParent,
    Column::OrderPosition,
    Column::AggregateFunction,
    Column::QueryGroupId,
    Column::ConstantClause,
];

/// Connection pool for one of the supported dialects.
#[derive(Debug, Clone)]
pub enum Backend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Backend {
    /// Connect by URL scheme: `postgres://`, `postgresql://` or `sqlite:`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await?;
            Ok(Backend::Postgres(pool))
        } else if url.starts_with("sqlite:") {
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await?;
            Ok(Backend::Sqlite(pool))
        } else {
            Err(RepositoryError::UnsupportedUrl(url.to_string()))
        }
    }

    fn render_insert(&self, statement: &InsertStatement) -> String {
        match self {
            Backend::Postgres(_) => statement.to_string(PostgresQueryBuilder),
            Backend::Sqlite(_) => statement.to_string(SqliteQueryBuilder),
        }
    }

    fn render_select(&self, statement: &SelectStatement) -> String {
        match self {
            Backend::Postgres(_) => statement.to_string(PostgresQueryBuilder),
            Backend::Sqlite(_) => statement.to_string(SqliteQueryBuilder),
        }
    }
}

/// Runs `$body` with `$pool` bound to whichever pool the backend holds.
macro_rules! with_pool {
    ($backend:expr, |$pool:ident| $body:expr) => {
        match $backend {
            Backend::Postgres($pool) => $body,
            Backend::Sqlite($pool) => $body,
        }
    };
}

pub struct SqlConditionRepository {
    backend: Backend,
    table: ConditionsTable,
}

impl SqlConditionRepository {
    pub fn new(backend: Backend, table: ConditionsTable) -> Self {
        Self { backend, table }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        table: ConditionsTable,
    ) -> Result<Self, RepositoryError> {
        let backend = Backend::connect(url, max_connections).await?;
        tracing::info!(table = %table, "Connected condition repository");
        Ok(Self::new(backend, table))
    }

    /// Insert `rows` in one transaction. With `link`, every row after the
    /// first is attached to the first row's generated id.
    async fn insert_rows(
        &self,
        rows: Vec<NewConditionRow>,
        link: bool,
    ) -> Result<Vec<i64>, RepositoryError> {
        let parent_check = rows
            .first()
            .and_then(|row| row.parent_query_id)
            .map(|parent_id| {
                let lookup = parent_lookup(&self.table, parent_id);
                (parent_id, self.backend.render_select(&lookup))
            });

        let ids = with_pool!(&self.backend, |pool| {
            let mut tx = pool.begin().await?;

            if let Some((parent_id, sql)) = &parent_check {
                let found: Option<i64> = sqlx::query_scalar(sql).fetch_optional(&mut *tx).await?;
                if found.is_none() {
                    return Err(RepositoryError::UnresolvedParentReference(*parent_id));
                }
            }

            let mut ids: Vec<i64> = Vec::with_capacity(rows.len());
            for mut row in rows {
                if link {
                    if let Some(&first) = ids.first() {
                        row.parent_query_id = Some(first);
                    }
                }
                let sql = self.backend.render_insert(&insert_statement(&self.table, &row)?);
                let id: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *tx).await?;
                ids.push(id);
            }

            tx.commit().await?;
            ids
        });

        Ok(ids)
    }
}

fn insert_statement(
    table: &ConditionsTable,
    row: &NewConditionRow,
) -> Result<InsertStatement, RepositoryError> {
    let mut columns = DATA_COLUMNS.to_vec();
    let mut values: Vec<SimpleExpr> = vec![
        row.batch_id.into(),
        row.parent_query_id.into(),
        row.condition_column.clone().into(),
        row.condition_operator.clone().into(),
        row.condition_value.clone().into(),
        row.logical_operator.clone().into(),
        row.is_active.into(),
        row.is_parent.into(),
        row.order_position.into(),
        row.aggregate_function.clone().into(),
        row.query_group_id.into(),
        row.constant_clause.clone().into(),
    ];
    if table.column_comparison {
        columns.push(Column::IsColumnComparison);
        values.push(row.is_column_comparison.into());
    }

    let mut statement = Query::insert();
    statement
        .into_table(table.table_ref())
        .columns(columns)
        .values(values)?
        .returning_col(Column::Id);
    Ok(statement)
}

fn parent_lookup(table: &ConditionsTable, parent_id: i64) -> SelectStatement {
    Query::select()
        .column(Column::Id)
        .from(table.table_ref())
        .and_where(Expr::col(Column::Id).eq(parent_id))
        .to_owned()
}

fn select_all(table: &ConditionsTable) -> SelectStatement {
    let mut columns = vec![Column::Id];
    columns.extend(DATA_COLUMNS);
    if table.column_comparison {
        columns.push(Column::IsColumnComparison);
    }
    Query::select()
        .columns(columns)
        .from(table.table_ref())
        .order_by(Column::Id, Order::Asc)
        .to_owned()
}

#[async_trait]
impl ConditionRepository for SqlConditionRepository {
    async fn insert(&self, row: &NewConditionRow) -> Result<i64, RepositoryError> {
        let ids = self.insert_rows(vec![row.clone()], false).await?;
        let id = ids.first().copied().ok_or(sqlx::Error::RowNotFound)?;
        tracing::info!(id, batch_id = row.batch_id, table = %self.table, "Inserted condition");
        Ok(id)
    }

    async fn fetch_all(&self) -> Result<Vec<ConditionRow>, RepositoryError> {
        let sql = self.backend.render_select(&select_all(&self.table));
        let rows = with_pool!(&self.backend, |pool| {
            sqlx::query_as::<_, ConditionRow>(&sql).fetch_all(pool).await?
        });
        tracing::debug!(count = rows.len(), table = %self.table, "Fetched conditions");
        Ok(rows)
    }

    async fn insert_linked(
        &self,
        parent: &NewConditionRow,
        dependents: &[NewConditionRow],
    ) -> Result<LinkedIds, RepositoryError> {
        let mut ids = self
            .insert_rows(linked_rows(parent, dependents), true)
            .await?
            .into_iter();
        let parent_id = ids.next().ok_or(sqlx::Error::RowNotFound)?;
        let dependent_ids: Vec<i64> = ids.collect();
        tracing::info!(
            parent_id,
            dependents = dependent_ids.len(),
            table = %self.table,
            "Inserted linked conditions"
        );
        Ok(LinkedIds {
            parent_id,
            dependent_ids,
        })
    }
}
