//! Compiles stored condition rows into a UNION of SELECT statements.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::operator::{OperatorMapper, OperatorPolicy};
use crate::row::ConditionRow;
use crate::value::format_value;

/// Compiler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub operator_policy: OperatorPolicy,
    /// Leave out rows whose `is_active` flag is cleared.
    pub skip_inactive: bool,
    /// Require every `parent_query_id` to name a row in the compiled set.
    pub check_parent_links: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            operator_policy: OperatorPolicy::PassThrough,
            skip_inactive: false,
            check_parent_links: true,
        }
    }
}

/// One SELECT produced for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBatch {
    pub batch_id: i64,
    pub condition_count: usize,
    pub sql: String,
}

/// Result of compilation with the per-batch breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub sql: String,
    pub batches: Vec<CompiledBatch>,
}

/// Turns condition rows into SQL. Holds no mutable state, so one instance
/// can serve any number of callers.
#[derive(Debug, Clone, Default)]
pub struct ConditionCompiler {
    config: CompilerConfig,
    mapper: OperatorMapper,
}

impl ConditionCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            mapper: OperatorMapper::new(config.operator_policy),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile rows into a single UNION-joined statement against `target_table`.
    pub fn compile(
        &self,
        rows: &[ConditionRow],
        target_table: &str,
    ) -> Result<String, CompileError> {
        self.compile_batches(rows, target_table).map(|result| result.sql)
    }

    /// Compile rows and keep the SELECT generated for each batch.
    pub fn compile_batches(
        &self,
        rows: &[ConditionRow],
        target_table: &str,
    ) -> Result<CompileResult, CompileError> {
        if rows.is_empty() {
            return Err(CompileError::NoConditions);
        }
        if self.config.check_parent_links {
            check_parent_links(rows)?;
        }

        let mut batches = Vec::new();
        for (batch_id, members) in self.group_batches(rows) {
            if members.is_empty() {
                tracing::warn!(batch_id, "Batch has no active conditions, skipping");
                continue;
            }
            let where_clause = self.compile_where(&members)?;
            let sql = format!("SELECT * FROM {} WHERE {}", target_table, where_clause);
            tracing::debug!(batch_id, conditions = members.len(), "Compiled batch");
            batches.push(CompiledBatch {
                batch_id,
                condition_count: members.len(),
                sql,
            });
        }

        if batches.is_empty() {
            return Err(CompileError::NoConditions);
        }

        let sql = batches
            .iter()
            .map(|batch| batch.sql.as_str())
            .collect::<Vec<_>>()
            .join(" UNION ");

        Ok(CompileResult { sql, batches })
    }

    /// Group rows by batch id in first-seen order, each batch sorted by position.
    fn group_batches<'a>(&self, rows: &'a [ConditionRow]) -> Vec<(i64, Vec<&'a ConditionRow>)> {
        let mut order: Vec<(i64, Vec<&'a ConditionRow>)> = Vec::new();
        let mut index: HashMap<i64, usize> = HashMap::new();

        for row in rows {
            let slot = *index.entry(row.batch_id).or_insert_with(|| {
                order.push((row.batch_id, Vec::new()));
                order.len() - 1
            });
            if self.config.skip_inactive && !row.is_active {
                continue;
            }
            order[slot].1.push(row);
        }

        for (_, members) in &mut order {
            // Stable, so equal positions keep their input order.
            members.sort_by_key(|row| row.order_position);
        }
        order
    }

    /// Join a batch's conditions, prefixing every row after the first with its combinator.
    fn compile_where(&self, members: &[&ConditionRow]) -> Result<String, CompileError> {
        let mut parts = Vec::with_capacity(members.len());
        for (i, row) in members.iter().enumerate() {
            let condition = self.compile_condition(row)?;
            if i == 0 {
                parts.push(condition);
            } else {
                parts.push(format!("{} {}", row.combinator()?.as_sql(), condition));
            }
        }
        Ok(parts.join(" "))
    }

    /// Compile a single row into `column operator value`.
    fn compile_condition(&self, row: &ConditionRow) -> Result<String, CompileError> {
        let op = self.mapper.map(&row.condition_operator, row.location())?;
        let value = format_value(
            row.condition_value.as_deref(),
            &op,
            row.is_column_comparison,
            row.location(),
        )?;

        if value.is_empty() {
            Ok(format!("{} {}", row.condition_column, op.token()))
        } else {
            Ok(format!("{} {} {}", row.condition_column, op.token(), value))
        }
    }
}

fn check_parent_links(rows: &[ConditionRow]) -> Result<(), CompileError> {
    let ids: HashSet<i64> = rows.iter().map(|row| row.id).collect();
    for row in rows {
        if let Some(parent_id) = row.parent_query_id {
            if !ids.contains(&parent_id) {
                return Err(CompileError::UnresolvedParentReference {
                    row: row.location(),
                    parent_id,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::NewConditionRow;

    fn rows(input: Vec<NewConditionRow>) -> Vec<ConditionRow> {
        input
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.into_row(i as i64 + 1))
            .collect()
    }

    #[test]
    fn test_single_batch_with_or() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "a", "equals", Some("5")).with_order_position(0),
            NewConditionRow::new(1, "b", "equals", Some("x"))
                .with_logical_operator("OR")
                .with_order_position(1),
        ]);

        let sql = compiler.compile(&input, "shipments").unwrap();
        assert_eq!(sql, "SELECT * FROM shipments WHERE a = '5' OR b = 'x'");
    }

    #[test]
    fn test_single_row_has_no_dangling_combinator() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "status", "equals", Some("open")).with_logical_operator("OR"),
        ]);

        let sql = compiler.compile(&input, "shipments").unwrap();
        assert_eq!(sql, "SELECT * FROM shipments WHERE status = 'open'");
    }

    #[test]
    fn test_missing_combinator_defaults_to_and() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "a", "greater_than", Some("1")),
            NewConditionRow::new(1, "b", "less_than", Some("9")).with_order_position(1),
        ]);

        let sql = compiler.compile(&input, "t").unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a > '1' AND b < '9'");
    }

    #[test]
    fn test_union_preserves_first_seen_batch_order() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(2, "region", "equals", Some("EU")),
            NewConditionRow::new(1, "region", "equals", Some("US")),
            NewConditionRow::new(2, "weight", "greater_than", Some("10")).with_order_position(1),
        ]);

        let result = compiler.compile_batches(&input, "shipments").unwrap();
        assert_eq!(
            result.sql,
            "SELECT * FROM shipments WHERE region = 'EU' AND weight > '10' \
             UNION SELECT * FROM shipments WHERE region = 'US'"
        );
        assert_eq!(result.batches.len(), 2);
        assert_eq!(result.batches[0].batch_id, 2);
        assert_eq!(result.batches[0].condition_count, 2);
        assert_eq!(result.batches[1].batch_id, 1);
    }

    #[test]
    fn test_rows_sorted_by_order_position_within_batch() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "b", "equals", Some("2"))
                .with_logical_operator("OR")
                .with_order_position(2),
            NewConditionRow::new(1, "a", "equals", Some("1")).with_order_position(1),
        ]);

        let sql = compiler.compile(&input, "t").unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = '1' OR b = '2'");
    }

    #[test]
    fn test_null_checks_and_column_comparison() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "delivered_at", "is_null", None),
            NewConditionRow::new(1, "carrier", "is_not_null", Some("ignored"))
                .with_order_position(1),
            NewConditionRow::new(1, "shipped_at", "greater_than", Some("ordered_at"))
                .with_column_comparison()
                .with_order_position(2),
        ]);

        let sql = compiler.compile(&input, "shipments").unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM shipments WHERE delivered_at IS NULL AND carrier IS NOT NULL \
             AND shipped_at > ordered_at"
        );
    }

    #[test]
    fn test_range_and_list_operators() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "shipped_on", "between", Some("2024-01-01,2024-12-31")),
            NewConditionRow::new(1, "status", "not_in", Some(" lost, returned"))
                .with_order_position(1),
        ]);

        let sql = compiler.compile(&input, "shipments").unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM shipments WHERE shipped_on BETWEEN '2024-01-01' AND '2024-12-31' \
             AND status NOT IN ('lost', 'returned')"
        );
    }

    #[test]
    fn test_malformed_range_identifies_row() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "a", "equals", Some("x")),
            NewConditionRow::new(4, "shipped_on", "between", Some("2024-01-01"))
                .with_order_position(3),
        ]);

        match compiler.compile(&input, "shipments").unwrap_err() {
            CompileError::MalformedConditionValue { row, operator, .. } => {
                assert_eq!(row.id, Some(2));
                assert_eq!(row.batch_id, 4);
                assert_eq!(row.order_position, 3);
                assert_eq!(operator, "BETWEEN");
            }
            other => panic!("Expected MalformedConditionValue, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operator_policy() {
        let input = rows(vec![NewConditionRow::new(1, "weight", ">=", Some("10"))]);

        let permissive = ConditionCompiler::new();
        assert_eq!(
            permissive.compile(&input, "t").unwrap(),
            "SELECT * FROM t WHERE weight >= '10'"
        );

        let strict = ConditionCompiler::with_config(CompilerConfig {
            operator_policy: OperatorPolicy::Reject,
            ..Default::default()
        });
        assert!(matches!(
            strict.compile(&input, "t"),
            Err(CompileError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_unresolved_parent_is_reported() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "a", "equals", Some("1")),
            NewConditionRow::new(1, "b", "equals", Some("2"))
                .with_parent(99)
                .with_order_position(1),
        ]);

        assert_eq!(
            compiler.compile(&input, "t").unwrap_err(),
            CompileError::UnresolvedParentReference {
                row: input[1].location(),
                parent_id: 99,
            }
        );

        let lenient = ConditionCompiler::with_config(CompilerConfig {
            check_parent_links: false,
            ..Default::default()
        });
        assert!(lenient.compile(&input, "t").is_ok());
    }

    #[test]
    fn test_resolved_parent_compiles() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(1, "a", "equals", Some("1")),
            NewConditionRow::new(1, "b", "equals", Some("2"))
                .with_parent(1)
                .with_order_position(1),
        ]);
        assert!(compiler.compile(&input, "t").is_ok());
    }

    #[test]
    fn test_skip_inactive_rows() {
        let mut input = rows(vec![
            NewConditionRow::new(1, "a", "equals", Some("1")),
            NewConditionRow::new(1, "b", "equals", Some("2")).with_order_position(1),
            NewConditionRow::new(2, "c", "equals", Some("3")),
        ]);
        input[0].is_active = false;
        input[2].is_active = false;

        let everything = ConditionCompiler::new().compile(&input, "t").unwrap();
        assert!(everything.contains("a = '1'"));
        assert!(everything.contains("UNION"));

        let compiler = ConditionCompiler::with_config(CompilerConfig {
            skip_inactive: true,
            ..Default::default()
        });
        let result = compiler.compile_batches(&input, "t").unwrap();
        assert_eq!(result.sql, "SELECT * FROM t WHERE b = '2'");
        assert_eq!(result.batches.len(), 1);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let compiler = ConditionCompiler::new();
        assert_eq!(compiler.compile(&[], "t"), Err(CompileError::NoConditions));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let compiler = ConditionCompiler::new();
        let input = rows(vec![
            NewConditionRow::new(3, "a", "in", Some("x,y")),
            NewConditionRow::new(1, "b", "like", Some("%box%")),
            NewConditionRow::new(3, "c", "equals", Some("z"))
                .with_logical_operator("or")
                .with_order_position(1),
            NewConditionRow::new(2, "d", "is_null", None),
        ]);

        let first = compiler.compile(&input, "shipments").unwrap();
        let second = compiler.compile(&input, "shipments").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.matches(" UNION ").count(), 2);
    }
}
