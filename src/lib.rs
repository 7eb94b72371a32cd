//! Stores filter conditions as table rows and compiles them into SQL.

pub mod compiler;
pub mod config;
pub mod error;
pub mod operator;
pub mod repository;
pub mod row;
pub mod value;

pub use compiler::{CompileResult, CompiledBatch, CompilerConfig, ConditionCompiler};
pub use config::DispatcherConfig;
pub use error::{CompileError, RepositoryError, RowLocation};
pub use operator::{OperatorMapper, OperatorPolicy, SqlOperator};
pub use repository::{
    ConditionRepository, ConditionsTable, InMemoryConditionRepository, LinkedIds,
    SqlConditionRepository,
};
pub use row::{Combinator, ConditionRow, NewConditionRow};
pub use value::{format_value, ValueKind};
