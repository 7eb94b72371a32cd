//! 配置模块，负责加载JSON配置文件

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::compiler::CompilerConfig;
use crate::operator::OperatorPolicy;
use crate::repository::ConditionsTable;

/// 覆盖 `database_url` 的环境变量
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(String),

    #[error("无法读取配置文件 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置文件 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 调度器配置，显式传递给各组件，不使用全局状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// `postgres://…` 或 `sqlite:…`；为空时使用内存存储
    pub database_url: Option<String>,
    /// 条件表位置
    pub conditions_table: ConditionsTable,
    /// 生成的 SELECT 语句查询的目标表
    pub target_table: String,
    pub operator_policy: OperatorPolicy,
    pub skip_inactive: bool,
    pub check_parent_links: bool,
    pub max_connections: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let compiler = CompilerConfig::default();
        Self {
            database_url: None,
            conditions_table: ConditionsTable::default(),
            target_table: "shipments".to_string(),
            operator_policy: compiler.operator_policy,
            skip_inactive: compiler.skip_inactive,
            check_parent_links: compiler.check_parent_links,
            max_connections: 5,
        }
    }
}

impl DispatcherConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(display));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// 用环境变量覆盖数据库地址
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_database_url(std::env::var(DATABASE_URL_ENV).ok());
        self
    }

    fn apply_database_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            self.database_url = Some(url);
        }
    }

    /// 编译器相关的配置
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            operator_policy: self.operator_policy,
            skip_inactive: self.skip_inactive,
            check_parent_links: self.check_parent_links,
        }
    }
}
