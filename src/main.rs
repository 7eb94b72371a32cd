use std::fs;

use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use condition_dispatcher::config::{ConfigError, DispatcherConfig};
use condition_dispatcher::{
    ConditionCompiler, ConditionRepository, InMemoryConditionRepository, NewConditionRow,
    SqlConditionRepository,
};

const DEFAULT_CONFIG_PATH: &str = "dispatcher.json";

const HELP: &str = "\
命令:
  add <json>            插入一条条件，打印生成的ID
  link [<json>, ...]    原子地插入父条件及其子条件（第一个元素为父条件）
  load <file.json>      插入文件中的条件数组
  list                  列出已存储的条件
  compile               将所有条件编译为 SQL
  help                  显示帮助
  quit                  退出";

/// REPL 中的一条命令
#[derive(Debug, PartialEq)]
enum Command {
    Add(NewConditionRow),
    Link(NewConditionRow, Vec<NewConditionRow>),
    Load(String),
    List,
    Compile,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match name.to_ascii_lowercase().as_str() {
            "add" => Command::Add(serde_json::from_str(rest).context("无效的条件JSON")?),
            "link" => {
                let mut rows: Vec<NewConditionRow> =
                    serde_json::from_str(rest).context("link 需要条件JSON数组")?;
                if rows.is_empty() {
                    bail!("link 至少需要一个父条件");
                }
                let parent = rows.remove(0);
                Command::Link(parent, rows)
            }
            "load" if !rest.is_empty() => Command::Load(rest.to_string()),
            "load" => bail!("load 需要文件路径"),
            "list" => Command::List,
            "compile" => Command::Compile,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("未知命令: {} (输入 help 查看帮助)", other),
        };
        Ok(command)
    }
}

struct Session {
    repository: Box<dyn ConditionRepository>,
    compiler: ConditionCompiler,
    target_table: String,
}

impl Session {
    /// 执行一条命令，返回 false 表示退出
    async fn execute(&self, command: Command) -> Result<bool> {
        match command {
            Command::Add(row) => {
                let id = self.repository.insert(&row).await?;
                println!("✅ 条件已插入，ID: {}", id);
            }
            Command::Link(parent, dependents) => {
                let ids = self.repository.insert_linked(&parent, &dependents).await?;
                println!("✅ 父条件已插入，ID: {}", ids.parent_id);
                if !ids.dependent_ids.is_empty() {
                    println!("✅ 子条件ID: {:?}", ids.dependent_ids);
                }
            }
            Command::Load(path) => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("无法读取文件 {}", path))?;
                let rows: Vec<NewConditionRow> = serde_json::from_str(&content)
                    .with_context(|| format!("无法解析文件 {}", path))?;
                for row in &rows {
                    let id = self.repository.insert(row).await?;
                    println!(
                        "  • batch {} / {} -> ID {}",
                        row.batch_id, row.condition_column, id
                    );
                }
                println!("✅ 从 {} 插入了 {} 条条件", path, rows.len());
            }
            Command::List => {
                let rows = self.repository.fetch_all().await?;
                if rows.is_empty() {
                    println!("(空)");
                }
                for row in rows {
                    println!(
                        "{:>4}  batch={} pos={} parent={} {} {} {} {}{}",
                        row.id,
                        row.batch_id,
                        row.order_position,
                        row.parent_query_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        row.logical_operator.as_deref().unwrap_or("AND"),
                        row.condition_column,
                        row.condition_operator,
                        row.condition_value.as_deref().unwrap_or(""),
                        if row.is_active { "" } else { "  (inactive)" },
                    );
                }
            }
            Command::Compile => {
                let rows = self.repository.fetch_all().await?;
                let result = self.compiler.compile_batches(&rows, &self.target_table)?;
                println!("\n[批次 SQL]:");
                for batch in &result.batches {
                    println!(
                        "批次 {} ({} 个条件): {}",
                        batch.batch_id, batch.condition_count, batch.sql
                    );
                }
                println!("\n[生成的 SQL]:\n{}", result.sql);
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn load_config(path: &str) -> Result<DispatcherConfig> {
    let config = match DispatcherConfig::from_json_file(path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => {
            tracing::warn!(path, "Config file not found, using defaults");
            DispatcherConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    Ok(config.with_env_overrides())
}

async fn open_repository(config: &DispatcherConfig) -> Result<Box<dyn ConditionRepository>> {
    match &config.database_url {
        Some(url) => {
            let repository = SqlConditionRepository::connect(
                url,
                config.max_connections,
                config.conditions_table.clone(),
            )
            .await
            .context("无法连接数据库")?;
            Ok(Box::new(repository))
        }
        None => {
            tracing::info!("No database_url configured, using in-memory conditions");
            Ok(Box::new(InMemoryConditionRepository::new()))
        }
    }
}

fn run_repl(session: &Session, runtime: &tokio::runtime::Handle) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("conditions> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(line.as_str())?;
                let command = match Command::parse(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("✗ {:#}", e);
                        continue;
                    }
                };
                match runtime.block_on(session.execute(command)) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("✗ {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let one_shot: Vec<String> = args.collect();

    let config = load_config(&config_path)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let repository = runtime.block_on(open_repository(&config))?;

    let session = Session {
        repository,
        compiler: ConditionCompiler::with_config(config.compiler_config()),
        target_table: config.target_table.clone(),
    };

    // 带参数时只执行一条命令
    if !one_shot.is_empty() {
        let command = Command::parse(&one_shot.join(" "))?;
        runtime.block_on(session.execute(command))?;
        return Ok(());
    }

    println!("--- Condition Dispatcher: 条件到 SQL 编译器 ---");
    println!("条件表: {}  目标表: {}", config.conditions_table, config.target_table);
    println!("输入 help 查看命令");
    run_repl(&session, runtime.handle())
}
