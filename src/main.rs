//! Fanyi - 连载小说翻译流水线
//!
//! 入口：解析命令行、加载配置、初始化日志，然后执行 run / cleanup / stats。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use fanyi::config::{load_config, AppConfig};
use fanyi::core::{Controller, ShutdownManager, WorkUnit};
use fanyi::gateway::{IdentityPool, OpenAiGateway};
use fanyi::store::{KnowledgeStore, MaintenanceReport, StoreCounts};

#[derive(Parser)]
#[command(name = "fanyi", version, about = "连载小说翻译流水线")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 作品根目录（覆盖配置中的 app.root_dir）
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// 输出 debug 日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 翻译根目录下所有作品的未译章节
    Run {
        /// 结束时以 JSON 打印运行报告
        #[arg(long)]
        json: bool,
    },
    /// 对每部作品的术语库执行维护（占位值、重复、孤立关系）
    Cleanup,
    /// 打印每部作品的术语库条目数
    Stats,
}

#[derive(Serialize)]
struct UnitCounts {
    work_unit: String,
    #[serde(flatten)]
    counts: StoreCounts,
}

#[derive(Serialize)]
struct UnitMaintenance {
    work_unit: String,
    #[serde(flatten)]
    report: MaintenanceReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    fanyi::observability::init(if cli.verbose { "debug" } else { "info" });

    let mut config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(root) = cli.root {
        config.app.root_dir = root;
    }

    match cli.command {
        Command::Run { json } => run(config, json).await,
        Command::Cleanup => cleanup(&config),
        Command::Stats => stats(&config),
    }
}

async fn run(config: AppConfig, json: bool) -> anyhow::Result<()> {
    let identities = IdentityPool::new(
        config.gateway.identities(),
        config.gateway.max_consecutive_rotations,
    )
    .context("No gateway identities configured")?;
    let gateway = OpenAiGateway::new(
        &config.gateway,
        identities.active().clone(),
        config.app.load_system_prompt(),
    )
    .context("Failed to create gateway")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut controller = Controller::new(gateway, identities, &config).with_cancellation(shutdown.token());
    let report = controller.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if let Some(reason) = &report.aborted {
        anyhow::bail!("Run aborted: {}", reason);
    }
    Ok(())
}

fn cleanup(config: &AppConfig) -> anyhow::Result<()> {
    let mut reports = Vec::new();
    for unit in WorkUnit::discover(&config.app.root_dir, &config.app)? {
        if !unit.has_store() {
            continue;
        }
        let mut store = KnowledgeStore::open(&unit.store_path)
            .with_context(|| format!("Failed to open {}", unit.store_path.display()))?;
        let report = store
            .run_maintenance()
            .with_context(|| format!("Maintenance failed for {}", unit.name))?;
        reports.push(UnitMaintenance {
            work_unit: unit.name,
            report,
        });
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn stats(config: &AppConfig) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for unit in WorkUnit::discover(&config.app.root_dir, &config.app)? {
        if !unit.has_store() {
            continue;
        }
        let store = KnowledgeStore::open(&unit.store_path)
            .with_context(|| format!("Failed to open {}", unit.store_path.display()))?;
        rows.push(UnitCounts {
            work_unit: unit.name,
            counts: store.counts()?,
        });
    }
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
