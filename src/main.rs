//! Chimera 命令行入口
//!
//! 加载配置、初始化日志、恢复存储快照，然后执行子命令（ask / chat / ingest / status）。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chimera::config::{load_config, AppConfig};
use chimera::core::{WorkflowEvent, WorkflowState};
use chimera::health::{readiness, HealthTargets};
use chimera::llm::create_llm_from_config;
use chimera::observability;
use chimera::store::{
    ingest_dir, GraphStore, MemoryGraphStore, MemoryVectorStore, StoreSnapshot, VectorStore,
};
use chimera::tools::default_registry;
use chimera::workflow::{WorkflowEngine, WorkflowEngineBuilder};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "chimera")]
#[command(about = "Plan, dispatch retrieval tools and synthesize answers with a local LLM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (merged over config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// Question text
        #[arg(required = true)]
        question: Vec<String>,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,

        /// Print a metrics snapshot after the answer
        #[arg(long)]
        metrics: bool,
    },

    /// Interactive session; type `exit` or `quit` to leave
    Chat,

    /// Index a directory of markdown / text documents
    Ingest {
        /// Source directory
        dir: PathBuf,
    },

    /// Check store and model readiness
    Status,
}

struct Stores {
    vector: Arc<MemoryVectorStore>,
    graph: Arc<MemoryGraphStore>,
}

fn open_stores(cfg: &AppConfig) -> anyhow::Result<Stores> {
    let vector = Arc::new(MemoryVectorStore::from_config(&cfg.tools.vector));
    let graph = Arc::new(MemoryGraphStore::new());
    if let Some(path) = cfg.app.index_path.as_deref() {
        StoreSnapshot::load(path)
            .and_then(|snapshot| snapshot.restore_into(&vector, &graph))
            .with_context(|| format!("Failed to load index from {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            chunks = vector.len(),
            entities = graph.entity_count(),
            "index loaded"
        );
    }
    Ok(Stores { vector, graph })
}

fn build_engine(cfg: &AppConfig, stores: &Stores) -> anyhow::Result<WorkflowEngine> {
    let llm = create_llm_from_config(cfg).context("Failed to create LLM client")?;
    let vector: Arc<dyn VectorStore> = stores.vector.clone();
    let graph: Arc<dyn GraphStore> = stores.graph.clone();
    WorkflowEngineBuilder::from_config(cfg)
        .llm(llm)
        .registry(default_registry(vector, graph, cfg.tools.top_k))
        .build()
        .context("Failed to build workflow engine")
}

/// 进度事件写到 stderr，答案写到 stdout
fn progress_printer() -> chimera::core::ProgressFn {
    Arc::new(|event: &WorkflowEvent| eprintln!("  · {event}"))
}

async fn ask_once(engine: &WorkflowEngine, question: String) -> anyhow::Result<WorkflowState> {
    let cancel = CancellationToken::new();
    let state = WorkflowState::new(question)
        .with_progress(progress_printer())
        .with_cancel_token(cancel.clone());

    let run = engine.run(state);
    tokio::pin!(run);
    let state = tokio::select! {
        r = &mut run => r?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelling...");
            cancel.cancel();
            run.await?
        }
    };
    Ok(state)
}

async fn cmd_ask(
    cfg: &AppConfig,
    question: Vec<String>,
    as_json: bool,
    show_metrics: bool,
) -> anyhow::Result<()> {
    let stores = open_stores(cfg)?;
    let engine = build_engine(cfg, &stores)?;
    let state = ask_once(&engine, question.join(" ")).await?;

    if as_json {
        let out = json!({
            "request_id": state.request_id,
            "query": state.query,
            "plan": state.plan,
            "tool_output": state.tool_output,
            "response": state.response,
            "iteration": state.iteration,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", state.response);
    }
    if show_metrics {
        println!(
            "{}",
            serde_json::to_string_pretty(&engine.metrics().snapshot())?
        );
    }
    Ok(())
}

async fn cmd_chat(cfg: &AppConfig) -> anyhow::Result<()> {
    let stores = open_stores(cfg)?;
    let engine = build_engine(cfg, &stores)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        match ask_once(&engine, line.to_string()).await {
            Ok(state) => println!("{}\n", state.response),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn cmd_ingest(cfg: &AppConfig, dir: &Path) -> anyhow::Result<()> {
    let stores = open_stores(cfg)?;
    let report = ingest_dir(dir, &stores.vector, &stores.graph)
        .with_context(|| format!("Failed to ingest {}", dir.display()))?;
    println!(
        "files: {}  skipped: {}  chunks: {}  entities: {}  relations: {}",
        report.files, report.skipped, report.chunks, report.entities, report.relations
    );

    match cfg.app.index_path.as_deref() {
        Some(path) => {
            StoreSnapshot::capture(&stores.vector, &stores.graph)
                .save(path)
                .with_context(|| format!("Failed to save index to {}", path.display()))?;
            println!("index saved to {}", path.display());
        }
        None => eprintln!("app.index_path is not set; the index was not persisted"),
    }
    Ok(())
}

async fn cmd_status(cfg: &AppConfig) -> anyhow::Result<()> {
    let stores = open_stores(cfg)?;
    let llm = match create_llm_from_config(cfg) {
        Ok(llm) => Some(llm),
        Err(e) => {
            tracing::warn!(error = %e, "LLM client unavailable");
            None
        }
    };
    let targets = HealthTargets {
        vector: Some(stores.vector.clone()),
        graph: Some(stores.graph.clone()),
        llm,
    };
    let report = readiness(&targets).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.ready {
        anyhow::bail!("not ready");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;
    observability::init(&cfg.app.log_level);
    cfg.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Ask {
            question,
            json,
            metrics,
        } => cmd_ask(&cfg, question, json, metrics).await,
        Commands::Chat => cmd_chat(&cfg).await,
        Commands::Ingest { dir } => cmd_ingest(&cfg, &dir),
        Commands::Status => cmd_status(&cfg).await,
    }
}
