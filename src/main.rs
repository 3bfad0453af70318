use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use entropy_canvas::config::CanvasConfig;
use entropy_canvas::domain::task::TaskStatus;
use entropy_canvas::services::export_service::{ExportService, ImportOptions};
use entropy_canvas::services::persistence::PersistedStore;
use entropy_canvas::services::TaskService;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inspect and convert entropy canvas documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Canvas config file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print task, connection and dependency statistics
    Summary {
        /// Export document
        input: PathBuf,
    },
    /// Convert an export document to CSV (stdout when no output is given)
    Csv {
        input: PathBuf,
        output: Option<PathBuf>,
    },
    /// Convert an export document to the persisted-store layout
    Store { input: PathBuf, output: PathBuf },
    /// Convert a persisted store back to an export document
    Export { input: PathBuf, output: PathBuf },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };

    match cli.command {
        Command::Summary { input } => summary(&config, &input),
        Command::Csv { input, output } => csv(&input, output),
        Command::Store { input, output } => to_store(&input, &output),
        Command::Export { input, output } => from_store(&input, &output),
    }
}

fn load_service(config: &CanvasConfig, input: &Path) -> Result<TaskService> {
    let data = ExportService::import_from_file(input, ImportOptions::default())
        .with_context(|| format!("Failed to import {}", input.display()))?;
    let mut service = TaskService::new(config.max_history);
    service.replace_all(data.tasks, data.connections);
    Ok(service)
}

fn summary(config: &CanvasConfig, input: &Path) -> Result<()> {
    let service = load_service(config, input)?;
    let tasks = service.tasks();

    println!("Tasks:       {}", tasks.len());
    for status in TaskStatus::ALL {
        let count = tasks.iter().filter(|t| t.status == status).count();
        if count > 0 {
            println!("  {:<11}{}", status.as_str(), count);
        }
    }
    println!("Connections: {}", service.connections().len());

    let graph = service.dependency_graph();
    match graph.topological_sort() {
        Ok(order) => {
            println!("Dependency order:");
            for id in order {
                let title = service.task(&id).map(|t| t.title.as_str()).unwrap_or("<missing task>");
                println!("  [depth {}] {}", graph.depth(&id), title);
            }
        }
        Err(reason) => println!("Dependency graph is not acyclic: {}", reason),
    }

    let overdue = tasks.iter().filter(|t| t.is_overdue()).count();
    if overdue > 0 {
        println!("Overdue:     {}", overdue);
    }
    Ok(())
}

fn csv(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let data = ExportService::import_from_file(input, ImportOptions::default())?;
    let csv = ExportService::export_to_csv(&data.tasks)?;
    match output {
        Some(path) => {
            std::fs::write(&path, csv).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "CSV written");
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn to_store(input: &Path, output: &Path) -> Result<()> {
    let data = ExportService::import_from_file(input, ImportOptions::default())?;
    PersistedStore::new(data.tasks, data.connections).save(output)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn from_store(input: &Path, output: &Path) -> Result<()> {
    let Some(store) = PersistedStore::load(input)? else {
        bail!("No store at {}", input.display());
    };
    let json = ExportService::export_to_json(&store.state.tasks, &store.state.connections)?;
    std::fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}
