use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use vibeterm_core::git::{CommandResult, RemediationPlan, RepositoryStatus};
use vibeterm_core::{Engine, EngineConfig};

use crate::shell;
use crate::tui;

#[derive(Debug, Parser)]
#[command(
    name = "vibeterm",
    about = "Shell sessions and git drift reconciliation across your projects"
)]
pub struct Cli {
    /// Config file (defaults to $VIBETERM_CONFIG or ~/.config/vibeterm/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the git status of projects (defaults to the configured projects)
    Status {
        paths: Vec<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the remediation plan for a project
    Plan {
        path: PathBuf,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Inspect, plan and execute the remediation for a project
    Fix {
        path: PathBuf,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Push the current branch
    Push { path: PathBuf },

    /// Pull the current branch
    Pull { path: PathBuf },

    /// Fetch from the default remote
    Fetch { path: PathBuf },

    /// Find project directories under a root
    Scan {
        root: PathBuf,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Attach this terminal to a new shell session
    Shell {
        /// Working directory (defaults to the current directory)
        path: Option<PathBuf>,

        /// Command typed into the shell once it starts (defaults to the
        /// project's configured `startupCommand`)
        #[arg(short, long)]
        command: Option<String>,
    },

    /// Interactive status dashboard of the configured projects
    Dashboard,
}

impl Commands {
    /// Name used for the command's log directory.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Plan { .. } => "plan",
            Self::Fix { .. } => "fix",
            Self::Push { .. } => "push",
            Self::Pull { .. } => "pull",
            Self::Fetch { .. } => "fetch",
            Self::Scan { .. } => "scan",
            Self::Shell { .. } => "shell",
            Self::Dashboard => "dashboard",
        }
    }

    /// Whether the command takes over the terminal.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Shell { .. } | Self::Dashboard)
    }
}

#[derive(Debug, Serialize)]
struct StatusRow<'a> {
    path: &'a Path,
    #[serde(flatten)]
    status: RepositoryStatus,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match self.config {
            Some(path) => EngineConfig::builder().config_path(path).build(),
            None => EngineConfig::default(),
        };
        let engine = Arc::new(Engine::new(config).context("failed to initialize engine")?);

        let result = tokio::select! {
            result = dispatch(Arc::clone(&engine), self.command) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                Ok(())
            }
        };

        engine.close_all_sessions();
        result
    }
}

async fn dispatch(engine: Arc<Engine>, command: Commands) -> Result<()> {
    match command {
        Commands::Status { paths, json } => status(&engine, paths, json).await,
        Commands::Plan { path, json } => {
            let plan = engine.get_fix_plan(&path).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
            Ok(())
        }
        Commands::Fix { path, yes } => fix(&engine, &path, yes).await,
        Commands::Push { path } => report(engine.push(&path).await, "push"),
        Commands::Pull { path } => report(engine.pull(&path).await, "pull"),
        Commands::Fetch { path } => report(engine.fetch(&path).await, "fetch"),
        Commands::Scan { root, json } => {
            let projects = engine.scan_projects(&root);
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for project in &projects {
                    println!("{:<24} {}", project.name, project.path.display());
                }
            }
            Ok(())
        }
        Commands::Shell { path, command } => {
            let cwd = match path {
                Some(path) => path,
                None => std::env::current_dir().context("failed to read current directory")?,
            };
            shell::attach(engine, &cwd, command.as_deref()).await
        }
        Commands::Dashboard => tui::run_dashboard(engine).await,
    }
}

async fn status(engine: &Engine, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let paths = if paths.is_empty() {
        engine.tracked_projects()
    } else {
        paths
    };
    if paths.is_empty() {
        bail!("no paths given and no projects configured");
    }

    let statuses = engine.get_status_all(&paths).await;
    if json {
        let rows: Vec<StatusRow<'_>> = statuses
            .iter()
            .map(|(path, status)| StatusRow {
                path,
                status: *status,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (path, status) in &statuses {
            println!("{:<10} {}  {status}", status.label(), path.display());
        }
    }
    Ok(())
}

async fn fix(engine: &Engine, path: &Path, yes: bool) -> Result<()> {
    let plan = engine.get_fix_plan(path).await;
    print_plan(&plan);
    if !plan.can_fix {
        return Ok(());
    }
    if !yes && !confirm("Proceed?").await? {
        println!("Aborted.");
        return Ok(());
    }

    let result = engine.execute_plan(path, &plan).await;
    if !result.output.is_empty() {
        println!("{}", result.output.trim_end());
    }
    match result.error {
        Some(error) if !result.success => bail!("fix failed: {error}"),
        _ => {
            println!("Done.");
            Ok(())
        }
    }
}

fn print_plan(plan: &RemediationPlan) {
    for action in &plan.actions {
        println!("  - {action}");
    }
    if let Some(warning) = &plan.warning {
        println!("warning: {warning}");
    }
}

fn report(result: CommandResult, what: &str) -> Result<()> {
    if let Some(output) = result.output.as_deref().map(str::trim_end)
        && !output.is_empty()
    {
        println!("{output}");
    }
    if result.success {
        return Ok(());
    }
    bail!(
        "{what} failed: {}",
        result.error.as_deref().unwrap_or("unknown error")
    )
}

async fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{prompt} [y/N] ").as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
