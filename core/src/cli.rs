use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{CompilerConfig, Config};
use crate::error::Diagnostic;
use crate::parser::{parse_document, printer};
use crate::project::load_project;

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Tempo - compiles YAML flow definitions into process graphs", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a document and print the process definitions as JSON
    Compile {
        /// Flow document to compile
        file: PathBuf,

        /// Only print this flow
        #[arg(short = 'f', long = "flow")]
        flow: Option<String>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Compile every flow of every file and report all errors
    Check {
        /// Flow documents to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the parsed syntax tree as JSON
    Ast {
        file: PathBuf,
    },

    /// Re-emit a document in canonical form
    Fmt {
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration before any command so config errors show first
    let config = Config::builder().config_path(cli.config.clone()).build()?;
    init_logging(&config.log.level);

    match cli.command {
        Commands::Compile { file, flow, pretty } => {
            let (name, text) = read_source(&file).await?;
            let project = load_project(&name, &text, &config.compiler)
                .map_err(|e| anyhow::anyhow!("{}", e.diagnostic()))?;

            if !project.is_valid() {
                for error in &project.errors {
                    eprintln!("{}", error.diagnostic());
                }
                std::process::exit(1);
            }

            let output = match &flow {
                Some(flow) => {
                    let process = project
                        .processes
                        .get(flow)
                        .with_context(|| format!("Flow '{}' not found in {}", flow, name))?;
                    to_json(process, pretty)?
                }
                None => to_json(&project, pretty)?,
            };
            println!("{}", output);
        }

        Commands::Check { files } => {
            let handles: Vec<_> = files
                .into_iter()
                .map(|path| {
                    let compiler = config.compiler.clone();
                    tokio::task::spawn_blocking(move || {
                        let result = check_file(&path, &compiler);
                        (path, result)
                    })
                })
                .collect();

            let mut failed = 0;
            for handle in handles {
                let (path, result) = handle.await.context("Check task panicked")?;
                let diagnostics = result?;
                if diagnostics.is_empty() {
                    println!("✓ {}", path.display());
                } else {
                    failed += 1;
                    for diagnostic in diagnostics {
                        eprintln!("{}", diagnostic);
                    }
                }
            }

            if failed > 0 {
                eprintln!("{} file(s) failed to compile", failed);
                std::process::exit(1);
            }
        }

        Commands::Ast { file } => {
            let (name, text) = read_source(&file).await?;
            let document =
                parse_document(&name, &text).map_err(|e| anyhow::anyhow!("{}", e.diagnostic()))?;
            println!("{}", to_json(&document, true)?);
        }

        Commands::Fmt { file } => {
            let (name, text) = read_source(&file).await?;
            let document =
                parse_document(&name, &text).map_err(|e| anyhow::anyhow!("{}", e.diagnostic()))?;
            let formatted = printer::print_document(&document)
                .with_context(|| format!("Failed to print {}", name))?;
            print!("{}", formatted);
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Already initialised when embedded; keep the existing subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn read_source(path: &Path) -> Result<(String, String)> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((path.display().to_string(), text))
}

/// Diagnostics of one file; empty when every flow compiled
fn check_file(path: &Path, config: &CompilerConfig) -> Result<Vec<Diagnostic>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.display().to_string();

    let diagnostics = match load_project(&name, &text, config) {
        Ok(project) => project.errors.iter().map(|e| e.diagnostic()).collect(),
        Err(e) => vec![e.diagnostic()],
    };
    Ok(diagnostics)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("Failed to serialize output")
}
