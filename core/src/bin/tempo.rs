//! Tempo CLI
//!
//! Compiles, checks and formats flow documents from the command line.

use tempo_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
