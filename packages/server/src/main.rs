#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region similarity service.
//!
//! ```text
//! similarity_server [serve]
//! similarity_server pairs [--output pairs.csv]
//! ```
//!
//! Configuration comes from the TOML file named by `SIMILARITY_CONFIG` and
//! the `SIMILARITY_*` environment variables.

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use similarity_manager::{Collaborators, Manager, SimilarityConfig};

#[derive(Parser)]
#[command(
    name = "similarity_server",
    about = "Serve region epidemic-similarity tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (the default)
    Serve,
    /// Compute the distance between every pair of regions
    Pairs {
        /// Output CSV file [default: <output_dir>/pairs.csv]
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = SimilarityConfig::load()?;
    let collaborators = Collaborators::from_config(&config);
    let manager = Arc::new(Manager::new(config, collaborators));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let control_loop = manager.start();
            let result = similarity_server::run_server(manager).await;
            control_loop.abort();
            result?;
        }
        Commands::Pairs { output } => {
            let output = output.unwrap_or_else(|| manager.paths().pairs_csv());
            let count = manager.compute_pairs(&output).await?;
            log::info!("Wrote {count} pairs to {}", output.display());
        }
    }

    Ok(())
}
