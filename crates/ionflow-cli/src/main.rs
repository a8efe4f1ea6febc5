mod cli;
mod config;
mod error;
mod logging;
mod progress;
mod run;

use crate::cli::Cli;
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file)?;

    info!("🚀 ionflow v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let result = run::run(cli);
    match &result {
        Ok(_) => {
            info!("✅ Pipeline pass completed.");
            println!("✅ Pipeline pass completed.");
        }
        Err(e) => {
            error!("❌ Pipeline failed: {}", e);
        }
    }
    result
}
