//! convertool - converts archive files with external tools.

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;
mod logging;

use commands::{DigiarchCommand, StandaloneCommand};

#[derive(Parser, Debug)]
#[command(
    name = "convertool",
    version,
    about = "Convert archive files to preservation and access formats",
    after_help = "EXAMPLES:\n  \
                  convertool digiarch /archive original:master --threads 8\n  \
                  convertool digiarch /archive master:access --tool-ignore cad --dry-run\n  \
                  convertool standalone image jpg out/ scans/*.tif --root scans"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging and converter output passed through to the terminal
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert the pending files of an archive catalog
    Digiarch(DigiarchCommand),

    /// Convert files directly, without a catalog
    Standalone(StandaloneCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Digiarch(cmd) => cmd.execute(cli.verbose).await,
        Commands::Standalone(cmd) => cmd.execute(cli.verbose).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
