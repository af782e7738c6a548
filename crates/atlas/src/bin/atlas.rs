use std::path::PathBuf;
use std::process::ExitCode;

use atlas::console::ConsoleConnector;
use atlas::runtime::{AtlasRuntime, ConfigLoader};
use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "atlas")]
#[command(version, about = "Atlas - self-hosted chat automation agent")]
struct Cli {
    /// Configuration file (defaults to ./atlas.toml, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore ATLAS_* and legacy environment variables
    #[arg(long)]
    no_env: bool,

    /// Transport used to connect identities
    #[arg(long, value_enum, default_value_t = ConnectorKind::Console)]
    connector: ConnectorKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConnectorKind {
    /// Terminal loopback: input lines become messages, output is printed
    Console,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if cli.no_env {
        loader = loader.without_env();
    }
    let config = loader.load_validated()?;

    let owner_id = config.owner_id.unwrap_or_default();
    let builder = AtlasRuntime::builder().config(config);
    let builder = match cli.connector {
        ConnectorKind::Console => builder.connector(ConsoleConnector::stdio(owner_id)),
    };

    builder.build()?.run().await?;
    Ok(())
}
