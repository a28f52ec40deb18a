//! Quire CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod build;
mod commands;
mod pipeline;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Incremental documentation compiler with live reload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Documentation project root
    #[arg(short, long, default_value = ".")]
    input: PathBuf,

    /// Build output directory
    #[arg(short, long, default_value = "_output")]
    output: PathBuf,

    /// Active variable preset scope
    #[arg(long, default_value = "default")]
    vars_preset: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the whole project once and exit
    Build,
    /// Build, then watch for changes and serve with live reload
    Watch {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("quire={}", log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Quire v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Project root: {}", cli.input.display());

    match cli.command {
        Commands::Build => commands::build(cli.input, cli.output, cli.vars_preset).await,
        Commands::Watch { host, port } => {
            commands::watch(cli.input, cli.output, cli.vars_preset, host, port).await
        }
    }
}
