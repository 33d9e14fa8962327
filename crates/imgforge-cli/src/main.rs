//! imgforge CLI tool.

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::build::BuildArgs;
use commands::client::ApiClient;

#[derive(Parser)]
#[command(name = "imgforge")]
#[command(about = "imgforge build service CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "IMGFORGE_API_URL", default_value = "http://localhost:9007")]
    api_url: String,

    /// Log HTTP requests to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an image build
    Build {
        #[command(flatten)]
        args: BuildArgs,
        /// Poll the build and print its logs until it finishes
        #[arg(short, long)]
        follow: bool,
        /// Poll interval in milliseconds when following
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,
    },
    /// Show the status of a build
    Status {
        /// Image name returned by `build`
        image: String,
        /// Print the accumulated build logs
        #[arg(long)]
        logs: bool,
    },
    /// Validate a service configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "imgforge.kdl")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            args,
            follow,
            poll_interval_ms,
        } => {
            let client = ApiClient::new(&cli.api_url);
            let poll = follow.then(|| Duration::from_millis(poll_interval_ms));
            commands::build::run(&client, args, poll).await?;
        }
        Commands::Status { image, logs } => {
            let client = ApiClient::new(&cli.api_url);
            commands::status::show(&client, &image, logs).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
