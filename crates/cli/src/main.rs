use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "truthbounty")]
#[command(about = "Multi-platform prediction-market aggregation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web API with background market sync
    Serve {
        /// Listen address, overrides the configured host/port
        #[arg(short, long)]
        addr: Option<String>,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Run one fetch cycle across all platforms
    Sync {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Bypass the cache and refetch everything
        #[arg(long)]
        force: bool,
    },
    /// Build a leaderboard snapshot and write it as JSON
    Index {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Output file path
        #[arg(short, long, default_value = "leaderboard-snapshot.json")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Serve { addr, config } => {
            commands::run_serve(addr.as_deref(), &config).await?;
        }
        Commands::Sync { config, force } => {
            commands::run_sync(&config, force).await?;
        }
        Commands::Index { config, output } => {
            commands::run_index(&config, &output).await?;
        }
    }

    Ok(())
}
