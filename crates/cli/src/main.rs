mod commands;
mod server;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "siteferry=info,siteferry_deployer=info,tower_http=info";

#[derive(Parser)]
#[command(name = "siteferry")]
#[command(version, about = "Deploy Webflow sites to Porkbun static hosting", long_about = None)]
struct Cli {
    /// Path to a siteferry.toml settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run the webhook receiver
    Serve {
        /// Address to bind (overrides settings)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Deploy one site now and wait for the result
    Deploy {
        /// Webflow site ID
        site_id: String,
    },

    /// Print the resolved settings with secrets redacted
    Config,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal in production
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Command::Serve { host, port } => commands::serve::run(config, host, port).await,
        Command::Deploy { site_id } => commands::deploy::run(config, &site_id).await,
        Command::Config => commands::config::run(config),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "siteferry", &mut io::stdout());
            Ok(())
        }
    }
}
