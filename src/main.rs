use clap::{Parser, Subcommand};
use logpusher::config::resolve_config_path;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logpusher")]
#[command(about = "Ship log lines from stdin to a log stream", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read lines from stdin and push them (default)
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config file
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run) | None => {
            let config_path = resolve_config_path(cli.config.as_deref());
            logpusher::cli::run::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                logpusher::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
