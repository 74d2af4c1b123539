use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fractise-relay")]
#[command(about = "Fractise Telegram relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a template config file (secrets left blank).
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.fractise-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Resolve the configuration (file + environment) and print a summary with secrets redacted.
    Check {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.fractise-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay: answer Telegram messages and post scheduled broadcasts until Ctrl+C.
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.fractise-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("fractise-relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config).context("init failed"),
        Some(Commands::Check { config }) => run_check(config).context("configuration invalid"),
        Some(Commands::Run { config }) => run_relay(config).await.context("relay failed"),
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    let code = exit_code(&result);
    if let Err(e) = result {
        log::error!("{:#}", e);
    }
    if code != 0 {
        std::process::exit(code);
    }
}

/// Any failure, configuration errors included, exits with status 1.
fn exit_code(result: &anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!(
        "initialized configuration at {} (fill in telegram.botToken and openai.apiKey in {})",
        dir.display(),
        path.display()
    );
    Ok(())
}

fn resolve_config(config_path: Option<PathBuf>) -> anyhow::Result<relay::config::RelayConfig> {
    resolve_config_with(config_path, |key| std::env::var(key).ok())
}

fn resolve_config_with<F>(config_path: Option<PathBuf>, env: F) -> anyhow::Result<relay::config::RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (file, path) = relay::config::load_config(config_path)?;
    log::debug!("using config file {}", path.display());
    Ok(relay::config::RelayConfig::resolve_with(&file, env)?)
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = resolve_config(config_path)?;
    println!("{}", config.summary());
    Ok(())
}

async fn run_relay(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = resolve_config(config_path)?;
    log::info!("starting relay\n{}", config.summary());
    relay::service::run(config).await
}
