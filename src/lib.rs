pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod domain;
pub mod entities;
pub mod error;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod ranking;
pub mod resolver;
pub mod scheduler;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Init)) {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Edit config.toml and run again.");
        } else {
            println!("config.toml already exists.");
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config);

    match cli.command {
        None | Some(Commands::Daemon) => cli::cmd_daemon(config).await,
        Some(Commands::Check) => cli::cmd_check(config).await,
        Some(Commands::Add {
            title,
            year,
            show,
            imdb,
        }) => cli::cmd_add(&config, &title.join(" "), year, show, imdb).await,
        Some(Commands::List) => cli::cmd_list(&config).await,
        Some(Commands::Retry { id, symlink }) => cli::cmd_retry(&config, id, symlink).await,
        Some(Commands::Remove { id, yes }) => cli::cmd_remove(&config, id, yes).await,
        Some(Commands::Sweep) => cli::cmd_sweep(&config).await,
        Some(Commands::Sync) => cli::cmd_sync(&config).await,
        Some(Commands::Init) => Ok(()),
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.general.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
