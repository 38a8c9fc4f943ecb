use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobyard::cli::{Cli, Command};
use jobyard::commands;
use jobyard::config::JobyardConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => JobyardConfig::load_from(path)?,
        None => JobyardConfig::load()?,
    };
    if let Some(size) = cli.pool_size {
        config.max_pool_size = Some(size);
        config.validate()?;
    }

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Jobs {
            count,
            sleep_ms,
            fail_every,
        } => {
            let failed = commands::run_jobs(&config, count, sleep_ms, fail_every).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Tasks {
            count,
            polls,
            title,
            cleanup,
            fail_first,
        } => {
            let failed =
                commands::run_tasks(&config, count, polls, &title, cleanup, fail_first).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Config => {
            println!("{}", config.to_pretty_json()?);
        }
    }

    Ok(())
}
