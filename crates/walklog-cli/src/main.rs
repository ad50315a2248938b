use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use walklog_cli::cli::{Cli, Commands};
use walklog_cli::commands::{self, Output, RecordArgs};
use walklog_cli::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "walklog", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    let config = Config::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.database.clone(), cli.remote.as_deref());
    config.validate()?;

    let out = Output {
        quiet: cli.quiet,
        no_color: cli.no_color,
    };

    match cli.command {
        Commands::Record {
            replay,
            mode,
            realtime,
            export,
        } => {
            let args = RecordArgs {
                replay,
                mode,
                realtime,
                export,
            };
            commands::cmd_record(args, &config, out).await?;
        }
        Commands::Stats { format } => commands::cmd_stats(format, &config, out).await?,
        Commands::LastPosition { format } => {
            commands::cmd_last_position(format, &config, out).await?;
        }
        Commands::Photos {
            format,
            limit,
            pending,
        } => commands::cmd_photos(format, limit, pending, &config, out).await?,
        Commands::Clear { yes } => commands::cmd_clear(yes, &config, out).await?,
        Commands::Export { name } => commands::cmd_export(name, &config, out).await?,
        Commands::Import { name } => commands::cmd_import(name, &config, out).await?,
        Commands::ListRemote { format } => {
            commands::cmd_list_remote(format, &config, out).await?;
        }
        Commands::OfficialPoints { format } => {
            commands::cmd_official_points(format, &config, out).await?;
        }
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}
