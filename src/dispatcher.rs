//! Command dispatcher that routes parsed clap commands to their handlers.

mod rate;
mod report;

use anyhow::Result;
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::config::Config;

/// Load configuration and route a parsed command to its handler
pub async fn dispatch_command(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    debug!("Effective config: {:?}", config);

    match cli.command {
        Commands::Report {
            month,
            output,
            keys,
            skip_unsupported,
            threshold,
        } => {
            report::dispatch_report(
                &config,
                report::ReportArgs {
                    month,
                    output,
                    keys,
                    skip_unsupported,
                    threshold,
                },
                cli.json,
            )
            .await
        }
        Commands::Rate { asset, date, quote } => {
            rate::dispatch_rate(&config, &asset, &date, &quote, cli.json).await
        }
    }
}
