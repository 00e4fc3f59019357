use clap::Parser;
use colored::Colorize;
use kraken_rfb::cli::Cli;
use kraken_rfb::{dispatcher, error};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable with --json
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(err) = dispatcher::dispatch_command(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), err);
        for cause in err.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".bright_black(), cause);
        }
        std::process::exit(error::exit_code(&err));
    }
}
