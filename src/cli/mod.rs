use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "kraken-rfb")]
#[command(
    version,
    about = "Monthly Receita Federal cryptoasset report from Kraken account history"
)]
#[command(
    long_about = "Fetch one month of Kraken trades, deposits and withdrawals, value every operation in BRL (BCB PTAX for fiat, CoinGecko for cryptoassets) and write the pipe-delimited RFB cryptoasset report."
)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/kraken-rfb/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the monthly report file
    Report {
        /// Month to report, YYYY-MM (default: previous month)
        #[arg(short, long)]
        month: Option<String>,

        /// Output file (default: rfb-YYYY-MM.txt)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Kraken key file, used when KRAKEN_API_KEY/KRAKEN_API_SECRET are unset
        #[arg(long, value_name = "PATH")]
        keys: Option<PathBuf>,

        /// Leave out transactions with no report mapping instead of aborting
        #[arg(long)]
        skip_unsupported: bool,

        /// Filing threshold in BRL (default from config, 30000)
        #[arg(long)]
        threshold: Option<String>,
    },

    /// Look up one historical rate
    Rate {
        /// Asset or currency code (BTC, USDT, USD, EUR...)
        asset: String,

        /// Date, YYYY-MM-DD or DD/MM/YYYY
        date: String,

        /// Quote currency
        #[arg(long, default_value = "BRL")]
        quote: String,
    },
}
