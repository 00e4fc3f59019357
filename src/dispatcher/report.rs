use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use tracing::info;

use crate::cli::formatters::{format_report_json, format_report_summary};
use crate::config::{parse_amount, Config};
use crate::exchange::KrakenClient;
use crate::period::ReportPeriod;
use crate::pipeline::{default_output_path, generate_report, write_atomically, ReportOptions};
use crate::pricing::RateLookup;
use crate::report::RfbLayout;

pub struct ReportArgs {
    pub month: Option<String>,
    pub output: Option<PathBuf>,
    pub keys: Option<PathBuf>,
    pub skip_unsupported: bool,
    pub threshold: Option<String>,
}

pub async fn dispatch_report(config: &Config, args: ReportArgs, json_output: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let period = match args.month.as_deref() {
        Some(month) => ReportPeriod::parse(month)?,
        None => ReportPeriod::previous_month(today)?,
    };
    let threshold = match args.threshold.as_deref() {
        Some(value) => parse_amount(value)?,
        None => config.report.threshold,
    };
    let output = args.output.unwrap_or_else(|| default_output_path(&period));
    info!("Generating RFB report for {} into {}", period, output.display());

    let credentials = config.credentials(args.keys.as_deref())?;
    let client = KrakenClient::new(credentials, &config.kraken)?;
    let mut rates = RateLookup::from_config(&config.rates, today)?;
    let layout = RfbLayout::new(config.exchange.clone());
    let options = ReportOptions {
        skip_unsupported: args.skip_unsupported,
        threshold,
    };

    let (report, rendered) = generate_report(&client, &mut rates, &layout, &period, &options).await?;
    write_atomically(&output, &rendered)?;

    if json_output {
        println!("{}", format_report_json(&report, &output));
    } else {
        print!("{}", format_report_summary(&report, &output));
    }
    Ok(())
}
