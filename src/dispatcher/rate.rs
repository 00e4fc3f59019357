use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::cli::formatters::{format_rate, format_rate_json};
use crate::config::Config;
use crate::error::ReportError;
use crate::pricing::RateLookup;

/// Accepts YYYY-MM-DD or DD/MM/YYYY
fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .map_err(|_| {
            ReportError::Config(format!("invalid date '{}', expected YYYY-MM-DD", value)).into()
        })
}

pub async fn dispatch_rate(
    config: &Config,
    asset: &str,
    date: &str,
    quote: &str,
    json_output: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let mut rates = RateLookup::from_config(&config.rates, Local::now().date_naive())?;
    let rate = rates
        .rate(date, &asset.to_uppercase(), &quote.to_uppercase())
        .await?;

    if json_output {
        println!("{}", format_rate_json(&rate));
    } else {
        print!("{}", format_rate(&rate));
    }
    Ok(())
}
