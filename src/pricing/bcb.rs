//! Banco Central do Brasil PTAX selling rates (SGS time series)
//!
//! PTAX is only published on business days, so a request asks for a small
//! window ending on the wanted date and keeps the latest observation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{http_client, RateQuote, RateSource, BRL};
use crate::config::RatesConfig;
use crate::error::ReportError;

const SERVICE: &str = "BCB";

/// SGS series of the PTAX selling rate, in BRL per unit
pub fn ptax_series(currency: &str) -> Option<u32> {
    match currency {
        "USD" => Some(1),
        "EUR" => Some(21619),
        "JPY" => Some(21621),
        "GBP" => Some(21623),
        "CHF" => Some(21625),
        "DKK" => Some(21627),
        "NOK" => Some(21629),
        "SEK" => Some(21631),
        "AUD" => Some(21633),
        "CAD" => Some(21635),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BcbObservation {
    #[serde(rename = "data", deserialize_with = "deserialize_br_date")]
    pub date: NaiveDate,
    #[serde(rename = "valor")]
    pub value: Decimal,
}

fn deserialize_br_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NaiveDate::parse_from_str(&s, "%d/%m/%Y").map_err(serde::de::Error::custom)
}

/// Latest observation on or before `date`
pub fn latest_on_or_before(
    observations: &[BcbObservation],
    date: NaiveDate,
) -> Option<&BcbObservation> {
    observations
        .iter()
        .filter(|o| o.date <= date)
        .max_by_key(|o| o.date)
}

pub fn parse_series(body: &str) -> Result<Vec<BcbObservation>> {
    serde_json::from_str(body)
        .map_err(|e| ReportError::invalid_response(SERVICE, format!("unexpected series body: {}", e)).into())
}

pub struct BcbSource {
    client: Client,
    base_url: String,
    fallback_days: i64,
}

impl BcbSource {
    pub fn new(config: &RatesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.bcb_url.trim_end_matches('/').to_string(),
            fallback_days: config.fallback_days.max(0),
        })
    }

    fn series_url(&self, series: u32, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{}/dados/serie/bcdata.sgs.{}/dados?formato=json&dataInicial={}&dataFinal={}",
            self.base_url,
            series,
            from.format("%d/%m/%Y"),
            to.format("%d/%m/%Y")
        )
    }
}

#[async_trait]
impl RateSource for BcbSource {
    fn name(&self) -> &str {
        SERVICE
    }

    fn supports(&self, base: &str, quote: &str) -> bool {
        quote == BRL && ptax_series(base).is_some()
    }

    async fn fetch_rate(&self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote> {
        let series = ptax_series(base)
            .ok_or_else(|| ReportError::rate_unavailable(date, base, quote, "no PTAX series"))?;
        let from = date - Duration::days(self.fallback_days);
        let url = self.series_url(series, from, date);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))
            .context("PTAX request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))?;

        // SGS answers 404 when the window holds no observation
        if status == StatusCode::NOT_FOUND {
            return Err(ReportError::rate_unavailable(
                date,
                base,
                quote,
                format!("no PTAX quote between {} and {}", from, date),
            )
            .into());
        }
        if !status.is_success() {
            return Err(ReportError::from_status(SERVICE, status, &body).into());
        }

        let observations = parse_series(&body)?;
        let observation = latest_on_or_before(&observations, date).ok_or_else(|| {
            ReportError::rate_unavailable(
                date,
                base,
                quote,
                format!("no PTAX quote between {} and {}", from, date),
            )
        })?;

        Ok(RateQuote {
            date,
            effective_date: observation.date,
            base: base.to_string(),
            quote: quote.to_string(),
            rate: observation.value,
            source: SERVICE.to_string(),
        })
    }
}
