use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::{http_client, RateQuote, RateSource};
use crate::config::RatesConfig;
use crate::error::ReportError;
use crate::exchange::assets::is_fiat;

const SERVICE: &str = "CoinGecko";

/// CoinGecko coin id for a ticker; unknown tickers are tried as ids
pub fn coin_id(ticker: &str) -> String {
    let id = match ticker.to_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "LTC" => "litecoin",
        "XRP" => "ripple",
        "BCH" => "bitcoin-cash",
        "BNB" => "binancecoin",
        "ADA" => "cardano",
        "DOT" => "polkadot",
        "DOGE" => "dogecoin",
        "SOL" => "solana",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "AVAX" => "avalanche-2",
        "LINK" => "chainlink",
        "MATIC" => "matic-network",
        "XLM" => "stellar",
        "UNI" => "uniswap",
        "ATOM" => "cosmos",
        "ALGO" => "algorand",
        "XTZ" => "tezos",
        "XMR" => "monero",
        "DAI" => "dai",
        other => return other.to_lowercase(),
    };
    id.to_string()
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    current_price: HashMap<String, Decimal>,
}

/// Price in `quote` from a `/coins/{id}/history` body
pub fn parse_history(body: &str, date: NaiveDate, base: &str, quote: &str) -> Result<Decimal> {
    let response: HistoryResponse = serde_json::from_str(body)
        .map_err(|e| ReportError::invalid_response(SERVICE, format!("unexpected history body: {}", e)))?;

    let market_data = response.market_data.ok_or_else(|| {
        ReportError::rate_unavailable(date, base, quote, "no market data for that date")
    })?;

    market_data
        .current_price
        .get(&quote.to_lowercase())
        .copied()
        .ok_or_else(|| {
            ReportError::rate_unavailable(date, base, quote, format!("no {} price", quote)).into()
        })
}

pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
    api_key: Option<(String, String)>,
}

impl CoinGeckoSource {
    pub fn new(config: &RatesConfig) -> Result<Self> {
        let api_key = config
            .coingecko_api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| (config.coingecko_key_header.clone(), k.clone()));
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.coingecko_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn history_url(&self, id: &str, date: NaiveDate) -> String {
        format!(
            "{}/coins/{}/history?date={}&localization=false",
            self.base_url,
            id,
            date.format("%d-%m-%Y")
        )
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        SERVICE
    }

    fn supports(&self, base: &str, _quote: &str) -> bool {
        !is_fiat(base)
    }

    async fn fetch_rate(&self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote> {
        let id = coin_id(base);
        let url = self.history_url(&id, date);
        debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))
            .context("price history request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))?;

        if status == StatusCode::NOT_FOUND {
            return Err(ReportError::rate_unavailable(
                date,
                base,
                quote,
                format!("unknown coin id '{}'", id),
            )
            .into());
        }
        if !status.is_success() {
            return Err(ReportError::from_status(SERVICE, status, &body).into());
        }

        let rate = parse_history(&body, date, base, quote)?;
        Ok(RateQuote {
            date,
            effective_date: date,
            base: base.to_string(),
            quote: quote.to_string(),
            rate,
            source: SERVICE.to_string(),
        })
    }
}
