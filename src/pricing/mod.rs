// Pricing module - historical BRL rates for fiat currencies and cryptoassets

pub mod bcb;
pub mod coingecko;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RatesConfig;
use crate::error::ReportError;

pub use bcb::BcbSource;
pub use coingecko::CoinGeckoSource;

pub const BRL: &str = "BRL";

/// One (date, base, quote) conversion the report needs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RateRequest {
    pub date: NaiveDate,
    pub base: String,
    pub quote: String,
}

impl RateRequest {
    pub fn new(date: NaiveDate, base: &str, quote: &str) -> Self {
        Self {
            date,
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }
}

/// Rates a run needs, each with the references of the transactions it values
pub type RateNeeds = BTreeMap<RateRequest, Vec<String>>;

/// Price of one unit of `base` in `quote`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateQuote {
    /// Date the rate was asked for
    pub date: NaiveDate,
    /// Date of the observation actually used (PTAX falls back to earlier days)
    pub effective_date: NaiveDate,
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
    pub source: String,
}

/// A historical price provider
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this source can price `base` in `quote` at all
    fn supports(&self, base: &str, quote: &str) -> bool;

    async fn fetch_rate(&self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote>;
}

/// Rate lookup with a per-run memo. Each distinct (date, base, quote) hits
/// its source at most once.
pub struct RateLookup {
    sources: Vec<Box<dyn RateSource>>,
    memo: HashMap<RateRequest, RateQuote>,
    today: NaiveDate,
}

impl RateLookup {
    pub fn new(sources: Vec<Box<dyn RateSource>>, today: NaiveDate) -> Self {
        Self {
            sources,
            memo: HashMap::new(),
            today,
        }
    }

    /// BCB PTAX for fiat, CoinGecko for everything else
    pub fn from_config(config: &RatesConfig, today: NaiveDate) -> Result<Self> {
        let sources: Vec<Box<dyn RateSource>> = vec![
            Box::new(BcbSource::new(config)?),
            Box::new(CoinGeckoSource::new(config)?),
        ];
        Ok(Self::new(sources, today))
    }

    pub async fn rate(&mut self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote> {
        let request = RateRequest::new(date, base, quote);
        if let Some(quote) = self.memo.get(&request) {
            debug!("Memoized rate {}/{} on {}", request.base, request.quote, date);
            return Ok(quote.clone());
        }

        let quote = self.resolve(&request).await?;
        self.memo.insert(request, quote.clone());
        Ok(quote)
    }

    async fn resolve(&self, request: &RateRequest) -> Result<RateQuote> {
        let RateRequest { date, base, quote } = request;

        if base == quote {
            return Ok(RateQuote {
                date: *date,
                effective_date: *date,
                base: base.clone(),
                quote: quote.clone(),
                rate: Decimal::ONE,
                source: "identity".to_string(),
            });
        }

        if *date > self.today {
            return Err(ReportError::rate_unavailable(*date, base, quote, "date is in the future").into());
        }

        let source = self
            .sources
            .iter()
            .find(|s| s.supports(base, quote))
            .ok_or_else(|| ReportError::rate_unavailable(*date, base, quote, "unsupported pair"))?;

        info!("Fetching {}/{} for {} from {}", base, quote, date, source.name());
        let rate = source
            .fetch_rate(*date, base, quote)
            .await
            .with_context(|| format!("{}/{} rate for {} from {}", base, quote, date, source.name()))?;

        if rate.rate <= Decimal::ZERO {
            return Err(ReportError::rate_unavailable(
                *date,
                base,
                quote,
                format!("{} returned a non-positive rate", source.name()),
            )
            .into());
        }
        Ok(rate)
    }

    /// Resolve every request, stopping at the first failure
    pub async fn quotes_for(&mut self, needs: &RateNeeds) -> Result<RateTable> {
        let mut table = RateTable::default();
        for (request, references) in needs {
            let quote = self
                .rate(request.date, &request.base, &request.quote)
                .await
                .with_context(|| format!("valuing {}", references.join(", ")))?;
            table.insert(quote);
        }
        Ok(table)
    }
}

/// Resolved quotes the report builder reads from
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    quotes: BTreeMap<RateRequest, RateQuote>,
}

impl RateTable {
    pub fn insert(&mut self, quote: RateQuote) {
        let key = RateRequest::new(quote.date, &quote.base, &quote.quote);
        self.quotes.insert(key, quote);
    }

    pub fn get(&self, date: NaiveDate, base: &str, quote: &str) -> Result<&RateQuote> {
        self.quotes
            .get(&RateRequest::new(date, base, quote))
            .ok_or_else(|| {
                ReportError::rate_unavailable(date, base, quote, "rate was not looked up").into()
            })
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateQuote> {
        self.quotes.values()
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("kraken-rfb/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn supports(&self, base: &str, quote: &str) -> bool {
            base == "USD" && quote == BRL
        }

        async fn fetch_rate(&self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RateQuote {
                date,
                effective_date: date,
                base: base.to_string(),
                quote: quote.to_string(),
                rate: dec!(4.9753),
                source: "counting".to_string(),
            })
        }
    }

    fn lookup() -> (RateLookup, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
        };
        (RateLookup::new(vec![Box::new(source)], d(2024, 4, 10)), calls)
    }

    #[tokio::test]
    async fn test_memoizes_per_key() {
        let (mut lookup, calls) = lookup();
        let a = lookup.rate(d(2024, 3, 1), "USD", "BRL").await.unwrap();
        let b = lookup.rate(d(2024, 3, 1), "usd", "brl").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        lookup.rate(d(2024, 3, 4), "USD", "BRL").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_identity_rate_skips_sources() {
        let (mut lookup, calls) = lookup();
        let quote = lookup.rate(d(2024, 3, 1), "BRL", "BRL").await.unwrap();
        assert_eq!(quote.rate, Decimal::ONE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_future_date_is_unavailable() {
        let (mut lookup, calls) = lookup();
        let err = lookup.rate(d(2024, 4, 11), "USD", "BRL").await.unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 13);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_pair_is_unavailable() {
        let (mut lookup, _) = lookup();
        let err = lookup.rate(d(2024, 3, 1), "AED", "BRL").await.unwrap_err();
        assert!(matches!(
            crate::error::report_error(&err),
            Some(ReportError::RateUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_quotes_for_builds_table() {
        let (mut lookup, calls) = lookup();
        let needs: RateNeeds = [
            (RateRequest::new(d(2024, 3, 1), "USD", "BRL"), vec!["T1".to_string()]),
            (RateRequest::new(d(2024, 3, 2), "USD", "BRL"), vec!["T2".to_string()]),
        ]
        .into_iter()
        .collect();

        let table = lookup.quotes_for(&needs).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(table.get(d(2024, 3, 2), "USD", "BRL").unwrap().rate, dec!(4.9753));

        let err = table.get(d(2024, 3, 3), "USD", "BRL").unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 13);
    }

    #[tokio::test]
    async fn test_quotes_for_names_transactions_on_failure() {
        let (mut lookup, _) = lookup();
        let needs: RateNeeds = [(
            RateRequest::new(d(2024, 3, 5), "AED", "BRL"),
            vec!["W7".to_string(), "W8".to_string()],
        )]
        .into_iter()
        .collect();

        let err = lookup.quotes_for(&needs).await.unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 13);
        assert!(format!("{:#}", err).contains("valuing W7, W8"));
    }
}
