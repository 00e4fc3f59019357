use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use itertools::Itertools;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::assets::{normalize_asset, parse_pair};
use super::{sort_chronologically, Fee, Transaction, TransactionKind, TransactionSource};
use crate::config::{Credentials, KrakenConfig};
use crate::error::ReportError;
use crate::period::ReportPeriod;

const SERVICE: &str = "Kraken";

type HmacSha512 = Hmac<Sha512>;

/// Envelope of every Kraken REST response
#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TradesHistoryResult {
    #[serde(default)]
    trades: HashMap<String, KrakenTrade>,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct KrakenTrade {
    pair: String,
    time: f64,
    #[serde(rename = "type")]
    trade_type: String,
    /// Quote-currency amount, fees excluded
    cost: Decimal,
    /// Fee in the quote currency
    fee: Decimal,
    /// Base-currency volume
    vol: Decimal,
}

#[derive(Debug, Deserialize)]
struct LedgersResult {
    #[serde(default)]
    ledger: HashMap<String, LedgerEntry>,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct LedgerEntry {
    time: f64,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    subtype: String,
    asset: String,
    amount: Decimal,
    #[serde(default)]
    fee: Decimal,
}

#[derive(Debug, Deserialize)]
struct FundingStatus {
    refid: String,
    asset: String,
    amount: Decimal,
    #[serde(default)]
    fee: Option<Decimal>,
    time: i64,
    status: String,
}

/// `DepositStatus`/`WithdrawStatus` answer with a bare list, or with a
/// cursor page when `cursor=true` was sent
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FundingPage {
    List(Vec<FundingStatus>),
    Cursor {
        #[serde(
            alias = "deposit",
            alias = "deposits",
            alias = "withdrawal",
            alias = "withdrawals"
        )]
        entries: Vec<FundingStatus>,
        #[serde(default)]
        next_cursor: Option<serde_json::Value>,
    },
}

impl FundingPage {
    fn into_parts(self) -> (Vec<FundingStatus>, Option<String>) {
        match self {
            FundingPage::List(entries) => (entries, None),
            FundingPage::Cursor {
                entries,
                next_cursor,
            } => {
                let cursor = next_cursor.and_then(|v| v.as_str().map(str::to_string));
                (entries, cursor)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Funding {
    Deposits,
    Withdrawals,
}

impl Funding {
    fn path(self) -> &'static str {
        match self {
            Funding::Deposits => "/0/private/DepositStatus",
            Funding::Withdrawals => "/0/private/WithdrawStatus",
        }
    }

    fn kind(self) -> TransactionKind {
        match self {
            Funding::Deposits => TransactionKind::Deposit,
            Funding::Withdrawals => TransactionKind::Withdrawal,
        }
    }
}

/// Page of an offset-paginated endpoint
pub(crate) struct OffsetPage<T> {
    pub items: Vec<T>,
    /// Total number of records the endpoint reports for the query
    pub total: usize,
}

/// Kraken private API client (read-only use)
pub struct KrakenClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    include_ledger: bool,
    last_nonce: AtomicU64,
}

impl KrakenClient {
    pub fn new(credentials: Credentials, config: &KrakenConfig) -> Result<Self> {
        BASE64.decode(credentials.secret.trim()).map_err(|e| {
            ReportError::Authentication(format!("Kraken API secret is not valid base64: {}", e))
        })?;

        let client = Client::builder()
            .user_agent(concat!("kraken-rfb/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            include_ledger: config.include_ledger,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Milliseconds since the epoch, bumped so consecutive calls never repeat
    fn next_nonce(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    async fn private_request<T: DeserializeOwned>(
        &self,
        uri_path: &str,
        mut params: BTreeMap<&'static str, String>,
    ) -> Result<T> {
        params.insert("nonce", self.next_nonce().to_string());
        let body = serde_urlencoded::to_string(&params)
            .with_context(|| format!("Failed to encode parameters for {}", uri_path))?;
        let signature = sign_encoded(uri_path, &params["nonce"], &body, &self.credentials.secret)?;

        debug!("POST {}{}", self.base_url, uri_path);
        let response = self
            .client
            .post(format!("{}{}", self.base_url, uri_path))
            .header("API-Key", &self.credentials.key)
            .header("API-Sign", signature)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))
            .with_context(|| format!("Kraken request {} failed", uri_path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReportError::from_transport(SERVICE, &e))
            .with_context(|| format!("Failed to read Kraken response for {}", uri_path))?;

        if !status.is_success() {
            return Err(ReportError::from_status(SERVICE, status, &text))
                .with_context(|| format!("Kraken request {} failed", uri_path));
        }

        parse_private_response(&text).with_context(|| format!("Kraken request {} failed", uri_path))
    }

    fn range_params(period: ReportPeriod) -> BTreeMap<&'static str, String> {
        // Kraken's bounds are both compared against fractional times: `start`
        // is exclusive and `end` inclusive, so the window is widened by a
        // second at the start and the half-open month is enforced locally
        let mut params = BTreeMap::new();
        params.insert("start", (period.start_timestamp() - 1).to_string());
        params.insert("end", period.end_timestamp().to_string());
        params
    }

    async fn trades_page(
        &self,
        period: ReportPeriod,
        offset: usize,
    ) -> Result<OffsetPage<(String, KrakenTrade)>> {
        let mut params = Self::range_params(period);
        params.insert("ofs", offset.to_string());
        let result: TradesHistoryResult =
            self.private_request("/0/private/TradesHistory", params).await?;
        Ok(OffsetPage {
            items: result.trades.into_iter().collect(),
            total: result.count,
        })
    }

    async fn ledger_page(
        &self,
        period: ReportPeriod,
        offset: usize,
    ) -> Result<OffsetPage<(String, LedgerEntry)>> {
        let mut params = Self::range_params(period);
        params.insert("ofs", offset.to_string());
        let result: LedgersResult = self.private_request("/0/private/Ledgers", params).await?;
        Ok(OffsetPage {
            items: result.ledger.into_iter().collect(),
            total: result.count,
        })
    }

    async fn funding_page(
        &self,
        funding: Funding,
        period: ReportPeriod,
        cursor: Option<String>,
    ) -> Result<(Vec<FundingStatus>, Option<String>)> {
        let mut params = Self::range_params(period);
        params.insert("cursor", cursor.unwrap_or_else(|| "true".to_string()));
        let page: FundingPage = self.private_request(funding.path(), params).await?;
        Ok(page.into_parts())
    }

    async fn fetch_trades(&self, period: ReportPeriod) -> Result<Vec<Transaction>> {
        let trades = collect_offset_pages(move |ofs| self.trades_page(period, ofs)).await?;
        info!("Kraken returned {} trades", trades.len());
        trades_to_transactions(&trades, period)
    }

    async fn fetch_funding(
        &self,
        funding: Funding,
        period: ReportPeriod,
    ) -> Result<Vec<Transaction>> {
        let entries =
            collect_cursor_pages(move |cursor| self.funding_page(funding, period, cursor)).await?;
        info!("Kraken returned {} {:?} entries", entries.len(), funding);
        funding_to_transactions(funding, &entries, period)
    }

    async fn fetch_ledger(&self, period: ReportPeriod) -> Result<Vec<Transaction>> {
        let entries = collect_offset_pages(move |ofs| self.ledger_page(period, ofs)).await?;
        info!("Kraken returned {} ledger entries", entries.len());

        let mut transactions = Vec::new();
        for (id, entry) in &entries {
            if let Some(transaction) = ledger_to_transaction(id, entry)? {
                if period.contains(&transaction.timestamp) {
                    transactions.push(transaction);
                }
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl TransactionSource for KrakenClient {
    async fn fetch_transactions(&self, period: &ReportPeriod) -> Result<Vec<Transaction>> {
        let period = *period;
        info!(
            "Fetching Kraken activity from {} to {}",
            period.start,
            period.last_day()
        );

        let mut transactions = self
            .fetch_trades(period)
            .await
            .context("Failed to fetch Kraken trade history")?;
        transactions.extend(
            self.fetch_funding(Funding::Deposits, period)
                .await
                .context("Failed to fetch Kraken deposits")?,
        );
        transactions.extend(
            self.fetch_funding(Funding::Withdrawals, period)
                .await
                .context("Failed to fetch Kraken withdrawals")?,
        );
        if self.include_ledger {
            transactions.extend(
                self.fetch_ledger(period)
                    .await
                    .context("Failed to fetch Kraken ledger")?,
            );
        }

        sort_chronologically(&mut transactions);
        Ok(transactions)
    }
}

/// Collect every page of an `ofs`-paginated endpoint
pub(crate) async fn collect_offset_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<OffsetPage<T>>>,
{
    let mut collected = Vec::new();
    loop {
        let page = fetch_page(collected.len()).await?;
        let received = page.items.len();
        collected.extend(page.items);
        debug!("Page: {} records, {}/{}", received, collected.len(), page.total);
        if received == 0 || collected.len() >= page.total {
            break;
        }
    }
    Ok(collected)
}

/// Collect every page of a cursor-paginated endpoint
pub(crate) async fn collect_cursor_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = None;
    loop {
        let (items, next) = fetch_page(cursor.take()).await?;
        collected.extend(items);
        match next {
            Some(next) if !next.is_empty() && seen.insert(next.clone()) => cursor = Some(next),
            _ => break,
        }
    }
    Ok(collected)
}

/// `API-Sign` for an already url-encoded POST body
pub fn sign_encoded(uri_path: &str, nonce: &str, encoded_body: &str, secret: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(encoded_body.as_bytes());
    let hash = hasher.finalize();

    let key = BASE64.decode(secret.trim()).map_err(|e| {
        ReportError::Authentication(format!("Kraken API secret is not valid base64: {}", e))
    })?;
    let mut mac = HmacSha512::new_from_slice(&key)
        .map_err(|e| ReportError::Authentication(format!("Invalid HMAC key: {}", e)))?;
    mac.update(uri_path.as_bytes());
    mac.update(&hash);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn parse_private_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: KrakenResponse<T> = serde_json::from_str(body)
        .map_err(|e| ReportError::invalid_response(SERVICE, e.to_string()))?;

    let errors: Vec<&String> = envelope
        .error
        .iter()
        .filter(|e| e.starts_with('E'))
        .collect();
    if !errors.is_empty() {
        return Err(classify_api_errors(&errors).into());
    }
    for warning in envelope.error.iter().filter(|e| e.starts_with('W')) {
        warn!("Kraken warning: {}", warning);
    }

    envelope
        .result
        .ok_or_else(|| ReportError::invalid_response(SERVICE, "response has no result").into())
}

fn classify_api_errors(errors: &[&String]) -> ReportError {
    let joined = errors.iter().join(", ");

    let any = |needles: &[&str]| {
        errors
            .iter()
            .any(|e| needles.iter().any(|needle| e.contains(needle)))
    };

    if any(&[
        "Invalid key",
        "Invalid signature",
        "Invalid nonce",
        "Permission denied",
    ]) {
        ReportError::Authentication(joined)
    } else if any(&["Rate limit exceeded", "Too many requests", "Throttled"]) {
        ReportError::RateLimited {
            service: SERVICE.to_string(),
            detail: joined,
        }
    } else {
        ReportError::Network(format!("{} API error: {}", SERVICE, joined))
    }
}

fn timestamp_from_secs(seconds: f64) -> Option<DateTime<Utc>> {
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn trades_to_transactions(
    trades: &[(String, KrakenTrade)],
    period: ReportPeriod,
) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::new();
    for (txid, trade) in trades {
        let transaction = trade_to_transaction(txid, trade)?;
        if period.contains(&transaction.timestamp) {
            transactions.push(transaction);
        }
    }
    Ok(transactions)
}

fn trade_to_transaction(txid: &str, trade: &KrakenTrade) -> Result<Transaction> {
    let (base, quote) = parse_pair(&trade.pair).ok_or_else(|| {
        ReportError::invalid_response(
            SERVICE,
            format!("unknown trading pair '{}' in trade {}", trade.pair, txid),
        )
    })?;
    let timestamp = timestamp_from_secs(trade.time)
        .ok_or_else(|| anyhow!("Invalid time {} in trade {}", trade.time, txid))?;

    let (kind, quantity, counter_quantity) = match trade.trade_type.as_str() {
        "buy" => (TransactionKind::TradeBuy, trade.vol, -trade.cost),
        "sell" => (TransactionKind::TradeSell, -trade.vol, trade.cost),
        other => {
            return Err(ReportError::invalid_response(
                SERVICE,
                format!("unknown trade type '{}' in trade {}", other, txid),
            )
            .into())
        }
    };

    let fee = (!trade.fee.is_zero()).then(|| Fee {
        asset: quote.clone(),
        amount: trade.fee,
    });

    Ok(Transaction {
        reference: txid.to_string(),
        timestamp,
        kind,
        asset: base,
        quantity,
        counter_asset: Some(quote),
        counter_quantity: Some(counter_quantity),
        fee,
    })
}

fn funding_to_transactions(
    funding: Funding,
    entries: &[FundingStatus],
    period: ReportPeriod,
) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::new();
    for entry in entries {
        if !period.contains_timestamp(entry.time) {
            continue;
        }
        if entry.status != "Success" {
            info!(
                "Skipping {:?} {} ({} {}): status {}",
                funding, entry.refid, entry.amount, entry.asset, entry.status
            );
            continue;
        }

        let timestamp = DateTime::from_timestamp(entry.time, 0)
            .ok_or_else(|| anyhow!("Invalid time {} in {}", entry.time, entry.refid))?;
        let asset = normalize_asset(&entry.asset);
        let quantity = match funding {
            Funding::Deposits => entry.amount.abs(),
            Funding::Withdrawals => -entry.amount.abs(),
        };
        let fee = entry.fee.filter(|f| !f.is_zero()).map(|amount| Fee {
            asset: asset.clone(),
            amount,
        });

        transactions.push(Transaction {
            reference: entry.refid.clone(),
            timestamp,
            kind: funding.kind(),
            asset,
            quantity,
            counter_asset: None,
            counter_quantity: None,
            fee,
        });
    }
    Ok(transactions)
}

/// Ledger movements not already covered by the trade and funding endpoints
fn ledger_to_transaction(id: &str, entry: &LedgerEntry) -> Result<Option<Transaction>> {
    let kind = match entry.entry_type.as_str() {
        "trade" | "deposit" | "withdrawal" => return Ok(None),
        "rollover" | "margin" => TransactionKind::Fee,
        other => TransactionKind::Other(other.to_string()),
    };
    if !entry.subtype.is_empty() {
        debug!("Ledger {} {} subtype {}", id, entry.entry_type, entry.subtype);
    }

    let timestamp = timestamp_from_secs(entry.time)
        .ok_or_else(|| anyhow!("Invalid time {} in ledger entry {}", entry.time, id))?;
    let asset = normalize_asset(&entry.asset);
    let fee = (!entry.fee.is_zero()).then(|| Fee {
        asset: asset.clone(),
        amount: entry.fee,
    });

    Ok(Some(Transaction {
        reference: id.to_string(),
        timestamp,
        kind,
        asset,
        quantity: entry.amount,
        counter_asset: None,
        counter_quantity: None,
        fee,
    }))
}
