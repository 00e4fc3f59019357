// Exchange module - account history fetched from the exchange API

pub mod assets;
pub mod kraken;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::period::ReportPeriod;

pub use kraken::KrakenClient;

/// Kind of account movement as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TradeBuy,
    TradeSell,
    Fee,
    /// Any other ledger movement (staking, earn, transfer, ...), by its exchange name
    Other(String),
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
            TransactionKind::TradeBuy => write!(f, "trade-buy"),
            TransactionKind::TradeSell => write!(f, "trade-sell"),
            TransactionKind::Fee => write!(f, "fee"),
            TransactionKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Fee charged by the exchange, in the asset it was charged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fee {
    pub asset: String,
    pub amount: Decimal,
}

/// One account movement, exchange vocabulary already mapped onto `TransactionKind`.
///
/// Quantities are signed from the account's point of view: positive means
/// the account received the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    /// Exchange identifier (trade id, deposit refid, ledger id)
    pub reference: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TransactionKind,
    pub asset: String,
    pub quantity: Decimal,
    pub counter_asset: Option<String>,
    pub counter_quantity: Option<Decimal>,
    pub fee: Option<Fee>,
}

impl Transaction {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Source of the account's transaction history
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// All transactions in `period`, in chronological order
    async fn fetch_transactions(&self, period: &ReportPeriod) -> Result<Vec<Transaction>>;
}

/// Sort by time, then by reference so equal timestamps keep a stable order
pub fn sort_chronologically(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.reference.cmp(&b.reference))
    });
}
