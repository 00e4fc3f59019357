//! Mapping of exchange transactions onto RFB operation codes
//!
//! | kind                 | condition              | operation                       |
//! |----------------------|------------------------|---------------------------------|
//! | trade-buy            | counter is fiat        | 0110 Purchase                   |
//! | trade-sell           | counter is fiat        | 0120 Sale                       |
//! | trade-buy/trade-sell | counter is crypto      | 0210 Swap                       |
//! | trade-buy/trade-sell | both legs fiat         | not reportable                  |
//! | deposit              | crypto asset           | 0410 Transfer to exchange       |
//! | withdrawal           | crypto asset           | 0510 Withdrawal from exchange   |
//! | deposit/withdrawal   | fiat asset             | not reportable                  |
//! | fee, other           |                        | unsupported                     |
//!
//! Only purchases and withdrawals have been checked against accepted
//! filings; the other mappings follow the layout manual.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::exchange::assets::is_fiat;
use crate::exchange::{Transaction, TransactionKind};

/// RFB cryptoasset operation record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OperationCode {
    Purchase,
    Sale,
    Swap,
    TransferToExchange,
    WithdrawalFromExchange,
}

impl OperationCode {
    /// Record type written in the first field
    pub fn code(&self) -> &'static str {
        match self {
            OperationCode::Purchase => "0110",
            OperationCode::Sale => "0120",
            OperationCode::Swap => "0210",
            OperationCode::TransferToExchange => "0410",
            OperationCode::WithdrawalFromExchange => "0510",
        }
    }

    /// Operation group, the roman numeral of the layout manual
    pub fn group(&self) -> &'static str {
        match self {
            OperationCode::Purchase | OperationCode::Sale => "I",
            OperationCode::Swap => "II",
            OperationCode::TransferToExchange => "IV",
            OperationCode::WithdrawalFromExchange => "V",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperationCode::Purchase => "Purchase",
            OperationCode::Sale => "Sale",
            OperationCode::Swap => "Swap",
            OperationCode::TransferToExchange => "Transfer to exchange",
            OperationCode::WithdrawalFromExchange => "Withdrawal from exchange",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.label())
    }
}

/// An amount of some currency or asset, priced into BRL later
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub currency: String,
    pub amount: Decimal,
}

impl Valuation {
    pub fn new(currency: &str, amount: Decimal) -> Self {
        Self {
            currency: currency.to_string(),
            amount: amount.abs(),
        }
    }
}

/// A transaction expressed as one report operation, not yet in BRL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedEntry {
    pub reference: String,
    pub timestamp: DateTime<Utc>,
    pub operation: OperationCode,
    /// Asset acquired, sold or moved (received asset for swaps)
    pub asset: String,
    pub quantity: Decimal,
    /// Given leg of a swap
    pub counter_asset: Option<String>,
    pub counter_quantity: Option<Decimal>,
    /// What the whole operation is worth
    pub valuation: Valuation,
    pub fee: Option<Valuation>,
}

impl NormalizedEntry {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Entry(NormalizedEntry),
    /// Fiat-only movement, outside the report's scope
    NotReportable { reference: String, reason: String },
}

fn unsupported(tx: &Transaction, kind: String) -> anyhow::Error {
    ReportError::UnsupportedTransactionKind {
        kind,
        reference: tx.reference.clone(),
        date: tx.date(),
    }
    .into()
}

fn fee_valuation(tx: &Transaction) -> Option<Valuation> {
    tx.fee
        .as_ref()
        .filter(|fee| !fee.amount.is_zero())
        .map(|fee| Valuation::new(&fee.asset, fee.amount))
}

/// Crypto quantity and fiat value of a crypto/fiat trade net of a fee
/// charged in the fiat leg: value = cost - fee, quantity = vol - fee / price
fn net_of_fee(tx: &Transaction, fiat: &str, cost: Decimal) -> Result<(Decimal, Decimal)> {
    let volume = tx.quantity.abs();
    let cost = cost.abs();
    let fee = match &tx.fee {
        Some(fee) if fee.asset == fiat && !fee.amount.is_zero() => fee.amount.abs(),
        _ => return Ok((volume, cost)),
    };

    let invalid = |msg: &str| -> anyhow::Error {
        ReportError::FormatValidation(format!("{}: {}", tx.reference, msg)).into()
    };
    let fee_in_asset = fee
        .checked_mul(volume)
        .and_then(|v| v.checked_div(cost))
        .ok_or_else(|| invalid("cannot net the fee out of a zero-cost trade"))?;
    let quantity = volume - fee_in_asset;
    let value = cost - fee;
    if quantity <= Decimal::ZERO || value <= Decimal::ZERO {
        return Err(invalid("fee exceeds the traded amount"));
    }
    Ok((quantity, value))
}

pub fn normalize(tx: &Transaction) -> Result<Normalized> {
    let not_reportable = |reason: String| -> Result<Normalized> {
        debug!("{} is not reportable: {}", tx.reference, reason);
        Ok(Normalized::NotReportable {
            reference: tx.reference.clone(),
            reason,
        })
    };

    let entry = |operation: OperationCode, valuation: Valuation| NormalizedEntry {
        reference: tx.reference.clone(),
        timestamp: tx.timestamp,
        operation,
        asset: tx.asset.clone(),
        quantity: tx.quantity.abs(),
        counter_asset: None,
        counter_quantity: None,
        valuation,
        fee: fee_valuation(tx),
    };

    match &tx.kind {
        TransactionKind::TradeBuy | TransactionKind::TradeSell => {
            let (counter_asset, counter_quantity) = match (&tx.counter_asset, tx.counter_quantity) {
                (Some(asset), Some(quantity)) => (asset, quantity),
                _ => return Err(unsupported(tx, format!("{} without counter leg", tx.kind))),
            };
            let buy = tx.kind == TransactionKind::TradeBuy;

            match (is_fiat(&tx.asset), is_fiat(counter_asset)) {
                (true, true) => not_reportable(format!(
                    "fiat exchange {}/{}",
                    tx.asset, counter_asset
                )),
                (false, true) => {
                    let operation = if buy {
                        OperationCode::Purchase
                    } else {
                        OperationCode::Sale
                    };
                    let (quantity, value) = net_of_fee(tx, counter_asset, counter_quantity)?;
                    Ok(Normalized::Entry(NormalizedEntry {
                        quantity,
                        ..entry(operation, Valuation::new(counter_asset, value))
                    }))
                }
                // Fiat base against a crypto quote: the crypto leg is what changed hands
                (true, false) => {
                    let operation = if buy {
                        OperationCode::Sale
                    } else {
                        OperationCode::Purchase
                    };
                    Ok(Normalized::Entry(NormalizedEntry {
                        asset: counter_asset.clone(),
                        quantity: counter_quantity.abs(),
                        ..entry(operation, Valuation::new(&tx.asset, tx.quantity))
                    }))
                }
                (false, false) => {
                    let (received, received_qty, given, given_qty) = if buy {
                        (&tx.asset, tx.quantity, counter_asset, counter_quantity)
                    } else {
                        (counter_asset, counter_quantity, &tx.asset, tx.quantity)
                    };
                    Ok(Normalized::Entry(NormalizedEntry {
                        asset: received.clone(),
                        quantity: received_qty.abs(),
                        counter_asset: Some(given.clone()),
                        counter_quantity: Some(given_qty.abs()),
                        ..entry(OperationCode::Swap, Valuation::new(received, received_qty))
                    }))
                }
            }
        }
        TransactionKind::Deposit | TransactionKind::Withdrawal => {
            if is_fiat(&tx.asset) {
                return not_reportable(format!("fiat {} of {}", tx.kind, tx.asset));
            }
            let operation = if tx.kind == TransactionKind::Deposit {
                OperationCode::TransferToExchange
            } else {
                OperationCode::WithdrawalFromExchange
            };
            Ok(Normalized::Entry(entry(
                operation,
                Valuation::new(&tx.asset, tx.quantity),
            )))
        }
        TransactionKind::Fee | TransactionKind::Other(_) => Err(unsupported(tx, tx.kind.to_string())),
    }
}
