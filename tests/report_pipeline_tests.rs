//! End-to-end report runs against in-memory transaction and rate sources

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use kraken_rfb::config::ExchangeInfo;
use kraken_rfb::error::{exit_code, ReportError};
use kraken_rfb::exchange::{Fee, Transaction, TransactionKind, TransactionSource};
use kraken_rfb::period::ReportPeriod;
use kraken_rfb::pipeline::{generate_report, write_atomically, ReportOptions};
use kraken_rfb::pricing::{RateLookup, RateQuote, RateSource};
use kraken_rfb::report::{MonthlyReport, RfbLayout};

struct FakeExchange {
    transactions: Vec<Transaction>,
}

#[async_trait]
impl TransactionSource for FakeExchange {
    async fn fetch_transactions(&self, period: &ReportPeriod) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| period.contains(&t.timestamp))
            .cloned()
            .collect())
    }
}

struct FakeRates {
    rates: HashMap<(NaiveDate, String), Decimal>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RateSource for FakeRates {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports(&self, _base: &str, quote: &str) -> bool {
        quote == "BRL"
    }

    async fn fetch_rate(&self, date: NaiveDate, base: &str, quote: &str) -> Result<RateQuote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rate = self
            .rates
            .get(&(date, base.to_string()))
            .copied()
            .ok_or_else(|| ReportError::rate_unavailable(date, base, quote, "no quote on record"))?;
        Ok(RateQuote {
            date,
            effective_date: date,
            base: base.to_string(),
            quote: quote.to_string(),
            rate,
            source: "fake".to_string(),
        })
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn march() -> ReportPeriod {
    ReportPeriod::for_month(2024, 3).unwrap()
}

fn tx(reference: &str, day: u32, kind: TransactionKind, asset: &str, quantity: Decimal) -> Transaction {
    Transaction {
        reference: reference.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, day, 14, 30, 0).unwrap(),
        kind,
        asset: asset.to_string(),
        quantity,
        counter_asset: None,
        counter_quantity: None,
        fee: None,
    }
}

fn btc_purchase() -> Transaction {
    Transaction {
        counter_asset: Some("USD".into()),
        counter_quantity: Some(dec!(-6200)),
        fee: Some(Fee {
            asset: "USD".into(),
            amount: dec!(16.12),
        }),
        ..tx("TQ1", 1, TransactionKind::TradeBuy, "BTC", dec!(0.1))
    }
}

fn usdt_withdrawal() -> Transaction {
    Transaction {
        fee: Some(Fee {
            asset: "USDT".into(),
            amount: dec!(1),
        }),
        ..tx("W1", 15, TransactionKind::Withdrawal, "USDT", dec!(-50))
    }
}

fn brl_purchase(reference: &str, day: u32, brl: Decimal) -> Transaction {
    Transaction {
        counter_asset: Some("BRL".into()),
        counter_quantity: Some(-brl),
        ..tx(reference, day, TransactionKind::TradeBuy, "BTC", dec!(0.01))
    }
}

fn standard_rates() -> (RateLookup, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let rates = HashMap::from([
        ((d(1), "USD".to_string()), dec!(4.9753)),
        ((d(15), "USDT".to_string()), dec!(4.97)),
    ]);
    let source = FakeRates {
        rates,
        calls: Arc::clone(&calls),
    };
    let today = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
    (RateLookup::new(vec![Box::new(source)], today), calls)
}

async fn run(transactions: Vec<Transaction>, skip_unsupported: bool) -> Result<(MonthlyReport, Vec<u8>)> {
    let exchange = FakeExchange { transactions };
    let (mut rates, _) = standard_rates();
    let layout = RfbLayout::new(ExchangeInfo::default());
    let options = ReportOptions {
        skip_unsupported,
        threshold: dec!(30000),
    };
    generate_report(&exchange, &mut rates, &layout, &march(), &options).await
}

#[tokio::test]
async fn purchase_renders_expected_line() {
    let (report, bytes) = run(vec![btc_purchase()], false).await.unwrap();

    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "0110|01032024|I|30766,66|80,20|BTC|0,0997400000|Kraken|https://www.kraken.com|US\r\n"
    );
    // Cost and volume are reported net of the 16.12 USD fee
    assert_eq!(report.aggregate, dec!(30766.66));
    assert!(report.is_due());
}

#[tokio::test]
async fn withdrawal_renders_expected_line() {
    let (report, bytes) = run(vec![usdt_withdrawal()], false).await.unwrap();

    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "0510|15032024|V|4,97|USDT|50,0000000000|Kraken|https://www.kraken.com|US\r\n"
    );
    assert_eq!(report.aggregate, dec!(248.50));
    assert!(!report.is_due());
}

#[tokio::test]
async fn entries_are_chronological_and_sum_to_aggregate() {
    let (report, bytes) = run(vec![usdt_withdrawal(), btc_purchase()], false)
        .await
        .unwrap();

    let text = String::from_utf8(bytes).unwrap();
    let codes: Vec<&str> = text
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .map(|l| &l[..4])
        .collect();
    assert_eq!(codes, vec!["0110", "0510"]);

    let sum: Decimal = report.entries.iter().map(|e| e.total_value).sum();
    assert_eq!(sum, report.aggregate);
    assert_eq!(report.aggregate, dec!(31015.16));
}

#[tokio::test]
async fn fiat_movements_are_counted_not_reported() {
    let fiat_deposit = tx("D1", 2, TransactionKind::Deposit, "EUR", dec!(1000));
    let (report, bytes) = run(vec![fiat_deposit, usdt_withdrawal()], false)
        .await
        .unwrap();

    assert_eq!(report.not_reportable, 1);
    assert_eq!(report.entries.len(), 1);
    assert!(String::from_utf8(bytes).unwrap().starts_with("0510|"));
}

#[tokio::test]
async fn unsupported_kind_aborts_without_file() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("rfb-2024-03.txt");
    let staking = tx("L1", 10, TransactionKind::Other("staking".into()), "DOT", dec!(0.25));

    let result = run(vec![btc_purchase(), staking], false).await;
    let err = match result {
        Ok((_, bytes)) => {
            write_atomically(&output, &bytes).unwrap();
            panic!("staking reward must not be reportable");
        }
        Err(err) => err,
    };

    assert_eq!(exit_code(&err), 14);
    assert!(format!("{:#}", err).contains("staking"));
    assert!(!output.exists());
}

#[tokio::test]
async fn unsupported_kind_can_be_skipped() {
    let staking = tx("L1", 10, TransactionKind::Other("staking".into()), "DOT", dec!(0.25));
    let (report, bytes) = run(vec![btc_purchase(), staking], true).await.unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reference, "L1");
    assert_eq!(report.entries.len(), 1);
    assert!(String::from_utf8(bytes).unwrap().starts_with("0110|"));
}

#[tokio::test]
async fn missing_rate_aborts() {
    // No USDT quote on record for the 20th
    let late = tx("W2", 20, TransactionKind::Withdrawal, "USDT", dec!(-10));
    let err = run(vec![late], false).await.unwrap_err();

    assert_eq!(exit_code(&err), 13);
    assert!(format!("{:#}", err).contains("valuing W2"));
    assert!(matches!(
        kraken_rfb::error::report_error(&err),
        Some(ReportError::RateUnavailable { .. })
    ));
}

#[tokio::test]
async fn threshold_boundary_is_not_due() {
    let (report, _) = run(
        vec![
            brl_purchase("A", 4, dec!(20000.00)),
            brl_purchase("B", 5, dec!(10000.00)),
        ],
        false,
    )
    .await
    .unwrap();
    assert_eq!(report.aggregate, dec!(30000.00));
    assert!(!report.is_due());

    let (report, _) = run(
        vec![
            brl_purchase("A", 4, dec!(20000.00)),
            brl_purchase("B", 5, dec!(10000.01)),
        ],
        false,
    )
    .await
    .unwrap();
    assert_eq!(report.aggregate, dec!(30000.01));
    assert!(report.is_due());
}

#[tokio::test]
async fn rendering_is_idempotent() {
    let (_, first) = run(vec![btc_purchase(), usdt_withdrawal()], false)
        .await
        .unwrap();
    let (_, second) = run(vec![btc_purchase(), usdt_withdrawal()], false)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn rates_are_fetched_once_per_date_and_currency() {
    let exchange = FakeExchange {
        transactions: vec![
            usdt_withdrawal(),
            Transaction {
                reference: "W3".into(),
                ..usdt_withdrawal()
            },
        ],
    };
    let (mut rates, calls) = standard_rates();
    let layout = RfbLayout::new(ExchangeInfo::default());
    let options = ReportOptions {
        skip_unsupported: false,
        threshold: dec!(30000),
    };

    let (report, _) = generate_report(&exchange, &mut rates, &layout, &march(), &options)
        .await
        .unwrap();
    assert_eq!(report.entries.len(), 2);
    // Value and fee share the USDT/BRL quote of the 15th
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transactions_outside_month_are_ignored() {
    let april = Transaction {
        timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        ..usdt_withdrawal()
    };
    let (report, bytes) = run(vec![april], false).await.unwrap();
    assert!(report.entries.is_empty());
    assert!(bytes.is_empty());
}
