//! One report run: fetch, normalize, price, render, write

use anyhow::Context;
use rust_decimal::Decimal;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{report_error, ReportError, Result};
use crate::exchange::{Transaction, TransactionSource};
use crate::period::ReportPeriod;
use crate::pricing::RateLookup;
use crate::report::{
    build, normalize, rate_requests, MonthlyReport, Normalized, NormalizedEntry, ReportLayout,
    SkippedTransaction,
};

#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Leave unsupported transactions out instead of aborting
    pub skip_unsupported: bool,
    pub threshold: Decimal,
}

/// Normalizer output for a whole month
#[derive(Debug, Default)]
pub struct Classified {
    pub entries: Vec<NormalizedEntry>,
    pub not_reportable: usize,
    pub skipped: Vec<SkippedTransaction>,
}

pub fn classify(transactions: &[Transaction], skip_unsupported: bool) -> Result<Classified> {
    let mut classified = Classified::default();

    for tx in transactions {
        match normalize(tx) {
            Ok(Normalized::Entry(entry)) => classified.entries.push(entry),
            Ok(Normalized::NotReportable { reference, reason }) => {
                info!("Not reportable: {} ({})", reference, reason);
                classified.not_reportable += 1;
            }
            Err(err) => {
                let unsupported_kind = match report_error(&err) {
                    Some(ReportError::UnsupportedTransactionKind { kind, .. }) => Some(kind.clone()),
                    _ => None,
                };
                match unsupported_kind {
                    Some(kind) if skip_unsupported => {
                        warn!("Skipping {}: {}", tx.reference, err);
                        classified.skipped.push(SkippedTransaction {
                            reference: tx.reference.clone(),
                            reason: format!("unsupported kind '{}'", kind),
                        });
                    }
                    _ => {
                        return Err(err.context(format!(
                            "normalizing {} {} {} on {}",
                            tx.kind,
                            tx.quantity,
                            tx.asset,
                            tx.date()
                        )))
                    }
                }
            }
        }
    }
    Ok(classified)
}

/// Build and render the month's report without touching the filesystem
pub async fn generate_report<S>(
    source: &S,
    rates: &mut RateLookup,
    layout: &dyn ReportLayout,
    period: &ReportPeriod,
    options: &ReportOptions,
) -> Result<(MonthlyReport, Vec<u8>)>
where
    S: TransactionSource + ?Sized,
{
    let transactions = source
        .fetch_transactions(period)
        .await
        .with_context(|| format!("fetching transactions for {}", period))?;
    info!("{} transactions in {}", transactions.len(), period);

    let classified = classify(&transactions, options.skip_unsupported)?;

    let needs = rate_requests(&classified.entries);
    info!("{} distinct rates needed", needs.len());
    let table = rates
        .quotes_for(&needs)
        .await
        .context("looking up BRL rates")?;

    let mut report = build(period, classified.entries, &table, options.threshold)?;
    report.not_reportable = classified.not_reportable;
    report.skipped = classified.skipped;

    let rendered = layout
        .render(&report)
        .with_context(|| format!("rendering report for {}", period))?;
    Ok((report, rendered))
}

/// Replace `path` with `bytes` via a sibling temp file, so readers never see a partial report
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ReportError::Config(format!("invalid output path {}", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".partial");
    let tmp_path: PathBuf = path.with_file_name(tmp_name);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path).map_err(ReportError::from)?;
        file.write_all(bytes).map_err(ReportError::from)?;
        file.sync_all().map_err(ReportError::from)?;
        fs::rename(&tmp_path, path).map_err(ReportError::from)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.with_context(|| format!("writing {}", path.display()))
}

/// Default output name for a period
pub fn default_output_path(period: &ReportPeriod) -> PathBuf {
    PathBuf::from(format!("rfb-{}.txt", period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::TransactionKind;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn tx(reference: &str, kind: TransactionKind, asset: &str, quantity: Decimal) -> Transaction {
        Transaction {
            reference: reference.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
            kind,
            asset: asset.into(),
            quantity,
            counter_asset: None,
            counter_quantity: None,
            fee: None,
        }
    }

    #[test]
    fn test_classify_counts_and_aborts() {
        let txs = vec![
            tx("D1", TransactionKind::Deposit, "BTC", dec!(0.5)),
            tx("D2", TransactionKind::Deposit, "EUR", dec!(500)),
            tx("L1", TransactionKind::Other("staking".into()), "DOT", dec!(1)),
        ];

        let err = classify(&txs, false).unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 14);
        assert!(format!("{:#}", err).contains("L1"));

        let classified = classify(&txs, true).unwrap();
        assert_eq!(classified.entries.len(), 1);
        assert_eq!(classified.not_reportable, 1);
        assert_eq!(classified.skipped.len(), 1);
        assert_eq!(classified.skipped[0].reference, "L1");
        assert!(classified.skipped[0].reason.contains("staking"));
    }

    #[test]
    fn test_write_atomically_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rfb-2024-03.txt");
        fs::write(&path, b"old").unwrap();

        write_atomically(&path, b"0110|...\r\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"0110|...\r\n");
        assert!(!dir.path().join(".rfb-2024-03.txt.partial").exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("rfb.txt");
        let err = write_atomically(&path, b"x").unwrap_err();
        assert_eq!(crate::error::exit_code(&err), 17);
        assert!(!path.exists());
    }

    #[test]
    fn test_default_output_path() {
        let period = ReportPeriod::for_month(2024, 3).unwrap();
        assert_eq!(default_output_path(&period), PathBuf::from("rfb-2024-03.txt"));
    }
}
