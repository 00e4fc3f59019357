//! Valuation of normalized entries in BRL and monthly aggregation

use anyhow::Context;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::normalize::{NormalizedEntry, OperationCode, Valuation};
use crate::error::{ReportError, Result};
use crate::period::ReportPeriod;
use crate::pricing::{RateNeeds, RateRequest, RateTable, BRL};

/// A normalized entry priced in BRL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    #[serde(flatten)]
    pub entry: NormalizedEntry,
    /// BRL per unit of `entry.asset`
    pub unit_value: Decimal,
    /// BRL, two decimal places
    pub total_value: Decimal,
    /// BRL, two decimal places; `None` when the exchange charged nothing
    pub fees: Option<Decimal>,
}

/// Transaction left out of the report on request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTransaction {
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub period: String,
    pub entries: Vec<ReportEntry>,
    /// Sum of every entry's total value
    pub aggregate: Decimal,
    pub threshold: Decimal,
    /// Fiat-only movements seen in the month
    pub not_reportable: usize,
    pub skipped: Vec<SkippedTransaction>,
}

impl MonthlyReport {
    /// The report must be filed when the month's movement exceeds the threshold
    pub fn is_due(&self) -> bool {
        self.aggregate > self.threshold
    }

    /// Entry count and BRL total per operation code
    pub fn totals_by_operation(&self) -> BTreeMap<OperationCode, (usize, Decimal)> {
        let mut totals: BTreeMap<OperationCode, (usize, Decimal)> = BTreeMap::new();
        for e in &self.entries {
            let slot = totals.entry(e.entry.operation).or_default();
            slot.0 += 1;
            slot.1 += e.total_value;
        }
        totals
    }
}

/// Round half away from zero to centavos
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Every conversion `build` will read from the rate table, with the
/// entries that need it
pub fn rate_requests(entries: &[NormalizedEntry]) -> RateNeeds {
    let mut needs = RateNeeds::new();
    for entry in entries {
        let currencies = std::iter::once(&entry.valuation.currency)
            .chain(entry.fee.as_ref().map(|fee| &fee.currency));
        for currency in currencies {
            let references = needs
                .entry(RateRequest::new(entry.date(), currency, BRL))
                .or_default();
            if !references.contains(&entry.reference) {
                references.push(entry.reference.clone());
            }
        }
    }
    needs
}

fn overflow(entry: &NormalizedEntry) -> ReportError {
    ReportError::FormatValidation(format!("value of {} overflows", entry.reference))
}

fn to_brl(entry: &NormalizedEntry, valuation: &Valuation, rates: &RateTable) -> Result<Decimal> {
    let quote = rates
        .get(entry.date(), &valuation.currency, BRL)
        .with_context(|| format!("valuing {}", entry.reference))?;
    valuation
        .amount
        .checked_mul(quote.rate)
        .ok_or_else(|| overflow(entry).into())
}

fn value_entry(entry: NormalizedEntry, rates: &RateTable) -> Result<ReportEntry> {
    if entry.quantity.is_zero() {
        return Err(ReportError::FormatValidation(format!(
            "{} has zero quantity of {}",
            entry.reference, entry.asset
        ))
        .into());
    }

    let brl = to_brl(&entry, &entry.valuation, rates)?;
    let unit_value = brl
        .checked_div(entry.quantity)
        .ok_or_else(|| overflow(&entry))?;
    let total_value = round_money(
        entry
            .quantity
            .checked_mul(unit_value)
            .ok_or_else(|| overflow(&entry))?,
    );
    let fees = match &entry.fee {
        Some(fee) => Some(round_money(to_brl(&entry, fee, rates)?)),
        None => None,
    };

    debug!(
        "{} {} {} {} = R$ {}",
        entry.reference,
        entry.operation.code(),
        entry.quantity,
        entry.asset,
        total_value
    );

    Ok(ReportEntry {
        entry,
        unit_value,
        total_value,
        fees,
    })
}

/// Check the record invariants of a priced entry
pub fn validate(entry: &ReportEntry) -> Result<()> {
    let fail = |msg: String| -> Result<()> { Err(ReportError::FormatValidation(msg).into()) };

    if entry.entry.quantity <= Decimal::ZERO {
        return fail(format!("{}: quantity must be positive", entry.entry.reference));
    }
    if entry.total_value.scale() > 2 {
        return fail(format!("{}: total value has more than 2 decimals", entry.entry.reference));
    }
    let expected = entry
        .entry
        .quantity
        .checked_mul(entry.unit_value)
        .map(round_money);
    if expected != Some(entry.total_value) {
        return fail(format!(
            "{}: total {} does not match quantity x unit value",
            entry.entry.reference, entry.total_value
        ));
    }
    if entry.total_value < Decimal::ZERO || entry.fees.is_some_and(|f| f < Decimal::ZERO) {
        return fail(format!("{}: negative value", entry.entry.reference));
    }
    Ok(())
}

/// Price every entry and aggregate the month
pub fn build(
    period: &ReportPeriod,
    entries: Vec<NormalizedEntry>,
    rates: &RateTable,
    threshold: Decimal,
) -> Result<MonthlyReport> {
    let mut priced = Vec::with_capacity(entries.len());
    for entry in entries {
        let priced_entry = value_entry(entry, rates)?;
        validate(&priced_entry)?;
        priced.push(priced_entry);
    }
    priced.sort_by(|a, b| {
        a.entry
            .timestamp
            .cmp(&b.entry.timestamp)
            .then_with(|| a.entry.reference.cmp(&b.entry.reference))
    });

    let aggregate: Decimal = priced.iter().map(|e| e.total_value.abs()).sum();
    info!(
        "{}: {} entries, aggregate R$ {} (threshold R$ {})",
        period,
        priced.len(),
        aggregate,
        threshold
    );

    Ok(MonthlyReport {
        period: period.to_string(),
        entries: priced,
        aggregate,
        threshold,
        not_reportable: 0,
        skipped: Vec::new(),
    })
}
