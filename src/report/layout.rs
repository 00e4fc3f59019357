//! Fixed RFB cryptoasset record layout
//!
//! Records are pipe-delimited and CRLF-terminated with no trailing pipe.
//! Dates are `ddmmaaaa`, money has 2 decimals and quantities 10 (12 on sale
//! records), all with a comma as decimal separator and no thousands separator.

use chrono::{Datelike, NaiveDate};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use rust_decimal::{Decimal, RoundingStrategy};

use super::builder::{MonthlyReport, ReportEntry};
use super::normalize::OperationCode;
use crate::config::ExchangeInfo;
use crate::error::{ReportError, Result};

const MONEY_DP: u32 = 2;
const QUANTITY_DP: u32 = 10;
const SALE_QUANTITY_DP: u32 = 12;

/// Serializes a finished report
pub trait ReportLayout {
    fn render(&self, report: &MonthlyReport) -> Result<Vec<u8>>;
}

/// One field of a record
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    Date(NaiveDate),
    Decimal { value: Decimal, precision: u32 },
    Text(&'a str),
    Empty,
}

impl<'a> Field<'a> {
    pub fn money(value: Decimal) -> Self {
        Field::Decimal {
            value,
            precision: MONEY_DP,
        }
    }

    pub fn quantity(value: Decimal) -> Self {
        Field::Decimal {
            value,
            precision: QUANTITY_DP,
        }
    }

    pub fn sale_quantity(value: Decimal) -> Self {
        Field::Decimal {
            value,
            precision: SALE_QUANTITY_DP,
        }
    }

    pub fn optional_money(value: Option<Decimal>) -> Self {
        value.map_or(Field::Empty, Field::money)
    }

    pub fn encode(&self) -> Result<String> {
        match self {
            Field::Date(date) => Ok(format!(
                "{:02}{:02}{:04}",
                date.day(),
                date.month(),
                date.year()
            )),
            Field::Decimal { value, precision } => {
                let rounded =
                    value.round_dp_with_strategy(*precision, RoundingStrategy::MidpointAwayFromZero);
                Ok(format!("{:.1$}", rounded, *precision as usize).replace('.', ","))
            }
            Field::Text(text) => {
                if text.contains(['|', '\r', '\n']) {
                    return Err(ReportError::FormatValidation(format!(
                        "field '{}' contains a delimiter or line break",
                        text.escape_debug()
                    ))
                    .into());
                }
                Ok(text.to_string())
            }
            Field::Empty => Ok(String::new()),
        }
    }
}

/// The layout filed with the Receita Federal
pub struct RfbLayout {
    pub exchange: ExchangeInfo,
}

impl RfbLayout {
    pub fn new(exchange: ExchangeInfo) -> Self {
        Self { exchange }
    }

    fn exchange_fields(&self) -> [Field<'_>; 3] {
        [
            Field::Text(&self.exchange.name),
            Field::Text(&self.exchange.url),
            Field::Text(&self.exchange.country),
        ]
    }

    /// Fields of one record, record type first
    pub fn record<'a>(&'a self, e: &'a ReportEntry) -> Result<Vec<Field<'a>>> {
        let op = e.entry.operation;
        let mut fields = vec![
            Field::Text(op.code()),
            Field::Date(e.entry.date()),
            Field::Text(op.group()),
        ];

        match op {
            OperationCode::Purchase | OperationCode::Sale => {
                let quantity = if op == OperationCode::Sale {
                    Field::sale_quantity(e.entry.quantity)
                } else {
                    Field::quantity(e.entry.quantity)
                };
                fields.extend([
                    Field::money(e.total_value),
                    Field::optional_money(e.fees),
                    Field::Text(&e.entry.asset),
                    quantity,
                ]);
                fields.extend(self.exchange_fields());
            }
            OperationCode::Swap => {
                let (given, given_qty) = e
                    .entry
                    .counter_asset
                    .as_deref()
                    .zip(e.entry.counter_quantity)
                    .ok_or_else(|| {
                        ReportError::FormatValidation(format!(
                            "swap {} has no given asset",
                            e.entry.reference
                        ))
                    })?;
                fields.extend([
                    Field::optional_money(e.fees),
                    Field::Text(&e.entry.asset),
                    Field::quantity(e.entry.quantity),
                    Field::Text(given),
                    Field::quantity(given_qty),
                ]);
                fields.extend(self.exchange_fields());
            }
            OperationCode::TransferToExchange => {
                // Origin wallet and exchange are not known from Kraken's history
                fields.extend([
                    Field::optional_money(e.fees),
                    Field::Text(&e.entry.asset),
                    Field::quantity(e.entry.quantity),
                    Field::Empty,
                    Field::Empty,
                ]);
            }
            OperationCode::WithdrawalFromExchange => {
                fields.extend([
                    Field::optional_money(e.fees),
                    Field::Text(&e.entry.asset),
                    Field::quantity(e.entry.quantity),
                ]);
                fields.extend(self.exchange_fields());
            }
        }
        Ok(fields)
    }
}

impl ReportLayout for RfbLayout {
    fn render(&self, report: &MonthlyReport) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .delimiter(b'|')
            .terminator(Terminator::CRLF)
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .flexible(true)
            .from_writer(Vec::new());

        for entry in &report.entries {
            let encoded = self
                .record(entry)?
                .iter()
                .map(Field::encode)
                .collect::<Result<Vec<_>>>()
                .map_err(|e| e.context(format!("rendering {}", entry.entry.reference)))?;
            writer
                .write_record(&encoded)
                .map_err(|e| ReportError::FormatValidation(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| ReportError::FormatValidation(e.to_string()).into())
    }
}
