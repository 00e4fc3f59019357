//! Output formatting module for CLI display
//!
//! Keeps the presentation of a finished run apart from the pipeline.

use colored::Colorize;
use serde_json::json;
use std::path::Path;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::pricing::RateQuote;
use crate::report::MonthlyReport;
use crate::utils::{format_currency, format_quantity};

/// Operator summary printed after the report file was written
pub fn format_report_summary(report: &MonthlyReport, output: &Path) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} RFB cryptoasset report - {}\n\n",
        "📄".cyan().bold(),
        report.period
    ));

    #[derive(Tabled)]
    struct OperationRow {
        #[tabled(rename = "Code")]
        code: String,
        #[tabled(rename = "Operation")]
        operation: String,
        #[tabled(rename = "Entries")]
        entries: usize,
        #[tabled(rename = "Total")]
        total: String,
    }

    let rows: Vec<OperationRow> = report
        .totals_by_operation()
        .into_iter()
        .map(|(op, (count, total))| OperationRow {
            code: op.code().to_string(),
            operation: op.label().to_string(),
            entries: count,
            total: format_currency(total),
        })
        .collect();

    if rows.is_empty() {
        out.push_str(&format!("{} No reportable operations\n", "ℹ".blue().bold()));
    } else {
        let mut table = Table::new(&rows);
        table.with(Style::modern());
        table.modify(Columns::new(2..), Alignment::right());
        out.push_str(&table.to_string());
        out.push('\n');
    }

    out.push_str(&format!("\n{:<20} {}", "Aggregate:".bold(), format_currency(report.aggregate)));
    out.push_str(&format!("\n{:<20} {}", "Threshold:".bold(), format_currency(report.threshold)));
    let due = if report.is_due() {
        "due - file this report".yellow().bold()
    } else {
        "not due".green()
    };
    out.push_str(&format!("\n{:<20} {}", "Filing:".bold(), due));
    out.push_str(&format!("\n{:<20} {}", "Not reportable:".bold(), report.not_reportable));

    if !report.skipped.is_empty() {
        out.push_str(&format!(
            "\n\n{} Skipped {} unsupported transaction(s):",
            "⚠".yellow().bold(),
            report.skipped.len()
        ));
        for skipped in &report.skipped {
            out.push_str(&format!("\n  {} ({})", skipped.reference, skipped.reason));
        }
    }

    out.push_str(&format!(
        "\n\n{} Written to {}\n",
        "✓".green(),
        output.display()
    ));
    out
}

pub fn format_report_json(report: &MonthlyReport, output: &Path) -> String {
    let operations: Vec<_> = report
        .totals_by_operation()
        .into_iter()
        .map(|(op, (count, total))| {
            json!({
                "code": op.code(),
                "operation": op.label(),
                "entries": count,
                "total_brl": total.to_string(),
            })
        })
        .collect();

    let value = json!({
        "period": report.period,
        "output": output.display().to_string(),
        "entries": report.entries.len(),
        "operations": operations,
        "aggregate_brl": report.aggregate.to_string(),
        "threshold_brl": report.threshold.to_string(),
        "due": report.is_due(),
        "not_reportable": report.not_reportable,
        "skipped": report.skipped,
    });

    serde_json::to_string_pretty(&value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

pub fn format_rate(quote: &RateQuote) -> String {
    let mut out = format!(
        "{} {}/{} on {}: {}",
        "💱".cyan(),
        quote.base.bold(),
        quote.quote,
        quote.date,
        format_quantity(quote.rate)
    );
    if quote.effective_date != quote.date {
        out.push_str(&format!(" (quote of {})", quote.effective_date));
    }
    out.push_str(&format!(" [{}]\n", quote.source.bright_black()));
    out
}

pub fn format_rate_json(quote: &RateQuote) -> String {
    serde_json::to_string_pretty(quote)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}
