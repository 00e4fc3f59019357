//! Utility functions for formatting
//!
//! Terminal output uses Brazilian conventions: `.` groups thousands and `,`
//! separates decimals. The report file itself has its own encoding in
//! `report::layout`.

use rust_decimal::Decimal;

/// Currency symbol options for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySymbol {
    /// Include "R$ " prefix (Brazilian Real)
    BRL,
    /// No currency symbol
    None,
}

fn group_thousands(integer_part: &str) -> String {
    integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| if i > 0 && i % 3 == 0 { vec!['.', c] } else { vec![c] })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}

/// Formats a Decimal with 2 decimal places using Brazilian locale conventions,
/// right-aligned to `width` (0 for no padding).
///
/// # Examples
/// ```
/// use kraken_rfb::utils::{format_currency_with_width, CurrencySymbol};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(
///     format_currency_with_width(dec!(30846.86), 0, CurrencySymbol::BRL),
///     "R$ 30.846,86"
/// );
/// assert_eq!(
///     format_currency_with_width(dec!(1234), 12, CurrencySymbol::None),
///     "    1.234,00"
/// );
/// ```
pub fn format_currency_with_width(value: Decimal, width: usize, symbol: CurrencySymbol) -> String {
    let sign = if value < Decimal::ZERO { "-" } else { "" };
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let prefix = match symbol {
        CurrencySymbol::BRL => "R$ ",
        CurrencySymbol::None => "",
    };
    let result = format!(
        "{}{}{},{}",
        prefix,
        sign,
        group_thousands(integer_part),
        decimal_part
    );

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Format as Brazilian Real with symbol: "R$ 1.234,56"
pub fn format_currency(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::BRL)
}

/// Quantity or rate at full precision, trailing zeros dropped: "0,0512", "1.250"
pub fn format_quantity(value: Decimal) -> String {
    let normalized = value.normalize();
    let text = normalized.abs().to_string();
    let sign = if normalized < Decimal::ZERO { "-" } else { "" };
    match text.split_once('.') {
        Some((integer_part, fraction)) => {
            format!("{}{},{}", sign, group_thousands(integer_part), fraction)
        }
        None => format!("{}{}", sign, group_thousands(&text)),
    }
}
