//! kraken-rfb - monthly Receita Federal cryptoasset report for Kraken accounts
//!
//! Fetches one month of Kraken account history, values each operation in
//! BRL and renders the fixed RFB record layout (IN RFB 1888).

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod period;
pub mod pipeline;
pub mod pricing;
pub mod report;
pub mod utils;
