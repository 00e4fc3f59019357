// Report module - normalization, BRL valuation and the RFB record layout

pub mod builder;
pub mod layout;
pub mod normalize;

pub use builder::{build, rate_requests, round_money, MonthlyReport, ReportEntry, SkippedTransaction};
pub use layout::{ReportLayout, RfbLayout};
pub use normalize::{normalize, Normalized, NormalizedEntry, OperationCode, Valuation};
