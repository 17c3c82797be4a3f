//! Financial aggregation (read side).
//!
//! The single authority for every derived supplier metric: windowed revenue
//! partitions, profit, return penalties, return rate, counts, and chart
//! series. Everything here is a pure function of the ledger entries it is
//! handed — no IO, no mutation, no hidden caching — so repeated calls over
//! the same history are bit-identical.

pub mod report;
pub mod window;

pub use report::{
    FinancialReport, LedgerEntry, ReportConfig, ReturnPenaltyRule, RevenueBreakdown, SeriesPoint,
    StatusCounts, build_report,
};
pub use window::DateWindow;
