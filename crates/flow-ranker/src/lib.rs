//! Dual-Pull Flow Ranking
//!
//! Ranks stocks by institutional and foreign net buying relative to market
//! cap over a window of business days.

pub mod calendar;
pub mod normalizer;
pub mod service;
pub mod strength;

#[cfg(test)]
mod test_support;

pub use calendar::{BusinessCalendar, REFERENCE_TICKER};
pub use normalizer::{fill_missing_names, normalize_net_buy, select_investor_series};
pub use service::{AnalysisOutcome, AnalysisReport, AnalysisService};
pub use strength::{rank_by_strength, StrengthCalculator, TOP_N};
