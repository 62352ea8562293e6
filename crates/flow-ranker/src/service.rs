//! Analysis entry point
//!
//! Resolves the window and ranks it, turning every failure into an explicit
//! outcome so callers can tell "nothing qualified" from "source down".

use chrono::{DateTime, NaiveDate, Utc};
use flow_core::{AnalysisWindow, FlowError, Market, MarketDataSource, Ranking, RankingMode, WindowLength};
use serde::Serialize;
use std::sync::Arc;

use crate::calendar::BusinessCalendar;
use crate::strength::StrengthCalculator;

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Ranked(Ranking),
    /// Data was retrieved but no stock qualified, or the window could not be resolved.
    NoQualifyingData { reason: String },
    /// The data source failed or returned something unusable.
    SourceUnavailable { reason: String },
}

impl AnalysisOutcome {
    pub fn ranking(&self) -> Option<&Ranking> {
        match self {
            AnalysisOutcome::Ranked(ranking) => Some(ranking),
            _ => None,
        }
    }
}

/// An outcome together with the request that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub length: WindowLength,
    pub mode: RankingMode,
    pub window: Option<AnalysisWindow>,
    pub outcome: AnalysisOutcome,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalysisService {
    calendar: BusinessCalendar,
    calculator: StrengthCalculator,
}

impl AnalysisService {
    pub fn new(source: Arc<dyn MarketDataSource>, reference_ticker: &str, market: Market) -> Self {
        Self {
            calendar: BusinessCalendar::with_reference(source.clone(), reference_ticker),
            calculator: StrengthCalculator::with_market(source, market),
        }
    }

    /// Rank the `length` business days ending at the latest session on or before `today`.
    pub async fn analyze(&self, today: NaiveDate, length: WindowLength, mode: RankingMode) -> AnalysisReport {
        let (window, outcome) = match self.calendar.resolve_window(today, length).await {
            Ok(Some(window)) => {
                let outcome = self.rank(&window, mode).await;
                (Some(window), outcome)
            }
            Ok(None) => (
                None,
                AnalysisOutcome::NoQualifyingData {
                    reason: format!("not enough trading history for a {}-day window", length),
                },
            ),
            Err(e) => {
                tracing::warn!("Window resolution failed: {}", e);
                (None, AnalysisOutcome::SourceUnavailable { reason: e.to_string() })
            }
        };

        AnalysisReport {
            length,
            mode,
            window,
            outcome,
            generated_at: Utc::now(),
        }
    }

    async fn rank(&self, window: &AnalysisWindow, mode: RankingMode) -> AnalysisOutcome {
        match self.calculator.calculate(window.start, window.end, mode).await {
            Ok(ranking) if ranking.is_empty() => AnalysisOutcome::NoQualifyingData {
                reason: format!("no stock qualified for {} between {} and {}", mode, window.start, window.end),
            },
            Ok(ranking) => AnalysisOutcome::Ranked(ranking),
            Err(e) => {
                tracing::warn!("Strength calculation failed for {} {:?}: {}", mode, window, e);
                outcome_for_error(e)
            }
        }
    }
}

fn outcome_for_error(e: FlowError) -> AnalysisOutcome {
    if e.is_source_failure() {
        AnalysisOutcome::SourceUnavailable { reason: e.to_string() }
    } else {
        AnalysisOutcome::NoQualifyingData { reason: e.to_string() }
    }
}
