use dashmap::DashMap;
use flow_core::{RankingMode, WindowLength};
use flow_ranker::{AnalysisOutcome, AnalysisReport};
use std::future::Future;
use std::sync::Arc;

type CacheKey = (WindowLength, RankingMode);

/// Analysis reports keyed by (window, mode), invalidated wholesale.
#[derive(Default)]
pub struct ReportCache {
    reports: DashMap<CacheKey, Arc<AnalysisReport>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, length: WindowLength, mode: RankingMode) -> Option<Arc<AnalysisReport>> {
        self.reports.get(&(length, mode)).map(|r| Arc::clone(r.value()))
    }

    /// Cached report, or compute and store one.
    ///
    /// Reports from an unreachable source are returned but not stored, so the
    /// next request retries. No entry guard is held across the computation;
    /// two concurrent misses both compute and the later insert wins.
    pub async fn get_or_compute<F, Fut>(&self, length: WindowLength, mode: RankingMode, compute: F) -> Arc<AnalysisReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisReport>,
    {
        if let Some(report) = self.get(length, mode) {
            tracing::debug!("Cache hit for window={} mode={}", length, mode);
            return report;
        }

        let report = Arc::new(compute().await);
        if matches!(report.outcome, AnalysisOutcome::SourceUnavailable { .. }) {
            tracing::debug!("Not caching unavailable-source report for window={} mode={}", length, mode);
        } else {
            self.reports.insert((length, mode), Arc::clone(&report));
        }
        report
    }

    pub fn clear(&self) -> usize {
        let count = self.reports.len();
        self.reports.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
