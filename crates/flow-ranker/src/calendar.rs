//! Business-day resolution
//!
//! The exchange calendar is read off a liquid reference stock's price
//! history: a date is a business day if the reference traded on it.

use chrono::NaiveDate;
use flow_core::{AnalysisWindow, FlowError, MarketDataSource, TradingDay, WindowLength};
use std::sync::Arc;

/// Samsung Electronics, traded on every KOSPI session.
pub const REFERENCE_TICKER: &str = "005930";

const LATEST_LOOKBACK_DAYS: i64 = 30;
const OFFSET_LOOKBACK_DAYS: i64 = 400;

pub struct BusinessCalendar {
    source: Arc<dyn MarketDataSource>,
    reference_ticker: String,
}

impl BusinessCalendar {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self::with_reference(source, REFERENCE_TICKER)
    }

    pub fn with_reference(source: Arc<dyn MarketDataSource>, reference_ticker: &str) -> Self {
        Self {
            source,
            reference_ticker: reference_ticker.to_string(),
        }
    }

    /// Most recent business day on or before `today`.
    ///
    /// Falls back to `today` itself when the reference history can't be
    /// fetched or is empty, even though `today` may be a holiday.
    pub async fn latest_trading_day(&self, today: NaiveDate) -> TradingDay {
        let end = TradingDay::new(today);
        match self.trading_days(end, LATEST_LOOKBACK_DAYS).await {
            Ok(days) => match days.last() {
                Some(last) => *last,
                None => {
                    tracing::warn!("No reference trades in the last {} days, using {}", LATEST_LOOKBACK_DAYS, end);
                    end
                }
            },
            Err(e) => {
                tracing::warn!("Failed to fetch reference calendar ({}), using {}", e, end);
                end
            }
        }
    }

    /// The business day `n` sessions before `end_day`.
    ///
    /// `Ok(None)` when `end_day` is not a known business day or the history
    /// is shorter than `n` sessions.
    pub async fn trading_day_offset(
        &self,
        end_day: TradingDay,
        n: usize,
    ) -> Result<Option<TradingDay>, FlowError> {
        let days = self.trading_days(end_day, OFFSET_LOOKBACK_DAYS).await?;
        Ok(offset_in(&days, end_day, n))
    }

    /// Resolve the analysis period ending at the latest business day.
    pub async fn resolve_window(
        &self,
        today: NaiveDate,
        length: WindowLength,
    ) -> Result<Option<AnalysisWindow>, FlowError> {
        let end = self.latest_trading_day(today).await;
        let start = self.trading_day_offset(end, length.get() as usize).await?;
        Ok(start.map(|start| AnalysisWindow { length, start, end }))
    }

    /// Reference trading days in the `lookback` calendar days ending at `end`, oldest first.
    async fn trading_days(&self, end: TradingDay, lookback: i64) -> Result<Vec<TradingDay>, FlowError> {
        let bars = self
            .source
            .daily_prices(&self.reference_ticker, end.minus_days(lookback), end)
            .await?;

        let mut days: Vec<TradingDay> = bars.into_iter().map(|b| b.date).collect();
        days.sort();
        days.dedup();
        Ok(days)
    }
}

/// Day `n` positions before `end` in an ascending calendar.
fn offset_in(days: &[TradingDay], end: TradingDay, n: usize) -> Option<TradingDay> {
    let idx = days.binary_search(&end).ok()?;
    idx.checked_sub(n).map(|i| days[i])
}
