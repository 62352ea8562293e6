use async_trait::async_trait;

use crate::{FlowError, InvestorClass, Market, MarketCap, PriceBar, RawFrame, TradingDay};

/// Everything the dashboard needs from a market-data provider.
///
/// Implementations may fail on any call or return tables whose column names
/// differ between schema versions; callers normalize and degrade.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Daily OHLCV bars for `ticker` between `start` and `end` inclusive, oldest first.
    async fn daily_prices(
        &self,
        ticker: &str,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<Vec<PriceBar>, FlowError>;

    /// Per-day net trading value for `ticker` broken down by investor class.
    /// Rows are keyed by trading day.
    async fn investor_trading_value(
        &self,
        ticker: &str,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<RawFrame, FlowError>;

    /// Aggregate net purchases per stock for one investor class over a range.
    /// Rows are keyed by ticker.
    async fn net_purchases(
        &self,
        market: Market,
        investor: InvestorClass,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<RawFrame, FlowError>;

    /// Market capitalization of every listed stock at `date`.
    async fn market_caps(&self, market: Market, date: TradingDay) -> Result<Vec<MarketCap>, FlowError>;

    /// Display name for a ticker.
    async fn ticker_name(&self, ticker: &str) -> Result<String, FlowError>;
}
