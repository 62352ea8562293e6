//! In-memory [`MarketDataSource`] backed by canned tables.
//!
//! Test fixture for the workspace, enabled in other crates through the
//! `test-support` feature. Every call bumps a counter so tests can assert how
//! often the source was hit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    FlowError, InvestorClass, Market, MarketCap, MarketDataSource, PriceBar, RawFrame, TradingDay,
};

#[derive(Default)]
pub struct InMemorySource {
    prices: HashMap<String, Vec<PriceBar>>,
    investor_values: HashMap<String, RawFrame>,
    net_purchases: HashMap<InvestorClass, RawFrame>,
    market_caps: Vec<MarketCap>,
    names: HashMap<String, String>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose every call fails as if the network were down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_prices(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.prices.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_investor_values(mut self, ticker: &str, frame: RawFrame) -> Self {
        self.investor_values.insert(ticker.to_string(), frame);
        self
    }

    pub fn with_net_purchases(mut self, investor: InvestorClass, frame: RawFrame) -> Self {
        self.net_purchases.insert(investor, frame);
        self
    }

    pub fn with_market_caps(mut self, caps: Vec<MarketCap>) -> Self {
        self.market_caps = caps;
        self
    }

    pub fn with_name(mut self, ticker: &str, name: &str) -> Self {
        self.names.insert(ticker.to_string(), name.to_string());
        self
    }

    /// Number of calls served (or refused) so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, what: &str) -> Result<(), FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(FlowError::Api(format!("{}: source unavailable", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for InMemorySource {
    async fn daily_prices(
        &self,
        ticker: &str,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<Vec<PriceBar>, FlowError> {
        self.enter("daily_prices")?;
        Ok(self
            .prices
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn investor_trading_value(
        &self,
        ticker: &str,
        _start: TradingDay,
        _end: TradingDay,
    ) -> Result<RawFrame, FlowError> {
        self.enter("investor_trading_value")?;
        self.investor_values
            .get(ticker)
            .cloned()
            .ok_or_else(|| FlowError::Schema(format!("no investor values for {}", ticker)))
    }

    async fn net_purchases(
        &self,
        _market: Market,
        investor: InvestorClass,
        _start: TradingDay,
        _end: TradingDay,
    ) -> Result<RawFrame, FlowError> {
        self.enter("net_purchases")?;
        Ok(self.net_purchases.get(&investor).cloned().unwrap_or_default())
    }

    async fn market_caps(&self, _market: Market, _date: TradingDay) -> Result<Vec<MarketCap>, FlowError> {
        self.enter("market_caps")?;
        Ok(self.market_caps.clone())
    }

    async fn ticker_name(&self, ticker: &str) -> Result<String, FlowError> {
        self.enter("ticker_name")?;
        self.names
            .get(ticker)
            .cloned()
            .ok_or_else(|| FlowError::Schema(format!("unknown ticker {}", ticker)))
    }
}
