//! Detail charts for ranked stocks
//!
//! Renders price with a 20-day moving average above daily institutional and
//! foreign net buying, as SVG.

pub mod fonts;
pub mod render;

pub use fonts::{font_family, init_fonts, FALLBACK_FONT_FAMILY};
pub use render::{bar_color, draw_svg, format_thousands, moving_average, ChartData};

use flow_core::{AnalysisWindow, FlowError, InvestorClass, MarketDataSource, StrengthRow};
use flow_ranker::select_investor_series;
use std::sync::Arc;

/// Calendar days of price history shown before the window end.
pub const PRICE_LOOKBACK_DAYS: i64 = 180;
pub const MA_WINDOW: usize = 20;

pub struct ChartRenderer {
    source: Arc<dyn MarketDataSource>,
}

impl ChartRenderer {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }

    /// Render the detail figure for one ranked stock.
    ///
    /// `Ok(None)` when there is no price history to show. Flow panels whose
    /// series can't be fetched are left blank.
    pub async fn render(
        &self,
        ticker: &str,
        row: &StrengthRow,
        window: &AnalysisWindow,
    ) -> Result<Option<String>, FlowError> {
        let start = window.end.minus_days(PRICE_LOOKBACK_DAYS);
        let bars = self.source.daily_prices(ticker, start, window.end).await?;
        let Some(last) = bars.last() else {
            tracing::info!("No price data for {} up to {}", ticker, window.end);
            return Ok(None);
        };

        let (institutional, foreign) = match self.source.investor_trading_value(ticker, start, window.end).await {
            Ok(frame) => (
                select_investor_series(&frame, InvestorClass::Institutional),
                select_investor_series(&frame, InvestorClass::Foreign),
            ),
            Err(e) => {
                tracing::warn!("Investor flow series unavailable for {}: {}", ticker, e);
                (None, None)
            }
        };

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let data = ChartData {
            title: format!("{} ({}) - 현재가: {}원", row.name, ticker, format_thousands(last.close)),
            moving_average: moving_average(&closes, MA_WINDOW),
            bars,
            institutional_title: format!("기관 일별 순매수 (강도: {:.2}%)", row.institutional_pct),
            institutional,
            foreign_title: format!("외국인 일별 순매수 (강도: {:.2}%)", row.foreign_pct),
            foreign,
        };

        draw_svg(&data, font_family())
            .map(Some)
            .map_err(|e| FlowError::Render(e.to_string()))
    }
}
