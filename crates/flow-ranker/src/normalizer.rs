//! Net-buy table normalization
//!
//! Upstream column names drift between schema versions. Each concept is
//! resolved through an explicit, ordered alias list; the first alias present
//! wins.

use flow_core::{FlowPoint, InvestorClass, MarketDataSource, NetBuyEntry, NetBuyTable, RawFrame, TradingDay};

/// Net-buy trading value column, in priority order.
pub const NET_BUY_VALUE_ALIASES: [&str; 5] = [
    "NETBID_TRDVAL",
    "순매수거래대금",
    "순매수대금",
    "순매수금액",
    "순매수거래금액",
];

/// Display name column, in priority order.
pub const NAME_ALIASES: [&str; 3] = ["ISU_ABBRV", "ISU_NM", "종목명"];

pub const INSTITUTIONAL_SERIES_ALIASES: [&str; 2] = ["기관합계", "기관"];
pub const FOREIGN_SERIES_ALIASES: [&str; 2] = ["외국인합계", "외국인"];

/// Reshape a net-purchase frame into a (name, value) table keyed by ticker.
///
/// Returns an empty table when no known value column is present. Rows whose
/// value can't be parsed are dropped.
pub fn normalize_net_buy(frame: &RawFrame) -> NetBuyTable {
    let Some(value_col) = frame.resolve_column(&NET_BUY_VALUE_ALIASES) else {
        if !frame.is_empty() {
            tracing::warn!(
                "No net-buy value column among {:?}; got {:?}",
                NET_BUY_VALUE_ALIASES,
                frame.columns
            );
        }
        return NetBuyTable::new();
    };
    let name_col = frame.resolve_column(&NAME_ALIASES);

    frame
        .rows
        .iter()
        .filter_map(|row| {
            let value = row.number(value_col)?;
            Some(NetBuyEntry {
                ticker: row.key.clone(),
                name: name_col.and_then(|c| row.text(c)).map(str::to_string),
                value,
            })
        })
        .collect()
}

/// Look up display names for rows that came without one. A failed lookup
/// leaves the ticker as the name.
pub async fn fill_missing_names(table: &mut NetBuyTable, source: &dyn MarketDataSource) {
    for entry in table.iter_mut().filter(|e| e.name.is_none()) {
        let name = match source.ticker_name(&entry.ticker).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Name lookup failed for {}: {}", entry.ticker, e);
                entry.ticker.clone()
            }
        };
        entry.name = Some(name);
    }
}

/// Daily net trading value of one investor class from a by-date frame.
///
/// `None` when the frame carries no column for that class.
pub fn select_investor_series(frame: &RawFrame, investor: InvestorClass) -> Option<Vec<FlowPoint>> {
    let aliases: &[&str] = match investor {
        InvestorClass::Institutional => &INSTITUTIONAL_SERIES_ALIASES,
        InvestorClass::Foreign => &FOREIGN_SERIES_ALIASES,
    };
    let column = frame.resolve_column(aliases)?;

    let mut points: Vec<FlowPoint> = frame
        .rows
        .iter()
        .filter_map(|row| {
            let date = row.key.parse::<TradingDay>().ok()?;
            let value = row.number(column)?;
            Some(FlowPoint { date, value })
        })
        .collect();
    points.sort_by_key(|p| p.date);
    Some(points)
}
