use chrono::{Datelike, Duration, Weekday};
use flow_core::{MarketCap, PriceBar, RawFrame, RawRow, TradingDay};
use serde_json::{json, Map, Value};

pub fn day(s: &str) -> TradingDay {
    s.parse().unwrap()
}

/// `count` weekday bars ending on or before `end`, oldest first, closes rising by 10.
pub fn weekday_bars(end: &str, count: usize, base_close: f64) -> Vec<PriceBar> {
    let mut date = day(end).date();
    let mut dates = Vec::with_capacity(count);
    while dates.len() < count {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date -= Duration::days(1);
    }
    dates.reverse();

    dates
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let close = base_close + i as f64 * 10.0;
            PriceBar {
                date: TradingDay::new(d),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

/// Frame keyed by ticker with a single value column and optional names.
pub fn net_frame(value_column: &str, rows: &[(&str, Option<&str>, f64)]) -> RawFrame {
    let mut frame = RawFrame {
        columns: vec!["ISU_SRT_CD".to_string(), value_column.to_string()],
        rows: Vec::new(),
    };
    if rows.iter().any(|(_, name, _)| name.is_some()) {
        frame.columns.push("ISU_NM".to_string());
    }

    for (ticker, name, value) in rows {
        let mut fields = Map::new();
        fields.insert("ISU_SRT_CD".to_string(), json!(ticker));
        fields.insert(value_column.to_string(), Value::String(format!("{}", value)));
        if let Some(name) = name {
            fields.insert("ISU_NM".to_string(), json!(name));
        }
        frame.rows.push(RawRow {
            key: ticker.to_string(),
            fields,
        });
    }
    frame
}

pub fn caps(rows: &[(&str, f64)]) -> Vec<MarketCap> {
    rows.iter()
        .map(|(ticker, cap)| MarketCap {
            ticker: ticker.to_string(),
            name: format!("Stock {}", ticker),
            market_cap: *cap,
        })
        .collect()
}
