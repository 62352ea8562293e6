use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::FlowError;

/// A date on which the reference market traded, keyed as `YYYYMMDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingDay(NaiveDate);

impl TradingDay {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The calendar date `days` days earlier. Not necessarily a trading day.
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    pub fn key(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for TradingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl FromStr for TradingDay {
    type Err = FlowError;

    /// Accepts `YYYYMMDD` as well as the `YYYY/MM/DD` and `YYYY-MM-DD`
    /// forms the exchange uses in its payloads.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| *c != '/' && *c != '-').collect();
        NaiveDate::parse_from_str(&digits, "%Y%m%d")
            .map(Self)
            .map_err(|_| FlowError::InvalidInput(format!("not a YYYYMMDD date: {:?}", s)))
    }
}

impl TryFrom<String> for TradingDay {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradingDay> for String {
    fn from(day: TradingDay) -> Self {
        day.key()
    }
}

/// Exchange segment a table is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// Market id used by the KRX data service.
    pub fn krx_id(&self) -> &'static str {
        match self {
            Market::Kospi => "STK",
            Market::Kosdaq => "KSQ",
        }
    }
}

/// Investor class whose net buying is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestorClass {
    /// Domestic institutions in total (기관합계).
    Institutional,
    /// Foreign investors (외국인).
    Foreign,
}

impl InvestorClass {
    /// Investor type code used by the KRX data service.
    pub fn krx_code(&self) -> &'static str {
        match self {
            InvestorClass::Institutional => "7050",
            InvestorClass::Foreign => "9000",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvestorClass::Institutional => "기관",
            InvestorClass::Foreign => "외국인",
        }
    }
}

/// Which investor classes drive the ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankingMode {
    #[default]
    #[serde(rename = "BOTH")]
    Both,
    #[serde(rename = "INST")]
    Inst,
    #[serde(rename = "FORG")]
    Forg,
}

impl RankingMode {
    pub const ALL: [RankingMode; 3] = [RankingMode::Both, RankingMode::Inst, RankingMode::Forg];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::Both => "BOTH",
            RankingMode::Inst => "INST",
            RankingMode::Forg => "FORG",
        }
    }

    /// Human-readable label for selectors
    pub fn label(&self) -> &'static str {
        match self {
            RankingMode::Both => "기관+외인(쌍끌이)",
            RankingMode::Inst => "기관 집중",
            RankingMode::Forg => "외인 집중",
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOTH" => Ok(RankingMode::Both),
            "INST" => Ok(RankingMode::Inst),
            "FORG" => Ok(RankingMode::Forg),
            other => Err(FlowError::InvalidInput(format!("unknown ranking mode: {}", other))),
        }
    }
}

/// Look-back window in business days, restricted to the selectable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WindowLength(u32);

impl WindowLength {
    pub const ALLOWED: [u32; 7] = [2, 3, 5, 10, 20, 30, 60];

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = WindowLength> {
        Self::ALLOWED.into_iter().map(WindowLength)
    }

    pub fn label(&self) -> String {
        format!("최근 {}일", self.0)
    }
}

impl Default for WindowLength {
    fn default() -> Self {
        WindowLength(Self::ALLOWED[0])
    }
}

impl TryFrom<u32> for WindowLength {
    type Error = FlowError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        if Self::ALLOWED.contains(&days) {
            Ok(WindowLength(days))
        } else {
            Err(FlowError::InvalidInput(format!(
                "window must be one of {:?} business days, got {}",
                Self::ALLOWED,
                days
            )))
        }
    }
}

impl From<WindowLength> for u32 {
    fn from(window: WindowLength) -> Self {
        window.0
    }
}

impl fmt::Display for WindowLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved analysis period: `length` business days back from `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub length: WindowLength,
    pub start: TradingDay,
    pub end: TradingDay,
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: TradingDay,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Market capitalization of one listed stock at a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCap {
    pub ticker: String,
    pub name: String,
    pub market_cap: f64,
}

/// One row of a schema-varying table as the data source returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// Ticker for per-stock tables, trading day key for per-date tables.
    pub key: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRow {
    pub fn number(&self, column: &str) -> Option<f64> {
        self.fields.get(column).and_then(parse_amount)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Parse a numeric cell that may be a JSON number or an exchange-formatted
/// string such as `"-1,234,500"`. A lone `"-"` means no value.
pub fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() || cleaned == "-" {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// A table whose column names depend on the upstream schema version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawFrame {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// First candidate present in the frame, in the candidates' order.
    pub fn resolve_column<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|c| self.has_column(c))
    }
}

/// Net-buy value of a single stock for one investor class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetBuyEntry {
    pub ticker: String,
    /// Display name, `None` until looked up.
    pub name: Option<String>,
    pub value: f64,
}

/// Ticker-indexed (name, value) table for one investor class.
///
/// Keeps insertion order; the first row for a ticker wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetBuyTable {
    entries: Vec<NetBuyEntry>,
    index: HashMap<String, usize>,
}

impl NetBuyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: NetBuyEntry) {
        if self.index.contains_key(&entry.ticker) {
            return;
        }
        self.index.insert(entry.ticker.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, ticker: &str) -> Option<&NetBuyEntry> {
        self.index.get(ticker).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetBuyEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NetBuyEntry> {
        self.entries.iter_mut()
    }
}

impl FromIterator<NetBuyEntry> for NetBuyTable {
    fn from_iter<I: IntoIterator<Item = NetBuyEntry>>(iter: I) -> Self {
        let mut table = NetBuyTable::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

/// A ranked stock with its buying-strength metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthRow {
    pub ticker: String,
    pub name: String,
    pub market_cap: f64,
    pub institutional_net: f64,
    pub foreign_net: f64,
    /// Institutional net buy as % of market cap
    pub institutional_pct: f64,
    /// Foreign net buy as % of market cap
    pub foreign_pct: f64,
    /// Combined (dual-pull) strength, the ranking key
    pub combined_pct: f64,
}

/// Top stocks by combined strength for one period and mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub mode: RankingMode,
    pub start: TradingDay,
    pub end: TradingDay,
    pub rows: Vec<StrengthRow>,
}

impl Ranking {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn find(&self, ticker: &str) -> Option<&StrengthRow> {
        self.rows.iter().find(|r| r.ticker == ticker)
    }
}

/// One day of an investor class's net trading value for a single stock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowPoint {
    pub date: TradingDay,
    pub value: f64,
}
