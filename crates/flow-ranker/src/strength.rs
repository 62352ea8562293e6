//! Buying-strength ranking
//!
//! Strength is net-buy value as a percentage of market cap. Combined
//! ("dual-pull") strength sums institutional and foreign net buying before
//! dividing.

use flow_core::{
    FlowError, InvestorClass, Market, MarketCap, MarketDataSource, NetBuyEntry, NetBuyTable,
    Ranking, RankingMode, StrengthRow, TradingDay,
};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::normalizer::{fill_missing_names, normalize_net_buy};

/// Rows kept in a ranking.
pub const TOP_N: usize = 10;

/// Rank stocks by buying strength for `mode`.
///
/// Only stocks present in all three tables take part. In `BOTH` mode stocks
/// bought by both classes are preferred; when fewer than [`TOP_N`] qualify,
/// any stock with positive combined net buying is eligible instead. The sort
/// is stable, so ties keep market-cap table order.
pub fn rank_by_strength(
    caps: &[MarketCap],
    institutional: &NetBuyTable,
    foreign: &NetBuyTable,
    mode: RankingMode,
) -> Vec<StrengthRow> {
    let joined: Vec<(&MarketCap, f64, f64, String)> = caps
        .iter()
        .filter(|cap| cap.market_cap > 0.0)
        .filter_map(|cap| {
            let inst = institutional.get(&cap.ticker)?;
            let forg = foreign.get(&cap.ticker)?;
            let name = inst
                .name
                .clone()
                .or_else(|| forg.name.clone())
                .unwrap_or_else(|| cap.name.clone());
            Some((cap, inst.value, forg.value, name))
        })
        .collect();

    let eligible: Vec<_> = match mode {
        RankingMode::Inst => joined.into_iter().filter(|(_, i, _, _)| *i > 0.0).collect(),
        RankingMode::Forg => joined.into_iter().filter(|(_, _, f, _)| *f > 0.0).collect(),
        RankingMode::Both => {
            let dual = joined.iter().filter(|(_, i, f, _)| *i > 0.0 && *f > 0.0).count();
            if dual >= TOP_N {
                joined.into_iter().filter(|(_, i, f, _)| *i > 0.0 && *f > 0.0).collect()
            } else {
                tracing::debug!("Only {} dual-positive stocks, relaxing to positive combined", dual);
                joined.into_iter().filter(|(_, i, f, _)| i + f > 0.0).collect()
            }
        }
    };

    let mut rows: Vec<StrengthRow> = eligible
        .into_iter()
        .map(|(cap, inst, forg, name)| {
            let pct = |v: f64| v / cap.market_cap * 100.0;
            let (institutional_pct, foreign_pct, combined_pct) = match mode {
                RankingMode::Inst => (pct(inst), 0.0, pct(inst)),
                RankingMode::Forg => (0.0, pct(forg), pct(forg)),
                RankingMode::Both => (pct(inst), pct(forg), pct(inst + forg)),
            };
            StrengthRow {
                ticker: cap.ticker.clone(),
                name,
                market_cap: cap.market_cap,
                institutional_net: inst,
                foreign_net: forg,
                institutional_pct,
                foreign_pct,
                combined_pct,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.combined_pct.partial_cmp(&a.combined_pct).unwrap_or(Ordering::Equal));
    rows.truncate(TOP_N);
    rows
}

/// Fetches the three tables for a period and ranks them.
pub struct StrengthCalculator {
    source: Arc<dyn MarketDataSource>,
    market: Market,
}

impl StrengthCalculator {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self::with_market(source, Market::Kospi)
    }

    pub fn with_market(source: Arc<dyn MarketDataSource>, market: Market) -> Self {
        Self { source, market }
    }

    /// Top stocks by strength between `start` and `end`.
    ///
    /// An empty ranking means nothing qualified; an error means the data
    /// could not be retrieved.
    pub async fn calculate(
        &self,
        start: TradingDay,
        end: TradingDay,
        mode: RankingMode,
    ) -> Result<Ranking, FlowError> {
        let institutional = self.net_buy_table(InvestorClass::Institutional, start, end).await?;
        let foreign = self.net_buy_table(InvestorClass::Foreign, start, end).await?;
        let caps = self.source.market_caps(self.market, end).await?;

        let mut rows = rank_by_strength(&caps, &institutional, &foreign, mode);
        self.name_unnamed_rows(&mut rows, &institutional).await;
        tracing::info!(
            "Ranked {} stocks ({} {}..{}): {} cap rows, {} inst rows, {} foreign rows",
            rows.len(),
            mode,
            start,
            end,
            caps.len(),
            institutional.len(),
            foreign.len()
        );

        Ok(Ranking { mode, start, end, rows })
    }

    async fn net_buy_table(
        &self,
        investor: InvestorClass,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<NetBuyTable, FlowError> {
        let frame = self.source.net_purchases(self.market, investor, start, end).await?;
        Ok(normalize_net_buy(&frame))
    }

    /// Look up names only for ranked rows whose institutional entry had none,
    /// so a frame without a name column costs at most [`TOP_N`] lookups.
    async fn name_unnamed_rows(&self, rows: &mut [StrengthRow], institutional: &NetBuyTable) {
        let mut unnamed: NetBuyTable = rows
            .iter()
            .filter(|row| institutional.get(&row.ticker).is_some_and(|e| e.name.is_none()))
            .map(|row| NetBuyEntry {
                ticker: row.ticker.clone(),
                name: None,
                value: row.institutional_net,
            })
            .collect();
        if unnamed.is_empty() {
            return;
        }

        fill_missing_names(&mut unnamed, self.source.as_ref()).await;
        for row in rows.iter_mut() {
            if let Some(name) = unnamed.get(&row.ticker).and_then(|e| e.name.clone()) {
                row.name = name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{caps, day, net_frame};
    use flow_core::InMemorySource;

    const EPS: f64 = 1e-9;

    fn table(rows: &[(&str, f64)]) -> NetBuyTable {
        rows.iter()
            .map(|(ticker, value)| NetBuyEntry {
                ticker: ticker.to_string(),
                name: Some(format!("Name {}", ticker)),
                value: *value,
            })
            .collect()
    }

    fn assert_sorted_desc(rows: &[StrengthRow]) {
        for pair in rows.windows(2) {
            assert!(pair[0].combined_pct >= pair[1].combined_pct);
        }
    }

    #[test]
    fn test_inner_join_drops_partial_tickers() {
        let caps = caps(&[("A", 1000.0), ("B", 1000.0), ("C", 1000.0)]);
        let inst = table(&[("A", 10.0), ("B", 10.0)]);
        let forg = table(&[("A", 10.0), ("C", 10.0)]);

        let rows = rank_by_strength(&caps, &inst, &forg, RankingMode::Both);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticker, "A");
        assert_eq!(rows[0].name, "Name A");
    }

    #[test]
    fn test_empty_join_gives_empty_ranking() {
        let rows = rank_by_strength(&caps(&[("A", 1000.0)]), &table(&[]), &table(&[("A", 1.0)]), RankingMode::Both);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_both_mode_relaxes_when_few_dual_buyers() {
        // 5 bought by both classes, 8 only positive in sum
        let mut cap_rows = Vec::new();
        let mut inst_rows = Vec::new();
        let mut forg_rows = Vec::new();
        let tickers: Vec<String> = (0..13).map(|i| format!("{:06}", i)).collect();
        for (i, t) in tickers.iter().enumerate() {
            cap_rows.push((t.as_str(), 10_000.0));
            if i < 5 {
                inst_rows.push((t.as_str(), 10.0));
                forg_rows.push((t.as_str(), 10.0));
            } else {
                inst_rows.push((t.as_str(), 100.0 + i as f64));
                forg_rows.push((t.as_str(), -50.0));
            }
        }

        let rows = rank_by_strength(&caps(&cap_rows), &table(&inst_rows), &table(&forg_rows), RankingMode::Both);

        assert_eq!(rows.len(), TOP_N);
        let relaxed_only = rows.iter().filter(|r| r.foreign_net < 0.0).count();
        assert_eq!(relaxed_only, 8);
        assert_sorted_desc(&rows);
        for r in &rows {
            assert!((r.combined_pct - (r.institutional_pct + r.foreign_pct)).abs() < EPS);
        }
    }

    #[test]
    fn test_both_mode_strict_when_enough_dual_buyers() {
        let tickers: Vec<String> = (0..12).map(|i| format!("{:06}", i)).collect();
        let cap_rows: Vec<_> = tickers.iter().map(|t| (t.as_str(), 1_000.0)).collect();
        let inst_rows: Vec<_> = tickers.iter().map(|t| (t.as_str(), 5.0)).collect();
        let mut forg_rows: Vec<_> = tickers.iter().map(|t| (t.as_str(), 5.0)).collect();
        // Huge combined buying but foreign is selling: excluded in strict mode
        forg_rows.push(("BIG", -1.0));
        let mut cap_rows = cap_rows;
        cap_rows.push(("BIG", 1_000.0));
        let mut inst_rows = inst_rows;
        inst_rows.push(("BIG", 900.0));

        let rows = rank_by_strength(&caps(&cap_rows), &table(&inst_rows), &table(&forg_rows), RankingMode::Both);

        assert_eq!(rows.len(), TOP_N);
        assert!(rows.iter().all(|r| r.institutional_net > 0.0 && r.foreign_net > 0.0));
        assert!(rows.iter().all(|r| r.ticker != "BIG"));
    }

    #[test]
    fn test_single_class_modes_zero_fill_other_class() {
        let caps = caps(&[("A", 1_000.0), ("B", 2_000.0), ("C", 1_000.0)]);
        let inst = table(&[("A", 10.0), ("B", 40.0), ("C", -5.0)]);
        let forg = table(&[("A", 30.0), ("B", -10.0), ("C", 20.0)]);

        let rows = rank_by_strength(&caps, &inst, &forg, RankingMode::Inst);
        assert_eq!(rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(), vec!["B", "A"]);
        assert!(rows.iter().all(|r| r.institutional_pct > 0.0 && r.foreign_pct == 0.0));
        assert!((rows[0].combined_pct - 2.0).abs() < EPS);

        let rows = rank_by_strength(&caps, &inst, &forg, RankingMode::Forg);
        assert_eq!(rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(), vec!["A", "C"]);
        assert!(rows.iter().all(|r| r.institutional_pct == 0.0 && r.foreign_pct > 0.0));
        assert_eq!(rows[0].combined_pct, rows[0].foreign_pct);
    }

    #[test]
    fn test_ties_keep_cap_table_order() {
        let caps = caps(&[("Z", 1_000.0), ("Y", 1_000.0), ("X", 1_000.0)]);
        let inst = table(&[("X", 10.0), ("Y", 10.0), ("Z", 10.0)]);
        let forg = table(&[("X", 0.0), ("Y", 0.0), ("Z", 0.0)]);

        let rows = rank_by_strength(&caps, &inst, &forg, RankingMode::Inst);
        assert_eq!(rows.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(), vec!["Z", "Y", "X"]);
    }

    #[test]
    fn test_zero_market_cap_is_skipped() {
        let caps = caps(&[("A", 0.0), ("B", 1_000.0)]);
        let inst = table(&[("A", 10.0), ("B", 10.0)]);
        let forg = table(&[("A", 10.0), ("B", 10.0)]);

        let rows = rank_by_strength(&caps, &inst, &forg, RankingMode::Both);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].combined_pct.is_finite());
    }

    #[tokio::test]
    async fn test_calculate_inst_window_end_to_end() {
        let tickers: Vec<String> = (0..15).map(|i| format!("{:06}", i)).collect();
        let inst: Vec<(&str, Option<&str>, f64)> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), None, if i % 3 == 0 { -100.0 } else { 100.0 * i as f64 }))
            .collect();
        let forg: Vec<(&str, Option<&str>, f64)> =
            tickers.iter().map(|t| (t.as_str(), None, 50.0)).collect();
        let cap_rows: Vec<(&str, f64)> = tickers.iter().map(|t| (t.as_str(), 1_000_000.0)).collect();

        let source = InMemorySource::new()
            .with_net_purchases(InvestorClass::Institutional, net_frame("순매수거래대금", &inst))
            .with_net_purchases(InvestorClass::Foreign, net_frame("NETBID_TRDVAL", &forg))
            .with_market_caps(caps(&cap_rows))
            .with_name("000001", "First");
        let calculator = StrengthCalculator::new(Arc::new(source));

        let ranking = calculator
            .calculate(day("20240301"), day("20240308"), RankingMode::Inst)
            .await
            .unwrap();

        assert!(ranking.rows.len() <= TOP_N);
        assert!(!ranking.is_empty());
        assert!(ranking.rows.iter().all(|r| r.institutional_pct > 0.0 && r.foreign_pct == 0.0));
        assert_sorted_desc(&ranking.rows);
        // Names missing from the frame are looked up, falling back to the ticker
        assert_eq!(ranking.find("000001").map(|r| r.name.as_str()), Some("First"));
        assert_eq!(ranking.find("000014").map(|r| r.name.as_str()), Some("000014"));
    }

    #[tokio::test]
    async fn test_name_lookups_limited_to_ranked_rows() {
        let tickers: Vec<String> = (0..40).map(|i| format!("{:06}", i)).collect();
        let unnamed: Vec<(&str, Option<&str>, f64)> =
            tickers.iter().enumerate().map(|(i, t)| (t.as_str(), None, 10.0 + i as f64)).collect();
        let cap_rows: Vec<(&str, f64)> = tickers.iter().map(|t| (t.as_str(), 1_000.0)).collect();

        let source = Arc::new(
            InMemorySource::new()
                .with_net_purchases(InvestorClass::Institutional, net_frame("NETBID_TRDVAL", &unnamed))
                .with_net_purchases(InvestorClass::Foreign, net_frame("NETBID_TRDVAL", &unnamed))
                .with_market_caps(caps(&cap_rows))
                .with_name("000039", "Top"),
        );
        let calculator = StrengthCalculator::new(source.clone());

        let ranking = calculator
            .calculate(day("20240301"), day("20240308"), RankingMode::Both)
            .await
            .unwrap();

        assert_eq!(ranking.rows.len(), TOP_N);
        assert_eq!(ranking.rows[0].name, "Top");
        assert_eq!(ranking.rows[1].name, "000038");
        // Two net-purchase tables, one cap table, one lookup per ranked row
        assert_eq!(source.calls(), 3 + TOP_N);
    }

    #[tokio::test]
    async fn test_calculate_reports_source_failure() {
        let calculator = StrengthCalculator::new(Arc::new(InMemorySource::unavailable()));

        let result = calculator
            .calculate(day("20240301"), day("20240308"), RankingMode::Both)
            .await;
        assert!(matches!(result, Err(FlowError::Api(_))));
    }
}
