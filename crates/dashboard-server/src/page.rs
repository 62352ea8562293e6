//! Server-rendered dashboard markup.
//!
//! No scripts: the selectors are a plain GET form and the stock tabs are
//! CSS radio tabs, so the page works under a `default-src 'none'` policy.

use flow_core::{RankingMode, StrengthRow, WindowLength};
use flow_ranker::{AnalysisOutcome, AnalysisReport};
use std::fmt::Write;

pub const PAGE_TITLE: &str = "수급 Top10 분석기";
pub const NO_DATA_MESSAGE: &str = "해당 조건의 종목을 찾을 수 없습니다.";
pub const SOURCE_UNAVAILABLE_MESSAGE: &str = "시장 데이터 소스에 연결할 수 없습니다. 잠시 후 다시 시도해 주세요.";
pub const NO_PRICE_MESSAGE: &str = "가격 데이터가 없습니다.";

const STYLE: &str = r#"
body { margin: 0; font-family: "NanumGothic", "Malgun Gothic", sans-serif; color: #222; display: flex; }
aside { width: 260px; min-height: 100vh; padding: 24px; background: #f4f5f7; box-sizing: border-box; }
main { flex: 1; padding: 24px 40px; }
.field { display: block; margin: 16px 0 6px; font-weight: bold; }
select, button { width: 100%; padding: 6px; }
.modes label { display: block; margin: 4px 0; }
form + form { margin-top: 12px; }
.banner { padding: 12px 16px; border-radius: 6px; margin: 16px 0; }
.banner.empty { background: #fdecea; color: #8a1c1c; }
.banner.unavailable { background: #fff4e5; color: #7a4b00; }
.tabs > input { display: none; }
.tabs > label { display: inline-block; padding: 8px 14px; cursor: pointer; border-bottom: 2px solid transparent; }
.tabs > input:checked + label { border-bottom-color: #d62728; font-weight: bold; }
.panel { display: none; padding-top: 16px; border-top: 1px solid #ddd; }
.metrics td, .metrics th { padding: 4px 12px; text-align: right; }
.panel img { max-width: 1000px; width: 100%; }
"#;

/// Minimal HTML text/attribute escaping.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative path of a chart image for one ranked ticker.
pub fn chart_url(ticker: &str, length: WindowLength, mode: RankingMode) -> String {
    format!("/api/chart/{}?window={}&mode={}", ticker, length, mode)
}

/// Full dashboard page for one analysis report.
pub fn render_dashboard(report: &AnalysisReport) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"ko\"><head><meta charset=\"utf-8\"><title>{}</title><style>{}{}</style></head><body>",
        PAGE_TITLE,
        STYLE,
        panel_rules(report)
    );

    render_sidebar(&mut html, report.length, report.mode);

    html.push_str("<main><h1>📊 수급 주도주 Top 10 분석</h1>");
    match &report.outcome {
        AnalysisOutcome::Ranked(ranking) => {
            let _ = write!(html, "<p><strong>분석 기간:</strong> {} ~ {}</p>", ranking.start, ranking.end);
            render_tabs(&mut html, &ranking.rows, report.length, report.mode);
        }
        AnalysisOutcome::NoQualifyingData { .. } => {
            let _ = write!(html, "<div class=\"banner empty\">{}</div>", NO_DATA_MESSAGE);
        }
        AnalysisOutcome::SourceUnavailable { reason } => {
            let _ = write!(
                html,
                "<div class=\"banner unavailable\">{}<br><small>{}</small></div>",
                SOURCE_UNAVAILABLE_MESSAGE,
                escape_html(reason)
            );
        }
    }
    html.push_str("</main></body></html>");
    html
}

fn render_sidebar(html: &mut String, selected_length: WindowLength, selected_mode: RankingMode) {
    html.push_str("<aside><h2>🔍 분석 설정</h2><form method=\"get\" action=\"/\">");

    html.push_str("<label class=\"field\" for=\"window\">기간 선택 (영업일 기준)</label><select id=\"window\" name=\"window\">");
    for length in WindowLength::all() {
        let selected = if length == selected_length { " selected" } else { "" };
        let _ = write!(html, "<option value=\"{}\"{}>{}</option>", length, selected, length.label());
    }
    html.push_str("</select>");

    html.push_str("<p class=\"field\">분석 모드</p><div class=\"modes\">");
    for mode in RankingMode::ALL {
        let checked = if mode == selected_mode { " checked" } else { "" };
        let _ = write!(
            html,
            "<label><input type=\"radio\" name=\"mode\" value=\"{}\"{}> {}</label>",
            mode,
            checked,
            mode.label()
        );
    }
    html.push_str("</div><button type=\"submit\">조회</button></form>");

    let _ = write!(
        html,
        "<form method=\"post\" action=\"/refresh?window={}&amp;mode={}\"><button type=\"submit\">데이터 새로고침</button></form></aside>",
        selected_length, selected_mode
    );
}

fn render_tabs(html: &mut String, rows: &[StrengthRow], length: WindowLength, mode: RankingMode) {
    html.push_str("<div class=\"tabs\">");
    for (i, row) in rows.iter().enumerate() {
        let checked = if i == 0 { " checked" } else { "" };
        let _ = write!(
            html,
            "<input type=\"radio\" name=\"stock\" id=\"tab{i}\"{checked}><label for=\"tab{i}\">{}. {}</label>",
            i + 1,
            escape_html(&row.name)
        );
    }

    for (i, row) in rows.iter().enumerate() {
        let _ = write!(
            html,
            "<section class=\"panel\" id=\"panel{i}\">\
             <table class=\"metrics\"><tr><th>종목코드</th><th>시가총액</th><th>기관 강도</th><th>외인 강도</th><th>합산 강도</th></tr>\
             <tr><td>{}</td><td>{}</td><td>{:.2}%</td><td>{:.2}%</td><td>{:.2}%</td></tr></table>\
             <img src=\"{}\" alt=\"{}\" loading=\"lazy\"></section>",
            escape_html(&row.ticker),
            flow_chart::format_thousands(row.market_cap),
            row.institutional_pct,
            row.foreign_pct,
            row.combined_pct,
            escape_html(&chart_url(&row.ticker, length, mode)),
            NO_PRICE_MESSAGE,
        );
    }
    html.push_str("</div>");
}

/// One `:checked` rule per tab, since panels are not adjacent to their inputs.
fn panel_rules(report: &AnalysisReport) -> String {
    let count = report.outcome.ranking().map(|r| r.rows.len()).unwrap_or(0);
    (0..count)
        .map(|i| format!("#tab{i}:checked ~ #panel{i} {{ display: block; }}\n"))
        .collect()
}
