//! Ranking API Routes
//!
//! Ranking JSON, per-stock charts and cache control.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use flow_ranker::AnalysisReport;
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiResponse, AppError, AppState, SelectionQuery};

#[derive(Serialize)]
pub struct CacheClearResponse {
    pub cleared: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cached_reports: usize,
}

pub fn ranking_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ranking", get(get_ranking))
        .route("/api/chart/:ticker", get(get_chart))
        .route("/api/cache/clear", post(clear_cache))
        .route("/refresh", post(refresh))
        .route("/health", get(health))
}

/// Cached analysis outcome for the selected window and mode.
async fn get_ranking(
    State(state): State<AppState>,
    Query(query): Query<SelectionQuery>,
) -> Result<Json<ApiResponse<Arc<AnalysisReport>>>, AppError> {
    let (length, mode) = query.resolve().map_err(AppError::bad_request)?;
    Ok(Json(ApiResponse::success(state.report(length, mode).await)))
}

/// SVG chart for a ticker that is part of the selected ranking.
async fn get_chart(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<SelectionQuery>,
) -> Result<Response, AppError> {
    let (length, mode) = query.resolve().map_err(AppError::bad_request)?;
    let report = state.report(length, mode).await;

    let (Some(window), Some(ranking)) = (report.window, report.outcome.ranking()) else {
        return Err(AppError::not_found(format!("no ranking for window={} mode={}", length, mode)));
    };
    let row = ranking
        .find(&ticker)
        .ok_or_else(|| AppError::not_found(format!("{} is not in the {} ranking", ticker, mode)))?;

    match state.charts.render(&ticker, row, &window).await {
        Ok(Some(svg)) => Ok(([(header::CONTENT_TYPE, "image/svg+xml; charset=utf-8")], svg).into_response()),
        Ok(None) => Err(AppError::not_found(format!("no price data for {}", ticker))),
        Err(e) if e.is_source_failure() => Err(AppError::with_status(StatusCode::BAD_GATEWAY, e.into())),
        Err(e) => Err(e.into()),
    }
}

async fn clear_cache(State(state): State<AppState>) -> Json<ApiResponse<CacheClearResponse>> {
    let cleared = state.cache.clear();
    tracing::info!("Cleared {} cached reports", cleared);
    Json(ApiResponse::success(CacheClearResponse { cleared }))
}

/// Dashboard refresh button: wipe the cache and go back to the same selection.
async fn refresh(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Redirect {
    let cleared = state.cache.clear();
    tracing::info!("Refresh requested, cleared {} cached reports", cleared);

    match query.resolve() {
        Ok((length, mode)) => Redirect::to(&format!("/?window={}&mode={}", length, mode)),
        Err(_) => Redirect::to("/"),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cached_reports: state.cache.len(),
    })
}

#[cfg(test)]
mod tests {
    use crate::{app, AppState};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Datelike, Duration, NaiveDate, Weekday};
    use flow_core::{InMemorySource, InvestorClass, MarketCap, PriceBar, RawFrame, RawRow, TradingDay};
    use http_body_util::BodyExt;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const REFERENCE: &str = "005930";

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn weekday_bars(count: usize) -> Vec<PriceBar> {
        let mut bars = Vec::new();
        let mut date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        while bars.len() < count {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                let close = 70_000.0 + bars.len() as f64 * 10.0;
                bars.push(PriceBar {
                    date: TradingDay::new(date),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1_000.0,
                });
            }
            date -= Duration::days(1);
        }
        bars.reverse();
        bars
    }

    fn net_frame(rows: &[(&str, &str, f64)]) -> RawFrame {
        RawFrame {
            columns: vec!["ISU_SRT_CD".into(), "ISU_NM".into(), "NETBID_TRDVAL".into()],
            rows: rows
                .iter()
                .map(|(ticker, name, value)| {
                    let mut fields = Map::new();
                    fields.insert("ISU_SRT_CD".into(), json!(ticker));
                    fields.insert("ISU_NM".into(), json!(name));
                    fields.insert("NETBID_TRDVAL".into(), json!(value));
                    RawRow { key: ticker.to_string(), fields }
                })
                .collect(),
        }
    }

    fn source() -> InMemorySource {
        InMemorySource::new()
            .with_prices(REFERENCE, weekday_bars(80))
            .with_net_purchases(InvestorClass::Institutional, net_frame(&[(REFERENCE, "삼성전자", 500.0)]))
            .with_net_purchases(InvestorClass::Foreign, net_frame(&[(REFERENCE, "삼성전자", 100.0)]))
            .with_market_caps(vec![MarketCap {
                ticker: REFERENCE.into(),
                name: "삼성전자".into(),
                market_cap: 100_000.0,
            }])
    }

    fn state(source: InMemorySource) -> AppState {
        AppState::new(Arc::new(source), REFERENCE).with_today(fixed_today)
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn post(state: &AppState, uri: &str) -> (StatusCode, axum::http::HeaderMap) {
        let response = app(state.clone())
            .oneshot(Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response.headers().clone())
    }

    #[tokio::test]
    async fn test_ranking_json() {
        let state = state(source());
        let (status, _, body) = get(&state, "/api/ranking?window=5&mode=INST").await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        let outcome = &json["data"]["outcome"];
        assert_eq!(outcome["status"], "ranked");
        let rows = outcome["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "삼성전자");
        assert_eq!(rows[0]["foreign_pct"], 0.0);
        assert!(rows[0]["institutional_pct"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_ranking_rejects_bad_selection() {
        let state = state(source());
        let (status, _, body) = get(&state, "/api/ranking?window=4").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_unavailable_source_is_reported_not_failed() {
        let state = state(InMemorySource::unavailable());
        let (status, _, body) = get(&state, "/api/ranking").await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["outcome"]["status"], "source_unavailable");
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_chart_for_ranked_ticker() {
        let state = state(source());
        let (status, headers, body) = get(&state, "/api/chart/005930?window=5&mode=BOTH").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/svg+xml; charset=utf-8");
        assert!(String::from_utf8(body).unwrap().contains("<svg"));
    }

    #[tokio::test]
    async fn test_chart_for_unranked_ticker_is_404() {
        let state = state(source());
        let (status, _, _) = get(&state, "/api/chart/000660?window=5&mode=BOTH").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dashboard_page() {
        let state = state(source());
        let (status, headers, body) = get(&state, "/?window=5&mode=FORG").await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("x-request-id"));
        assert!(headers.contains_key("content-security-policy"));
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("1. 삼성전자"));
        assert!(html.contains("/api/chart/005930?window=5&amp;mode=FORG"));
    }

    #[tokio::test]
    async fn test_refresh_clears_cache_and_redirects() {
        let state = state(source());
        get(&state, "/api/ranking?window=5&mode=INST").await;
        get(&state, "/api/ranking?window=10&mode=BOTH").await;
        assert_eq!(state.cache.len(), 2);

        let (status, headers) = post(&state, "/refresh?window=5&mode=INST").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/?window=5&mode=INST");
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_clear_endpoint() {
        let state = state(source());
        get(&state, "/api/ranking").await;

        let response = app(state.clone())
            .oneshot(Request::builder().method("POST").uri("/api/cache/clear").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["cleared"], 1);
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = get(&state(source()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
