//! Dual-pull flow dashboard server
//!
//! Serves the HTML dashboard, the ranking JSON and per-stock SVG charts, with
//! analysis results cached per (window, mode).

pub mod cache;
pub mod config;
pub mod dashboard_routes;
pub mod page;
pub mod ranking_routes;
pub mod request_id;
pub mod security_headers;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::{FixedOffset, NaiveDate, Utc};
use flow_chart::ChartRenderer;
use flow_core::{FlowError, Market, MarketDataSource, RankingMode, WindowLength};
use flow_ranker::{AnalysisReport, AnalysisService};
use krx_client::KrxClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::ReportCache;
use crate::config::DashboardConfig;

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Current calendar date in Korea, where the exchange trades.
pub fn today_kst() -> NaiveDate {
    match FixedOffset::east_opt(KST_OFFSET_SECS) {
        Some(kst) => Utc::now().with_timezone(&kst).date_naive(),
        None => Utc::now().date_naive(),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub analysis: Arc<AnalysisService>,
    pub charts: Arc<ChartRenderer>,
    pub cache: Arc<ReportCache>,
    pub today: fn() -> NaiveDate,
}

impl AppState {
    pub fn new(source: Arc<dyn MarketDataSource>, reference_ticker: &str) -> Self {
        Self {
            analysis: Arc::new(AnalysisService::new(source.clone(), reference_ticker, Market::Kospi)),
            charts: Arc::new(ChartRenderer::new(source)),
            cache: Arc::new(ReportCache::new()),
            today: today_kst,
        }
    }

    /// Pin "today" (tests, replays).
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Cached analysis for the selection, computed on first use.
    pub async fn report(&self, length: WindowLength, mode: RankingMode) -> Arc<AnalysisReport> {
        let today = (self.today)();
        self.cache
            .get_or_compute(length, mode, || self.analysis.analyze(today, length, mode))
            .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error rendered as a JSON `ApiResponse`; 500 unless stated otherwise.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }

    pub fn bad_request(error: FlowError) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, error.into())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.error);
        }
        (self.status, Json(ApiResponse::<()>::error(self.error.to_string()))).into_response()
    }
}

/// Window/mode query shared by the page and the API. Missing values use defaults.
#[derive(Debug, Default, Deserialize)]
pub struct SelectionQuery {
    pub window: Option<u32>,
    pub mode: Option<String>,
}

impl SelectionQuery {
    pub fn resolve(&self) -> Result<(WindowLength, RankingMode), FlowError> {
        let length = match self.window {
            Some(days) => WindowLength::try_from(days)?,
            None => WindowLength::default(),
        };
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse()?,
            None => RankingMode::default(),
        };
        Ok((length, mode))
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(dashboard_routes::dashboard_routes())
        .merge(ranking_routes::ranking_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_id::request_span))
                .layer(middleware::from_fn(request_id::request_id_middleware))
                .layer(middleware::from_fn(security_headers::security_headers_middleware)),
        )
}

fn init_tracing(json_logging: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dashboard_server=info,flow_ranker=info,flow_chart=info,krx_client=info,tower_http=info".into());

    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = DashboardConfig::from_env();
    init_tracing(config.json_logging);

    tracing::info!("Starting dashboard server with {:?}", config);
    flow_chart::init_fonts(&config.chart_font_path);

    let source: Arc<dyn MarketDataSource> =
        Arc::new(KrxClient::with_config(config.krx_base_url.clone(), config.krx_rate_limit));
    let state = AppState::new(source, &config.reference_ticker);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Dashboard server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
