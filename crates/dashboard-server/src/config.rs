use std::net::SocketAddr;
use std::path::PathBuf;

use flow_ranker::REFERENCE_TICKER;

/// Runtime settings, read once from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub bind_addr: SocketAddr,
    pub krx_base_url: String,
    pub krx_rate_limit: usize,
    pub reference_ticker: String,
    pub chart_font_path: PathBuf,
    pub json_logging: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            krx_base_url: krx_client::BASE_URL.to_string(),
            krx_rate_limit: 120,
            reference_ticker: REFERENCE_TICKER.to_string(),
            chart_font_path: PathBuf::from("NanumGothic.ttf"),
            json_logging: false,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid BIND_ADDR {:?}, using {}", raw, defaults.bind_addr);
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        Self {
            bind_addr,
            krx_base_url: lookup("KRX_BASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.krx_base_url),
            krx_rate_limit: lookup("KRX_RATE_LIMIT")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.krx_rate_limit),
            reference_ticker: lookup("REFERENCE_TICKER")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.reference_ticker),
            chart_font_path: lookup("CHART_FONT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.chart_font_path),
            json_logging: lookup("RUST_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}
