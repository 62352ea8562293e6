use async_trait::async_trait;
use dashmap::DashMap;
use flow_core::{
    FlowError, InvestorClass, Market, MarketCap, MarketDataSource, PriceBar, RawFrame, RawRow,
    TradingDay,
};
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const BASE_URL: &str = "http://data.krx.co.kr";
const JSON_ENDPOINT: &str = "/comm/bldAttendant/getJsonData.cmd";
const REFERER: &str = "http://data.krx.co.kr/contents/MDC/MDI/mdiLoader";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) krx-flow-dashboard";

/// Report ids ("bld") of the KRX statistics screens we read.
mod bld {
    pub const FINDER: &str = "dbms/comm/finder/finder_stkisu";
    pub const DAILY_PRICES: &str = "dbms/MDC/STAT/standard/MDCSTAT01701";
    pub const MARKET_CAP: &str = "dbms/MDC/STAT/standard/MDCSTAT01501";
    pub const NET_PURCHASES: &str = "dbms/MDC/STAT/standard/MDCSTAT02401";
    pub const INVESTOR_BY_DATE: &str = "dbms/MDC/STAT/standard/MDCSTAT02203";
}

/// Keys under which the service returns its row array, depending on the screen.
const ROW_BLOCK_KEYS: [&str; 3] = ["output", "OutBlock_1", "block1"];

/// Positional investor columns of the by-date screen and the names they are exposed under.
const INVESTOR_COLUMN_NAMES: [(&str, &str); 5] = [
    ("TRDVAL1", "기관합계"),
    ("TRDVAL2", "기타법인"),
    ("TRDVAL3", "개인"),
    ("TRDVAL4", "외국인합계"),
    ("TRDVAL_TOT", "전체"),
];

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            let oldest = match ts.front() {
                Some(&oldest) if ts.len() >= self.max_requests => oldest,
                _ => {
                    ts.push_back(now);
                    return;
                }
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for KRX slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Listing metadata from the stock finder.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub ticker: String,
    pub isin: String,
    pub name: String,
}

/// Client for the KRX market data service (data.krx.co.kr).
#[derive(Clone)]
pub struct KrxClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    listings: Arc<DashMap<String, Listing>>,
}

impl KrxClient {
    /// Client against the public endpoint. `KRX_RATE_LIMIT` caps requests per minute (default 120).
    pub fn new() -> Self {
        let rate_limit: usize = std::env::var("KRX_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        Self::with_config(BASE_URL.to_string(), rate_limit)
    }

    pub fn with_config(base_url: String, rate_limit_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit_per_minute, Duration::from_secs(60)),
            listings: Arc::new(DashMap::new()),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FlowError> {
        let request = builder.build().map_err(|e| FlowError::Api(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| FlowError::Api("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| FlowError::Api(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("KRX 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(FlowError::Api("Rate limited by KRX after 3 retries".to_string()))
    }

    /// POST one statistics screen query and return its rows.
    async fn fetch_rows(&self, bld: &str, params: &[(&str, String)]) -> Result<Vec<Map<String, Value>>, FlowError> {
        let mut form: Vec<(&str, &str)> = vec![("bld", bld), ("locale", "ko_KR")];
        form.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        let url = format!("{}{}", self.base_url, JSON_ENDPOINT);
        let response = self
            .send_request(self.client.post(&url).header("Referer", REFERER).form(&form))
            .await?;

        if !response.status().is_success() {
            return Err(FlowError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FlowError::Schema(format!("{} returned non-JSON body: {}", bld, e)))?;

        extract_rows(body)
    }

    /// Resolve a ticker's ISIN and name, caching the answer.
    pub async fn listing(&self, ticker: &str) -> Result<Listing, FlowError> {
        if let Some(cached) = self.listings.get(ticker) {
            return Ok(cached.clone());
        }

        let rows = self
            .fetch_rows(
                bld::FINDER,
                &[("mktsel", "ALL".to_string()), ("searchText", ticker.to_string())],
            )
            .await?;

        let listing = find_listing(&rows, ticker)
            .ok_or_else(|| FlowError::Schema(format!("ticker {} not found in KRX finder", ticker)))?;

        self.listings.insert(ticker.to_string(), listing.clone());
        Ok(listing)
    }
}

impl Default for KrxClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for KrxClient {
    async fn daily_prices(
        &self,
        ticker: &str,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<Vec<PriceBar>, FlowError> {
        let listing = self.listing(ticker).await?;
        let rows = self
            .fetch_rows(
                bld::DAILY_PRICES,
                &[
                    ("isuCd", listing.isin),
                    ("strtDd", start.key()),
                    ("endDd", end.key()),
                    ("adjStkPrc", "2".to_string()),
                ],
            )
            .await?;

        let bars = parse_price_rows(&rows);
        tracing::debug!("KRX daily prices {} {}..{}: {} bars", ticker, start, end, bars.len());
        Ok(bars)
    }

    async fn investor_trading_value(
        &self,
        ticker: &str,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<RawFrame, FlowError> {
        let listing = self.listing(ticker).await?;
        let rows = self
            .fetch_rows(
                bld::INVESTOR_BY_DATE,
                &[
                    ("isuCd", listing.isin),
                    ("strtDd", start.key()),
                    ("endDd", end.key()),
                    ("inqTpCd", "2".to_string()),
                    ("trdVolVal", "2".to_string()),
                    ("askBid", "3".to_string()),
                ],
            )
            .await?;

        let mut frame = rows_to_frame(rename_investor_columns(rows), "TRD_DD");
        for row in &mut frame.rows {
            if let Ok(day) = row.key.parse::<TradingDay>() {
                row.key = day.key();
            }
        }
        frame.rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(frame)
    }

    async fn net_purchases(
        &self,
        market: Market,
        investor: InvestorClass,
        start: TradingDay,
        end: TradingDay,
    ) -> Result<RawFrame, FlowError> {
        let rows = self
            .fetch_rows(
                bld::NET_PURCHASES,
                &[
                    ("mktId", market.krx_id().to_string()),
                    ("invstTpCd", investor.krx_code().to_string()),
                    ("strtDd", start.key()),
                    ("endDd", end.key()),
                ],
            )
            .await?;

        let frame = rows_to_frame(rows, "ISU_SRT_CD");
        tracing::debug!(
            "KRX net purchases {:?} {:?} {}..{}: {} rows",
            market,
            investor,
            start,
            end,
            frame.rows.len()
        );
        Ok(frame)
    }

    async fn market_caps(&self, market: Market, date: TradingDay) -> Result<Vec<MarketCap>, FlowError> {
        let rows = self
            .fetch_rows(
                bld::MARKET_CAP,
                &[("mktId", market.krx_id().to_string()), ("trdDd", date.key())],
            )
            .await?;

        Ok(parse_market_cap_rows(&rows))
    }

    async fn ticker_name(&self, ticker: &str) -> Result<String, FlowError> {
        Ok(self.listing(ticker).await?.name)
    }
}

/// Pull the row array out of a response body.
pub fn extract_rows(body: Value) -> Result<Vec<Map<String, Value>>, FlowError> {
    let Value::Object(mut obj) = body else {
        return Err(FlowError::Schema("expected a JSON object".to_string()));
    };

    let block = ROW_BLOCK_KEYS
        .iter()
        .find_map(|k| obj.remove(*k))
        .ok_or_else(|| FlowError::Schema("response has no row block".to_string()))?;

    match block {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        _ => Err(FlowError::Schema("row block is not an array".to_string())),
    }
}

/// Build a frame keyed by `key_column`; rows without the key are skipped.
/// Columns keep first-seen order across all rows.
pub fn rows_to_frame(rows: Vec<Map<String, Value>>, key_column: &str) -> RawFrame {
    let mut frame = RawFrame::default();

    for fields in rows {
        for name in fields.keys() {
            if !frame.has_column(name) {
                frame.columns.push(name.clone());
            }
        }

        let key = match fields.get(key_column).and_then(|v| v.as_str()) {
            Some(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => continue,
        };

        frame.rows.push(RawRow { key, fields });
    }

    frame
}

fn rename_investor_columns(rows: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    rows.into_iter()
        .map(|fields| {
            fields
                .into_iter()
                .map(|(k, v)| {
                    let name = INVESTOR_COLUMN_NAMES
                        .iter()
                        .find(|(raw, _)| *raw == k)
                        .map(|(_, renamed)| renamed.to_string())
                        .unwrap_or(k);
                    (name, v)
                })
                .collect()
        })
        .collect()
}

/// Parse daily price rows, oldest first. Rows without a date or close are dropped.
pub fn parse_price_rows(rows: &[Map<String, Value>]) -> Vec<PriceBar> {
    let num = |row: &Map<String, Value>, key: &str| row.get(key).and_then(flow_core::parse_amount);

    let mut bars: Vec<PriceBar> = rows
        .iter()
        .filter_map(|row| {
            let date = row.get("TRD_DD")?.as_str()?.parse::<TradingDay>().ok()?;
            let close = num(row, "TDD_CLSPRC")?;
            Some(PriceBar {
                date,
                open: num(row, "TDD_OPNPRC").unwrap_or(close),
                high: num(row, "TDD_HGPRC").unwrap_or(close),
                low: num(row, "TDD_LWPRC").unwrap_or(close),
                close,
                volume: num(row, "ACC_TRDVOL").unwrap_or(0.0),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

pub fn parse_market_cap_rows(rows: &[Map<String, Value>]) -> Vec<MarketCap> {
    rows.iter()
        .filter_map(|row| {
            let ticker = row.get("ISU_SRT_CD")?.as_str()?.trim().to_string();
            let market_cap = row.get("MKTCAP").and_then(flow_core::parse_amount)?;
            let name = row
                .get("ISU_ABBRV")
                .and_then(|v| v.as_str())
                .unwrap_or(&ticker)
                .trim()
                .to_string();
            Some(MarketCap { ticker, name, market_cap })
        })
        .collect()
}

fn find_listing(rows: &[Map<String, Value>], ticker: &str) -> Option<Listing> {
    rows.iter().find_map(|row| {
        let short = row.get("short_code")?.as_str()?.trim();
        if short != ticker {
            return None;
        }
        Some(Listing {
            ticker: short.to_string(),
            isin: row.get("full_code")?.as_str()?.trim().to_string(),
            name: row
                .get("codeName")
                .and_then(|v| v.as_str())
                .unwrap_or(short)
                .trim()
                .to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rows(body: Value) -> Vec<Map<String, Value>> {
        extract_rows(body).unwrap()
    }

    fn day(s: &str) -> TradingDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_rows_accepts_known_blocks() {
        assert_eq!(rows(json!({"output": [{"a": 1}]})).len(), 1);
        assert_eq!(rows(json!({"OutBlock_1": [{"a": 1}, {"b": 2}]})).len(), 2);
        assert!(extract_rows(json!({"unexpected": []})).is_err());
        assert!(extract_rows(json!([1, 2])).is_err());
    }

    #[test]
    fn test_parse_price_rows_sorts_oldest_first() {
        let bars = parse_price_rows(&rows(json!({"output": [
            {"TRD_DD": "2024/03/08", "TDD_OPNPRC": "73,000", "TDD_HGPRC": "74,000",
             "TDD_LWPRC": "72,500", "TDD_CLSPRC": "73,600", "ACC_TRDVOL": "12,345,678"},
            {"TRD_DD": "2024/03/07", "TDD_CLSPRC": "72,900"},
            {"TRD_DD": "2024/03/06", "TDD_CLSPRC": "-"}
        ]})));

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, day("20240307"));
        assert_eq!(bars[0].open, 72_900.0);
        assert_eq!(bars[1].close, 73_600.0);
        assert_eq!(bars[1].volume, 12_345_678.0);
    }

    #[test]
    fn test_rows_to_frame_keys_by_ticker() {
        let frame = rows_to_frame(
            rows(json!({"output": [
                {"ISU_SRT_CD": "005930", "ISU_NM": "삼성전자", "NETBID_TRDVAL": "1,000"},
                {"ISU_NM": "no key", "NETBID_TRDVAL": "5"},
                {"ISU_SRT_CD": "000660", "ISU_NM": "SK하이닉스", "NETBID_TRDVAL": "-20"}
            ]})),
            "ISU_SRT_CD",
        );

        assert_eq!(frame.rows.len(), 2);
        assert_eq!(frame.rows[1].key, "000660");
        assert!(frame.has_column("NETBID_TRDVAL"));
        assert_eq!(frame.rows[1].number("NETBID_TRDVAL"), Some(-20.0));
    }

    #[test]
    fn test_investor_columns_are_renamed() {
        let renamed = rename_investor_columns(rows(json!({"output": [
            {"TRD_DD": "2024/03/08", "TRDVAL1": "10", "TRDVAL4": "-3", "TRDVAL_TOT": "0"}
        ]})));
        assert!(renamed[0].contains_key("기관합계"));
        assert!(renamed[0].contains_key("외국인합계"));
        assert!(renamed[0].contains_key("TRD_DD"));
        assert!(!renamed[0].contains_key("TRDVAL1"));
    }

    #[tokio::test]
    async fn test_market_caps_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(JSON_ENDPOINT))
            .and(body_string_contains("MDCSTAT01501"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "OutBlock_1": [
                    {"ISU_SRT_CD": "005930", "ISU_ABBRV": "삼성전자", "MKTCAP": "439,000,000,000,000"},
                    {"ISU_SRT_CD": "000660", "ISU_ABBRV": "SK하이닉스", "MKTCAP": "-"}
                ],
                "CURRENT_DATETIME": "2024.03.08 PM 06:00:00"
            })))
            .mount(&server)
            .await;

        let client = KrxClient::with_config(server.uri(), 1000);
        let caps = client.market_caps(Market::Kospi, day("20240308")).await.unwrap();

        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].name, "삼성전자");
        assert_eq!(caps[0].market_cap, 439_000_000_000_000.0);
    }

    #[tokio::test]
    async fn test_listing_is_cached_after_first_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(JSON_ENDPOINT))
            .and(body_string_contains("finder_stkisu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "block1": [
                    {"full_code": "KR7005930003", "short_code": "005930", "codeName": "삼성전자"},
                    {"full_code": "KR7005931001", "short_code": "005935", "codeName": "삼성전자우"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = KrxClient::with_config(server.uri(), 1000);
        assert_eq!(client.ticker_name("005930").await.unwrap(), "삼성전자");
        let listing = client.listing("005930").await.unwrap();
        assert_eq!(listing.isin, "KR7005930003");
    }

    #[tokio::test]
    async fn test_http_error_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = KrxClient::with_config(server.uri(), 1000);
        let err = client
            .net_purchases(Market::Kospi, InvestorClass::Foreign, day("20240301"), day("20240308"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Api(_)));
    }
}
