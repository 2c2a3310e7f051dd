use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{Config, TradeDataset, TradeQuery, TradeRecord};
use super::{ApiRateLimiter, FetchError, StockDataProvider};

/// Public token the EastMoney kline endpoint expects
const KLINE_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";
/// Public token the EastMoney list endpoint expects
const SPOT_UT: &str = "bd1d9ddb04089700cf9c27f6f49426c2";
/// Shanghai and Shenzhen main boards, ChiNext, STAR and BSE
const A_SHARE_MARKETS: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";
const KLINE_FIELDS1: &str = "f1,f2,f3,f4,f5,f6";
const KLINE_FIELDS2: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61";

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: Option<SpotData>,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    diff: Vec<SpotEntry>,
}

#[derive(Debug, Deserialize)]
struct SpotEntry {
    /// Security code
    f12: String,
}

/// EastMoney quote service client
pub struct EastMoneyClient {
    client: Client,
    kline_url: String,
    spot_url: String,
    page_size: usize,
    rate_limiter: ApiRateLimiter,
}

impl EastMoneyClient {
    /// Create a new EastMoney client
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("stock-saver/0.1")
            .build()?;

        Ok(Self {
            client,
            kline_url: config.kline_url.clone(),
            spot_url: config.spot_url.clone(),
            page_size: config.spot_page_size.max(1),
            rate_limiter: ApiRateLimiter::new(config.rate_limit_per_minute),
        })
    }

    /// `secid` parameter: Shanghai codes start with 6 and live in market 1
    pub fn secid(symbol: &str) -> String {
        let market = if symbol.starts_with('6') { 1 } else { 0 };
        format!("{}.{}", market, symbol)
    }

    /// Make a paced GET request and decode the JSON body
    async fn make_request<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        self.rate_limiter.wait().await;

        debug!("Making request to: {} {:?}", url, params);

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        debug!("API response received: {} bytes", body.len());
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn fetch_symbol_page(&self, page: usize) -> Result<SpotData, FetchError> {
        let params = [
            ("pn", page.to_string()),
            ("pz", self.page_size.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", SPOT_UT.to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f3".to_string()),
            ("fs", A_SHARE_MARKETS.to_string()),
            ("fields", "f12,f14".to_string()),
        ];

        let response: SpotResponse = self.make_request(&self.spot_url, &params).await?;
        response
            .data
            .ok_or_else(|| FetchError::Decode("symbol list response has no data".to_string()))
    }
}

/// Split one `klines` entry into a record
///
/// Layout: date, open, close, high, low, volume, amount, amplitude,
/// pct change, change, turnover.
pub fn parse_kline(line: &str) -> Result<TradeRecord, FetchError> {
    let malformed = |reason: String| FetchError::MalformedRecord {
        line: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < TradeRecord::COLUMNS.len() {
        return Err(malformed(format!(
            "expected {} fields, got {}",
            TradeRecord::COLUMNS.len(),
            fields.len()
        )));
    }

    let number = |index: usize| -> Result<f64, FetchError> {
        fields[index]
            .parse::<f64>()
            .map_err(|e| malformed(format!("{} '{}': {}", TradeRecord::COLUMNS[index], fields[index], e)))
    };

    let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
        .map_err(|e| malformed(format!("date '{}': {}", fields[0], e)))?;
    let volume = fields[5]
        .parse::<u64>()
        .map_err(|e| malformed(format!("volume '{}': {}", fields[5], e)))?;

    Ok(TradeRecord {
        date,
        open: number(1)?,
        close: number(2)?,
        high: number(3)?,
        low: number(4)?,
        volume,
        amount: number(6)?,
        amplitude: number(7)?,
        pct_change: number(8)?,
        change: number(9)?,
        turnover: number(10)?,
    })
}

#[async_trait::async_trait]
impl StockDataProvider for EastMoneyClient {
    /// Page through the A-share list until every reported code was seen
    async fn list_symbols(&self) -> Result<Vec<String>, FetchError> {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        let mut received = 0;
        let mut page = 1;

        loop {
            let data = self.fetch_symbol_page(page).await?;
            if data.diff.is_empty() {
                break;
            }

            received += data.diff.len();
            for entry in data.diff {
                if seen.insert(entry.f12.clone()) {
                    symbols.push(entry.f12);
                }
            }

            debug!("Symbol page {}: {}/{} codes received", page, received, data.total);
            if received >= data.total {
                break;
            }
            page += 1;
        }

        if received > symbols.len() {
            warn!("Dropped {} duplicate codes from the symbol list", received - symbols.len());
        }
        info!("📋 Retrieved {} A-share codes", symbols.len());
        Ok(symbols)
    }

    /// Get trading history for a symbol
    async fn fetch_trade_history(
        &self,
        symbol: &str,
        query: &TradeQuery,
    ) -> Result<TradeDataset, FetchError> {
        let params = [
            ("fields1", KLINE_FIELDS1.to_string()),
            ("fields2", KLINE_FIELDS2.to_string()),
            ("ut", KLINE_UT.to_string()),
            ("klt", query.period.provider_code().to_string()),
            ("fqt", query.adjust.provider_code().to_string()),
            ("secid", Self::secid(symbol)),
            ("beg", query.start_compact()),
            ("end", query.end_compact()),
        ];

        let response: KlineResponse = self.make_request(&self.kline_url, &params).await?;
        let data = response.data.ok_or_else(|| FetchError::NoData {
            symbol: symbol.to_string(),
        })?;

        let records = data
            .klines
            .iter()
            .map(|line| parse_kline(line))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Retrieved {} bars for {} from {} to {}",
               records.len(), symbol, query.start_date, query.end_date);
        Ok(TradeDataset::new(symbol, records))
    }
}
