use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Bar frequency requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// EastMoney `klt` code
    pub fn provider_code(&self) -> &'static str {
        match self {
            Period::Daily => "101",
            Period::Weekly => "102",
            Period::Monthly => "103",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(anyhow!("Unknown period '{}', expected daily, weekly or monthly", other)),
        }
    }
}

/// Price adjustment applied by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjust {
    /// Raw, unadjusted prices
    None,
    /// Forward-adjusted (前复权)
    Qfq,
    /// Backward-adjusted (后复权)
    #[default]
    Hfq,
}

impl Adjust {
    /// EastMoney `fqt` code
    pub fn provider_code(&self) -> &'static str {
        match self {
            Adjust::None => "0",
            Adjust::Qfq => "1",
            Adjust::Hfq => "2",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Adjust::None => "none",
            Adjust::Qfq => "qfq",
            Adjust::Hfq => "hfq",
        }
    }
}

impl fmt::Display for Adjust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Adjust {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Adjust::None),
            "qfq" => Ok(Adjust::Qfq),
            "hfq" => Ok(Adjust::Hfq),
            other => Err(anyhow!("Unknown adjust mode '{}', expected none, qfq or hfq", other)),
        }
    }
}

/// Text encoding of saved CSV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    /// Simplified Chinese legacy encoding, what Excel on a Chinese locale expects
    #[default]
    Gbk,
    Utf8,
}

impl OutputEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputEncoding::Gbk => "gbk",
            OutputEncoding::Utf8 => "utf-8",
        }
    }

    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        match self {
            OutputEncoding::Gbk => encoding_rs::GBK,
            OutputEncoding::Utf8 => encoding_rs::UTF_8,
        }
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gbk" => Ok(OutputEncoding::Gbk),
            "utf8" | "utf-8" => Ok(OutputEncoding::Utf8),
            other => Err(anyhow!("Unknown encoding '{}', expected gbk or utf-8", other)),
        }
    }
}

/// Parameters shared by every request in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period: Period,
    pub adjust: Adjust,
}

impl TradeQuery {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, period: Period, adjust: Adjust) -> Result<Self> {
        if start_date > end_date {
            return Err(anyhow!(
                "Start date ({}) must not be later than end date ({})",
                start_date, end_date
            ));
        }

        Ok(Self { start_date, end_date, period, adjust })
    }

    /// Start date as the provider expects it (YYYYMMDD)
    pub fn start_compact(&self) -> String {
        self.start_date.format("%Y%m%d").to_string()
    }

    /// End date as the provider expects it (YYYYMMDD)
    pub fn end_compact(&self) -> String {
        self.end_date.format("%Y%m%d").to_string()
    }
}

/// Which identifiers a batch should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every listed A-share, resolved from the provider at run time
    All,
    /// Caller-supplied codes, processed in the given order
    Symbols(Vec<String>),
}

impl Target {
    pub fn symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Target::Symbols(symbols.into_iter().map(Into::into).collect())
    }
}

/// One trading bar as returned by the kline endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "日期")]
    pub date: NaiveDate,
    #[serde(rename = "开盘")]
    pub open: f64,
    #[serde(rename = "收盘")]
    pub close: f64,
    #[serde(rename = "最高")]
    pub high: f64,
    #[serde(rename = "最低")]
    pub low: f64,
    #[serde(rename = "成交量")]
    pub volume: u64,
    #[serde(rename = "成交额")]
    pub amount: f64,
    #[serde(rename = "振幅")]
    pub amplitude: f64,
    #[serde(rename = "涨跌幅")]
    pub pct_change: f64,
    #[serde(rename = "涨跌额")]
    pub change: f64,
    #[serde(rename = "换手率")]
    pub turnover: f64,
}

impl TradeRecord {
    /// CSV header, in field order
    pub const COLUMNS: [&'static str; 11] = [
        "日期", "开盘", "收盘", "最高", "最低", "成交量", "成交额", "振幅", "涨跌幅", "涨跌额", "换手率",
    ];
}

/// Everything fetched for a single identifier
#[derive(Debug, Clone, PartialEq)]
pub struct TradeDataset {
    pub symbol: String,
    pub records: Vec<TradeRecord>,
}

impl TradeDataset {
    pub fn new(symbol: impl Into<String>, records: Vec<TradeRecord>) -> Self {
        Self { symbol: symbol.into(), records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub const DEFAULT_KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
pub const DEFAULT_SPOT_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub kline_url: String,
    pub spot_url: String,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub spot_page_size: usize,
    pub output_encoding: OutputEncoding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            kline_url: DEFAULT_KLINE_URL.to_string(),
            spot_url: DEFAULT_SPOT_URL.to_string(),
            rate_limit_per_minute: 120,
            request_timeout_secs: 30,
            spot_page_size: 100,
            output_encoding: OutputEncoding::Gbk,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();

        let config = Config {
            data_root: std::env::var("STOCK_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            kline_url: std::env::var("EASTMONEY_KLINE_URL")
                .unwrap_or(defaults.kline_url),
            spot_url: std::env::var("EASTMONEY_SPOT_URL")
                .unwrap_or(defaults.spot_url),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            spot_page_size: std::env::var("SPOT_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            output_encoding: match std::env::var("OUTPUT_ENCODING") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.output_encoding,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.kline_url)
            .map_err(|e| anyhow!("EASTMONEY_KLINE_URL is not a valid URL ({}): {}", self.kline_url, e))?;
        Url::parse(&self.spot_url)
            .map_err(|e| anyhow!("EASTMONEY_SPOT_URL is not a valid URL ({}): {}", self.spot_url, e))?;

        if self.spot_page_size == 0 {
            return Err(anyhow!("SPOT_PAGE_SIZE must be at least 1"));
        }

        // reqwest treats a zero timeout as "expire immediately"
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("REQUEST_TIMEOUT_SECS must be at least 1"));
        }

        Ok(())
    }
}
