use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{TradeDataset, TradeQuery};

pub mod eastmoney_client;
pub use eastmoney_client::EastMoneyClient;

/// Failure of a single remote call
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("no data returned for {symbol}")]
    NoData { symbol: String },

    #[error("malformed kline '{line}': {reason}")]
    MalformedRecord { line: String, reason: String },
}

/// Spaces consecutive requests at least `60s / requests_per_minute` apart
pub struct ApiRateLimiter {
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute > 0 {
            Some(Duration::from_millis(60_000 / requests_per_minute as u64))
        } else {
            None // Unpaced
        };

        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    pub async fn wait(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };

        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// The remote data source
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StockDataProvider: Send + Sync {
    /// Every listed A-share code, unique, in provider order
    async fn list_symbols(&self) -> Result<Vec<String>, FetchError>;

    /// Trading history of one code for the query's range, period and adjustment
    async fn fetch_trade_history(
        &self,
        symbol: &str,
        query: &TradeQuery,
    ) -> Result<TradeDataset, FetchError>;
}
