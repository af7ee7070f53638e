use super::{CandleRequest, CandleSource};
use crate::error::DataError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Binance spot kline endpoint path.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#klinecandlestick-data>
pub const KLINES_PATH: &str = "/api/v3/klines";

/// Full kline endpoint url for `host`.
pub fn klines_url(host: &str) -> String {
    format!("https://{host}{KLINES_PATH}")
}

/// [`CandleSource`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpCandleSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCandleSource {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CandleSource for HttpCandleSource {
    async fn fetch_raw(&self, host: &str, request: &CandleRequest) -> Result<Value, DataError> {
        let url = klines_url(host);
        let response = self
            .client
            .get(&url)
            .query(&request.query())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Binance error bodies are small JSON objects, eg/ {"code":-1121,"msg":"Invalid symbol."}
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::NetworkFailure(format!(
                "{host}: HTTP {status}: {body}"
            )));
        }

        let body = response.text().await?;
        let payload = decode_payload(&body)?;
        debug!(
            %url,
            symbol = %request.symbol,
            interval = %request.interval,
            records = payload.as_array().map(Vec::len).unwrap_or_default(),
            "received kline payload"
        );

        Ok(payload)
    }
}

/// Parse a successful response body; anything but JSON is a payload mismatch.
fn decode_payload(body: &str) -> Result<Value, DataError> {
    serde_json::from_str(body)
        .map_err(|error| DataError::schema(0, format!("response body is not JSON: {error}")))
}
