//! Alpaca REST adapter: implements the core's `Broker` and `MarketData`
//! ports over blocking HTTP.
//!
//! - Trading API: account, positions, open orders, submit, status, cancel
//! - Data API: daily bars and the latest trade
//!
//! Every call is a single attempt with a 30 second timeout. Failures map
//! onto the port error kinds and are never retried here; the next daily run
//! reconciles whatever a failed call left behind.

pub mod api_types;
pub mod error;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use meanrev_core::domain::{
    AccountSnapshot, BrokerOrder, BrokerPosition, LimitOrderRequest, OrderId, PricePoint, Ticker,
};
use meanrev_core::ports::{Broker, BrokerError, MarketData, MarketDataError};

use crate::config::Credentials;
use api_types::{
    to_alpaca_symbol, AlpacaAccountResponse, AlpacaBarsResponse, AlpacaErrorResponse,
    AlpacaLatestTradeResponse, AlpacaOrderRequest, AlpacaOrderResponse, AlpacaPositionResponse,
};
pub use error::AlpacaError;
use error::into_market_data_error;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ORDER_LIST_LIMIT: &str = "500";

/// Base URLs for the trading and market data APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlpacaEndpoints {
    pub trading: String,
    pub data: String,
}

impl AlpacaEndpoints {
    pub fn paper() -> Self {
        Self {
            trading: "https://paper-api.alpaca.markets".into(),
            data: "https://data.alpaca.markets".into(),
        }
    }

    pub fn live() -> Self {
        Self {
            trading: "https://api.alpaca.markets".into(),
            data: "https://data.alpaca.markets".into(),
        }
    }

    pub fn for_mode(paper: bool) -> Self {
        if paper {
            Self::paper()
        } else {
            Self::live()
        }
    }
}

/// Calendar-day span requested for a history window: `window + buffer`
/// days ending the day before `as_of`, so today's partial bar never enters.
pub fn history_range(as_of: DateTime<Utc>, window: usize, buffer_days: i64) -> (NaiveDate, NaiveDate) {
    let end = as_of.date_naive() - ChronoDuration::days(1);
    (end - ChronoDuration::days(window as i64 + buffer_days), end)
}

pub struct AlpacaClient {
    client: Client,
    credentials: Credentials,
    endpoints: AlpacaEndpoints,
    history_buffer_days: i64,
}

impl AlpacaClient {
    pub fn new(
        credentials: Credentials,
        endpoints: AlpacaEndpoints,
        history_buffer_days: i64,
    ) -> Result<Self, AlpacaError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AlpacaError::Client(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
            endpoints,
            history_buffer_days,
        })
    }

    fn trading_url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoints.trading)
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoints.data)
    }

    /// Attach credentials, send once, and turn non-success statuses into
    /// errors. The error body's `message` is used when it parses.
    fn execute(&self, request: RequestBuilder) -> Result<Response, AlpacaError> {
        let response = request
            .header(KEY_HEADER, self.credentials.key_id.as_str())
            .header(SECRET_HEADER, self.credentials.secret_key.as_str())
            .send()
            .map_err(|e| AlpacaError::from_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<AlpacaErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        tracing::debug!(status = status.as_u16(), %message, "alpaca request failed");
        Err(AlpacaError::from_status(status, message))
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AlpacaError> {
        let text = response.text().map_err(|e| AlpacaError::from_transport(&e))?;
        serde_json::from_str(&text).map_err(|e| AlpacaError::JsonParse(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AlpacaError> {
        Self::decode(self.execute(request)?)
    }
}

impl Broker for AlpacaClient {
    fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        let resp: AlpacaAccountResponse = self.get_json(self.client.get(self.trading_url("/v2/account")))?;
        Ok(resp.into_snapshot()?)
    }

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let resp: Vec<AlpacaPositionResponse> =
            self.get_json(self.client.get(self.trading_url("/v2/positions")))?;
        resp.into_iter()
            .map(|p| p.into_broker_position().map_err(BrokerError::from))
            .collect()
    }

    fn get_open_orders(&self, tickers: Option<&[Ticker]>) -> Result<Vec<BrokerOrder>, BrokerError> {
        let mut request = self
            .client
            .get(self.trading_url("/v2/orders"))
            .query(&[("status", "open"), ("limit", ORDER_LIST_LIMIT)]);
        if let Some(tickers) = tickers.filter(|t| !t.is_empty()) {
            let symbols: Vec<String> = tickers.iter().map(|t| to_alpaca_symbol(t)).collect();
            request = request.query(&[("symbols", symbols.join(","))]);
        }
        let resp: Vec<AlpacaOrderResponse> = self.get_json(request)?;
        resp.into_iter()
            .map(|o| o.into_broker_order().map_err(BrokerError::from))
            .collect()
    }

    fn submit_limit_order(&self, request: &LimitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        let body = AlpacaOrderRequest::from(request);
        tracing::debug!(
            ticker = %request.ticker,
            side = request.side.as_str(),
            qty = request.quantity,
            limit = request.limit_price,
            "submitting limit order"
        );
        let resp: AlpacaOrderResponse =
            self.get_json(self.client.post(self.trading_url("/v2/orders")).json(&body))?;
        Ok(resp.into_broker_order()?)
    }

    fn get_order_status(&self, order_id: &OrderId) -> Result<BrokerOrder, BrokerError> {
        let url = self.trading_url(&format!("/v2/orders/{order_id}"));
        let resp: AlpacaOrderResponse = self.get_json(self.client.get(url))?;
        Ok(resp.into_broker_order()?)
    }

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), BrokerError> {
        let url = self.trading_url(&format!("/v2/orders/{order_id}"));
        self.execute(self.client.delete(url))?;
        Ok(())
    }
}

impl MarketData for AlpacaClient {
    fn get_history(
        &self,
        ticker: &str,
        window: usize,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let (start, end) = history_range(as_of, window, self.history_buffer_days);
        let url = self.data_url(&format!("/v2/stocks/{}/bars", to_alpaca_symbol(ticker)));
        let request = self.client.get(url).query(&[
            ("timeframe", "1Day".to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("limit", "10000".to_string()),
        ]);
        let resp: AlpacaBarsResponse = self
            .get_json(request)
            .map_err(|e| into_market_data_error(e, ticker))?;

        let mut history = resp.into_history(window);
        history.retain(|p| p.timestamp < as_of);
        Ok(history)
    }

    fn get_latest_price(&self, ticker: &str) -> Result<f64, MarketDataError> {
        let url = self.data_url(&format!("/v2/stocks/{}/trades/latest", to_alpaca_symbol(ticker)));
        let resp: AlpacaLatestTradeResponse = self
            .get_json(self.client.get(url))
            .map_err(|e| into_market_data_error(e, ticker))?;
        Ok(resp.trade.p)
    }
}
