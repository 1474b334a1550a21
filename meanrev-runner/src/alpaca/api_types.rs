//! Alpaca REST request and response types, and their conversion into core
//! domain records.
//!
//! Alpaca sends most numbers as strings. Conversion parses them and fails
//! with `JsonParse` on anything unusable, so a half-read record never
//! reaches reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AlpacaError;
use meanrev_core::domain::{
    AccountSnapshot, BrokerOrder, BrokerOrderStatus, BrokerPosition, LimitOrderRequest, OrderId,
    OrderSide, PositionSide, PricePoint,
};

// ── Symbols ──────────────────────────────────────────────────────────

/// Class shares are written `BRK-A` locally and `BRK.A` at Alpaca.
pub fn to_alpaca_symbol(ticker: &str) -> String {
    ticker.replace('-', ".")
}

pub fn from_alpaca_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

// ── Parsing helpers ──────────────────────────────────────────────────

fn parse_num(field: &str, raw: &str) -> Result<f64, AlpacaError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AlpacaError::JsonParse(format!("{field}: not a number: {raw:?}")))
}

fn parse_opt_num(field: &str, raw: Option<&str>) -> Result<Option<f64>, AlpacaError> {
    match raw {
        Some(s) if !s.trim().is_empty() => parse_num(field, s).map(Some),
        _ => Ok(None),
    }
}

fn parse_time(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, AlpacaError> {
    match raw {
        Some(s) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| AlpacaError::JsonParse(format!("{field}: {e}"))),
        _ => Ok(None),
    }
}

fn parse_side(raw: &str) -> Result<OrderSide, AlpacaError> {
    match raw {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(AlpacaError::JsonParse(format!("unknown order side {other:?}"))),
    }
}

// ── Orders ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AlpacaOrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    pub limit_price: String,
}

impl From<&LimitOrderRequest> for AlpacaOrderRequest {
    fn from(req: &LimitOrderRequest) -> Self {
        Self {
            symbol: to_alpaca_symbol(&req.ticker),
            qty: format!("{}", req.quantity),
            side: req.side.as_str().to_string(),
            order_type: "limit".to_string(),
            time_in_force: req.time_in_force.as_str().to_string(),
            limit_price: format!("{:.2}", req.limit_price),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub filled_qty: Option<String>,
    #[serde(default)]
    pub filled_avg_price: Option<String>,
    pub status: String,
    pub side: String,
    #[serde(default)]
    pub limit_price: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub filled_at: Option<String>,
}

impl AlpacaOrderResponse {
    pub fn into_broker_order(self) -> Result<BrokerOrder, AlpacaError> {
        Ok(BrokerOrder {
            order_id: OrderId::new(self.id),
            ticker: from_alpaca_symbol(&self.symbol),
            side: parse_side(&self.side)?,
            quantity: parse_opt_num("qty", self.qty.as_deref())?.unwrap_or(0.0),
            limit_price: parse_opt_num("limit_price", self.limit_price.as_deref())?,
            status: BrokerOrderStatus::parse(&self.status),
            submitted_at: parse_time("submitted_at", self.submitted_at.as_deref())?,
            filled_qty: parse_opt_num("filled_qty", self.filled_qty.as_deref())?.unwrap_or(0.0),
            filled_avg_price: parse_opt_num("filled_avg_price", self.filled_avg_price.as_deref())?,
            filled_at: parse_time("filled_at", self.filled_at.as_deref())?,
        })
    }
}

// ── Account ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccountResponse {
    pub cash: String,
    pub buying_power: String,
    #[serde(default)]
    pub daytrade_count: Option<i32>,
    #[serde(default)]
    pub pattern_day_trader: Option<bool>,
}

impl AlpacaAccountResponse {
    /// Buying power is the spendable figure, so it stands in for cash.
    pub fn into_snapshot(self) -> Result<AccountSnapshot, AlpacaError> {
        Ok(AccountSnapshot {
            cash: parse_num("buying_power", &self.buying_power)?,
            day_trade_count: self.daytrade_count.unwrap_or(0).max(0) as u32,
            is_pdt_restricted: self.pattern_day_trader.unwrap_or(false),
        })
    }
}

// ── Positions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    pub symbol: String,
    /// Signed: negative for shorts.
    pub qty: String,
    pub side: String,
    pub avg_entry_price: String,
}

impl AlpacaPositionResponse {
    pub fn into_broker_position(self) -> Result<BrokerPosition, AlpacaError> {
        let side = match self.side.as_str() {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            other => return Err(AlpacaError::JsonParse(format!("unknown position side {other:?}"))),
        };
        Ok(BrokerPosition {
            ticker: from_alpaca_symbol(&self.symbol),
            side,
            quantity: parse_num("qty", &self.qty)?.abs(),
            avg_entry_price: parse_num("avg_entry_price", &self.avg_entry_price)?,
        })
    }
}

// ── Market data ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBar {
    pub t: DateTime<Utc>,
    pub c: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBarsResponse {
    /// Null when the range holds no bars.
    #[serde(default)]
    pub bars: Option<Vec<AlpacaBar>>,
}

impl AlpacaBarsResponse {
    /// The last `window` closes, oldest first.
    pub fn into_history(self, window: usize) -> Vec<PricePoint> {
        let mut points: Vec<PricePoint> = self
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| PricePoint::new(b.t, b.c))
            .collect();
        points.sort_by_key(|p| p.timestamp);
        let skip = points.len().saturating_sub(window);
        points.split_off(skip)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaTrade {
    pub p: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaLatestTradeResponse {
    pub trade: AlpacaTrade,
}

/// Error body Alpaca returns alongside non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meanrev_core::domain::TimeInForce;

    #[test]
    fn order_response_converts() {
        let json = r#"{
            "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
            "client_order_id": "eb9e2aaa",
            "symbol": "BRK.A",
            "qty": "1",
            "filled_qty": "1",
            "filled_avg_price": "101.23",
            "status": "filled",
            "side": "buy",
            "type": "limit",
            "time_in_force": "day",
            "limit_price": "101.25",
            "submitted_at": "2024-06-10T14:00:01.123Z",
            "filled_at": "2024-06-10T14:00:05Z"
        }"#;
        let resp: AlpacaOrderResponse = serde_json::from_str(json).unwrap();
        let order = resp.into_broker_order().unwrap();
        assert_eq!(order.ticker, "BRK-A");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.status, BrokerOrderStatus::Filled);
        assert_eq!(order.filled_avg_price, Some(101.23));
        assert_eq!(order.limit_price, Some(101.25));
        assert!(order.submitted_at.is_some());
        assert!(order.filled_at.is_some());
    }

    #[test]
    fn open_order_has_no_fill_fields() {
        let json = r#"{
            "id": "abc", "symbol": "AAPL", "qty": "3", "filled_qty": "0",
            "filled_avg_price": null, "status": "new", "side": "sell",
            "limit_price": "190.10", "submitted_at": "2024-06-10T14:00:01Z",
            "filled_at": null
        }"#;
        let resp: AlpacaOrderResponse = serde_json::from_str(json).unwrap();
        let order = resp.into_broker_order().unwrap();
        assert_eq!(order.filled_qty, 0.0);
        assert_eq!(order.filled_avg_price, None);
        assert!(order.status.is_open());
    }

    #[test]
    fn garbage_number_is_malformed() {
        let json = r#"{"id": "x", "symbol": "AAPL", "qty": "lots", "status": "new", "side": "buy"}"#;
        let resp: AlpacaOrderResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.into_broker_order(), Err(AlpacaError::JsonParse(_))));
    }

    #[test]
    fn request_uses_string_fields() {
        let req = LimitOrderRequest::day("BRK-B", 2.0, 412.456, OrderSide::Sell);
        let body = serde_json::to_value(AlpacaOrderRequest::from(&req)).unwrap();
        assert_eq!(body["symbol"], "BRK.B");
        assert_eq!(body["qty"], "2");
        assert_eq!(body["type"], "limit");
        assert_eq!(body["time_in_force"], TimeInForce::Day.as_str());
        assert_eq!(body["limit_price"], "412.46");
    }

    #[test]
    fn short_position_quantity_is_absolute() {
        let json = r#"{"symbol": "TSLA", "qty": "-4", "side": "short", "avg_entry_price": "180.5",
                       "market_value": "-720", "current_price": "180", "unrealized_pl": "2"}"#;
        let resp: AlpacaPositionResponse = serde_json::from_str(json).unwrap();
        let pos = resp.into_broker_position().unwrap();
        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.quantity, 4.0);
    }

    #[test]
    fn account_uses_buying_power() {
        let json = r#"{"cash": "1000.00", "buying_power": "2000.00",
                       "daytrade_count": 3, "pattern_day_trader": true}"#;
        let resp: AlpacaAccountResponse = serde_json::from_str(json).unwrap();
        let snap = resp.into_snapshot().unwrap();
        assert_eq!(snap.cash, 2000.0);
        assert_eq!(snap.day_trade_count, 3);
        assert!(snap.is_pdt_restricted);
    }

    #[test]
    fn bars_trimmed_to_window() {
        let json = r#"{"bars": [
            {"t": "2024-06-05T04:00:00Z", "c": 3.0},
            {"t": "2024-06-03T04:00:00Z", "c": 1.0},
            {"t": "2024-06-04T04:00:00Z", "c": 2.0}
        ], "symbol": "AAPL", "next_page_token": null}"#;
        let resp: AlpacaBarsResponse = serde_json::from_str(json).unwrap();
        let closes: Vec<f64> = resp.into_history(2).iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn null_bars_is_empty_history() {
        let resp: AlpacaBarsResponse = serde_json::from_str(r#"{"bars": null}"#).unwrap();
        assert!(resp.into_history(30).is_empty());
    }
}
