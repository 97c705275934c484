use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `GET /v2/clock` response.
#[derive(Debug, Clone, Deserialize)]
pub struct Clock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

/// `GET /v2/account` response, trimmed to the fields this system reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub status: String,
    pub cash: Decimal,
    pub portfolio_value: Decimal,
}

/// `GET /v2/positions/{symbol}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: Decimal,
    pub side: String,
    pub avg_entry_price: Decimal,
    pub market_value: Decimal,
}

/// `GET|POST /v2/orders...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_order_id: String,
    pub status: String,
    pub symbol: String,
    pub side: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl From<gb_types::orders::Side> for OrderSide {
    fn from(side: gb_types::orders::Side) -> Self {
        match side {
            gb_types::orders::Side::Buy => OrderSide::Buy,
            gb_types::orders::Side::Sell => OrderSide::Sell,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TakeProfit {
    pub limit_price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopLoss {
    pub stop_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
}

/// `POST /v2/orders` request body, field names matching the wire format
/// exactly (`qty`, `time_in_force`, `client_order_id`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
    pub client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLoss>,
}

impl OrderRequest {
    pub fn market_day(symbol: impl Into<String>, side: OrderSide, qty: Decimal, client_order_id: String) -> Self {
        Self {
            symbol: symbol.into(),
            qty: qty.to_string(),
            side,
            order_type: "market",
            time_in_force: "day",
            client_order_id,
            order_class: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_bracket(mut self, take_profit_price: Decimal, stop_loss_price: Decimal) -> Self {
        self.order_class = Some("bracket");
        self.take_profit = Some(TakeProfit {
            limit_price: format!("{:.2}", take_profit_price),
        });
        self.stop_loss = Some(StopLoss {
            stop_price: format!("{:.2}", stop_loss_price),
            limit_price: None,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bracket_order_serializes_with_two_decimal_prices() {
        let req = OrderRequest::market_day("AAPL", OrderSide::Buy, dec!(10), "agent-1-123".to_string())
            .with_bracket(dec!(106), dec!(96));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["order_class"], "bracket");
        assert_eq!(json["take_profit"]["limit_price"], "106.00");
        assert_eq!(json["stop_loss"]["stop_price"], "96.00");
        assert_eq!(json["qty"], "10");
        assert_eq!(json["type"], "market");
        assert_eq!(json["time_in_force"], "day");
    }

    #[test]
    fn plain_market_order_omits_bracket_fields() {
        let req = OrderRequest::market_day("AAPL", OrderSide::Sell, dec!(5), "agent-1-124".to_string());
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("order_class").is_none());
        assert!(json.get("take_profit").is_none());
    }
}
