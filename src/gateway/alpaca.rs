//! # gateway::alpaca
//!
//! **Alpaca REST client** — brokerage, market data and asset universe in one
//! `reqwest::Client` (connection pooling, shared auth headers).
//!
//! ## Endpoints used
//!
//! | Call              | Method / Path                                      |
//! |-------------------|----------------------------------------------------|
//! | account           | `GET    /v2/account`                               |
//! | positions         | `GET    /v2/positions`                             |
//! | clock             | `GET    /v2/clock`                                 |
//! | list assets       | `GET    /v2/assets?status=…&asset_class=…`         |
//! | place order       | `POST   /v2/orders`                                |
//! | cancel (symbol)   | `GET    /v2/orders?status=open&symbols=…` + `DELETE /v2/orders/{id}` |
//! | close position    | `DELETE /v2/positions/{symbol}`                    |
//! | stock quote       | `GET    {data}/v2/stocks/{symbol}/quotes/latest`   |
//! | crypto quote      | `GET    {data}/v1beta3/crypto/us/latest/quotes?symbols=BTC/USD` |
//!
//! Reads and cancels are retried through [`RetryPolicy`]; order submission
//! and position close are sent exactly once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::error::{Result, TraderError};
use crate::gateway::retry::RetryPolicy;
use crate::gateway::{Brokerage, QuoteSource, UniverseSource};
use crate::models::{Account, Asset, AssetFilter, Clock, OrderAck, OrderRequest, Position, Quote};

/// Paper-trading endpoint.
pub const ALPACA_PAPER_URL: &str = "https://paper-api.alpaca.markets";
pub const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    pub base_url: String,
    pub data_url: String,
    pub key_id: String,
    pub secret_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

// ─── Raw Wire Types ───────────────────────────────────────────────────────────

/// Alpaca sends every decimal as a string.
#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol: String,
    qty: String,
    avg_entry_price: String,
    current_price: String,
}

impl TryFrom<RawPosition> for Position {
    type Error = TraderError;

    fn try_from(raw: RawPosition) -> Result<Self> {
        Ok(Position::new(
            raw.symbol,
            parse_decimal("qty", &raw.qty)?,
            parse_decimal("avg_entry_price", &raw.avg_entry_price)?,
            parse_decimal("current_price", &raw.current_price)?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    buying_power: String,
    cash: String,
    #[serde(default)]
    portfolio_value: Option<String>,
    #[serde(default)]
    equity: Option<String>,
}

impl TryFrom<RawAccount> for Account {
    type Error = TraderError;

    fn try_from(raw: RawAccount) -> Result<Self> {
        let value = raw
            .portfolio_value
            .or(raw.equity)
            .ok_or_else(|| TraderError::Malformed("account has neither portfolio_value nor equity".into()))?;

        Ok(Account {
            buying_power: parse_decimal("buying_power", &raw.buying_power)?,
            portfolio_value: parse_decimal("portfolio_value", &value)?,
            cash: parse_decimal("cash", &raw.cash)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawOpenOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    bp: f64,
    ap: f64,
}

#[derive(Debug, Deserialize)]
struct StockQuoteResponse {
    quote: Option<RawQuote>,
}

#[derive(Debug, Deserialize)]
struct CryptoQuotesResponse {
    #[serde(default)]
    quotes: HashMap<String, RawQuote>,
}

fn parse_decimal(field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TraderError::Malformed(format!("{field}: '{raw}' is not a number")))
}

/// `BTCUSD` → `BTC/USD` for the crypto data endpoint.
fn crypto_pair(symbol: &str) -> String {
    match symbol.strip_suffix("USD") {
        Some(base) if !base.is_empty() && !base.ends_with('/') => format!("{base}/USD"),
        _ => symbol.to_string(),
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub struct AlpacaClient {
    http: reqwest::Client,
    config: AlpacaConfig,
}

impl AlpacaClient {
    pub fn new(config: AlpacaConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            HeaderValue::from_str(&config.key_id)
                .map_err(|_| TraderError::Config("APCA key id contains invalid characters".into()))?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            HeaderValue::from_str(&config.secret_key)
                .map_err(|_| TraderError::Config("APCA secret key contains invalid characters".into()))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, config })
    }

    fn trading_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.data_url.trim_end_matches('/'))
    }

    /// Turn a non-2xx response into `TraderError::Api` with the body attached.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TraderError::Api { status: status.as_u16(), message: body })
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self.http.get(url).query(query).send().await?;
        let resp = Self::check(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| TraderError::Malformed(format!("{url}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, label: &str, url: &str, query: &[(&str, String)]) -> Result<T> {
        self.config
            .retry
            .run(label, move || self.get_once::<T>(url, query))
            .await
    }

    async fn delete_once(&self, url: &str) -> Result<()> {
        let resp = self.http.delete(url).send().await?;
        Self::check(resp).await.map(|_| ())
    }
}

// ─── Brokerage ────────────────────────────────────────────────────────────────

#[async_trait]
impl Brokerage for AlpacaClient {
    async fn account(&self) -> Result<Account> {
        let raw: RawAccount = self.get_json("account", &self.trading_url("/v2/account"), &[]).await?;
        raw.try_into()
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let raw: Vec<RawPosition> = self
            .get_json("positions", &self.trading_url("/v2/positions"), &[])
            .await?;
        raw.into_iter().map(Position::try_from).collect()
    }

    async fn clock(&self) -> Result<Clock> {
        self.get_json("clock", &self.trading_url("/v2/clock"), &[]).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        info!(
            symbol   = %order.symbol,
            side     = ?order.side,
            notional = ?order.notional,
            qty      = ?order.qty,
            tif      = ?order.time_in_force,
            "🚀 Sending market order"
        );

        let resp = self
            .http
            .post(self.trading_url("/v2/orders"))
            .json(order)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, symbol = %order.symbol, "Brokerage unreachable");
                TraderError::from(e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(http_status = %status, body = %body, symbol = %order.symbol, "❌ Order refused");
            // 403 = buying power / permissions, 422 = invalid order
            return Err(match status.as_u16() {
                403 | 422 => TraderError::Rejected { symbol: order.symbol.clone(), reason: body },
                code => TraderError::Api { status: code, message: body },
            });
        }

        let ack: OrderAck = resp
            .json()
            .await
            .map_err(|e| TraderError::Malformed(format!("order ack: {e}")))?;
        info!(order_id = %ack.id, symbol = %order.symbol, "✅ Order accepted");
        Ok(ack)
    }

    async fn cancel_orders(&self, symbol: &str) -> Result<usize> {
        let open: Vec<RawOpenOrder> = self
            .get_json(
                "open orders",
                &self.trading_url("/v2/orders"),
                &[("status", "open".to_string()), ("symbols", symbol.to_string())],
            )
            .await?;

        let mut cancelled = 0;
        for order in open {
            let url = self.trading_url(&format!("/v2/orders/{}", order.id));
            let url = url.as_str();
            match self.config.retry.run("cancel order", move || self.delete_once(url)).await {
                Ok(()) => cancelled += 1,
                // 422: already filled or already cancelling, nothing left to cancel
                Err(e) => warn!(symbol, order_id = %order.id, error = %e, "Cancel failed"),
            }
        }

        if cancelled > 0 {
            debug!(symbol, cancelled, "Open orders cancelled");
        }
        Ok(cancelled)
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderAck> {
        let resp = self
            .http
            .delete(self.trading_url(&format!("/v2/positions/{symbol}")))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(http_status = %status, body = %body, symbol, "❌ Close refused");
            return Err(match status.as_u16() {
                403 | 422 => TraderError::Rejected { symbol: symbol.to_string(), reason: body },
                code => TraderError::Api { status: code, message: body },
            });
        }

        resp.json()
            .await
            .map_err(|e| TraderError::Malformed(format!("close ack: {e}")))
    }
}

// ─── Quotes ───────────────────────────────────────────────────────────────────

#[async_trait]
impl QuoteSource for AlpacaClient {
    async fn latest_quote(&self, symbol: &str) -> Result<Quote> {
        let raw = if classify(symbol).asset_type.is_crypto() {
            let pair = crypto_pair(symbol);
            let mut resp: CryptoQuotesResponse = self
                .get_json(
                    "crypto quote",
                    &self.data_url("/v1beta3/crypto/us/latest/quotes"),
                    &[("symbols", pair.clone())],
                )
                .await?;
            resp.quotes.remove(&pair)
        } else {
            let resp: StockQuoteResponse = self
                .get_json("stock quote", &self.data_url(&format!("/v2/stocks/{symbol}/quotes/latest")), &[])
                .await?;
            resp.quote
        };

        raw.map(|q| Quote::live(q.bp, q.ap))
            .ok_or_else(|| TraderError::Malformed(format!("no quote in response for {symbol}")))
    }
}

// ─── Universe ─────────────────────────────────────────────────────────────────

#[async_trait]
impl UniverseSource for AlpacaClient {
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        self.get_json(
            "assets",
            &self.trading_url("/v2/assets"),
            &[
                ("status", filter.status.to_string()),
                ("asset_class", filter.asset_class.to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuoteOrigin;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AlpacaClient {
        AlpacaClient::new(AlpacaConfig {
            base_url: server.uri(),
            data_url: server.uri(),
            key_id: "key".into(),
            secret_key: "secret".into(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        })
        .unwrap()
    }

    #[test]
    fn test_crypto_pair_conversion() {
        assert_eq!(crypto_pair("BTCUSD"), "BTC/USD");
        assert_eq!(crypto_pair("BTC/USD"), "BTC/USD");
        assert_eq!(crypto_pair("USD"), "USD");
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(parse_decimal("qty", " 1.5 ").unwrap(), 1.5);
        assert!(matches!(parse_decimal("qty", "abc"), Err(TraderError::Malformed(_))));
        assert!(parse_decimal("qty", "inf").is_err());
    }

    #[tokio::test]
    async fn test_positions_parsed_with_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/positions"))
            .and(header("APCA-API-KEY-ID", "key"))
            .and(header("APCA-API-SECRET-KEY", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "symbol": "XOM",
                    "qty": "10",
                    "avg_entry_price": "100.00",
                    "current_price": "91.00",
                    "unrealized_plpc": "-0.09",
                    "side": "long"
                }
            ])))
            .mount(&server)
            .await;

        let positions = client_for(&server).positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "XOM");
        assert!((positions[0].unrealized_pnl_pct + 0.09).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_account_and_clock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "buying_power": "25000.50",
                "cash": "12000",
                "portfolio_value": "101234.56"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/clock"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_open": true,
                "next_open": "2026-10-20T13:30:00Z",
                "next_close": "2026-10-19T20:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let account = client.account().await.unwrap();
        assert_eq!(account.buying_power, 25000.50);
        assert_eq!(account.portfolio_value, 101234.56);
        assert!(client.clock().await.unwrap().is_open);
    }

    #[tokio::test]
    async fn test_transient_5xx_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/clock"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/clock"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "is_open": false })))
            .mount(&server)
            .await;

        assert!(!client_for(&server).clock().await.unwrap().is_open);
    }

    #[tokio::test]
    async fn test_rejected_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient buying power"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .place_order(&OrderRequest::buy_notional("SPY", 1200.0))
            .await
            .unwrap_err();

        match err {
            TraderError::Rejected { symbol, reason } => {
                assert_eq!(symbol, "SPY");
                assert!(reason.contains("buying power"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_order_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ord-1",
                "symbol": "ETHUSD",
                "status": "accepted"
            })))
            .mount(&server)
            .await;

        let ack = client_for(&server)
            .place_order(&OrderRequest::buy_notional("ETHUSD", 600.0))
            .await
            .unwrap();
        assert_eq!(ack.id, "ord-1");
    }

    #[tokio::test]
    async fn test_cancel_orders_for_symbol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders"))
            .and(query_param("status", "open"))
            .and(query_param("symbols", "XOM"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "a1" }, { "id": "a2" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/orders/a1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/orders/a2"))
            .respond_with(ResponseTemplate::new(422).set_body_string("already filled"))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).cancel_orders("XOM").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stock_and_crypto_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/stocks/AAPL/quotes/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbol": "AAPL",
                "quote": { "bp": 229.0, "ap": 231.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta3/crypto/us/latest/quotes"))
            .and(query_param("symbols", "BTC/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quotes": { "BTC/USD": { "bp": 99990.0, "ap": 100010.0 } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let q = client.latest_quote("AAPL").await.unwrap();
        assert_eq!(q.price, 230.0);
        assert_eq!(q.origin, QuoteOrigin::Live);

        let q = client.latest_quote("BTCUSD").await.unwrap();
        assert_eq!(q.price, 100_000.0);
    }

    #[tokio::test]
    async fn test_missing_quote_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/stocks/ZZZ/quotes/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "symbol": "ZZZ" })))
            .mount(&server)
            .await;

        let err = client_for(&server).latest_quote("ZZZ").await.unwrap_err();
        assert!(matches!(err, TraderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_assets_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/assets"))
            .and(query_param("status", "active"))
            .and(query_param("asset_class", "us_equity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "symbol": "XOM", "tradable": true, "fractionable": true, "shortable": true, "easy_to_borrow": true },
                { "symbol": "PINK", "tradable": true }
            ])))
            .mount(&server)
            .await;

        let assets = client_for(&server).list_assets(&AssetFilter::default()).await.unwrap();
        assert_eq!(assets.len(), 2);
        assert!(assets[0].is_eligible());
        assert!(!assets[1].is_eligible());
    }
}
