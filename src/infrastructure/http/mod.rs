// src/infrastructure/http/mod.rs
// hyper implementation of the trading backend API

use async_trait::async_trait;
use chrono::SecondsFormat;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Client, Method, Request};
use hyper_tls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::domain::errors::{ApiError, ApiResult};
use crate::domain::filter::TradeFilters;
use crate::domain::models::{Position, SystemHealth, Trade, TradingSettings, TradingStatus};
use crate::domain::repository::TradingApi;

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    symbol: &'a str,
    timeframe: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct HttpTradingApi {
    base_url: Url,
    client: Client<HttpsConnector<HttpConnector>>,
    timeout: Duration,
}

impl HttpTradingApi {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL {}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            client: Client::builder().build::<_, Body>(HttpsConnector::new()),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, path));
        url
    }

    fn trades_url(&self, filters: &TradeFilters) -> Url {
        let mut url = self.endpoint("/api/trades");
        {
            let mut query = url.query_pairs_mut();
            if let Some(symbol) = &filters.symbol {
                query.append_pair("symbol", symbol);
            }
            if let Some(order_type) = filters.order_type {
                query.append_pair("orderType", order_type.as_str());
            }
            if let Some(from) = filters.date_from {
                query.append_pair("from", &from.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            if let Some(to) = filters.date_to {
                query.append_pair("to", &to.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }

        // Drop the dangling '?' when no filter was sent
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> ApiResult<T> {
        log::debug!("{} {}", method, url);

        let mut builder = Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(ACCEPT, "application/json");

        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let request = builder
            .body(body)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ApiError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.trim().is_empty());
            log::warn!("Backend returned {} for {}", status, url);
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(Method::GET, self.endpoint(path), None).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.send(method, self.endpoint(path), Some(bytes)).await
    }
}

#[async_trait]
impl TradingApi for HttpTradingApi {
    async fn list_trades(&self, filters: &TradeFilters) -> ApiResult<Vec<Trade>> {
        self.send(Method::GET, self.trades_url(filters), None).await
    }

    async fn get_trade(&self, id: &str) -> ApiResult<Trade> {
        let mut url = self.endpoint("/api/trades");
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest("Base URL cannot have a path".to_string()))?
            .push(id);
        self.send(Method::GET, url, None).await
    }

    async fn list_positions(&self) -> ApiResult<Vec<Position>> {
        self.get("/api/positions").await
    }

    async fn get_trading_status(&self) -> ApiResult<TradingStatus> {
        self.get("/api/trading/status").await
    }

    async fn start_trading(&self, symbol: &str, timeframe: &str) -> ApiResult<TradingStatus> {
        let body = StartRequest { symbol, timeframe };
        self.send_json(Method::POST, "/api/trading/start", &body).await
    }

    async fn stop_trading(&self) -> ApiResult<TradingStatus> {
        self.send(Method::POST, self.endpoint("/api/trading/stop"), None)
            .await
    }

    async fn get_settings(&self) -> ApiResult<TradingSettings> {
        self.get("/api/settings").await
    }

    async fn update_settings(&self, settings: &TradingSettings) -> ApiResult<TradingSettings> {
        self.send_json(Method::PUT, "/api/settings", settings).await
    }

    async fn get_health(&self) -> ApiResult<SystemHealth> {
        self.get("/api/health").await
    }
}
