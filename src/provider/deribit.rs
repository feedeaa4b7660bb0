use super::{PriceQuote, ProviderError, QuoteSource};
use crate::config::ProviderConfig;
use serde::Deserialize;
use std::time::Duration;

/// JSON-RPC style envelope returned by Deribit public endpoints
#[derive(Debug, Deserialize)]
struct IndexPriceEnvelope {
    #[serde(default)]
    result: Option<serde_json::Value>,

    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Deribit public API client
///
/// Holds one `reqwest::Client`; concurrent calls each get their own pooled connection.
#[derive(Debug, Clone)]
pub struct DeribitClient {
    client: reqwest::Client,
    base_url: String,
}

impl DeribitClient {
    /// Create a client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("index-price-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ProviderError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Index name for an instrument, e.g. "BTC" -> "btc_usd"
    pub fn index_name(instrument: &str) -> String {
        format!("{}_usd", instrument.to_lowercase())
    }

    fn endpoint(&self) -> String {
        format!("{}/get_index_price", self.base_url)
    }
}

#[async_trait::async_trait]
impl QuoteSource for DeribitClient {
    async fn fetch_index_price(&self, instrument: &str) -> Result<PriceQuote, ProviderError> {
        let index_name = Self::index_name(instrument);

        tracing::debug!("Requesting index price for {}", index_name);

        let response = self
            .client
            .get(self.endpoint())
            .query(&[("index_name", index_name.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unreachable(format!(
                "HTTP {} for {}",
                status, index_name
            )));
        }

        let body = response.text().await?;
        parse_index_price(&body)
    }
}

/// Parse a `get_index_price` response body
///
/// Rejects negative and non-finite prices as missing: they are not usable observations.
pub fn parse_index_price(body: &str) -> Result<PriceQuote, ProviderError> {
    let envelope: IndexPriceEnvelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    // Anything but an object carries no usable payload
    let result = match (envelope.result, envelope.error) {
        (Some(serde_json::Value::Object(result)), _) => result,
        (_, Some(err)) => {
            return Err(ProviderError::MissingField(format!(
                "result (provider error {}: {})",
                err.code, err.message
            )))
        }
        (_, None) => return Err(ProviderError::MissingField("result".to_string())),
    };

    let index_price = match result.get("index_price") {
        None | Some(serde_json::Value::Null) => {
            return Err(ProviderError::MissingField("index_price".to_string()))
        }
        Some(value) => value.as_f64().ok_or_else(|| {
            ProviderError::MalformedResponse(format!("index_price is not a number: {}", value))
        })?,
    };

    if !index_price.is_finite() || index_price < 0.0 {
        return Err(ProviderError::MissingField(format!(
            "index_price has no usable value: {}",
            index_price
        )));
    }

    Ok(PriceQuote { index_price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderErrorKind;
    use axum::{
        extract::Query,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use std::collections::HashMap;

    /// Serve a fake provider on an ephemeral port
    async fn spawn_provider() -> String {
        async fn index_price(Query(params): Query<HashMap<String, String>>) -> Response {
            match params.get("index_name").map(String::as_str) {
                Some("btc_usd") => (
                    StatusCode::OK,
                    r#"{"jsonrpc":"2.0","result":{"index_price":65000.5,"estimated_delivery_price":65000.5}}"#,
                )
                    .into_response(),
                Some("eth_usd") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                Some("sol_usd") => (StatusCode::OK, r#"{"result":{}}"#).into_response(),
                Some("xrp_usd") => (StatusCode::OK, "<html>gateway</html>").into_response(),
                _ => (
                    StatusCode::BAD_REQUEST,
                    r#"{"error":{"code":10001,"message":"unknown index"}}"#,
                )
                    .into_response(),
            }
        }

        let router = Router::new().route("/get_index_price", get(index_price));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn client_for(base_url: &str) -> DeribitClient {
        DeribitClient::new(&ProviderConfig {
            base_url: base_url.to_string(),
            request_timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[test]
    fn test_index_name() {
        assert_eq!(DeribitClient::index_name("BTC"), "btc_usd");
        assert_eq!(DeribitClient::index_name("eth"), "eth_usd");
    }

    #[test]
    fn test_parse_valid_body() {
        let quote = parse_index_price(r#"{"result":{"index_price":65000.5}}"#).unwrap();
        assert_eq!(quote.index_price, 65000.5);

        let quote = parse_index_price(r#"{"result":{"index_price":3100}}"#).unwrap();
        assert_eq!(quote.index_price, 3100.0);
    }

    #[test]
    fn test_parse_missing_fields() {
        for body in [
            r#"{"result":{}}"#,
            r#"{"result":null}"#,
            r#"{"result":5}"#,
            r#"{"result":[]}"#,
            r#"{"result":{"index_price":null}}"#,
            r#"{}"#,
            r#"{"error":{"code":10001,"message":"unknown index"}}"#,
        ] {
            let err = parse_index_price(body).unwrap_err();
            assert_eq!(err.kind(), ProviderErrorKind::MissingField, "body: {}", body);
        }
    }

    #[test]
    fn test_parse_malformed_bodies() {
        for body in [
            "",
            "not json",
            r#"[1, 2, 3]"#,
            r#"{"result":{"index_price":"65000"}}"#,
        ] {
            let err = parse_index_price(body).unwrap_err();
            assert_eq!(
                err.kind(),
                ProviderErrorKind::MalformedResponse,
                "body: {}",
                body
            );
        }
    }

    #[test]
    fn test_parse_rejects_negative_price() {
        let err = parse_index_price(r#"{"result":{"index_price":-1.5}}"#).unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::MissingField);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base_url = spawn_provider().await;
        let client = client_for(&base_url);

        let quote = client.fetch_index_price("BTC").await.unwrap();
        assert_eq!(quote.index_price, 65000.5);

        // Instrument is case-insensitive
        let quote = client.fetch_index_price("btc").await.unwrap();
        assert_eq!(quote.index_price, 65000.5);
    }

    #[tokio::test]
    async fn test_fetch_error_classification() {
        let base_url = spawn_provider().await;
        let client = client_for(&base_url);

        let err = client.fetch_index_price("ETH").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Unreachable);

        let err = client.fetch_index_price("SOL").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::MissingField);

        let err = client.fetch_index_price("XRP").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::MalformedResponse);

        let err = client.fetch_index_price("DOGE").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        let err = client.fetch_index_price("BTC").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Unreachable);
    }
}
