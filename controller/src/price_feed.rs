use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use hvac_optimizer_common::{PriceError, PriceSource};

/// Live electricity price over HTTP: `GET {url}?region=..&time=now`, answering
/// `{"current_price": <number>}`.
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    client: Client,
    url: String,
    region: String,
}

impl HttpPriceSource {
    pub fn new(
        url: impl Into<String>,
        region: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            region: region.into(),
        })
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn current_price(&self) -> Result<f64, PriceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("region", self.region.as_str()), ("time", "now")])
            .send()
            .await
            .map_err(|err| PriceError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| PriceError::Malformed(err.to_string()))?;

        body.get("current_price")
            .and_then(Value::as_f64)
            .ok_or_else(|| PriceError::Malformed("missing numeric current_price".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;

    fn source(url: String) -> HttpPriceSource {
        HttpPriceSource::new(url, "LA", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn reads_current_price() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/electricity_price")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("region".into(), "LA".into()),
                Matcher::UrlEncoded("time".into(), "now".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"current_price": 0.23, "unit": "USD/kWh"}"#)
            .create_async()
            .await;

        let price = source(format!("{}/electricity_price", server.url()))
            .current_price()
            .await
            .unwrap();

        assert_eq!(price, 0.23);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = source(server.url()).current_price().await.unwrap_err();

        assert!(matches!(err, PriceError::Status(503)));
    }

    #[tokio::test]
    async fn missing_field_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"price": "cheap"}"#)
            .create_async()
            .await;

        let err = source(server.url()).current_price().await.unwrap_err();

        assert!(matches!(err, PriceError::Malformed(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = source(server.url()).current_price().await.unwrap_err();

        assert!(matches!(err, PriceError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let err = source("http://127.0.0.1:9".to_string())
            .current_price()
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::Transport(_)));
    }
}
