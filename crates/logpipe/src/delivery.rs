// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::DeliveryError;
use crate::record::Record;
use async_trait::async_trait;
use core::time::Duration;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

/// One delivery attempt of a single record to the remote collector.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Resolves `Ok` only when the collector accepted the record.
    async fn deliver(&self, record: &Record) -> Result<(), DeliveryError>;
}

/// Builds the HTTP client used for remote delivery. Every request is bounded by `timeout`,
/// so a hung connection cannot hold an in-flight slot forever.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

/// POSTs each record as a JSON body to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDelivery {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Deliver for HttpDelivery {
    async fn deliver(&self, record: &Record) -> Result<(), DeliveryError> {
        let body = record.to_json()?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        trace!(
            "remote sink: record {} got status {status}",
            record.sequence_id()
        );
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use mockito::{Matcher, Server};
    use tokio::net::TcpListener;

    fn delivery(url: String, timeout: Duration) -> HttpDelivery {
        let client = build_client(None, timeout).expect("failed to build client");
        HttpDelivery::new(client, url)
    }

    #[tokio::test]
    async fn test_delivers_json_record() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/log")
            .match_header("Content-Type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "id": 12,
                "level": "error",
                "msg": "disk almost full",
            })))
            .with_status(200)
            .create_async()
            .await;

        let delivery = delivery(format!("{}/log", server.url()), Duration::from_secs(5));
        let record = Record::new(12, Level::Error, "disk almost full");
        delivery.deliver(&record).await.expect("delivery failed");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_any_2xx_is_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/log")
            .with_status(204)
            .create_async()
            .await;

        let delivery = delivery(format!("{}/log", server.url()), Duration::from_secs(5));
        assert!(delivery
            .deliver(&Record::new(0, Level::Info, "ok"))
            .await
            .is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_2xx_is_status_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/log")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let delivery = delivery(format!("{}/log", server.url()), Duration::from_secs(5));
        let result = delivery.deliver(&Record::new(1, Level::Info, "nope")).await;
        assert!(matches!(result, Err(DeliveryError::Status(503))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let delivery = delivery(format!("http://{addr}/log"), Duration::from_secs(5));
        let result = delivery.deliver(&Record::new(2, Level::Info, "x")).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[tokio::test]
    async fn test_hung_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections but never answer
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let delivery = delivery(format!("http://{addr}/log"), Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = delivery.deliver(&Record::new(3, Level::Info, "x")).await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_build_client_with_proxy() {
        assert!(build_client(Some("http://proxy:3128"), Duration::from_secs(1)).is_ok());
    }
}
