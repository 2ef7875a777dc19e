// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::AgentConfig;
use crate::errors::AgentError;
use metrics_model::retry::{retry, Backoff, RetryError};
use metrics_model::signature::{Signer, SIGNATURE_HEADER};
use metrics_model::MetricRecord;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const BATCH_PATH: &str = "/updates/";
pub const SINGLE_PATH: &str = "/update/";

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Destination error {0:?}: {1}")]
    Destination(Option<StatusCode>, String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ShippingError>,
    },

    #[error("Delivery cancelled")]
    Cancelled,
}

impl ShippingError {
    /// No response at all, or a server-side failure.
    pub fn is_retriable(&self) -> bool {
        match self {
            ShippingError::Destination(None, _) => true,
            ShippingError::Destination(Some(status), _) => status.is_server_error(),
            _ => false,
        }
    }
}

impl From<RetryError<ShippingError>> for ShippingError {
    fn from(err: RetryError<ShippingError>) -> Self {
        match err {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { attempts, source } => ShippingError::Exhausted {
                attempts,
                last: Box::new(source),
            },
            RetryError::Cancelled => ShippingError::Cancelled,
        }
    }
}

/// Posts metric records to the collector, signing bodies when a key is set.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    client: reqwest::Client,
    base_url: String,
    signer: Option<Signer>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl MetricsClient {
    pub fn new(config: &AgentConfig, cancel: CancellationToken) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::HttpClient(e.to_string()))?;
        let signer = config.key.as_deref().map(Signer::new).transpose()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            signer,
            backoff: config.backoff.clone(),
            cancel,
        })
    }

    pub async fn send_batch(&self, records: &[MetricRecord]) -> Result<(), ShippingError> {
        let body =
            serde_json::to_vec(records).map_err(|e| ShippingError::Payload(e.to_string()))?;
        self.post(BATCH_PATH, body).await
    }

    pub async fn send_one(&self, record: &MetricRecord) -> Result<(), ShippingError> {
        let body =
            serde_json::to_vec(record).map_err(|e| ShippingError::Payload(e.to_string()))?;
        self.post(SINGLE_PATH, body).await
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<(), ShippingError> {
        let url = format!("{}{path}", self.base_url);
        let signature = self.signer.as_ref().map(|signer| signer.sign(&body));

        retry(
            &self.backoff,
            &self.cancel,
            ShippingError::is_retriable,
            |attempt| self.attempt(&url, &body, signature.as_deref(), attempt),
        )
        .await
        .map_err(ShippingError::from)
    }

    async fn attempt(
        &self,
        url: &str,
        body: &[u8],
        signature: Option<&str>,
        attempt: usize,
    ) -> Result<(), ShippingError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), e.to_string()))?;
        let elapsed = start.elapsed();

        let status = response.status();
        if status.is_success() {
            debug!(
                "Delivered {} bytes to {url} in {} ms (attempt {attempt})",
                body.len(),
                elapsed.as_millis()
            );
            return Ok(());
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("Unable to read collector response body: {e}");
                String::new()
            }
        };
        warn!("{status}: collector rejected payload on attempt {attempt}: {text}");
        Err(ShippingError::Destination(Some(status), text))
    }
}
