//! HTTP payment gateway client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::HttpPaymentConfig;

use super::{ChargeRequest, PaymentConfirmation, PaymentError, PaymentProvider, RefundInstruction};

/// Payment provider backed by a simple HTTP gateway.
///
/// Charges are POSTed to `{url}/charges` and refunds to `{url}/refunds`;
/// the gateway answers charges with `{"reference", "approved", "reason"?}`.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    reference: String,
    approved: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(config: HttpPaymentConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentConfirmation, PaymentError> {
        let response = self
            .request("/charges")
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Gateway(format!(
                "charge returned HTTP {}",
                response.status()
            )));
        }

        let body: ChargeResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;

        Ok(PaymentConfirmation {
            reference: body.reference,
            approved: body.approved,
            declined_reason: body.reason,
        })
    }

    async fn refund(&self, instruction: &RefundInstruction) -> Result<(), PaymentError> {
        let response = self
            .request("/refunds")
            .json(instruction)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Gateway(format!(
                "refund returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
