use std::time::Duration;

use reqwest::Client;
use tracing::{error, info};

use crate::models::BatchResult;

/// Retry policy for callback delivery. The delay is fixed between
/// attempts, unlike the growing backoff used for grading retries.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Posts the final batch payload to the downstream callback endpoint.
#[derive(Clone)]
pub struct DeliveryService {
    client: Client,
    settings: DeliverySettings,
}

impl DeliveryService {
    pub fn new(settings: DeliverySettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// POST the JSON-serialized payload to `callback_url`. Returns true
    /// only if one attempt received a 2xx response; failure never
    /// propagates past this boundary, the caller records the boolean into
    /// `webhook_sent`.
    pub async fn deliver(&self, payload: &BatchResult, callback_url: &str) -> bool {
        let max_retries = self.settings.max_retries;

        for attempt in 1..=max_retries {
            match self
                .client
                .post(callback_url)
                .timeout(self.settings.request_timeout)
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    info!(
                        status = %response.status(),
                        attempt,
                        callback_url,
                        "Batch result delivered to webhook"
                    );
                    return true;
                }
                Ok(response) => {
                    error!(
                        status = %response.status(),
                        attempt,
                        max_retries,
                        callback_url,
                        "Webhook rejected batch result"
                    );
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempt,
                        max_retries,
                        callback_url,
                        "Failed to send batch result to webhook"
                    );
                }
            }

            if attempt < max_retries {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        false
    }
}
