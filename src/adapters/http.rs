use crate::domain::model::Source;
use crate::utils::error::{EtlError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// JSON GET with bounded retries, shared by both adapters.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    source: Source,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(source: Source, request_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("london-ev-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            source,
            retry,
        })
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let mut last_error = String::new();

        for attempt in 1..=self.retry.attempts {
            if attempt > 1 {
                let delay = self.retry.delay_for(attempt - 1);
                tracing::debug!(
                    "Retrying {} request (attempt {}/{}) after {:?}",
                    self.source,
                    attempt,
                    self.retry.attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            EtlError::SourceUnavailable {
                                data_source: self.source,
                                reason: format!("invalid JSON body: {}", e),
                            }
                        });
                    }
                    last_error = format!("HTTP {}", status);
                    if !is_retryable(status) {
                        break;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!("{} request error: {}", self.source, e);
                }
            }
        }

        Err(EtlError::SourceUnavailable {
            data_source: self.source,
            reason: last_error,
        })
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
