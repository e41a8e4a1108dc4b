//! Bounded-retry outbound HTTP client with exchange capture.

use reqwest::{Client, Method};
use serde_json::Value;
use shared_types::AuditBlock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::domain::CoordinatorError;

pub enum CallAuth {
    None,
    Bearer(String),
    Basic { user: String, password: String },
}

pub struct OutboundCall {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub auth: CallAuth,
    pub body: Option<Value>,
}

impl OutboundCall {
    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            auth: CallAuth::None,
            body: Some(body),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: CallAuth) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Body as sent, for the audit block.
    #[must_use]
    pub fn payload(&self) -> String {
        self.body.as_ref().map(Value::to_string).unwrap_or_default()
    }
}

/// A completed exchange with a non-5xx status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON; `Value::Null` when it is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Result of a call plus the last exchange it made.
#[derive(Debug)]
pub struct HttpOutcome {
    pub result: Result<HttpReply, CoordinatorError>,
    pub audit: AuditBlock,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CoordinatorError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        })
    }

    /// Send `call`, retrying network errors and 5xx up to the retry budget.
    /// Any other status is returned as a reply for the provider to classify.
    pub async fn send(&self, call: &OutboundCall) -> HttpOutcome {
        let mut audit = AuditBlock {
            request_url: call.url.clone(),
            request_payload: call.payload(),
            ..AuditBlock::default()
        };
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                debug!(url = %call.url, attempt, max_retries = self.max_retries, "Retrying provider call");
                tokio::time::sleep(self.backoff).await;
            }

            let error = match self.request(call).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match response.text().await {
                        Ok(body) => {
                            audit.response_status = status;
                            audit.response_body = body.clone();
                            if status < 500 {
                                return HttpOutcome {
                                    result: Ok(HttpReply { status, body }),
                                    audit,
                                };
                            }
                            CoordinatorError::Upstream {
                                status,
                                message: truncate(&body),
                            }
                        }
                        Err(e) => network_error(&mut audit, status, &e),
                    }
                }
                Err(e) => network_error(&mut audit, 0, &e),
            };

            if attempt >= self.max_retries || !error.is_retryable() {
                return HttpOutcome {
                    result: Err(error),
                    audit,
                };
            }
            warn!(url = %call.url, attempt, error = %error, "Provider call failed");
            attempt += 1;
        }
    }

    fn request(&self, call: &OutboundCall) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(call.method.clone(), &call.url)
            .timeout(self.timeout);
        for (name, value) in &call.headers {
            builder = builder.header(*name, value);
        }
        builder = match &call.auth {
            CallAuth::None => builder,
            CallAuth::Bearer(token) => builder.bearer_auth(token),
            CallAuth::Basic { user, password } => builder.basic_auth(user, Some(password)),
        };
        if let Some(body) = &call.body {
            builder = builder.json(body);
        }
        builder
    }
}

fn network_error(audit: &mut AuditBlock, status: u16, error: &reqwest::Error) -> CoordinatorError {
    let message = if error.is_timeout() {
        format!("timed out: {error}")
    } else {
        error.to_string()
    };
    audit.response_status = status;
    audit.response_body = serde_json::json!({ "error": message }).to_string();
    CoordinatorError::Network(message)
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    match body.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}
