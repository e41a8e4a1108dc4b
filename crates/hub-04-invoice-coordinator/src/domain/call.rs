//! What a provider receives and returns for one invoice job.

use serde::de::DeserializeOwned;
use shared_types::{AuditBlock, IntegrationId, InvoiceRequest, JsonMap};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use super::CoordinatorError;

/// Decrypted credential fields; wiped on drop.
#[derive(Default)]
pub struct Credentials(BTreeMap<String, Zeroizing<String>>);

impl Credentials {
    pub fn insert(&mut self, field: impl Into<String>, value: String) {
        self.0.insert(field.into(), Zeroizing::new(value));
    }

    pub fn get(&self, field: &str) -> Result<&str, CoordinatorError> {
        self.0
            .get(field)
            .map(|v| v.as_str())
            .ok_or_else(|| CoordinatorError::InvalidConfig(format!("credential '{field}' missing")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Integration config overlaid with the request's config; request keys win.
#[must_use]
pub fn merge_config(integration: &JsonMap, request: &JsonMap) -> JsonMap {
    let mut merged = integration.clone();
    for (key, value) in request {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Normalize a mixed-type config map into a provider's typed config.
pub fn typed_config<T: DeserializeOwned>(config: &JsonMap) -> Result<T, CoordinatorError> {
    serde_json::from_value(serde_json::Value::Object(config.clone()))
        .map_err(|e| CoordinatorError::InvalidConfig(e.to_string()))
}

pub struct ProviderCall<'a> {
    pub request: &'a InvoiceRequest,
    pub integration_id: IntegrationId,
    pub credentials: &'a Credentials,
    pub config: &'a JsonMap,
}

/// Provider fields mapped onto the generic response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedInvoice {
    pub external_id: String,
    pub invoice_number: Option<String>,
    pub cufe: Option<String>,
    pub issued_at: Option<String>,
    pub public_url: Option<String>,
}

/// Result of one provider call with the exchange that produced it.
#[derive(Debug)]
pub struct ProviderOutcome {
    pub result: Result<IssuedInvoice, CoordinatorError>,
    pub audit: AuditBlock,
}

impl ProviderOutcome {
    /// Failure before any HTTP exchange. The audit names the endpoint the
    /// call would have used and carries the error as its body.
    #[must_use]
    pub fn before_call(url: String, payload: String, error: CoordinatorError) -> Self {
        Self {
            audit: synthetic_audit(url, payload, &error),
            result: Err(error),
        }
    }
}

#[must_use]
pub fn synthetic_audit(url: String, payload: String, error: &CoordinatorError) -> AuditBlock {
    let body = serde_json::json!({
        "error": error.to_string(),
        "error_code": error.error_code().as_str(),
    });
    AuditBlock {
        request_url: url,
        request_payload: if payload.is_empty() { "{}".into() } else { payload },
        response_status: 0,
        response_body: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn map(value: serde_json::Value) -> JsonMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Cfg {
        document_id: u64,
        #[serde(default)]
        seller_id: Option<u64>,
    }

    #[test]
    fn test_request_config_wins() {
        let merged = merge_config(
            &map(json!({"document_id": 1, "seller_id": 5})),
            &map(json!({"document_id": 2})),
        );
        let cfg: Cfg = typed_config(&merged).unwrap();
        assert_eq!((cfg.document_id, cfg.seller_id), (2, Some(5)));
    }

    #[test]
    fn test_mistyped_or_missing_config_is_invalid() {
        let err = typed_config::<Cfg>(&map(json!({"document_id": "abc"}))).unwrap_err();
        assert_eq!(err.error_code().as_str(), "invalid_config");
        assert!(typed_config::<Cfg>(&JsonMap::new()).is_err());
    }

    #[test]
    fn test_synthetic_audit_is_populated() {
        let audit = synthetic_audit(
            "https://api.example/v1/invoices".into(),
            String::new(),
            &CoordinatorError::InvalidConfig("document_id missing".into()),
        );
        assert!(audit.is_populated());
        assert_eq!(audit.response_status, 0);
        assert!(audit.response_body.contains("invalid_config"));
    }

    #[test]
    fn test_credentials_debug_hides_values() {
        let mut creds = Credentials::default();
        creds.insert("access_key", "s3cret".into());
        assert_eq!(creds.get("access_key").unwrap(), "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
        assert!(creds.get("username").is_err());
    }
}
