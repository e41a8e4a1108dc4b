//! # Domain Event Envelope
//!
//! The on-wire JSON every producer publishes to a topic channel:
//!
//! ```text
//! {id, event_type, tenant_id?, integration_id?, timestamp, data, metadata?}
//! ```
//!
//! `event_type` stays a raw string on the envelope so a consumer can tell a
//! malformed payload (does not parse) from an unknown type (parses, but the
//! type is outside every declared namespace).

use crate::ids::{IntegrationId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Schemaless JSON object used for `data` and `metadata`.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Namespaces an event type may live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFamily {
    Order,
    Invoice,
    Shipment,
    IntegrationSync,
}

impl EventFamily {
    pub const ALL: [EventFamily; 4] = [
        EventFamily::Order,
        EventFamily::Invoice,
        EventFamily::Shipment,
        EventFamily::IntegrationSync,
    ];

    /// Namespace prefix including the trailing dot.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Order => "order.",
            Self::Invoice => "invoice.",
            Self::Shipment => "shipment.",
            Self::IntegrationSync => "integration.sync.",
        }
    }
}

/// Why a string is not a valid event type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventTypeError {
    #[error("event type is empty")]
    Empty,
    #[error("event type {0:?} is outside every declared namespace")]
    UnknownNamespace(String),
    #[error("event type {0:?} has no name after its namespace")]
    MissingName(String),
}

/// A validated event type, e.g. `order.paid` or `integration.sync.completed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Validate a raw type string against the declared namespaces.
    pub fn parse(raw: &str) -> Result<Self, EventTypeError> {
        if raw.is_empty() {
            return Err(EventTypeError::Empty);
        }
        let family = EventFamily::ALL
            .into_iter()
            .find(|f| raw.starts_with(f.prefix()))
            .ok_or_else(|| EventTypeError::UnknownNamespace(raw.to_string()))?;

        // Producers name events freely inside a namespace.
        if raw[family.prefix().len()..].trim().is_empty() {
            return Err(EventTypeError::MissingName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build `<family prefix><name>`; the name must not be blank.
    pub fn new(family: EventFamily, name: &str) -> Result<Self, EventTypeError> {
        Self::parse(&format!("{}{}", family.prefix(), name))
    }

    #[must_use]
    pub fn family(&self) -> EventFamily {
        EventFamily::ALL
            .into_iter()
            .find(|f| self.0.starts_with(f.prefix()))
            .unwrap_or(EventFamily::Order)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EventType::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<JsonMap, D::Error> {
    Ok(Option::<JsonMap>::deserialize(deserializer)?.unwrap_or_default())
}

/// Immutable domain event as published to a topic channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<IntegrationId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: JsonMap,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "JsonMap::is_empty"
    )]
    pub metadata: JsonMap,
}

impl DomainEvent {
    /// New event with a fresh id and the current time.
    #[must_use]
    pub fn new(event_type: EventType, data: JsonMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.0,
            tenant_id: None,
            integration_id: None,
            timestamp: Utc::now(),
            data,
            metadata: JsonMap::new(),
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    #[must_use]
    pub fn with_integration(mut self, integration_id: IntegrationId) -> Self {
        self.integration_id = Some(integration_id);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Parse an envelope from raw broker bytes.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Validate `event_type` against the declared namespaces.
    pub fn validated_type(&self) -> Result<EventType, EventTypeError> {
        EventType::parse(&self.event_type)
    }

    /// Tenant the event belongs to; `None` and `Some(0)` both mean global.
    #[must_use]
    pub fn owning_tenant(&self) -> Option<TenantId> {
        self.tenant_id.filter(|t| !t.is_superuser())
    }

    /// Metadata value rendered as a string. Numbers are accepted so that
    /// `order_id: 42` and `order_id: "42"` compare equal.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        scalar_to_string(self.metadata.get(key)?)
    }

    /// Lookup in `metadata`, falling back to `data`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.metadata_str(key)
            .or_else(|| self.data.get(key).and_then(scalar_to_string))
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
