//! # Reserved Channel Names
//!
//! Topic channels are `<prefix>:<domain>:...:events`; work queues are
//! `<family>.<provider>.requests` with replies on `<family>.<provider>.responses`.

use std::fmt;

/// Default prefix for state topics.
pub const DEFAULT_PREFIX: &str = "hub";

/// The closed set of state topics the router ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChannel {
    Orders,
    Invoicing,
    IntegrationsSync,
    Shipments,
}

impl StateChannel {
    pub const ALL: [StateChannel; 4] = [
        StateChannel::Orders,
        StateChannel::Invoicing,
        StateChannel::IntegrationsSync,
        StateChannel::Shipments,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Orders => "orders:state:events",
            Self::Invoicing => "invoicing:state:events",
            Self::IntegrationsSync => "integrations:orders:sync:events",
            Self::Shipments => "shipments:state:events",
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Invoicing => "invoicing",
            Self::IntegrationsSync => "integrations_sync",
            Self::Shipments => "shipments",
        }
    }
}

/// Resolves reserved channels under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNames {
    prefix: String,
}

impl ChannelNames {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn state(&self, channel: StateChannel) -> String {
        format!("{}:{}", self.prefix, channel.suffix())
    }

    #[must_use]
    pub fn orders(&self) -> String {
        self.state(StateChannel::Orders)
    }

    #[must_use]
    pub fn invoicing(&self) -> String {
        self.state(StateChannel::Invoicing)
    }

    #[must_use]
    pub fn integrations_sync(&self) -> String {
        self.state(StateChannel::IntegrationsSync)
    }

    #[must_use]
    pub fn shipments(&self) -> String {
        self.state(StateChannel::Shipments)
    }

    /// Every state topic with its channel kind.
    #[must_use]
    pub fn all_state(&self) -> Vec<(StateChannel, String)> {
        StateChannel::ALL
            .into_iter()
            .map(|c| (c, self.state(c)))
            .collect()
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

/// Class of external service with its own request/response channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    Invoicing,
    Shipping,
    Messaging,
    Payments,
}

impl ProviderFamily {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoicing => "invoicing",
            Self::Shipping => "shipping",
            Self::Messaging => "messaging",
            Self::Payments => "payments",
        }
    }

    /// `<family>.<provider>.requests`
    #[must_use]
    pub fn request_queue(&self, provider: &str) -> String {
        format!("{}.{}.requests", self.as_str(), provider)
    }

    /// `<family>.<provider>.responses`
    #[must_use]
    pub fn response_channel(&self, provider: &str) -> String {
        format!("{}.{}.responses", self.as_str(), provider)
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
