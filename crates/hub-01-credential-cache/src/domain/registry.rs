//! Closed registry of integration types.
//!
//! Every integration row names one of these codes. Rows carrying an unknown
//! code are rejected when loaded from the store of record.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationCategory {
    Ecommerce,
    Invoicing,
    Shipping,
    Payments,
    Messaging,
}

impl IntegrationCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecommerce => "ecommerce",
            Self::Invoicing => "invoicing",
            Self::Shipping => "shipping",
            Self::Payments => "payments",
            Self::Messaging => "messaging",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    Shopify,
    WooCommerce,
    MercadoLibre,
    Siigo,
    Alegra,
    Servientrega,
    Coordinadora,
    MercadoPago,
    Whatsapp,
}

impl IntegrationType {
    pub const ALL: [IntegrationType; 9] = [
        Self::Shopify,
        Self::WooCommerce,
        Self::MercadoLibre,
        Self::Siigo,
        Self::Alegra,
        Self::Servientrega,
        Self::Coordinadora,
        Self::MercadoPago,
        Self::Whatsapp,
    ];

    /// Stable code stored on integration rows; also the provider name used
    /// in queue names.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Shopify => "shopify",
            Self::WooCommerce => "woocommerce",
            Self::MercadoLibre => "mercadolibre",
            Self::Siigo => "siigo",
            Self::Alegra => "alegra",
            Self::Servientrega => "servientrega",
            Self::Coordinadora => "coordinadora",
            Self::MercadoPago => "mercadopago",
            Self::Whatsapp => "whatsapp",
        }
    }

    #[must_use]
    pub fn category(&self) -> IntegrationCategory {
        match self {
            Self::Shopify | Self::WooCommerce | Self::MercadoLibre => IntegrationCategory::Ecommerce,
            Self::Siigo | Self::Alegra => IntegrationCategory::Invoicing,
            Self::Servientrega | Self::Coordinadora => IntegrationCategory::Shipping,
            Self::MercadoPago => IntegrationCategory::Payments,
            Self::Whatsapp => IntegrationCategory::Messaging,
        }
    }

    /// Credential fields an integration of this type must carry.
    #[must_use]
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Shopify => &["access_token"],
            Self::WooCommerce => &["consumer_key", "consumer_secret"],
            Self::MercadoLibre => &["client_id", "client_secret", "refresh_token"],
            Self::Siigo => &["username", "access_key"],
            Self::Alegra => &["email", "token"],
            Self::Servientrega => &["user", "password"],
            Self::Coordinadora => &["api_key", "password"],
            Self::MercadoPago => &["access_token"],
            Self::Whatsapp => &["access_token", "phone_number_id"],
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CacheError> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| CacheError::UnknownIntegrationType(code.to_string()))
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
