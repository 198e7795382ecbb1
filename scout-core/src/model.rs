//! Model configuration types

use crate::{ConfigId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MODEL IDENTITY
// ============================================================================

/// The (provider, model, version) triple identifying an active configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub provider: String,
    pub model: String,
    pub version: String,
}

impl ModelIdentity {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            version: version.into(),
        }
    }

    /// `provider/model@version`, used in logs where the version matters.
    pub fn versioned(&self) -> String {
        format!("{}/{}@{}", self.provider, self.model, self.version)
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

// ============================================================================
// TIER ENUM (replaces String)
// ============================================================================

/// Pricing tier of a model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

impl ModelTier {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ModelTier::Economy => "ECONOMY",
            ModelTier::Standard => "STANDARD",
            ModelTier::Premium => "PREMIUM",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ModelTierParseError> {
        match s.to_lowercase().as_str() {
            "economy" => Ok(ModelTier::Economy),
            "standard" => Ok(ModelTier::Standard),
            "premium" => Ok(ModelTier::Premium),
            _ => Err(ModelTierParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ModelTier {
    type Err = ModelTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid tier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTierParseError(pub String);

impl fmt::Display for ModelTierParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid model tier: {}", self.0)
    }
}

impl std::error::Error for ModelTierParseError {}

// ============================================================================
// CAPABILITIES & PRICING
// ============================================================================

/// Numeric capability scores reported by research (0.0 to 10.0 scale).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub quality: f64,
    pub speed: f64,
    pub context_window: f64,
    pub reasoning: f64,
    pub code_quality: f64,
}

/// Price per million tokens in USD.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

// ============================================================================
// STORE ROWS
// ============================================================================

/// A persisted model configuration row.
///
/// `updated_at` strictly increases across successful writes and is the only
/// signal caches use to detect staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigStoreRow {
    pub id: ConfigId,
    pub provider: String,
    pub model: String,
    pub version: String,
    /// Consumer role this row applies to. `None` applies to every role.
    pub role: Option<String>,
    pub updated_at: Timestamp,
    pub capabilities: Capabilities,
    pub pricing: Pricing,
    pub tier: ModelTier,
    pub reason: Option<String>,
}

impl ConfigStoreRow {
    pub fn identity(&self) -> ModelIdentity {
        ModelIdentity::new(&self.provider, &self.model, &self.version)
    }
}

/// Write payload for a new configuration row. The store assigns `id` and
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConfigRow {
    pub provider: String,
    pub model: String,
    pub version: String,
    pub role: Option<String>,
    pub capabilities: Capabilities,
    pub pricing: Pricing,
    pub tier: ModelTier,
    pub reason: Option<String>,
}

impl NewConfigRow {
    pub fn identity(&self) -> ModelIdentity {
        ModelIdentity::new(&self.provider, &self.model, &self.version)
    }
}

/// Filter criteria for reading the latest configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFilter {
    pub role: Option<String>,
}

impl ConfigFilter {
    /// Filter matching every row.
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter for rows applying to `role` (including role-less rows).
    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
        }
    }

    pub fn matches(&self, row: &ConfigStoreRow) -> bool {
        match (&self.role, &row.role) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(wanted), Some(actual)) => wanted == actual,
        }
    }

    /// Role label for logs and errors.
    pub fn role_label(&self) -> &str {
        self.role.as_deref().unwrap_or("*")
    }
}
