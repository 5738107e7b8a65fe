//! CORRAL Core - Shared Types
//!
//! Record types, identities, errors and configuration shared by the storage
//! and API crates. No behavior beyond parsing and validation lives here.

pub mod config;
pub mod error;

pub use config::{
    env_or, BucketConfig, CacheConfig, CorralConfig, QueueConfig, RateLimitConfig,
};
pub use error::{
    ConfigError, CorralError, CorralResult, FetchError, QueueError, RateLimitError,
    ValidationError,
};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RECORDS
// ============================================================================

/// Key of a user record in the backing store.
pub type UserId = u64;

/// The record served by the lookup layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Parse a raw lookup key into a [`UserId`].
///
/// Surrounding whitespace is ignored; anything else that is not a plain
/// non-negative integer is rejected.
pub fn parse_user_id(raw: &str) -> Result<UserId, ValidationError> {
    raw.trim()
        .parse::<UserId>()
        .map_err(|_| ValidationError::InvalidValue {
            field: "id".to_string(),
            reason: format!("'{}' is not a valid user id", raw),
        })
}

// ============================================================================
// CLIENT IDENTITY
// ============================================================================

/// Identity the rate limiter keys its buckets by.
///
/// Construction fails for blank input so a missing identity can never be
/// mistaken for a real client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str) -> Result<Self, RateLimitError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RateLimitError::InvalidClient {
                reason: "client identifier is empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ClientId {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
