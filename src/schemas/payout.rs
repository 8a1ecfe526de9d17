//! Payout Schemas
//!
//! Configured per-article rates and the derived payout rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::RateType;
use crate::error::{NewsdeskError, Result};

/// Name of the source rule used when no specific source rule matches
pub const DEFAULT_SOURCE: &str = "Default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub rate: f64,
    #[serde(rename = "type")]
    pub rate_type: RateType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutRate {
    /// Creates a rule for a source name
    pub fn for_source(source: impl Into<String>, rate: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: Some(source.into()),
            author: None,
            rate,
            rate_type: RateType::Source,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a rule for an author name
    pub fn for_author(author: impl Into<String>, rate: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: None,
            author: Some(author.into()),
            rate,
            rate_type: RateType::Author,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name this rule targets, according to its type
    pub fn target(&self) -> Option<&str> {
        match self.rate_type {
            RateType::Source => self.source.as_deref(),
            RateType::Author => self.author.as_deref(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(NewsdeskError::ValidationError(format!(
                "rate must be a non-negative number, got {}",
                self.rate
            )));
        }
        match self.target() {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(NewsdeskError::ValidationError(format!(
                "{} rate requires a {} name",
                self.rate_type,
                self.rate_type
            ))),
        }
    }
}

/// Derived payout row, recomputed on every aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutData {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub articles: usize,
    pub rate: f64,
    pub total: f64,
    #[serde(rename = "type")]
    pub payout_type: RateType,
}
