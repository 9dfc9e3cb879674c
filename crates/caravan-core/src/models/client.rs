//! Client model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::phone::normalize_phone;

/// A unique identifier for a client, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new unique client ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A client record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier
    pub id: ClientId,
    /// Full name
    pub name: String,
    /// Email address, compared case-insensitively
    pub email: Option<String>,
    /// Phone number as entered
    pub phone: Option<String>,
    /// Digits-only phone form kept alongside the raw value
    pub normalized_phone: Option<String>,
    /// Date of birth
    pub dob: Option<NaiveDate>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

/// Incoming client fields before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
}

impl Client {
    /// Create a new client from a draft, trimming fields and deriving the
    /// normalized phone form
    #[must_use]
    pub fn from_draft(draft: &ClientDraft) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let phone = clean(draft.phone.as_deref());
        Self {
            id: ClientId::new(),
            name: draft.name.trim().to_string(),
            email: clean(draft.email.as_deref()),
            normalized_phone: phone.as_deref().and_then(normalize_phone),
            phone,
            dob: draft.dob,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite this client's editable fields from a draft and bump
    /// `updated_at`
    pub fn apply_draft(&mut self, draft: &ClientDraft) {
        let phone = clean(draft.phone.as_deref());
        self.name = draft.name.trim().to_string();
        self.email = clean(draft.email.as_deref());
        self.normalized_phone = phone.as_deref().and_then(normalize_phone);
        self.phone = phone;
        self.dob = draft.dob;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// Trim an optional field, mapping whitespace-only values to `None`
fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
