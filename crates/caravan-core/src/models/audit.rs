//! Audit trail entries

use serde::{Deserialize, Serialize};

/// A recorded mutation with before/after snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row id, assigned by the database
    pub id: i64,
    /// What happened ("create", "update", "delete", "merge")
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    /// Entity state before the mutation
    pub before: Option<serde_json::Value>,
    /// Entity state after the mutation
    pub after: Option<serde_json::Value>,
    /// When the mutation happened (Unix ms)
    pub timestamp: i64,
}
