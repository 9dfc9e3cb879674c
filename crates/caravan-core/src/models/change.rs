//! Change feed records
//!
//! Every local mutation appends one row to the outbox. Records carry a
//! per-entity logical clock for conflict ordering and a global sequence for
//! feed pagination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The closed set of entity types that participate in the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Trip,
    Booking,
}

impl EntityKind {
    /// Parse a wire-format entity type. Returns `None` for types this replica
    /// does not know, which callers skip rather than reject.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Self::Client),
            "trip" => Some(Self::Trip),
            "booking" => Some(Self::Booking),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Trip => "trip",
            Self::Booking => "booking",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of mutation a change record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown change op: {other}"))),
        }
    }
}

/// One appended change. `sequence` is the replica-local feed position and is
/// never reused; `logical_clock` orders changes within a single entity's
/// lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub sequence: i64,
    /// Entity type as a wire string so unknown types survive relay
    pub entity_type: String,
    pub entity_id: String,
    pub logical_clock: i64,
    pub op: ChangeOp,
    /// Full entity snapshot for create/update, absent for delete
    pub payload: Option<serde_json::Value>,
    /// Wall-clock timestamp (Unix ms), tie-breaker between equal clocks
    pub updated_at: i64,
}

impl ChangeRecord {
    /// The entity type, if this replica recognizes it
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        EntityKind::parse(&self.entity_type)
    }

    /// The (logical clock, wall clock) pair used for newest-wins comparison
    #[must_use]
    pub const fn version(&self) -> (i64, i64) {
        (self.logical_clock, self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("client"), Some(EntityKind::Client));
        assert_eq!(EntityKind::parse("trip"), Some(EntityKind::Trip));
        assert_eq!(EntityKind::parse("booking"), Some(EntityKind::Booking));
        assert_eq!(EntityKind::parse("vehicle"), None);
    }

    #[test]
    fn test_change_op_round_trip() {
        for op in [ChangeOp::Create, ChangeOp::Update, ChangeOp::Delete] {
            assert_eq!(op.as_str().parse::<ChangeOp>().unwrap(), op);
        }
        assert!("merge".parse::<ChangeOp>().is_err());
    }

    #[test]
    fn test_change_record_wire_shape() {
        let record = ChangeRecord {
            sequence: 7,
            entity_type: "client".to_string(),
            entity_id: "abc".to_string(),
            logical_clock: 3,
            op: ChangeOp::Update,
            payload: Some(serde_json::json!({"name": "Alice"})),
            updated_at: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["op"], "update");
        assert_eq!(value["logical_clock"], 3);
        assert_eq!(record.kind(), Some(EntityKind::Client));
        assert_eq!(record.version(), (3, 1_700_000_000_000));
    }
}
