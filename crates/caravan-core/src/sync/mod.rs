//! Peer synchronization: inbound change application and the HTTP transfer
//! client used to push and pull change feeds between replicas.

mod apply;
mod client;

pub use apply::{ApplyOutcome, ApplySummary, ChangeApplier};
pub use client::{SyncClient, SyncClientError, SyncClientResult};
