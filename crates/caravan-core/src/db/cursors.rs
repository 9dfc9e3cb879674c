//! Pull cursor repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for per-peer pull cursor storage (async)
#[allow(async_fn_in_trait)]
pub trait CursorRepository {
    /// The last feed sequence pulled from a peer, 0 when never pulled
    async fn get(&self, peer: &str) -> Result<i64>;

    /// Advance the cursor for a peer
    async fn set(&self, peer: &str, last_sequence: i64) -> Result<()>;

    /// All known peers with their cursor positions
    async fn list(&self) -> Result<Vec<(String, i64)>>;
}

/// libSQL implementation of `CursorRepository`
pub struct LibSqlCursorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCursorRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CursorRepository for LibSqlCursorRepository<'_> {
    async fn get(&self, peer: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_sequence FROM sync_cursors WHERE peer = ?1",
                [peer],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    async fn set(&self, peer: &str, last_sequence: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_cursors (peer, last_sequence, updated_at)
                 VALUES (?1, ?2, ?3)",
                libsql::params![
                    peer,
                    last_sequence,
                    chrono::Utc::now().timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(String, i64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT peer, last_sequence FROM sync_cursors ORDER BY peer",
                (),
            )
            .await?;

        let mut cursors = Vec::new();
        while let Some(row) = rows.next().await? {
            cursors.push((row.get(0)?, row.get(1)?));
        }
        Ok(cursors)
    }
}
