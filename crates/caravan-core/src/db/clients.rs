//! Client repository implementation

use crate::error::{Error, Result};
use crate::models::{Client, ClientId};
use chrono::NaiveDate;
use libsql::Connection;

/// Stored format for dates of birth
const DOB_FORMAT: &str = "%Y-%m-%d";

/// Trait for client storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ClientRepository {
    /// Insert a new client
    async fn create(&self, client: &Client) -> Result<()>;

    /// Fetch a client by id
    async fn get(&self, id: &ClientId) -> Result<Option<Client>>;

    /// List clients, optionally filtering by a name/email/phone substring
    async fn list(&self, query: Option<&str>) -> Result<Vec<Client>>;

    /// Overwrite an existing client. Fails with `NotFound` if the id is unknown.
    async fn update(&self, client: &Client) -> Result<()>;

    /// Insert or overwrite a client, keeping dependent bookings intact
    async fn upsert(&self, client: &Client) -> Result<()>;

    /// Delete a client. Returns whether a row was removed.
    async fn delete(&self, id: &ClientId) -> Result<bool>;

    /// Total number of clients
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation of `ClientRepository`
pub struct LibSqlClientRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlClientRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ClientRepository for LibSqlClientRepository<'_> {
    async fn create(&self, client: &Client) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO clients (id, name, email, phone, normalized_phone, dob, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                client_params(client),
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn get(&self, id: &ClientId) -> Result<Option<Client>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, email, phone, normalized_phone, dob, created_at, updated_at
                 FROM clients WHERE id = ?1",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_client(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<Client>> {
        let mut rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let pattern = format!("%{}%", q.to_lowercase());
                self.conn
                    .query(
                        "SELECT id, name, email, phone, normalized_phone, dob, created_at, updated_at
                         FROM clients
                         WHERE lower(name) LIKE ?1 OR lower(email) LIKE ?1 OR phone LIKE ?1
                         ORDER BY name COLLATE NOCASE, created_at",
                        [pattern],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT id, name, email, phone, normalized_phone, dob, created_at, updated_at
                         FROM clients
                         ORDER BY name COLLATE NOCASE, created_at",
                        (),
                    )
                    .await?
            }
        };

        let mut clients = Vec::new();
        while let Some(row) = rows.next().await? {
            clients.push(parse_client(&row)?);
        }
        Ok(clients)
    }

    async fn update(&self, client: &Client) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE clients
                 SET name = ?2, email = ?3, phone = ?4, normalized_phone = ?5, dob = ?6, updated_at = ?8
                 WHERE id = ?1",
                client_params(client),
            )
            .await
            .map_err(Error::from_constraint)?;

        if affected == 0 {
            return Err(Error::NotFound(format!("client {}", client.id)));
        }
        Ok(())
    }

    async fn upsert(&self, client: &Client) -> Result<()> {
        // ON CONFLICT instead of INSERT OR REPLACE: REPLACE deletes the old
        // row first, which would cascade into bookings.
        self.conn
            .execute(
                "INSERT INTO clients (id, name, email, phone, normalized_phone, dob, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     phone = excluded.phone,
                     normalized_phone = excluded.normalized_phone,
                     dob = excluded.dob,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at",
                client_params(client),
            )
            .await
            .map_err(Error::from_constraint)?;
        Ok(())
    }

    async fn delete(&self, id: &ClientId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM clients WHERE id = ?1", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM clients", ()).await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}

fn client_params(client: &Client) -> impl libsql::params::IntoParams {
    libsql::params![
        client.id.as_str(),
        client.name.clone(),
        client.email.clone(),
        client.phone.clone(),
        client.normalized_phone.clone(),
        client.dob.map(|d| d.format(DOB_FORMAT).to_string()),
        client.created_at,
        client.updated_at,
    ]
}

fn parse_client(row: &libsql::Row) -> Result<Client> {
    let id: String = row.get(0)?;
    let dob: Option<String> = row.get(5)?;
    Ok(Client {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid client id: {id}")))?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        normalized_phone: row.get(4)?,
        dob: dob
            .map(|d| NaiveDate::parse_from_str(&d, DOB_FORMAT))
            .transpose()
            .map_err(|e| Error::Database(format!("invalid dob: {e}")))?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
