//! OAuth token repository — operations on the `oauth_tokens` table.

use rusqlite::params;

use super::{Database, DatabaseError};

/// A stored OAuth token set.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub account: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: String,
    pub scope: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TokenRow {
    /// Checks if the token is expired (or expires within `buffer_seconds`).
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        let Ok(expires) = chrono::DateTime::parse_from_rfc3339(&self.expires_at) else {
            return true; // Treat unparseable expiry as expired.
        };
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds.min(365 * 24 * 3600) as i64);
        expires <= now + buffer
    }

    /// Checks if the token can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Inserts or updates a token set.
pub fn upsert(db: &Database, row: &TokenRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO oauth_tokens (account, access_token, refresh_token, expires_at, scope, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account) DO UPDATE SET
               access_token = ?2,
               refresh_token = COALESCE(?3, oauth_tokens.refresh_token),
               expires_at = ?4,
               scope = ?5,
               updated_at = ?7",
            params![
                row.account,
                row.access_token,
                row.refresh_token,
                row.expires_at,
                row.scope,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the token set for an account.
pub fn find(db: &Database, account: &str) -> Result<Option<TokenRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT account, access_token, refresh_token, expires_at, scope, created_at, updated_at
             FROM oauth_tokens WHERE account = ?1",
        )?;
        let mut rows = stmt.query_map(params![account], |row| {
            Ok(TokenRow {
                account: row.get(0)?,
                access_token: row.get(1)?,
                refresh_token: row.get(2)?,
                expires_at: row.get(3)?,
                scope: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes the token set for an account.
pub fn delete(db: &Database, account: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM oauth_tokens WHERE account = ?1",
            params![account],
        )?;
        Ok(())
    })
}
