use crate::schema::MIG_0001_INIT;
use crate::StoreError;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

const CREDENTIAL_KEY: &str = "credential_sha256";

/// One open storage connection. Owned by exactly one worker at a time.
pub struct Db {
    pub conn: Connection,
    in_tx: bool,
}

impl Db {
    /// Open (creating if needed) the database at `path`. `busy_timeout` bounds
    /// how long any statement, including the schema migration, waits on locks
    /// held by other workers.
    pub fn open_or_create(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn, in_tx: false })
    }

    /// Bind the database to a credential. The first connection records the
    /// digest; every later connection must present the same secret.
    pub fn authorize(&self, credential: &str) -> Result<(), StoreError> {
        let digest = hex::encode(Sha256::digest(credential.as_bytes()));
        self.conn.execute(
            "INSERT INTO ingest_meta(key,value) VALUES (?1,?2) ON CONFLICT(key) DO NOTHING",
            [CREDENTIAL_KEY, digest.as_str()],
        )?;
        let stored: String = self.conn.query_row(
            "SELECT value FROM ingest_meta WHERE key=?1",
            [CREDENTIAL_KEY],
            |r| r.get(0),
        )?;
        if stored != digest {
            return Err(StoreError::Unauthorized);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn in_transaction(&self) -> bool {
        self.in_tx
    }

    pub fn begin(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_tx = true;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Err(StoreError::NoTransaction);
        }
        // The flag is cleared first: a failed COMMIT leaves the connection
        // unusable for this worker, which discards it.
        self.in_tx = false;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    // A returned COMMIT must survive power loss: the worker drops the batch
    // and never re-reads those lines.
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='flows'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
        tracing::info!("storage schema initialised");
    }
    Ok(())
}
