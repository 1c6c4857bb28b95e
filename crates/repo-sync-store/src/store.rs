use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use repo_sync::{
    CommitOutcome, ContentUnit, Policy, Provenance, RepositoryId, RepositoryVersion, StoreError,
    UnitKey, VersionDelta, VersionStore, validate_delta,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::schema;

/// How long a connection waits on another writer's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const UNIT_COLUMNS: &str = "u.kind, u.name, u.version, u.attributes_json";

/// Narrows [`SqliteVersionStore::search`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// Substring of the unit name, case-insensitive.
    pub name: Option<String>,
    /// Exact unit version.
    pub version: Option<String>,
}

impl UnitFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.version.is_none()
    }
}

/// A SQLite-backed [`VersionStore`].
///
/// Commits run in an immediate transaction and the `(repository, number)`
/// primary key makes a second commit on the same base impossible, even
/// from another process sharing the database file.
pub struct SqliteVersionStore {
    conn: Mutex<Connection>,
}

impl SqliteVersionStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(db)?;
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Units of version `number` matching `filter`, ordered by key.
    pub fn search(
        &self,
        id: &RepositoryId,
        number: u64,
        filter: &UnitFilter,
    ) -> Result<Vec<ContentUnit>, StoreError> {
        let conn = self.conn();
        ensure_version(&conn, id, number)?;
        let name_pattern = filter.name.as_ref().map(|name| format!("%{name}%"));

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {UNIT_COLUMNS}
                 FROM repository_content rc
                 JOIN content_units u ON u.id = rc.unit_id
                 WHERE rc.repository = ?1
                   AND rc.version_added <= ?2
                   AND (rc.version_removed IS NULL OR rc.version_removed > ?2)
                   AND (?3 IS NULL OR u.name LIKE ?3)
                   AND (?4 IS NULL OR u.version = ?4)
                 ORDER BY u.kind, u.name, u.version"
            ))
            .map_err(db)?;

        let units = stmt
            .query_map(
                rusqlite::params![id.as_str(), number as i64, name_pattern, filter.version],
                row_to_unit,
            )
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(units)
    }
}

impl VersionStore for SqliteVersionStore {
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db)?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO repositories (name, created_at) VALUES (?1, ?2)",
                rusqlite::params![id.as_str(), now_epoch_secs()],
            )
            .map_err(db)?;
        if inserted == 0 {
            return Err(StoreError::RepositoryExists(id.clone()));
        }

        tx.execute(
            "INSERT INTO versions (repository, number, created_at) VALUES (?1, 0, ?2)",
            rusqlite::params![id.as_str(), now_epoch_secs()],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;

        tracing::debug!(repository = %id, "created repository");
        Ok(RepositoryVersion::initial(id.clone()))
    }

    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM repositories ORDER BY name")
            .map_err(db)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(names.into_iter().map(RepositoryId::new).collect())
    }

    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        let conn = self.conn();
        let number = latest_number(&conn, id)?;
        Ok(RepositoryVersion {
            repository: id.clone(),
            number,
            content: content_at(&conn, id, number)?,
        })
    }

    fn version(&self, id: &RepositoryId, number: u64) -> Result<RepositoryVersion, StoreError> {
        let conn = self.conn();
        ensure_version(&conn, id, number)?;
        Ok(RepositoryVersion {
            repository: id.clone(),
            number,
            content: content_at(&conn, id, number)?,
        })
    }

    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError> {
        let conn = self.conn();
        latest_number(&conn, id)?;
        let mut stmt = conn
            .prepare("SELECT number FROM versions WHERE repository = ?1 ORDER BY number")
            .map_err(db)?;
        let numbers = stmt
            .query_map([id.as_str()], |row| row.get::<_, i64>(0))
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(numbers.into_iter().map(|n| n as u64).collect())
    }

    fn delta(&self, id: &RepositoryId, number: u64) -> Result<VersionDelta, StoreError> {
        let conn = self.conn();
        let (remote_url, policy) = ensure_version(&conn, id, number)?;

        let provenance = remote_url.map(|remote_url| Provenance {
            remote_url,
            policy: policy
                .as_deref()
                .and_then(Policy::parse)
                .unwrap_or_default(),
        });

        Ok(VersionDelta {
            number,
            added: units_where(&conn, id, "rc.version_added = ?2", number)?,
            removed: units_where(&conn, id, "rc.version_removed = ?2", number)?,
            provenance,
        })
    }

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db)?;

        let actual = latest_number(&tx, id)?;
        if actual != base.number {
            return Err(StoreError::ConcurrentModification {
                repository: id.clone(),
                expected: base.number,
                actual,
            });
        }
        if added.is_empty() && removed.is_empty() {
            return Ok(CommitOutcome::Unchanged(base.clone()));
        }

        // Validate against what is stored, not what the caller claims.
        let stored_base = RepositoryVersion {
            repository: id.clone(),
            number: actual,
            content: content_at(&tx, id, actual)?,
        };
        validate_delta(&stored_base, added, removed)?;

        let number = actual + 1;
        let (remote_url, policy) = match &provenance {
            Some(p) => (Some(p.remote_url.as_str()), Some(p.policy.as_str())),
            None => (None, None),
        };
        tx.execute(
            "INSERT INTO versions (repository, number, remote_url, policy, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id.as_str(), number as i64, remote_url, policy, now_epoch_secs()],
        )
        .map_err(db)?;

        for unit in removed {
            tx.execute(
                "UPDATE repository_content SET version_removed = ?1
                 WHERE repository = ?2
                   AND version_removed IS NULL
                   AND unit_id = (SELECT id FROM content_units
                                  WHERE kind = ?3 AND name = ?4 AND version = ?5)",
                rusqlite::params![
                    number as i64,
                    id.as_str(),
                    unit.kind(),
                    unit.name(),
                    unit.version()
                ],
            )
            .map_err(db)?;
        }

        for unit in added {
            let unit_id = upsert_unit(&tx, unit)?;
            tx.execute(
                "INSERT INTO repository_content (repository, unit_id, version_added)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![id.as_str(), unit_id, number as i64],
            )
            .map_err(db)?;
        }

        let content = content_at(&tx, id, number)?;
        tx.commit().map_err(db)?;

        tracing::debug!(
            repository = %id,
            version = number,
            added = added.len(),
            removed = removed.len(),
            "committed version"
        );

        Ok(CommitOutcome::Created(RepositoryVersion {
            repository: id.clone(),
            number,
            content,
        }))
    }
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn latest_number(conn: &Connection, id: &RepositoryId) -> Result<u64, StoreError> {
    let latest: Option<i64> = conn
        .query_row(
            "SELECT MAX(number) FROM versions WHERE repository = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .map_err(db)?;
    latest
        .map(|n| n as u64)
        .ok_or_else(|| StoreError::RepositoryNotFound(id.clone()))
}

/// Fails unless `number` exists. Returns the version's provenance columns.
fn ensure_version(
    conn: &Connection,
    id: &RepositoryId,
    number: u64,
) -> Result<(Option<String>, Option<String>), StoreError> {
    let row = conn
        .query_row(
            "SELECT remote_url, policy FROM versions WHERE repository = ?1 AND number = ?2",
            rusqlite::params![id.as_str(), number as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db)?;

    match row {
        Some(columns) => Ok(columns),
        None => {
            latest_number(conn, id)?;
            Err(StoreError::VersionNotFound {
                repository: id.clone(),
                number,
            })
        }
    }
}

fn content_at(
    conn: &Connection,
    id: &RepositoryId,
    number: u64,
) -> Result<BTreeSet<ContentUnit>, StoreError> {
    units_where(
        conn,
        id,
        "rc.version_added <= ?2 AND (rc.version_removed IS NULL OR rc.version_removed > ?2)",
        number,
    )
}

fn units_where(
    conn: &Connection,
    id: &RepositoryId,
    condition: &str,
    number: u64,
) -> Result<BTreeSet<ContentUnit>, StoreError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {UNIT_COLUMNS}
             FROM repository_content rc
             JOIN content_units u ON u.id = rc.unit_id
             WHERE rc.repository = ?1 AND {condition}"
        ))
        .map_err(db)?;

    let units = stmt
        .query_map(rusqlite::params![id.as_str(), number as i64], row_to_unit)
        .map_err(db)?
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .map_err(db)?;
    Ok(units)
}

/// Insert a unit if its key is new. An existing row keeps its attributes.
fn upsert_unit(conn: &Connection, unit: &ContentUnit) -> Result<i64, StoreError> {
    let attributes_json =
        serde_json::to_string(unit.attributes()).map_err(|e| StoreError::Database(e.to_string()))?;

    conn.execute(
        "INSERT OR IGNORE INTO content_units (kind, name, version, attributes_json)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![unit.kind(), unit.name(), unit.version(), attributes_json],
    )
    .map_err(db)?;

    conn.query_row(
        "SELECT id FROM content_units WHERE kind = ?1 AND name = ?2 AND version = ?3",
        rusqlite::params![unit.kind(), unit.name(), unit.version()],
        |row| row.get(0),
    )
    .map_err(db)
}

fn row_to_unit(row: &rusqlite::Row) -> rusqlite::Result<ContentUnit> {
    let kind: String = row.get(0)?;
    let name: String = row.get(1)?;
    let version: String = row.get(2)?;
    let attributes_json: String = row.get(3)?;

    let attributes: BTreeMap<String, String> =
        serde_json::from_str(&attributes_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ContentUnit::new(UnitKey::new(kind, name, version)).with_attributes(attributes))
}

fn now_epoch_secs() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}
