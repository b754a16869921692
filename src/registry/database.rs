//! `SQLite` database for card records.

use crate::card::{CardDetails, CardRecord, CardType, StoredArtifact};
use crate::error::{CardexError, Result};
use crate::version::{SemVer, VersionQuery};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Default row cap for unfiltered listings.
pub const DEFAULT_LIST_LIMIT: usize = 25;

const COLUMNS: &str = "uid, name, repository, contact, version, major, minor, patch, \
                       pre_tag, build_tag, timestamp, tags_json, details_json, artifacts_json, uri";

/// Most recent first: highest core, official before prerelease, newest row.
const RECENCY: &str =
    "ORDER BY major DESC, minor DESC, patch DESC, (pre_tag IS NULL) DESC, timestamp DESC";

// Extended result code for a PRIMARY KEY violation.
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;

/// Filters for [`RegistryDb::list`]. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFilter {
    /// Exact uid.
    pub uid: Option<String>,
    /// Exact (normalized) name.
    pub name: Option<String>,
    /// Exact (normalized) repository.
    pub repository: Option<String>,
    /// Version query.
    pub version: Option<VersionQuery>,
    /// Tags that must all be present with equal values.
    pub tags: BTreeMap<String, String>,
    /// Only records inserted at or before this timestamp (microseconds).
    pub max_timestamp: Option<i64>,
    /// Maximum number of records.
    pub limit: Option<usize>,
}

impl CardFilter {
    /// An empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a uid.
    #[must_use]
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Match a name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Match a repository.
    #[must_use]
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Match a version query such as `1.2.0`, `1`, `1.*`, `^1.2` or `~1.2.3`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is malformed.
    pub fn version(mut self, query: &str) -> Result<Self> {
        self.version = Some(VersionQuery::parse(query)?);
        Ok(self)
    }

    /// Require a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Only records at or before `timestamp`.
    #[must_use]
    pub fn max_timestamp(mut self, timestamp: i64) -> Self {
        self.max_timestamp = Some(timestamp);
        self
    }

    /// Cap the number of records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when no filter and no limit is set.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.uid.is_none()
            && self.name.is_none()
            && self.repository.is_none()
            && self.version.is_none()
            && self.tags.is_empty()
            && self.max_timestamp.is_none()
            && self.limit.is_none()
    }

    fn matches(&self, record: &CardRecord) -> bool {
        self.version.as_ref().map_or(true, |q| q.matches(&record.version))
            && self
                .tags
                .iter()
                .all(|(k, v)| record.tags.get(k) == Some(v))
    }
}

/// `SQLite` database with one table per card type.
pub struct RegistryDb {
    conn: Mutex<Connection>,
    default_limit: usize,
}

impl std::fmt::Debug for RegistryDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDb")
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

impl RegistryDb {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
            default_limit: DEFAULT_LIST_LIMIT,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Set the row cap for unfiltered listings.
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        for card_type in CardType::all() {
            let table = card_type.table();
            conn.execute_batch(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {table} (
                    uid TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    repository TEXT NOT NULL,
                    contact TEXT NOT NULL,
                    version TEXT NOT NULL,
                    major INTEGER NOT NULL,
                    minor INTEGER NOT NULL,
                    patch INTEGER NOT NULL,
                    pre_tag TEXT,
                    build_tag TEXT,
                    timestamp INTEGER NOT NULL,
                    tags_json TEXT NOT NULL,
                    details_json TEXT NOT NULL,
                    artifacts_json TEXT NOT NULL,
                    uri TEXT NOT NULL,
                    UNIQUE(name, repository, version)
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_name_repo ON {table}(name, repository);
                CREATE INDEX IF NOT EXISTS idx_{table}_version ON {table}(version);
                ",
            ))?;
        }
        Ok(())
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::DuplicateUid`] or [`CardexError::DuplicateVersion`]
    /// on an integrity violation.
    pub fn insert(&self, record: &CardRecord) -> Result<()> {
        let table = record.card_type.table();
        let row = RowValues::from_record(record)?;
        let conn = self.conn.lock();

        if exists(&conn, table, "uid = ?1", params![record.uid])? {
            return Err(duplicate_uid(record));
        }
        let version = record.version.to_string();
        if exists(
            &conn,
            table,
            "name = ?1 AND repository = ?2 AND version = ?3",
            params![record.name, record.repository, version],
        )? {
            return Err(duplicate_version(record));
        }

        conn.execute(
            &format!(
                "INSERT INTO {table} ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                record.uid,
                record.name,
                record.repository,
                record.contact,
                version,
                record.version.major,
                record.version.minor,
                record.version.patch,
                row.pre_tag,
                row.build_tag,
                record.timestamp,
                row.tags_json,
                row.details_json,
                row.artifacts_json,
                record.uri,
            ],
        )
        .map_err(|e| {
            let code = e.sqlite_error().map(|err| (err.code, err.extended_code));
            match code {
                // Another process won the race between the checks and the insert
                Some((ErrorCode::ConstraintViolation, SQLITE_CONSTRAINT_PRIMARYKEY)) => {
                    duplicate_uid(record)
                }
                Some((ErrorCode::ConstraintViolation, _)) => duplicate_version(record),
                _ => CardexError::Database(e),
            }
        })?;
        Ok(())
    }

    /// Replace the record with the same uid.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has this uid.
    pub fn update(&self, record: &CardRecord) -> Result<()> {
        let table = record.card_type.table();
        let row = RowValues::from_record(record)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            &format!(
                "UPDATE {table} SET name = ?2, repository = ?3, contact = ?4, version = ?5,
                     major = ?6, minor = ?7, patch = ?8, pre_tag = ?9, build_tag = ?10,
                     timestamp = ?11, tags_json = ?12, details_json = ?13,
                     artifacts_json = ?14, uri = ?15
                 WHERE uid = ?1"
            ),
            params![
                record.uid,
                record.name,
                record.repository,
                record.contact,
                record.version.to_string(),
                record.version.major,
                record.version.minor,
                record.version.patch,
                row.pre_tag,
                row.build_tag,
                record.timestamp,
                row.tags_json,
                row.details_json,
                row.artifacts_json,
                record.uri,
            ],
        )?;
        if changed == 0 {
            return Err(CardexError::not_found(table, &record.uid));
        }
        Ok(())
    }

    /// Get a record by uid.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has this uid.
    pub fn get(&self, card_type: CardType, uid: &str) -> Result<CardRecord> {
        let table = card_type.table();
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {table} WHERE uid = ?1"),
                params![uid],
                RawRecord::from_row,
            )
            .optional()?;
        row.ok_or_else(|| CardexError::not_found(table, uid))?
            .into_record(card_type)
    }

    /// Check whether a uid exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn contains(&self, card_type: CardType, uid: &str) -> Result<bool> {
        let conn = self.conn.lock();
        exists(&conn, card_type.table(), "uid = ?1", params![uid])
    }

    /// Versions of a `(name, repository)` pair, most recent first, optionally
    /// restricted to a numeric prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored version is malformed.
    pub fn get_versions(
        &self,
        card_type: CardType,
        name: &str,
        repository: &str,
        prefix: Option<&SemVer>,
    ) -> Result<Vec<SemVer>> {
        let table = card_type.table();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT version FROM {table} WHERE name = ?1 AND repository = ?2 {RECENCY}"
        ))?;
        let rows = stmt.query_map(params![name, repository], |row| row.get::<_, String>(0))?;

        let mut versions = Vec::new();
        for row in rows {
            let version = SemVer::parse(&row?)?;
            if prefix.map_or(true, |p| version.has_prefix(p)) {
                versions.push(version);
            }
        }
        Ok(versions)
    }

    /// List records matching a filter, most recent first.
    ///
    /// An unfiltered listing is capped at the default limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, card_type: CardType, filter: &CardFilter) -> Result<Vec<CardRecord>> {
        let table = card_type.table();
        let limit = if filter.is_unfiltered() {
            Some(self.default_limit)
        } else {
            filter.limit
        };

        let mut clauses = vec!["1 = 1".to_string()];
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut push = |column: &str, value: rusqlite::types::Value, op: &str| {
            values.push(value);
            clauses.push(format!("{column} {op} ?{}", values.len()));
        };
        if let Some(ref uid) = filter.uid {
            push("uid", uid.clone().into(), "=");
        }
        if let Some(ref name) = filter.name {
            push("name", name.clone().into(), "=");
        }
        if let Some(ref repository) = filter.repository {
            push("repository", repository.clone().into(), "=");
        }
        if let Some(max) = filter.max_timestamp {
            push("timestamp", max.into(), "<=");
        }

        let sql = format!(
            "SELECT {COLUMNS} FROM {table} WHERE {} {RECENCY}",
            clauses.join(" AND ")
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), RawRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            if limit.is_some_and(|n| records.len() >= n) {
                break;
            }
            let record = row?.into_record(card_type)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete a record by uid.
    ///
    /// # Errors
    ///
    /// Returns [`CardexError::NotFound`] if no record has this uid.
    pub fn delete(&self, card_type: CardType, uid: &str) -> Result<()> {
        let table = card_type.table();
        let conn = self.conn.lock();
        let changed = conn.execute(&format!("DELETE FROM {table} WHERE uid = ?1"), params![uid])?;
        if changed == 0 {
            return Err(CardexError::not_found(table, uid));
        }
        Ok(())
    }

    /// Number of records of a card type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, card_type: CardType) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", card_type.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Distinct `(repository, name)` pairs of a card type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_names(&self, card_type: CardType) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT repository, name FROM {} ORDER BY repository, name",
            card_type.table()
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn exists(conn: &Connection, table: &str, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {clause}"),
        params,
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn duplicate_uid(record: &CardRecord) -> CardexError {
    CardexError::DuplicateUid {
        table: record.card_type.table().to_string(),
        uid: record.uid.clone(),
    }
}

fn duplicate_version(record: &CardRecord) -> CardexError {
    CardexError::DuplicateVersion {
        table: record.card_type.table().to_string(),
        repository: record.repository.clone(),
        name: record.name.clone(),
        version: record.version.to_string(),
    }
}

/// Serialized columns shared by insert and update.
struct RowValues {
    pre_tag: Option<String>,
    build_tag: Option<String>,
    tags_json: String,
    details_json: String,
    artifacts_json: String,
}

impl RowValues {
    fn from_record(record: &CardRecord) -> Result<Self> {
        if !record.version.is_full() {
            return Err(CardexError::InvalidVersion(format!(
                "partial version '{}' cannot be stored",
                record.version
            )));
        }
        if record.details.card_type() != record.card_type {
            return Err(CardexError::Validation(format!(
                "{} details cannot be stored in {}",
                record.details.card_type(),
                record.card_type.table()
            )));
        }
        Ok(Self {
            pre_tag: record.version.prerelease.as_ref().map(|l| l.tag.clone()),
            build_tag: record.version.build.as_ref().map(|l| l.tag.clone()),
            tags_json: serde_json::to_string(&record.tags)?,
            details_json: serde_json::to_string(&record.details)?,
            artifacts_json: serde_json::to_string(&record.artifacts)?,
        })
    }
}

/// A row as read from the database, before JSON decoding.
struct RawRecord {
    uid: String,
    name: String,
    repository: String,
    contact: String,
    version: String,
    timestamp: i64,
    tags_json: String,
    details_json: String,
    artifacts_json: String,
    uri: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            name: row.get(1)?,
            repository: row.get(2)?,
            contact: row.get(3)?,
            version: row.get(4)?,
            timestamp: row.get(10)?,
            tags_json: row.get(11)?,
            details_json: row.get(12)?,
            artifacts_json: row.get(13)?,
            uri: row.get(14)?,
        })
    }

    fn into_record(self, card_type: CardType) -> Result<CardRecord> {
        let details: CardDetails = serde_json::from_str(&self.details_json)?;
        let artifacts: BTreeMap<String, StoredArtifact> = serde_json::from_str(&self.artifacts_json)?;
        Ok(CardRecord {
            uid: self.uid,
            card_type,
            name: self.name,
            repository: self.repository,
            contact: self.contact,
            version: SemVer::parse(&self.version)?,
            tags: serde_json::from_str(&self.tags_json)?,
            timestamp: self.timestamp,
            details,
            uri: self.uri,
            artifacts,
        })
    }
}
