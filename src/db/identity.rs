//! Identity resolution: free-text values to stable dictionary ids.
//!
//! Each [`KeyType`] owns one dictionary table `{id, name}` whose `name` is
//! unique. [`get_or_create`] is the only way ids are minted, so within one
//! key type the value/id mapping stays a bijection across runs. Id `0` is
//! reserved for "unknown" and is what a missing value resolves to.
//!
//! Album, genre and organization are also stored inline on `music` as
//! `(value, value_id)` column pairs. Databases written by older ingestion
//! code may hold inline ids that never went through a dictionary;
//! [`reconcile`] checks those pairings before trusting them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};

use super::schema::Table;
use crate::error::{Error, Result};

/// Reserved id meaning "absent/unknown" in every dictionary.
pub const SENTINEL_ID: i64 = 0;

/// Tag text that older files and older catalogs use for a missing value.
pub const UNKNOWN: &str = "Unknown";

/// A dictionary-backed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyType {
    Artist,
    Genre,
    Organization,
    Album,
}

impl KeyType {
    /// Key types stored inline on `music` as a `(value, value_id)` pair.
    pub const INLINE: [KeyType; 3] = [KeyType::Album, KeyType::Genre, KeyType::Organization];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Artist => "artist",
            KeyType::Genre => "genre",
            KeyType::Organization => "organization",
            KeyType::Album => "album",
        }
    }

    /// Dictionary table holding this key's values.
    pub fn table(&self) -> Table {
        match self {
            KeyType::Artist => Table::Artists,
            KeyType::Genre => Table::Genres,
            KeyType::Organization => Table::Organizations,
            KeyType::Album => Table::Albums,
        }
    }

    /// Text column on `music`.
    pub fn value_column(&self) -> &'static str {
        self.as_str()
    }

    /// Inline id column on `music`, if this key has one.
    pub fn id_column(&self) -> Option<&'static str> {
        match self {
            KeyType::Artist => None,
            KeyType::Genre => Some("genre_id"),
            KeyType::Organization => Some("organization_id"),
            KeyType::Album => Some("album_id"),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution chosen up front for a non-bijective inline mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Leave the inline ids untouched and skip reconciliation for the key.
    Keep,
    /// Discard the inline ids and reassign all of them through the dictionary.
    Reset,
}

/// Treat blank text and the literal "Unknown" as a missing value.
///
/// Other values pass through unchanged: the dictionary matches exact text.
pub fn normalize(value: Option<&str>) -> Option<&str> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && v != UNKNOWN
    })
}

/// `INSERT` minting the next id for `key`'s dictionary.
///
/// The id is above both the dictionary's ids and any inline id on `music`,
/// so a fresh value never lands on an id that unreconciled legacy rows
/// already use.
fn insert_sql(key: KeyType) -> String {
    let table = key.table().name();
    let inline_max = match key.id_column() {
        Some(id_col) => format!(
            " UNION ALL SELECT MAX({id_col}) FROM music WHERE typeof({id_col}) = 'integer'"
        ),
        None => String::new(),
    };
    format!(
        "INSERT INTO {table} (id, name)
         SELECT COALESCE(MAX(top), 0) + 1, ?
         FROM (SELECT MAX(id) AS top FROM {table}{inline_max})
         WHERE true
         ON CONFLICT(name) DO NOTHING"
    )
}

/// Look up `value` in the dictionary for `key`, inserting it if absent.
///
/// A missing value resolves to [`SENTINEL_ID`] without touching the table.
/// An existing value is returned without a write. New values get
/// `max(id) + 1`, counting inline ids on `music` too.
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    key: KeyType,
    value: Option<&str>,
) -> sqlx::Result<i64> {
    let Some(name) = normalize(value) else {
        return Ok(SENTINEL_ID);
    };
    let table = key.table().name();
    let select = format!("SELECT id FROM {table} WHERE name = ?");

    let existing: Option<i64> = sqlx::query_scalar(&select)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    // ON CONFLICT keeps this safe if a reader-side connection raced us
    sqlx::query(&insert_sql(key))
        .bind(name)
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar(&select)
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    debug!(target: "identity", key = %key, name, id, "Created dictionary entry");
    Ok(id)
}

/// Pool convenience wrapper around [`get_or_create`].
#[cfg(test)]
pub async fn get_or_create_in(pool: &SqlitePool, key: KeyType, value: Option<&str>) -> sqlx::Result<i64> {
    let mut conn = pool.acquire().await?;
    get_or_create(&mut *conn, key, value).await
}

/// Values mapped to several ids and ids mapped to several values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    pub duplicate_values: Vec<String>,
    pub duplicate_ids: Vec<i64>,
}

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.duplicate_values.is_empty() && self.duplicate_ids.is_empty()
    }
}

/// Check that a set of `(value, id)` pairs is one-to-one.
///
/// A real value paired with the sentinel id is also a violation: id 0 only
/// ever means "unknown".
pub fn check_bijective<'a>(pairs: impl IntoIterator<Item = (&'a str, i64)>) -> Violations {
    let mut ids_by_value: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
    let mut values_by_id: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
    for (value, id) in pairs {
        ids_by_value.entry(value).or_default().insert(id);
        values_by_id.entry(id).or_default().insert(value);
    }

    Violations {
        duplicate_values: ids_by_value
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(value, _)| value.to_string())
            .collect(),
        duplicate_ids: values_by_id
            .into_iter()
            .filter(|(id, values)| values.len() > 1 || *id == SENTINEL_ID)
            .map(|(id, _)| id)
            .collect(),
    }
}

/// What [`reconcile`] did for one key type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Legacy pairs copied into the dictionary with their existing ids
    pub seeded: u64,
    /// Tracks that received a fresh id
    pub assigned: u64,
    /// Inline ids were discarded under [`ConflictPolicy::Reset`]
    pub reset: bool,
    /// A conflict was found and left in place under [`ConflictPolicy::Keep`]
    pub kept_conflict: bool,
}

/// Verify and repair the inline `(value, value_id)` columns for one key.
///
/// 1. Legacy `'Unknown'` ids and ids on unknown values are cleared.
/// 2. Distinct non-null pairs from `music` plus the dictionary's own rows
///    are checked with [`check_bijective`].
/// 3. On conflict, `policy` decides: `None` returns
///    [`Error::IdentityConflict`] and changes nothing, `Keep` skips this key,
///    `Reset` clears every inline id for this key.
/// 4. Pairs missing from the dictionary are seeded with their ids.
/// 5. Tracks still lacking an id get one through [`get_or_create`].
///
/// Everything happens in one transaction.
pub async fn reconcile(
    pool: &SqlitePool,
    key: KeyType,
    policy: Option<ConflictPolicy>,
) -> Result<ReconcileReport> {
    let Some(id_col) = key.id_column() else {
        return Ok(ReconcileReport::default());
    };
    let val_col = key.value_column();
    let table = key.table().name();
    let mut report = ReconcileReport::default();
    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "UPDATE music SET {id_col} = NULL
         WHERE {id_col} = '{UNKNOWN}' OR {val_col} IS NULL OR trim({val_col}) IN ('', '{UNKNOWN}')"
    ))
    .execute(&mut *tx)
    .await?;

    let pairs: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT DISTINCT {val_col}, {id_col} FROM music WHERE {id_col} IS NOT NULL
         UNION
         SELECT name, id FROM {table} WHERE name IS NOT NULL"
    ))
    .fetch_all(&mut *tx)
    .await?;

    let violations = check_bijective(pairs.iter().map(|(v, id)| (v.as_str(), *id)));
    let mut trusted = pairs.as_slice();

    if !violations.is_empty() {
        error!(
            target: "identity",
            key = %key,
            values = ?violations.duplicate_values,
            ids = ?violations.duplicate_ids,
            "Inline ids are not one-to-one"
        );
        match policy {
            None => {
                tx.rollback().await?;
                return Err(Error::IdentityConflict {
                    key,
                    duplicate_values: violations.duplicate_values,
                    duplicate_ids: violations.duplicate_ids,
                });
            }
            Some(ConflictPolicy::Keep) => {
                warn!(target: "identity", key = %key, "Keeping conflicting ids; reconciliation skipped");
                tx.rollback().await?;
                report.kept_conflict = true;
                return Ok(report);
            }
            Some(ConflictPolicy::Reset) => {
                sqlx::query(&format!("UPDATE music SET {id_col} = NULL"))
                    .execute(&mut *tx)
                    .await?;
                info!(target: "identity", key = %key, "Reset inline ids");
                report.reset = true;
                trusted = &[];
            }
        }
    }

    for (value, id) in trusted {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} (id, name) VALUES (?, ?)"
        ))
        .bind(id)
        .bind(value)
        .execute(&mut *tx)
        .await?;
        report.seeded += result.rows_affected();
    }

    let unassigned: Vec<(i64, Option<String>)> = sqlx::query_as(&format!(
        "SELECT id, {val_col} FROM music WHERE {id_col} IS NULL"
    ))
    .fetch_all(&mut *tx)
    .await?;

    for (track_id, value) in unassigned {
        let id = get_or_create(&mut *tx, key, value.as_deref()).await?;
        sqlx::query(&format!("UPDATE music SET {id_col} = ? WHERE id = ?"))
            .bind(id)
            .bind(track_id)
            .execute(&mut *tx)
            .await?;
        report.assigned += 1;
    }

    tx.commit().await?;
    if report.seeded > 0 || report.assigned > 0 {
        info!(
            target: "identity",
            key = %key,
            seeded = report.seeded,
            assigned = report.assigned,
            "Reconciled inline ids"
        );
    }
    Ok(report)
}
