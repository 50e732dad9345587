//! Typed schema descriptors and additive schema evolution.
//!
//! Every persisted table is described once, as a [`Table`] variant with a
//! static column list. The descriptor drives three things:
//!
//! 1. `CREATE TABLE IF NOT EXISTS` on first run ([`ensure_schema`])
//! 2. Introspection of the live table via `PRAGMA table_info`
//! 3. `ALTER TABLE ADD COLUMN` for declared columns the live table lacks
//!    ([`sync_table`])
//!
//! Evolution is strictly additive: columns are never dropped, renamed, or
//! retyped. A column removed from a descriptor stays in existing databases.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// SQLite storage class of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }

    /// Whether a live column type has the same affinity as this one.
    fn is_compatible(&self, live: &str) -> bool {
        let live = live.to_uppercase();
        match self {
            SqlType::Integer => live.contains("INT"),
            SqlType::Real => {
                live.contains("REAL") || live.contains("FLOA") || live.contains("DOUB")
            }
            SqlType::Text => {
                live.contains("TEXT") || live.contains("CHAR") || live.contains("CLOB")
            }
        }
    }
}

/// Column declaration with the constraints the catalog uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<&'static str>,
    /// `(table, column)` this column references
    pub references: Option<(&'static str, &'static str)>,
}

impl ColumnDefinition {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
            not_null: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some((table, column));
        self
    }

    /// Column clause for `CREATE TABLE`.
    fn create_clause(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_str());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some((table, column)) = self.references {
            sql.push_str(&format!(" REFERENCES {table}({column})"));
        }
        sql
    }

    /// Column clause for `ALTER TABLE ADD COLUMN`.
    ///
    /// SQLite cannot add PRIMARY KEY or UNIQUE columns, nor NOT NULL columns
    /// without a default; those constraints are dropped with a warning.
    fn add_clause(&self, table: &str) -> String {
        if self.primary_key || self.unique {
            warn!(
                target: "schema",
                table, column = self.name,
                "Cannot add PRIMARY KEY/UNIQUE via ALTER TABLE; adding plain column"
            );
        }
        let mut sql = format!("{} {}", self.name, self.sql_type.as_str());
        match (self.not_null, self.default) {
            (true, Some(default)) => sql.push_str(&format!(" NOT NULL DEFAULT {default}")),
            (true, None) => {
                warn!(
                    target: "schema",
                    table, column = self.name,
                    "Cannot add NOT NULL column without DEFAULT; column will be nullable"
                );
            }
            (false, Some(default)) => sql.push_str(&format!(" DEFAULT {default}")),
            (false, None) => {}
        }
        sql
    }
}

use SqlType::{Integer, Real, Text};

const MUSIC_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition::new("id", Integer).primary_key(),
    ColumnDefinition::new("file_path", Text).not_null().unique(),
    ColumnDefinition::new("title", Text),
    ColumnDefinition::new("artist", Text),
    ColumnDefinition::new("album", Text),
    ColumnDefinition::new("album_id", Integer),
    ColumnDefinition::new("genre", Text),
    ColumnDefinition::new("genre_id", Integer),
    ColumnDefinition::new("organization", Text),
    ColumnDefinition::new("organization_id", Integer),
    ColumnDefinition::new("duration", Real),
    ColumnDefinition::new("tracknumber", Integer),
    ColumnDefinition::new("totaltracks", Integer),
    ColumnDefinition::new("discnumber", Integer),
    ColumnDefinition::new("totaldiscs", Integer),
    ColumnDefinition::new("albumartist", Text),
    ColumnDefinition::new("composer", Text),
    ColumnDefinition::new("date", Text),
    ColumnDefinition::new("mtime", Integer),
    ColumnDefinition::new("scanned_at", Text),
];

const ALBUM_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition::new("id", Integer).primary_key(),
    ColumnDefinition::new("name", Text).unique(),
    ColumnDefinition::new("path", Text),
    ColumnDefinition::new("art", Text),
    ColumnDefinition::new("artist_label", Text),
    ColumnDefinition::new("rating", Integer).default("1000"),
];

const DICTIONARY_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition::new("id", Integer).primary_key(),
    ColumnDefinition::new("name", Text).unique(),
];

const ARTISTS_MUSIC_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition::new("artist_id", Integer)
        .not_null()
        .references("artists", "id"),
    ColumnDefinition::new("music_id", Integer)
        .not_null()
        .references("music", "id"),
];

const ARTISTS_ALBUMS_COLUMNS: &[ColumnDefinition] = &[
    ColumnDefinition::new("artist_id", Integer)
        .not_null()
        .references("artists", "id"),
    ColumnDefinition::new("album_id", Integer)
        .not_null()
        .references("albums", "id"),
];

/// Every table the catalog persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Music,
    Albums,
    Artists,
    Genres,
    Organizations,
    ArtistsMusic,
    ArtistsAlbums,
}

impl Table {
    /// Creation order: parents before the join tables that reference them.
    pub const ALL: [Table; 7] = [
        Table::Artists,
        Table::Genres,
        Table::Organizations,
        Table::Albums,
        Table::Music,
        Table::ArtistsMusic,
        Table::ArtistsAlbums,
    ];

    /// Dictionary tables carrying the reserved `(0, NULL)` row.
    pub const DICTIONARIES: [Table; 4] = [
        Table::Artists,
        Table::Genres,
        Table::Organizations,
        Table::Albums,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Music => "music",
            Table::Albums => "albums",
            Table::Artists => "artists",
            Table::Genres => "genres",
            Table::Organizations => "organizations",
            Table::ArtistsMusic => "artists_music",
            Table::ArtistsAlbums => "artists_albums",
        }
    }

    pub fn columns(&self) -> &'static [ColumnDefinition] {
        match self {
            Table::Music => MUSIC_COLUMNS,
            Table::Albums => ALBUM_COLUMNS,
            Table::Artists | Table::Genres | Table::Organizations => DICTIONARY_COLUMNS,
            Table::ArtistsMusic => ARTISTS_MUSIC_COLUMNS,
            Table::ArtistsAlbums => ARTISTS_ALBUMS_COLUMNS,
        }
    }

    /// Look up a declared column by name.
    pub fn column(&self, name: &str) -> Option<&'static ColumnDefinition> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Table-level constraints (composite keys).
    fn constraints(&self) -> &'static [&'static str] {
        match self {
            Table::ArtistsMusic => &["PRIMARY KEY (artist_id, music_id)"],
            Table::ArtistsAlbums => &["PRIMARY KEY (artist_id, album_id)"],
            _ => &[],
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement generated from the descriptor.
    pub fn create_sql(&self) -> String {
        let clauses: Vec<String> = self
            .columns()
            .iter()
            .map(ColumnDefinition::create_clause)
            .chain(self.constraints().iter().map(|c| c.to_string()))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name(),
            clauses.join(",\n    ")
        )
    }
}

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub struct LiveColumn {
    pub cid: i64,
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub pk: bool,
}

/// Check whether a table exists in the live database.
pub async fn table_exists(pool: &SqlitePool, table: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)")
        .bind(table)
        .fetch_one(pool)
        .await
}

/// Read the live column list of a table, ordered by position.
pub async fn introspect_table(pool: &SqlitePool, table: Table) -> sqlx::Result<Vec<LiveColumn>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table.name()))
        .fetch_all(pool)
        .await?;

    let mut columns: Vec<LiveColumn> = rows
        .iter()
        .map(|row| LiveColumn {
            cid: row.get("cid"),
            name: row.get("name"),
            type_name: row.get("type"),
            not_null: row.get::<i64, _>("notnull") != 0,
            pk: row.get::<i64, _>("pk") != 0,
        })
        .collect();
    columns.sort_by_key(|c| c.cid);
    Ok(columns)
}

/// Declared columns missing from the live table, in declaration order.
///
/// Type mismatches on present columns are logged, never fixed.
pub fn missing_columns(table: Table, live: &[LiveColumn]) -> Vec<&'static ColumnDefinition> {
    let mut missing = Vec::new();
    for declared in table.columns() {
        match live.iter().find(|c| c.name.eq_ignore_ascii_case(declared.name)) {
            Some(actual) => {
                if !actual.type_name.is_empty() && !declared.sql_type.is_compatible(&actual.type_name)
                {
                    warn!(
                        target: "schema",
                        table = table.name(),
                        column = declared.name,
                        expected = declared.sql_type.as_str(),
                        actual = %actual.type_name,
                        "Column type differs from declaration; leaving as-is"
                    );
                }
            }
            None => missing.push(declared),
        }
    }
    missing
}

/// Add every declared column the live table lacks.
///
/// Returns the names of the columns that were added. Fails with
/// [`Error::SchemaMissingTable`] if the table does not exist at all.
pub async fn sync_table(pool: &SqlitePool, table: Table) -> Result<Vec<&'static str>> {
    if !table_exists(pool, table.name()).await? {
        return Err(Error::SchemaMissingTable(table.name()));
    }

    let live = introspect_table(pool, table).await?;
    let missing = missing_columns(table, &live);
    if missing.is_empty() {
        debug!(target: "schema", table = table.name(), "Schema up to date");
        return Ok(Vec::new());
    }

    let mut added = Vec::with_capacity(missing.len());
    for column in missing {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table.name(),
            column.add_clause(table.name())
        );
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => {
                info!(target: "schema", table = table.name(), column = column.name, "Added column");
                added.push(column.name);
            }
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                debug!(target: "schema", table = table.name(), column = column.name, "Column already added");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(added)
}

/// Create missing tables, add missing columns, and insert sentinel rows.
///
/// Idempotent: safe to run at every start-up.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    for table in Table::ALL {
        sqlx::query(&table.create_sql()).execute(pool).await?;
    }
    sync_all(pool).await?;
    insert_sentinels(pool).await?;
    Ok(())
}

/// Run [`sync_table`] over every table.
pub async fn sync_all(pool: &SqlitePool) -> Result<Vec<(Table, &'static str)>> {
    let mut added = Vec::new();
    for table in Table::ALL {
        for column in sync_table(pool, table).await? {
            added.push((table, column));
        }
    }
    Ok(added)
}

/// Fail with [`Error::SchemaMissingTable`] unless every table exists.
pub async fn verify_schema(pool: &SqlitePool) -> Result<()> {
    for table in Table::ALL {
        if !table_exists(pool, table.name()).await? {
            return Err(Error::SchemaMissingTable(table.name()));
        }
    }
    Ok(())
}

/// Insert the reserved `(0, NULL)` row into each dictionary table.
async fn insert_sentinels(pool: &SqlitePool) -> sqlx::Result<()> {
    for table in Table::DICTIONARIES {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (id, name) VALUES (0, NULL)",
            table.name()
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}
