//! Database module for the catalog.
//!
//! Uses SQLx with SQLite. The schema is declared in [`schema`] and applied
//! at start-up; dictionary ids are minted by [`identity`]; the read side
//! used by transports lives in [`queries`].
//!
//! # Example
//!
//! ```ignore
//! use music_catalog::db::{init_db, all_tracks};
//!
//! let pool = init_db("sqlite:media.db").await?;
//! let tracks = all_tracks(&pool).await?;
//! ```

pub mod identity;
pub mod queries;
pub mod schema;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::model::Track;

/// Open a connection pool with WAL journaling and foreign keys enabled.
///
/// `create` decides whether a missing database file is created.
pub async fn connect(db_url: &str, create: bool) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Open an existing database read-only, leaving its journal mode alone.
pub async fn connect_read_only(db_url: &str) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .read_only(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Open (creating if needed) the database and bring its schema up to date.
///
/// Creates missing tables, adds missing columns, and inserts the sentinel
/// dictionary rows. Safe to call on every start-up.
pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    let pool = connect(db_url, true).await?;
    schema::ensure_schema(&pool).await?;
    Ok(pool)
}

/// Open an existing catalog without creating anything.
///
/// Fails with [`Error::SchemaMissingTable`] when the file or any table is
/// missing.
pub async fn open_db(db_url: &str) -> Result<SqlitePool> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        return Err(Error::SchemaMissingTable(schema::Table::Music.name()));
    }
    let pool = connect(db_url, false).await?;
    schema::verify_schema(&pool).await?;
    Ok(pool)
}

/// A track row ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub file_path: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: String,
    pub album_id: i64,
    pub genre: Option<String>,
    pub genre_id: i64,
    pub organization: Option<String>,
    pub organization_id: i64,
    pub duration: f64,
    pub track_number: i64,
    pub total_tracks: i64,
    pub disc_number: i64,
    pub total_discs: i64,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub date: Option<String>,
    pub mtime: Option<i64>,
    pub scanned_at: String,
}

/// Insert or update a track keyed by its file path.
///
/// Rescanning a file updates its row in place, so the track id is stable
/// across scans.
pub async fn upsert_track(conn: &mut SqliteConnection, track: &NewTrack) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO music (
            file_path, title, artist, album, album_id, genre, genre_id,
            organization, organization_id, duration, tracknumber, totaltracks,
            discnumber, totaldiscs, albumartist, composer, date, mtime, scanned_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_path) DO UPDATE SET
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            album_id = excluded.album_id,
            genre = excluded.genre,
            genre_id = excluded.genre_id,
            organization = excluded.organization,
            organization_id = excluded.organization_id,
            duration = excluded.duration,
            tracknumber = excluded.tracknumber,
            totaltracks = excluded.totaltracks,
            discnumber = excluded.discnumber,
            totaldiscs = excluded.totaldiscs,
            albumartist = excluded.albumartist,
            composer = excluded.composer,
            date = excluded.date,
            mtime = excluded.mtime,
            scanned_at = excluded.scanned_at
        RETURNING id
        "#,
    )
    .bind(&track.file_path)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(track.album_id)
    .bind(&track.genre)
    .bind(track.genre_id)
    .bind(&track.organization)
    .bind(track.organization_id)
    .bind(track.duration)
    .bind(track.track_number)
    .bind(track.total_tracks)
    .bind(track.disc_number)
    .bind(track.total_discs)
    .bind(&track.album_artist)
    .bind(&track.composer)
    .bind(&track.date)
    .bind(track.mtime)
    .bind(&track.scanned_at)
    .fetch_one(conn)
    .await
}

/// Record the directory an album was first seen in.
pub async fn set_album_path(conn: &mut SqliteConnection, album_id: i64, path: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET path = COALESCE(path, ?) WHERE id = ? AND id != 0")
        .bind(path)
        .bind(album_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// True while the album has no stored art.
pub async fn album_needs_art(pool: &SqlitePool, album_id: i64) -> sqlx::Result<bool> {
    let art: Option<Option<String>> = sqlx::query_scalar("SELECT art FROM albums WHERE id = ?")
        .bind(album_id)
        .fetch_optional(pool)
        .await?;
    Ok(matches!(art, Some(None)))
}

/// Store a data URI as the album's art.
pub async fn set_album_art(pool: &SqlitePool, album_id: i64, data_uri: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET art = ? WHERE id = ? AND art IS NULL")
        .bind(data_uri)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// What a scan needs to know about a track already in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredTrack {
    pub mtime: Option<i64>,
    pub album_id: Option<i64>,
}

/// Stored tracks keyed by file path.
pub async fn stored_tracks(pool: &SqlitePool) -> sqlx::Result<HashMap<String, StoredTrack>> {
    let rows: Vec<(String, Option<i64>, Option<i64>)> =
        sqlx::query_as("SELECT file_path, mtime, album_id FROM music")
            .fetch_all(pool)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(path, mtime, album_id)| (path, StoredTrack { mtime, album_id }))
        .collect())
}

/// Retrieve all tracks ordered by path.
pub async fn all_tracks(pool: &SqlitePool) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM music ORDER BY file_path")
        .fetch_all(pool)
        .await
}

/// Number of tracks in the catalog.
pub async fn count_tracks(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM music")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{new_track, temp_db};

    #[tokio::test]
    async fn test_open_db_requires_initialized_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("missing.db").display());

        let err = open_db(&url).await.unwrap_err();
        assert!(matches!(err, Error::SchemaMissingTable("music")));

        init_db(&url).await.unwrap();
        open_db(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_connection_keeps_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        let url = format!("sqlite:{}", path.display());
        {
            let options = SqliteConnectOptions::from_str(&url)
                .unwrap()
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Delete);
            let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
            sqlx::query("CREATE TABLE music (id INTEGER PRIMARY KEY)")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = connect_read_only(&url).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode, "delete");
        assert!(
            sqlx::query("CREATE TABLE other (id INTEGER)")
                .execute(&pool)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_upsert_keeps_track_id() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = upsert_track(&mut conn, &new_track("/m/a.mp3", "First")).await.unwrap();
        let second = upsert_track(&mut conn, &new_track("/m/a.mp3", "Renamed")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(count_tracks(&pool).await.unwrap(), 1);

        let tracks = all_tracks(&pool).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_album_art_is_written_once() {
        let (pool, _dir) = temp_db().await;
        sqlx::query("INSERT INTO albums (id, name) VALUES (1, 'Blue')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(album_needs_art(&pool, 1).await.unwrap());
        set_album_art(&pool, 1, "data:image/jpeg;base64,AA==").await.unwrap();
        set_album_art(&pool, 1, "data:image/png;base64,BB==").await.unwrap();
        assert!(!album_needs_art(&pool, 1).await.unwrap());

        let art: String = sqlx::query_scalar("SELECT art FROM albums WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(art, "data:image/jpeg;base64,AA==");
    }

    #[tokio::test]
    async fn test_unknown_album_never_needs_art() {
        let (pool, _dir) = temp_db().await;
        assert!(!album_needs_art(&pool, 42).await.unwrap());
    }
}
