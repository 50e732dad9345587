//! Artist links for tracks and albums.
//!
//! Runs after the track rows of a scan are written. Every track is linked to
//! the artists named in its artist text. Every album is then attributed to
//! the artists that appear on *all* of its tracks: first by album artist
//! text (a track without any uses its own artists), then by the track links. An album with no common artist is labelled
//! [`VARIOUS_ARTISTS`] and gets no artist links.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::db::identity::{KeyType, SENTINEL_ID, get_or_create, normalize};
use crate::error::Result;

/// Label for albums whose tracks share no artist.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Separator between names in artist text.
pub const ARTIST_SEPARATOR: &str = ", ";

/// Split artist text into names; blank and "Unknown" pieces are dropped.
pub fn split_artists(text: Option<&str>) -> Vec<&str> {
    text.map(|t| {
        t.split(ARTIST_SEPARATOR)
            .filter_map(|piece| normalize(Some(piece)))
            .collect()
    })
    .unwrap_or_default()
}

/// Intersection of all sets; empty when there are no sets.
pub fn intersect_all<'a>(sets: impl IntoIterator<Item = &'a BTreeSet<i64>>) -> BTreeSet<i64> {
    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return BTreeSet::new();
    };
    iter.fold(first.clone(), |acc, set| acc.intersection(set).copied().collect())
}

/// Attribution chosen for one album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumArtists {
    Artists(BTreeSet<i64>),
    VariousArtists,
}

/// Pick the album's artists from per-track id sets.
///
/// `by_album_artist` holds each track's ids from its album artist text,
/// `by_track_artist` each track's linked artist ids.
pub fn infer_album_artists(
    by_album_artist: &[BTreeSet<i64>],
    by_track_artist: &[BTreeSet<i64>],
) -> AlbumArtists {
    let common = intersect_all(by_album_artist);
    if !common.is_empty() {
        return AlbumArtists::Artists(common);
    }
    let common = intersect_all(by_track_artist);
    if !common.is_empty() {
        return AlbumArtists::Artists(common);
    }
    AlbumArtists::VariousArtists
}

/// Counts from one linking pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSummary {
    pub track_links: u64,
    pub albums: u64,
    pub various_artists: u64,
}

/// Artist name resolution with a per-pass memo.
struct ArtistIds {
    by_name: HashMap<String, i64>,
    names: BTreeMap<i64, String>,
}

impl ArtistIds {
    fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            names: BTreeMap::new(),
        }
    }

    /// Ids for artist text; no names resolves to the sentinel.
    async fn resolve(&mut self, conn: &mut SqliteConnection, text: Option<&str>) -> Result<BTreeSet<i64>> {
        let names = split_artists(text);
        if names.is_empty() {
            return Ok(BTreeSet::from([SENTINEL_ID]));
        }

        let mut ids = BTreeSet::new();
        for name in names {
            let id = match self.by_name.get(name) {
                Some(id) => *id,
                None => {
                    let id = get_or_create(&mut *conn, KeyType::Artist, Some(name)).await?;
                    self.by_name.insert(name.to_string(), id);
                    self.names.insert(id, name.to_string());
                    id
                }
            };
            ids.insert(id);
        }
        Ok(ids)
    }

    /// "A, B" from the sorted names; None when only the sentinel is present.
    fn label(&self, ids: &BTreeSet<i64>) -> Option<String> {
        let mut names: Vec<&str> = ids
            .iter()
            .filter_map(|id| self.names.get(id).map(String::as_str))
            .collect();
        if names.is_empty() {
            return None;
        }
        names.sort();
        Some(names.join(ARTIST_SEPARATOR))
    }
}

/// Rebuild `artists_music`, `artists_albums` and album labels from the
/// current track rows, in one transaction.
pub async fn link_all(pool: &SqlitePool) -> Result<LinkSummary> {
    let mut tx = pool.begin().await?;
    let mut summary = LinkSummary::default();
    let mut artists = ArtistIds::new();

    let tracks: Vec<(i64, Option<String>, Option<String>, Option<i64>)> =
        sqlx::query_as("SELECT id, artist, albumartist, album_id FROM music ORDER BY id")
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM artists_music").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM artists_albums").execute(&mut *tx).await?;

    // album id -> (album artist sets, track artist sets)
    let mut per_album: BTreeMap<i64, (Vec<BTreeSet<i64>>, Vec<BTreeSet<i64>>)> = BTreeMap::new();

    for (music_id, artist, albumartist, album_id) in &tracks {
        let track_ids = artists.resolve(&mut tx, artist.as_deref()).await?;
        for artist_id in &track_ids {
            sqlx::query("INSERT OR IGNORE INTO artists_music (artist_id, music_id) VALUES (?, ?)")
                .bind(artist_id)
                .bind(music_id)
                .execute(&mut *tx)
                .await?;
            summary.track_links += 1;
        }

        let Some(album_id) = album_id.filter(|id| *id != SENTINEL_ID) else {
            continue;
        };
        // no album artist text: the track stands for itself
        let album_ids = if split_artists(albumartist.as_deref()).is_empty() {
            track_ids.clone()
        } else {
            artists.resolve(&mut tx, albumartist.as_deref()).await?
        };
        let entry = per_album.entry(album_id).or_default();
        entry.0.push(album_ids);
        entry.1.push(track_ids);
    }

    for (album_id, (by_album_artist, by_track_artist)) in &per_album {
        let label = match infer_album_artists(by_album_artist, by_track_artist) {
            AlbumArtists::Artists(ids) => {
                for artist_id in &ids {
                    sqlx::query(
                        "INSERT OR IGNORE INTO artists_albums (artist_id, album_id) VALUES (?, ?)",
                    )
                    .bind(artist_id)
                    .bind(album_id)
                    .execute(&mut *tx)
                    .await?;
                }
                artists.label(&ids)
            }
            AlbumArtists::VariousArtists => {
                summary.various_artists += 1;
                Some(VARIOUS_ARTISTS.to_string())
            }
        };
        debug!(target: "linker", album_id, label = ?label, "Attributed album");

        sqlx::query("UPDATE albums SET artist_label = ? WHERE id = ?")
            .bind(&label)
            .bind(album_id)
            .execute(&mut *tx)
            .await?;
        summary.albums += 1;
    }

    tx.commit().await?;
    info!(
        target: "linker",
        tracks = tracks.len(),
        albums = summary.albums,
        various_artists = summary.various_artists,
        "Linked artists"
    );
    Ok(summary)
}
