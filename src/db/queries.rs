//! Read side of the catalog, shaped for a transport layer.
//!
//! Everything here returns serializable values and reports unknown ids as
//! [`Error::NotFound`] and malformed input as [`Error::BadRequest`], which a
//! transport maps to 404 and 400.
//!
//! Column selection is typed: callers pick from [`TrackColumn`],
//! [`AlbumColumn`] and [`ArtistColumn`], and only those fixed names are ever
//! pushed into SQL. Ids are always bound.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::identity::SENTINEL_ID;
use crate::error::{Error, Result};
use crate::rating::{self, DEFAULT_RATING, RatingUpdate};

// ============================================================================
// Projection
// ============================================================================

/// Selectable columns of the `music` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackColumn {
    Id,
    FilePath,
    Title,
    Artist,
    Genre,
    Organization,
    Duration,
    TrackNumber,
    TotalTracks,
    DiscNumber,
    TotalDiscs,
    AlbumArtist,
    Composer,
    Date,
}

impl TrackColumn {
    pub const ALL: [TrackColumn; 14] = [
        TrackColumn::Id,
        TrackColumn::FilePath,
        TrackColumn::Title,
        TrackColumn::Artist,
        TrackColumn::Genre,
        TrackColumn::Organization,
        TrackColumn::Duration,
        TrackColumn::TrackNumber,
        TrackColumn::TotalTracks,
        TrackColumn::DiscNumber,
        TrackColumn::TotalDiscs,
        TrackColumn::AlbumArtist,
        TrackColumn::Composer,
        TrackColumn::Date,
    ];

    /// Column name on `music`, also used as the output key.
    pub fn name(&self) -> &'static str {
        match self {
            TrackColumn::Id => "id",
            TrackColumn::FilePath => "file_path",
            TrackColumn::Title => "title",
            TrackColumn::Artist => "artist",
            TrackColumn::Genre => "genre",
            TrackColumn::Organization => "organization",
            TrackColumn::Duration => "duration",
            TrackColumn::TrackNumber => "tracknumber",
            TrackColumn::TotalTracks => "totaltracks",
            TrackColumn::DiscNumber => "discnumber",
            TrackColumn::TotalDiscs => "totaldiscs",
            TrackColumn::AlbumArtist => "albumartist",
            TrackColumn::Composer => "composer",
            TrackColumn::Date => "date",
        }
    }
}

/// Selectable columns of the track's album, keyed `album_*` in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumColumn {
    Id,
    Name,
    Path,
    Art,
    Rating,
    ArtistLabel,
}

impl AlbumColumn {
    pub const ALL: [AlbumColumn; 6] = [
        AlbumColumn::Id,
        AlbumColumn::Name,
        AlbumColumn::Path,
        AlbumColumn::Art,
        AlbumColumn::Rating,
        AlbumColumn::ArtistLabel,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            AlbumColumn::Id => "album_id",
            AlbumColumn::Name => "album_name",
            AlbumColumn::Path => "album_path",
            AlbumColumn::Art => "album_art",
            AlbumColumn::Rating => "album_rating",
            AlbumColumn::ArtistLabel => "album_artist_label",
        }
    }

    fn expr(&self) -> &'static str {
        match self {
            AlbumColumn::Id => "albums.id",
            AlbumColumn::Name => "albums.name",
            AlbumColumn::Path => "albums.path",
            AlbumColumn::Art => "albums.art",
            AlbumColumn::Rating => {
                "CASE WHEN albums.id IS NULL THEN NULL ELSE COALESCE(albums.rating, 1000) END"
            }
            AlbumColumn::ArtistLabel => "albums.artist_label",
        }
    }
}

/// Selectable artist fields, returned as a list under `"artists"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtistColumn {
    Id,
    Name,
}

impl ArtistColumn {
    pub const ALL: [ArtistColumn; 2] = [ArtistColumn::Id, ArtistColumn::Name];

    pub fn key(&self) -> &'static str {
        match self {
            ArtistColumn::Id => "artist_id",
            ArtistColumn::Name => "artist_name",
        }
    }
}

/// One selectable output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Track(TrackColumn),
    Album(AlbumColumn),
    Artist(ArtistColumn),
}

impl Column {
    pub fn key(&self) -> &'static str {
        match self {
            Column::Track(c) => c.name(),
            Column::Album(c) => c.key(),
            Column::Artist(c) => c.key(),
        }
    }

    fn all() -> impl Iterator<Item = Column> {
        TrackColumn::ALL
            .into_iter()
            .map(Column::Track)
            .chain(AlbumColumn::ALL.into_iter().map(Column::Album))
            .chain(ArtistColumn::ALL.into_iter().map(Column::Artist))
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Column::all()
            .find(|c| c.key() == s)
            .ok_or_else(|| Error::bad_request(format!("unknown column '{s}'")))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The set of fields a track query returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    columns: Vec<Column>,
}

impl Projection {
    /// Every track, album and artist field.
    pub fn all() -> Self {
        Self {
            columns: Column::all().collect(),
        }
    }

    /// Exactly the given fields, deduplicated, in the given order.
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        let mut seen = HashSet::new();
        Self {
            columns: columns.into_iter().filter(|c| seen.insert(*c)).collect(),
        }
    }

    /// Parse a comma-separated list such as `"title,album_name,artist_name"`.
    pub fn parse(list: &str) -> Result<Self> {
        let columns = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Column::from_str)
            .collect::<Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(Error::bad_request("projection selects no columns"));
        }
        Ok(Self::new(columns))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn artist_columns(&self) -> Vec<ArtistColumn> {
        self.columns
            .iter()
            .filter_map(|c| match c {
                Column::Artist(a) => Some(*a),
                _ => None,
            })
            .collect()
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::all()
    }
}

// ============================================================================
// Track queries
// ============================================================================

/// Decode whatever SQLite stored, without assuming the declared type.
fn decode_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Deduplicate ids keeping first occurrence.
fn unique_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[i64]) {
    qb.push(" WHERE ").push(column).push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Tracks as JSON objects holding the projected fields.
///
/// An empty `ids` slice returns every track ordered by id; otherwise results
/// follow the order of `ids`. Any id without a track yields
/// [`Error::NotFound`] listing all the missing ids.
pub async fn tracks_by_id(pool: &SqlitePool, ids: &[i64], projection: &Projection) -> Result<Vec<Value>> {
    let ids = unique_ids(ids);

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT music.id");
    let mut scalar_keys = Vec::new();
    for column in projection.columns() {
        match column {
            Column::Track(c) => {
                qb.push(", music.").push(c.name());
                scalar_keys.push(c.name());
            }
            Column::Album(c) => {
                qb.push(", ").push(c.expr());
                scalar_keys.push(c.key());
            }
            Column::Artist(_) => {}
        }
    }
    qb.push(" FROM music LEFT JOIN albums ON albums.id = music.album_id");
    if !ids.is_empty() {
        push_id_list(&mut qb, "music.id", &ids);
    }
    qb.push(" ORDER BY music.id");

    let rows = qb.build().fetch_all(pool).await?;

    let mut by_id: HashMap<i64, Map<String, Value>> = HashMap::with_capacity(rows.len());
    let mut row_order = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.try_get(0)?;
        let mut object = Map::new();
        for (offset, key) in scalar_keys.iter().enumerate() {
            object.insert((*key).to_string(), decode_value(row, offset + 1));
        }
        by_id.insert(id, object);
        row_order.push(id);
    }

    let missing: Vec<i64> = ids.iter().copied().filter(|id| !by_id.contains_key(id)).collect();
    if !missing.is_empty() {
        return Err(Error::NotFound {
            entity: "track",
            ids: missing,
        });
    }

    let artist_columns = projection.artist_columns();
    if !artist_columns.is_empty() {
        let mut links = track_artists(pool, &ids).await?;
        for (id, object) in by_id.iter_mut() {
            let artists = links
                .remove(id)
                .unwrap_or_default()
                .into_iter()
                .map(|(artist_id, name)| {
                    let mut artist = Map::new();
                    for column in &artist_columns {
                        let value = match column {
                            ArtistColumn::Id => Value::from(artist_id),
                            ArtistColumn::Name => name.clone().map(Value::from).unwrap_or(Value::Null),
                        };
                        artist.insert(column.key().to_string(), value);
                    }
                    Value::Object(artist)
                })
                .collect();
            object.insert("artists".to_string(), Value::Array(artists));
        }
    }

    let order = if ids.is_empty() { row_order } else { ids };
    Ok(order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .map(Value::Object)
        .collect())
}

/// Linked `(artist_id, name)` pairs per track, sorted by name.
async fn track_artists(pool: &SqlitePool, ids: &[i64]) -> Result<HashMap<i64, Vec<(i64, Option<String>)>>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT am.music_id, a.id, a.name FROM artists_music am JOIN artists a ON a.id = am.artist_id",
    );
    if !ids.is_empty() {
        push_id_list(&mut qb, "am.music_id", ids);
    }
    qb.push(" ORDER BY am.music_id, a.name");

    let rows: Vec<(i64, i64, Option<String>)> = qb.build_query_as().fetch_all(pool).await?;
    let mut links: HashMap<i64, Vec<(i64, Option<String>)>> = HashMap::new();
    for (music_id, artist_id, name) in rows {
        links.entry(music_id).or_default().push((artist_id, name));
    }
    Ok(links)
}

/// File path of a track, for the streaming responder.
pub async fn track_path(pool: &SqlitePool, id: i64) -> Result<PathBuf> {
    let path: Option<String> = sqlx::query_scalar("SELECT file_path FROM music WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    path.map(PathBuf::from).ok_or_else(|| Error::not_found("track", id))
}

// ============================================================================
// Album queries
// ============================================================================

/// Sort order for [`albums`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlbumOrder {
    #[default]
    RatingDesc,
    Name,
}

/// An album with its merged artist names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumSummary {
    pub id: i64,
    pub name: Option<String>,
    pub art: Option<String>,
    pub rating: i64,
    /// Display label: "A, B" or "Various Artists"
    pub artist_label: Option<String>,
    pub artists: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct AlbumRow {
    id: i64,
    name: Option<String>,
    art: Option<String>,
    rating: Option<i64>,
    artist_label: Option<String>,
}

/// Album summaries, excluding the sentinel album.
///
/// An empty `ids` slice returns every album. Unknown ids are
/// [`Error::NotFound`].
pub async fn albums(pool: &SqlitePool, ids: &[i64], order: AlbumOrder) -> Result<Vec<AlbumSummary>> {
    let ids = unique_ids(ids);

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, name, art, rating, artist_label FROM albums");
    if ids.is_empty() {
        qb.push(" WHERE id != ").push_bind(SENTINEL_ID);
    } else {
        push_id_list(&mut qb, "id", &ids);
        qb.push(" AND id != ").push_bind(SENTINEL_ID);
    }
    qb.push(match order {
        AlbumOrder::RatingDesc => " ORDER BY COALESCE(rating, 1000) DESC, name",
        AlbumOrder::Name => " ORDER BY name",
    });

    let rows: Vec<AlbumRow> = qb.build_query_as().fetch_all(pool).await?;

    if !ids.is_empty() {
        let found: HashSet<i64> = rows.iter().map(|r| r.id).collect();
        let missing: Vec<i64> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
        if !missing.is_empty() {
            return Err(Error::NotFound {
                entity: "album",
                ids: missing,
            });
        }
    }

    let mut artists = album_artists(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| AlbumSummary {
            artists: artists.remove(&row.id).unwrap_or_default(),
            id: row.id,
            name: row.name,
            art: row.art,
            rating: row.rating.unwrap_or(DEFAULT_RATING),
            artist_label: row.artist_label,
        })
        .collect())
}

/// Album artist names keyed by album id, sorted.
async fn album_artists(pool: &SqlitePool) -> Result<BTreeMap<i64, Vec<String>>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT aa.album_id, a.name
        FROM artists_albums aa
        JOIN artists a ON a.id = aa.artist_id
        WHERE a.name IS NOT NULL
        ORDER BY aa.album_id, a.name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut map: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for (album_id, name) in rows {
        map.entry(album_id).or_default().push(name);
    }
    Ok(map)
}

/// A track as listed on an album page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumTrack {
    pub id: i64,
    pub title: Option<String>,
    pub discnumber: Option<i64>,
    pub tracknumber: Option<i64>,
    pub duration: Option<f64>,
    pub artists: Vec<String>,
}

/// An album with its tracks in disc/track order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: AlbumSummary,
    pub tracks: Vec<AlbumTrack>,
}

/// One album page.
pub async fn album_detail(pool: &SqlitePool, id: i64) -> Result<AlbumDetail> {
    let album = albums(pool, &[id], AlbumOrder::default())
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("album", id))?;

    let rows: Vec<(i64, Option<String>, Option<i64>, Option<i64>, Option<f64>)> = sqlx::query_as(
        r#"
        SELECT id, title, discnumber, tracknumber, duration
        FROM music
        WHERE album_id = ?
        ORDER BY discnumber, tracknumber, file_path
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let track_ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
    let mut links = if track_ids.is_empty() {
        HashMap::new()
    } else {
        track_artists(pool, &track_ids).await?
    };

    let tracks = rows
        .into_iter()
        .map(|(id, title, discnumber, tracknumber, duration)| AlbumTrack {
            artists: links
                .remove(&id)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(_, name)| name)
                .collect(),
            id,
            title,
            discnumber,
            tracknumber,
            duration,
        })
        .collect();

    Ok(AlbumDetail { album, tracks })
}

/// Two distinct albums picked at random for a comparison.
pub async fn random_pair(pool: &SqlitePool) -> Result<(AlbumSummary, AlbumSummary)> {
    let mut ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM albums WHERE id != ?")
        .bind(SENTINEL_ID)
        .fetch_all(pool)
        .await?;
    if ids.len() < 2 {
        return Err(Error::NotFound {
            entity: "album pair",
            ids: Vec::new(),
        });
    }

    ids.shuffle(&mut rand::rng());
    let mut found = albums(pool, &ids[..2], AlbumOrder::default()).await?;
    let first = take_album(&mut found, ids[0])?;
    let second = take_album(&mut found, ids[1])?;
    Ok((first, second))
}

fn take_album(found: &mut Vec<AlbumSummary>, id: i64) -> Result<AlbumSummary> {
    let pos = found
        .iter()
        .position(|a| a.id == id)
        .ok_or_else(|| Error::not_found("album", id))?;
    Ok(found.swap_remove(pos))
}

// ============================================================================
// Rating requests
// ============================================================================

/// A comparison result submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingRequest {
    pub winner_id: i64,
    pub loser_id: i64,
}

impl RatingRequest {
    /// Parse `{"winner_id": <int>, "loser_id": <int>}`.
    ///
    /// Strings, floats and missing fields are rejected rather than coerced.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::bad_request(format!("invalid JSON: {e}")))?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::bad_request(format!("{name} must be an integer")))
        };
        Ok(Self {
            winner_id: field("winner_id")?,
            loser_id: field("loser_id")?,
        })
    }

    /// Apply the comparison to the stored ratings.
    pub async fn apply(&self, pool: &SqlitePool) -> Result<RatingUpdate> {
        rating::update(pool, self.winner_id, self.loser_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_album, new_track, temp_db};

    async fn seed(pool: &SqlitePool) -> (i64, i64) {
        insert_album(pool, 1, "Blue").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut a = new_track("/m/Blue/01.flac", "All I Want");
        a.album_id = 1;
        a.duration = 214.5;
        let a = crate::db::upsert_track(&mut conn, &a).await.unwrap();
        let b = crate::db::upsert_track(&mut conn, &new_track("/m/loose.mp3", "Loose")).await.unwrap();

        sqlx::query("INSERT INTO artists (id, name) VALUES (5, 'Joni Mitchell')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO artists_music (artist_id, music_id) VALUES (5, ?)")
            .bind(a)
            .execute(pool)
            .await
            .unwrap();
        (a, b)
    }

    #[test]
    fn test_projection_parse() {
        let projection = Projection::parse("title, album_name,artist_name,title").unwrap();
        assert_eq!(
            projection.columns(),
            &[
                Column::Track(TrackColumn::Title),
                Column::Album(AlbumColumn::Name),
                Column::Artist(ArtistColumn::Name),
            ]
        );
        assert!(matches!(
            Projection::parse("title; DROP TABLE music"),
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_tracks_by_id_projects_columns() {
        let (pool, _dir) = temp_db().await;
        let (a, _) = seed(&pool).await;

        let projection = Projection::parse("title,duration,album_name,album_rating,artist_name").unwrap();
        let tracks = tracks_by_id(&pool, &[a], &projection).await.unwrap();

        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!(track["title"], "All I Want");
        assert_eq!(track["duration"], 214.5);
        assert_eq!(track["album_name"], "Blue");
        assert_eq!(track["album_rating"], 1000);
        assert_eq!(track["artists"][0]["artist_name"], "Joni Mitchell");
        assert!(track.get("file_path").is_none());
    }

    #[tokio::test]
    async fn test_tracks_by_id_follows_request_order() {
        let (pool, _dir) = temp_db().await;
        let (a, b) = seed(&pool).await;

        let projection = Projection::new([Column::Track(TrackColumn::Id)]);
        let tracks = tracks_by_id(&pool, &[b, a], &projection).await.unwrap();
        assert_eq!(tracks[0]["id"], b);
        assert_eq!(tracks[1]["id"], a);

        let everything = tracks_by_id(&pool, &[], &projection).await.unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn test_tracks_by_id_reports_missing_ids() {
        let (pool, _dir) = temp_db().await;
        let (a, _) = seed(&pool).await;

        let err = tracks_by_id(&pool, &[a, 404, 405], &Projection::all())
            .await
            .unwrap_err();
        match err {
            Error::NotFound { entity, ids } => {
                assert_eq!(entity, "track");
                assert_eq!(ids, vec![404, 405]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_albums_sorted_by_rating() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Low").await;
        insert_album(&pool, 2, "High").await;
        sqlx::query("UPDATE albums SET rating = 1200 WHERE id = 2")
            .execute(&pool)
            .await
            .unwrap();

        let list = albums(&pool, &[], AlbumOrder::default()).await.unwrap();
        let names: Vec<_> = list.iter().map(|a| a.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["High", "Low"]);

        assert!(albums(&pool, &[0], AlbumOrder::Name).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_album_detail_lists_tracks() {
        let (pool, _dir) = temp_db().await;
        seed(&pool).await;

        let detail = album_detail(&pool, 1).await.unwrap();
        assert_eq!(detail.album.name.as_deref(), Some("Blue"));
        assert_eq!(detail.tracks.len(), 1);
        assert_eq!(detail.tracks[0].artists, vec!["Joni Mitchell"]);

        assert!(album_detail(&pool, 9).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_random_pair_needs_two_albums() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Only").await;
        assert!(random_pair(&pool).await.unwrap_err().is_not_found());

        insert_album(&pool, 2, "Other").await;
        let (first, second) = random_pair(&pool).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id != SENTINEL_ID && second.id != SENTINEL_ID);
    }

    #[tokio::test]
    async fn test_random_pair_order_ignores_rating() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Favourite").await;
        insert_album(&pool, 2, "Filler").await;
        sqlx::query("UPDATE albums SET rating = 1400 WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();

        let mut firsts = std::collections::HashSet::new();
        for _ in 0..64 {
            let (first, _) = random_pair(&pool).await.unwrap();
            firsts.insert(first.id);
        }
        assert_eq!(firsts.len(), 2, "both albums should lead some pairs");
    }

    #[tokio::test]
    async fn test_track_path() {
        let (pool, _dir) = temp_db().await;
        let (a, _) = seed(&pool).await;
        assert_eq!(track_path(&pool, a).await.unwrap(), PathBuf::from("/m/Blue/01.flac"));
        assert!(track_path(&pool, 999).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_rating_request_parse() {
        let request = RatingRequest::parse(r#"{"winner_id": 3, "loser_id": 7}"#).unwrap();
        assert_eq!(request, RatingRequest { winner_id: 3, loser_id: 7 });

        for bad in [
            r#"{"winner_id": "3", "loser_id": 7}"#,
            r#"{"winner_id": 3.5, "loser_id": 7}"#,
            r#"{"winner_id": 3}"#,
            "not json",
        ] {
            assert!(
                matches!(RatingRequest::parse(bad), Err(Error::BadRequest(_))),
                "accepted {bad}"
            );
        }
    }

    #[tokio::test]
    async fn test_rating_request_apply() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "A").await;
        insert_album(&pool, 2, "B").await;

        let update = RatingRequest::parse(r#"{"winner_id": 2, "loser_id": 1}"#)
            .unwrap()
            .apply(&pool)
            .await
            .unwrap();
        assert_eq!(update.winner_rating, 1016);
    }
}
