//! Read-side commands and the rating update.

use tokio::runtime::Runtime;

use super::print_json;
use crate::config::Config;
use crate::db;
use crate::db::queries::{self, AlbumOrder, Projection, RatingRequest};
use crate::library::Catalog;

/// List all tracks in the catalog.
pub fn cmd_list(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        for track in db::all_tracks(catalog.pool()).await? {
            println!("{} - {}", track.title.as_deref().unwrap_or(""), track.file_path);
        }
        println!("{} tracks.", db::count_tracks(catalog.pool()).await?);
        Ok::<(), anyhow::Error>(())
    })
}

/// Print tracks, optionally restricted to `columns`.
pub fn cmd_tracks(rt: &Runtime, config: Config, ids: &[i64], columns: Option<&str>) -> anyhow::Result<()> {
    let projection = match columns {
        Some(list) => Projection::parse(list)?,
        None => Projection::all(),
    };
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let tracks = queries::tracks_by_id(catalog.pool(), ids, &projection).await?;
        print_json(&tracks)
    })
}

/// Print every album, best rated first.
pub fn cmd_albums(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let albums = queries::albums(catalog.pool(), &[], AlbumOrder::RatingDesc).await?;
        print_json(&albums)
    })
}

/// Print one album with its tracks.
pub fn cmd_album(rt: &Runtime, config: Config, id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let detail = queries::album_detail(catalog.pool(), id).await?;
        print_json(&detail)
    })
}

/// Print two random albums for a comparison.
pub fn cmd_compare(rt: &Runtime, config: Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let pair = queries::random_pair(catalog.pool()).await?;
        print_json(&pair)
    })
}

/// Apply a comparison result given as JSON.
pub fn cmd_rate(rt: &Runtime, config: Config, json: &str) -> anyhow::Result<()> {
    let request = RatingRequest::parse(json)?;
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let update = request.apply(catalog.pool()).await?;
        print_json(&update)
    })
}

/// Print the file path of a track.
pub fn cmd_path(rt: &Runtime, config: Config, id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = Catalog::open_existing(config).await?;
        let path = queries::track_path(catalog.pool(), id).await?;
        println!("{}", path.display());
        Ok::<(), anyhow::Error>(())
    })
}
