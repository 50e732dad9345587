//! Pairwise album ratings using the Elo system.
//!
//! Every album starts at [`DEFAULT_RATING`]. A comparison moves the winner up
//! and the loser down by an amount that depends on how surprising the result
//! was given the current ratings.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::identity::SENTINEL_ID;
use crate::error::{Error, Result};

/// Elo K-factor: the largest possible change from one comparison.
pub const K: f64 = 32.0;

/// Rating of an album that has never been compared.
pub const DEFAULT_RATING: i64 = 1000;

/// Probability that `rating` beats `opponent`.
pub fn expected_score(rating: i64, opponent: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

/// Stored ratings are whole numbers; halves go to the even neighbour.
fn round_rating(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// New `(winner, loser)` ratings after the winner beat the loser.
pub fn elo_update(winner: i64, loser: i64) -> (i64, i64) {
    let expected_winner = expected_score(winner, loser);
    let expected_loser = 1.0 - expected_winner;

    let new_winner = round_rating(winner as f64 + K * (1.0 - expected_winner));
    let new_loser = round_rating(loser as f64 + K * (0.0 - expected_loser));
    (new_winner, new_loser)
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RatingUpdate {
    pub winner_id: i64,
    pub loser_id: i64,
    pub winner_rating: i64,
    pub loser_rating: i64,
}

async fn read_rating(conn: &mut SqliteConnection, album_id: i64) -> Result<i64> {
    let row: Option<Option<i64>> = sqlx::query_scalar("SELECT rating FROM albums WHERE id = ?")
        .bind(album_id)
        .fetch_optional(conn)
        .await?;
    match row {
        Some(rating) => Ok(rating.unwrap_or(DEFAULT_RATING)),
        None => Err(Error::not_found("album", album_id)),
    }
}

/// Current rating of an album; a missing value reads as [`DEFAULT_RATING`]
/// and is not written back.
pub async fn rating(pool: &SqlitePool, album_id: i64) -> Result<i64> {
    let mut conn = pool.acquire().await?;
    read_rating(&mut conn, album_id).await
}

/// Record that `winner_id` beat `loser_id`.
///
/// Both ratings are read and written in one transaction.
pub async fn update(pool: &SqlitePool, winner_id: i64, loser_id: i64) -> Result<RatingUpdate> {
    if winner_id == loser_id {
        return Err(Error::bad_request("an album cannot be compared with itself"));
    }
    for id in [winner_id, loser_id] {
        if id == SENTINEL_ID {
            return Err(Error::not_found("album", id));
        }
    }

    let mut tx = pool.begin().await?;
    let winner = read_rating(&mut tx, winner_id).await?;
    let loser = read_rating(&mut tx, loser_id).await?;
    let (winner_rating, loser_rating) = elo_update(winner, loser);

    for (id, rating) in [(winner_id, winner_rating), (loser_id, loser_rating)] {
        sqlx::query("UPDATE albums SET rating = ? WHERE id = ?")
            .bind(rating)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(
        target: "rating",
        winner_id, loser_id, winner_rating, loser_rating,
        "Recorded comparison"
    );
    Ok(RatingUpdate {
        winner_id,
        loser_id,
        winner_rating,
        loser_rating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_album, temp_db};
    use proptest::prelude::*;

    #[test]
    fn test_round_rating_ties_to_even() {
        assert_eq!(round_rating(1016.5), 1016);
        assert_eq!(round_rating(1017.5), 1018);
        assert_eq!(round_rating(983.5), 984);
        assert_eq!(round_rating(1016.49), 1016);
        assert_eq!(round_rating(1016.51), 1017);
    }

    #[test]
    fn test_equal_ratings_move_by_half_k() {
        assert_eq!(elo_update(1000, 1000), (1016, 984));
    }

    #[test]
    fn test_upset_moves_more_than_expected_win() {
        let (upset_winner, _) = elo_update(1000, 1400);
        let (expected_winner, _) = elo_update(1400, 1000);
        assert!(upset_winner - 1000 > expected_winner - 1400);
        assert_eq!(elo_update(1000, 1400), (1029, 1371));
    }

    #[tokio::test]
    async fn test_missing_rating_reads_as_default_without_writing() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Blue").await;
        sqlx::query("UPDATE albums SET rating = NULL WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(rating(&pool, 1).await.unwrap(), DEFAULT_RATING);

        let stored: Option<i64> = sqlx::query_scalar("SELECT rating FROM albums WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, None);
    }

    #[tokio::test]
    async fn test_update_writes_both_ratings() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Blue").await;
        insert_album(&pool, 2, "Red").await;

        let result = update(&pool, 1, 2).await.unwrap();
        assert_eq!(result.winner_rating, 1016);
        assert_eq!(result.loser_rating, 984);
        assert_eq!(rating(&pool, 1).await.unwrap(), 1016);
        assert_eq!(rating(&pool, 2).await.unwrap(), 984);
    }

    #[tokio::test]
    async fn test_update_unknown_album_changes_nothing() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Blue").await;

        let err = update(&pool, 1, 99).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(rating(&pool, 1).await.unwrap(), DEFAULT_RATING);
    }

    #[tokio::test]
    async fn test_update_rejects_self_comparison() {
        let (pool, _dir) = temp_db().await;
        insert_album(&pool, 1, "Blue").await;
        assert!(matches!(update(&pool, 1, 1).await, Err(Error::BadRequest(_))));
    }

    proptest! {
        #[test]
        fn elo_winner_never_loses_points(w in 100i64..3000, l in 100i64..3000) {
            let (new_w, new_l) = elo_update(w, l);
            prop_assert!(new_w >= w);
            prop_assert!(new_l <= l);
            // rounding can shift the total by at most one point
            prop_assert!(((new_w + new_l) - (w + l)).abs() <= 1);
        }
    }
}
