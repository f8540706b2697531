use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{ClusterRecord, HistoryPlay, ItemRecord, ListenRecord, UserPreferencesRow},
};

/// Inserts a preference row unless the user already has one. Returns `true` on insert.
pub async fn insert_user_preferences(db: &Db, row: &UserPreferencesRow) -> Result<bool> {
	let result = sqlx::query(
		"\
INSERT INTO user_preferences (
	user_id,
	realtime_vector,
	batched_vector,
	batch_total_weight,
	batch_count,
	prev_day_vector,
	daily_vector,
	daily_total_weight,
	daily_listen_count,
	last_daily_fold_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (user_id) DO NOTHING",
	)
	.bind(row.user_id.as_str())
	.bind(&row.realtime_vector)
	.bind(&row.batched_vector)
	.bind(row.batch_total_weight)
	.bind(row.batch_count)
	.bind(&row.prev_day_vector)
	.bind(&row.daily_vector)
	.bind(row.daily_total_weight)
	.bind(row.daily_listen_count)
	.bind(row.last_daily_fold_at)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn get_user_preferences(db: &Db, user_id: &str) -> Result<Option<UserPreferencesRow>> {
	let row = sqlx::query_as::<_, UserPreferencesRow>(
		"\
SELECT
	user_id,
	realtime_vector,
	batched_vector,
	batch_total_weight,
	batch_count,
	prev_day_vector,
	daily_vector,
	daily_total_weight,
	daily_listen_count,
	last_daily_fold_at
FROM user_preferences
WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn update_user_preferences(db: &Db, row: &UserPreferencesRow) -> Result<()> {
	sqlx::query(
		"\
UPDATE user_preferences
SET
	realtime_vector = $2,
	batched_vector = $3,
	batch_total_weight = $4,
	batch_count = $5,
	prev_day_vector = $6,
	daily_vector = $7,
	daily_total_weight = $8,
	daily_listen_count = $9,
	last_daily_fold_at = $10,
	updated_at = now()
WHERE user_id = $1",
	)
	.bind(row.user_id.as_str())
	.bind(&row.realtime_vector)
	.bind(&row.batched_vector)
	.bind(row.batch_total_weight)
	.bind(row.batch_count)
	.bind(&row.prev_day_vector)
	.bind(&row.daily_vector)
	.bind(row.daily_total_weight)
	.bind(row.daily_listen_count)
	.bind(row.last_daily_fold_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn list_user_ids(db: &Db) -> Result<Vec<String>> {
	let ids: Vec<String> = sqlx::query_scalar("SELECT user_id FROM user_preferences ORDER BY user_id")
		.fetch_all(&db.pool)
		.await?;

	Ok(ids)
}

/// Every item the user has a history row for, hidden rows included.
pub async fn history_item_ids(db: &Db, user_id: &str) -> Result<Vec<Uuid>> {
	let ids: Vec<Uuid> = sqlx::query_scalar(
		"SELECT DISTINCT item_id FROM listening_history WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}

/// History rows for one item, newest first.
pub async fn history_plays(db: &Db, user_id: &str, item_id: Uuid) -> Result<Vec<HistoryPlay>> {
	let rows = sqlx::query_as::<_, HistoryPlay>(
		"\
SELECT play_count, hidden, listened_at
FROM listening_history
WHERE user_id = $1 AND item_id = $2
ORDER BY listened_at DESC",
	)
	.bind(user_id)
	.bind(item_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Appends a listen to the visible history row, creating it on first play.
pub async fn record_listen(
	db: &Db,
	user_id: &str,
	item_id: Uuid,
	listen: &ListenRecord,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO listening_history (
	history_id,
	user_id,
	item_id,
	listen_duration_seconds,
	stop_position_seconds,
	completed,
	hidden,
	play_count,
	share_count,
	download_count,
	add_to_playlist_count,
	rating,
	listened_at
)
VALUES ($1, $2, $3, $4, $5, $6, FALSE, 1, $7, $8, $9, $10, $11)
ON CONFLICT (user_id, item_id) WHERE NOT hidden DO UPDATE
SET
	listen_duration_seconds =
		listening_history.listen_duration_seconds + EXCLUDED.listen_duration_seconds,
	stop_position_seconds = EXCLUDED.stop_position_seconds,
	completed = EXCLUDED.completed,
	play_count = listening_history.play_count + 1,
	share_count = listening_history.share_count + EXCLUDED.share_count,
	download_count = listening_history.download_count + EXCLUDED.download_count,
	add_to_playlist_count = listening_history.add_to_playlist_count + EXCLUDED.add_to_playlist_count,
	rating = COALESCE(EXCLUDED.rating, listening_history.rating),
	listened_at = EXCLUDED.listened_at",
	)
	.bind(Uuid::new_v4())
	.bind(user_id)
	.bind(item_id)
	.bind(listen.listen_duration_seconds)
	.bind(listen.stop_position_seconds)
	.bind(listen.completed)
	.bind(i32::from(listen.shared))
	.bind(i32::from(listen.downloaded))
	.bind(i32::from(listen.added_to_playlist))
	.bind(listen.rating)
	.bind(listen.listened_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Hides the visible history row. Returns `false` when there was none.
pub async fn hide_history(db: &Db, user_id: &str, item_id: Uuid) -> Result<bool> {
	let result = sqlx::query(
		"UPDATE listening_history SET hidden = TRUE WHERE user_id = $1 AND item_id = $2 AND NOT hidden",
	)
	.bind(user_id)
	.bind(item_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn insert_item(db: &Db, item: &ItemRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO items (item_id, title, link, published_at, cluster_id)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(item.item_id)
	.bind(item.title.as_str())
	.bind(item.link.as_str())
	.bind(item.published_at)
	.bind(item.cluster_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_item_by_link(db: &Db, link: &str) -> Result<Option<ItemRecord>> {
	let item = sqlx::query_as::<_, ItemRecord>(
		"SELECT item_id, title, link, published_at, cluster_id FROM items WHERE link = $1",
	)
	.bind(link)
	.fetch_optional(&db.pool)
	.await?;

	Ok(item)
}

pub async fn get_items(db: &Db, item_ids: &[Uuid]) -> Result<Vec<ItemRecord>> {
	if item_ids.is_empty() {
		return Ok(Vec::new());
	}

	let items = sqlx::query_as::<_, ItemRecord>(
		"SELECT item_id, title, link, published_at, cluster_id FROM items WHERE item_id = ANY($1)",
	)
	.bind(item_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(items)
}

pub async fn get_cluster(db: &Db, cluster_id: Uuid) -> Result<Option<ClusterRecord>> {
	let cluster = sqlx::query_as::<_, ClusterRecord>(
		"\
SELECT cluster_id, hot, trending, hot_score, trending_score, hot_at, trending_at
FROM clusters
WHERE cluster_id = $1",
	)
	.bind(cluster_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(cluster)
}

/// Upserts the cluster and points every member item at it, in one transaction.
pub async fn assign_cluster(db: &Db, cluster: &ClusterRecord, item_ids: &[Uuid]) -> Result<()> {
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO clusters (cluster_id, hot, trending, hot_score, trending_score, hot_at, trending_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (cluster_id) DO UPDATE
SET
	hot = EXCLUDED.hot,
	trending = EXCLUDED.trending,
	hot_score = EXCLUDED.hot_score,
	trending_score = EXCLUDED.trending_score,
	hot_at = EXCLUDED.hot_at,
	trending_at = EXCLUDED.trending_at,
	updated_at = now()",
	)
	.bind(cluster.cluster_id)
	.bind(cluster.hot)
	.bind(cluster.trending)
	.bind(cluster.hot_score)
	.bind(cluster.trending_score)
	.bind(cluster.hot_at)
	.bind(cluster.trending_at)
	.execute(&mut *tx)
	.await?;
	sqlx::query("UPDATE items SET cluster_id = $1 WHERE item_id = ANY($2)")
		.bind(cluster.cluster_id)
		.bind(item_ids)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(())
}

/// Newest item of each hot cluster published since `since`, hottest clusters first.
pub async fn hot_representatives(db: &Db, since: OffsetDateTime, limit: u32) -> Result<Vec<Uuid>> {
	let ids: Vec<Uuid> = sqlx::query_scalar(
		"\
WITH ranked AS (
	SELECT
		i.item_id,
		i.published_at,
		c.hot_score,
		c.hot_at,
		ROW_NUMBER() OVER (PARTITION BY c.cluster_id ORDER BY i.published_at DESC) AS row_num
	FROM items i
	JOIN clusters c ON i.cluster_id = c.cluster_id
	WHERE c.hot AND i.published_at >= $1
)
SELECT item_id
FROM ranked
WHERE row_num = 1
ORDER BY hot_score DESC, hot_at DESC NULLS LAST, published_at DESC
LIMIT $2",
	)
	.bind(since)
	.bind(i64::from(limit))
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}

/// Newest item of each trending cluster published since `since`.
pub async fn trending_representatives(db: &Db, since: OffsetDateTime) -> Result<Vec<Uuid>> {
	let ids: Vec<Uuid> = sqlx::query_scalar(
		"\
WITH ranked AS (
	SELECT
		i.item_id,
		i.published_at,
		c.trending_score,
		c.trending_at,
		ROW_NUMBER() OVER (PARTITION BY c.cluster_id ORDER BY i.published_at DESC) AS row_num
	FROM items i
	JOIN clusters c ON i.cluster_id = c.cluster_id
	WHERE c.trending AND i.published_at >= $1
)
SELECT item_id
FROM ranked
WHERE row_num = 1
ORDER BY trending_score DESC, trending_at DESC NULLS LAST, published_at DESC",
	)
	.bind(since)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}

pub async fn expired_item_ids(db: &Db, published_before: OffsetDateTime) -> Result<Vec<Uuid>> {
	let ids: Vec<Uuid> = sqlx::query_scalar("SELECT item_id FROM items WHERE published_at < $1")
		.bind(published_before)
		.fetch_all(&db.pool)
		.await?;

	Ok(ids)
}

/// Deletes items and any cluster left without members. Returns the number of items removed.
pub async fn delete_items(db: &Db, item_ids: &[Uuid]) -> Result<u64> {
	if item_ids.is_empty() {
		return Ok(0);
	}

	let mut tx = db.pool.begin().await?;
	let deleted = sqlx::query("DELETE FROM items WHERE item_id = ANY($1)")
		.bind(item_ids)
		.execute(&mut *tx)
		.await?
		.rows_affected();

	sqlx::query(
		"\
DELETE FROM clusters c
WHERE NOT EXISTS (SELECT 1 FROM items i WHERE i.cluster_id = c.cluster_id)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(deleted)
}
