use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use brief_domain::weighting::{self, ActionKind};
use brief_storage::models::{HistoryPlay, ListenRecord};

use crate::{BriefService, Error, Result};

/// One playback report for an item.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ListenEvent {
	pub item_id: Uuid,
	#[serde(default)]
	pub actions: HashSet<ActionKind>,
	pub listen_duration_seconds: f32,
	pub stop_position_seconds: f32,
	pub total_duration_seconds: f32,
	#[serde(default)]
	pub is_autoplay: bool,
	#[serde(default)]
	pub rating: Option<i32>,
}

/// How earlier plays of an item count toward replay damping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayPolicy {
	/// Play count of the newest visible history row.
	#[default]
	LatestVisible,
	/// Play count summed over every row, hidden ones included.
	AllTime,
}
impl ReplayPolicy {
	pub fn from_config(raw: &str) -> Self {
		match raw {
			"all_time" => Self::AllTime,
			_ => Self::LatestVisible,
		}
	}

	/// Earlier plays, given history rows ordered newest first.
	pub fn replay_count(self, plays: &[HistoryPlay]) -> u32 {
		let count = match self {
			Self::LatestVisible =>
				plays.iter().find(|play| !play.hidden).map_or(0, |play| play.play_count),
			Self::AllTime => plays.iter().map(|play| play.play_count).sum(),
		};

		count.max(0) as u32
	}
}

impl BriefService {
	pub fn replay_policy(&self) -> ReplayPolicy {
		ReplayPolicy::from_config(&self.cfg.preference.replay_policy)
	}

	/// Folds a listen into the user's preferences and appends it to history.
	///
	/// Returns `Ok(false)` when the item has no stored embedding; nothing is recorded then.
	pub async fn log_listen(&self, user_id: &str, event: &ListenEvent) -> Result<bool> {
		crate::require_user_id(user_id)?;

		for (field, value) in [
			("listen_duration_seconds", event.listen_duration_seconds),
			("stop_position_seconds", event.stop_position_seconds),
			("total_duration_seconds", event.total_duration_seconds),
		] {
			if !value.is_finite() {
				return Err(Error::InvalidRequest { message: format!("{field} must be finite.") });
			}
		}

		let Some(embedding) = self.backends.vectors.dense_vector(event.item_id).await? else {
			tracing::warn!(
				user_id = %user_id,
				item_id = %event.item_id,
				"Ignored listen for an item without an embedding."
			);

			return Ok(false);
		};
		let _guard = self.lock_user(user_id).await;
		let plays = self.backends.preferences.history_plays(user_id, event.item_id).await?;
		let replay_count = self.replay_policy().replay_count(&plays);
		let completeness =
			weighting::completeness(event.stop_position_seconds, event.total_duration_seconds);
		let weight =
			weighting::weight(&event.actions, completeness, replay_count, event.is_autoplay);

		self.record_locked(user_id, &embedding, weight).await?;

		let listen = ListenRecord {
			listen_duration_seconds: event.listen_duration_seconds,
			stop_position_seconds: event.stop_position_seconds,
			completed: weighting::is_completed(completeness),
			shared: event.actions.contains(&ActionKind::Share),
			downloaded: event.actions.contains(&ActionKind::Download),
			added_to_playlist: event.actions.contains(&ActionKind::AddToPlaylist),
			rating: event.rating,
			listened_at: OffsetDateTime::now_utc(),
		};

		self.backends.preferences.record_listen(user_id, event.item_id, &listen).await?;

		tracing::debug!(
			user_id = %user_id,
			item_id = %event.item_id,
			weight,
			replay_count,
			"Recorded listen."
		);

		Ok(true)
	}

	/// Folds a search query into the user's preferences with the search action weight.
	pub async fn log_search(&self, user_id: &str, query: &str) -> Result<()> {
		crate::require_user_id(user_id)?;

		let embedding = self.embed_query(query).await?;
		let actions = HashSet::from([ActionKind::Search]);
		let weight = weighting::weight(&actions, 0.0, 0, false);

		self.record_interaction(user_id, &embedding.dense, weight).await?;

		Ok(())
	}

	/// Hides the visible history row; the next play starts a fresh row.
	pub async fn hide_item(&self, user_id: &str, item_id: Uuid) -> Result<bool> {
		crate::require_user_id(user_id)?;

		self.backends.preferences.hide_item(user_id, item_id).await
	}
}
