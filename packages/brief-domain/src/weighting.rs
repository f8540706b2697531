use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Upper bound applied to the combined action and completeness weight.
pub const MAX_WEIGHT: f32 = 3.0;
/// Listened fraction at which a history row counts as completed.
pub const COMPLETED_FRACTION: f32 = 0.9;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
	Like,
	Dislike,
	Share,
	Download,
	AddToPlaylist,
	Search,
}
impl ActionKind {
	pub const ALL: [Self; 6] =
		[Self::Like, Self::Dislike, Self::Share, Self::Download, Self::AddToPlaylist, Self::Search];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Like => "like",
			Self::Dislike => "dislike",
			Self::Share => "share",
			Self::Download => "download",
			Self::AddToPlaylist => "add_to_playlist",
			Self::Search => "search",
		}
	}

	pub fn weight(self) -> f32 {
		match self {
			Self::Like => 1.0,
			Self::Dislike => -1.0,
			Self::Share => 1.8,
			Self::Download => 1.3,
			Self::AddToPlaylist => 1.4,
			Self::Search => 0.75,
		}
	}
}
impl fmt::Display for ActionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ActionKind {
	type Err = UnknownAction;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let normalized = raw.trim().to_ascii_lowercase();

		Self::ALL
			.into_iter()
			.find(|kind| kind.as_str() == normalized)
			.ok_or_else(|| UnknownAction(raw.to_string()))
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown action kind {0:?}.")]
pub struct UnknownAction(pub String);

/// Interaction weight fed into the preference ledger.
///
/// Sums the distinct action weights and the completeness bonus, clamps the sum to
/// [`MAX_WEIGHT`], then damps by replay count. Autoplay halves a clamped weight of exactly 1.
pub fn weight(
	actions: &HashSet<ActionKind>,
	completeness: f32,
	replay_count: u32,
	is_autoplay: bool,
) -> f32 {
	let base: f32 = actions.iter().map(|kind| kind.weight()).sum();
	let clamped = (base + completeness_bonus(completeness)).min(MAX_WEIGHT);
	let damped = clamped * replay_damping(replay_count);

	if is_autoplay && clamped == 1.0 { damped * 0.5 } else { damped }
}

/// Step function over the listened fraction.
pub fn completeness_bonus(completeness: f32) -> f32 {
	if !completeness.is_finite() || completeness < 0.05 {
		0.0
	} else if completeness < 0.3 {
		-0.5
	} else if completeness < 0.5 {
		0.0
	} else if completeness < 0.8 {
		0.5
	} else {
		1.0
	}
}

/// `e^-(max(replay, 1) - 1)`; the first play is undamped.
pub fn replay_damping(replay_count: u32) -> f32 {
	let extra = replay_count.max(1) - 1;

	(-(extra as f32)).exp()
}

/// Listened fraction, zero when the duration is unknown.
pub fn completeness(stop_position_seconds: f32, total_duration_seconds: f32) -> f32 {
	if !total_duration_seconds.is_finite() || total_duration_seconds <= 0.0 {
		return 0.0;
	}

	let fraction = stop_position_seconds / total_duration_seconds;

	if fraction.is_finite() { fraction.max(0.0) } else { 0.0 }
}

pub fn is_completed(completeness: f32) -> bool {
	completeness >= COMPLETED_FRACTION
}
