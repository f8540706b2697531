use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::source::SourceDomain;

#[derive(Clone, Copy, Debug)]
pub struct ClusterThresholds {
	pub hot_min_score: u32,
	pub trending_min_score: u32,
}
impl Default for ClusterThresholds {
	fn default() -> Self {
		Self { hot_min_score: 2, trending_min_score: 4 }
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterScore {
	pub hot_score: u32,
	pub trending_score: u32,
	pub hot: bool,
	pub trending: bool,
}

/// Scores a cluster from its members' links.
///
/// Each distinct base domain counts once toward `trending_score`, and once more toward
/// `hot_score` when it belongs to the authoritative allow-list. Unparseable links are ignored.
pub fn score_cluster<'a>(
	links: impl IntoIterator<Item = &'a str>,
	authoritative: &[String],
	thresholds: ClusterThresholds,
) -> ClusterScore {
	let mut seen = HashSet::new();
	let mut hot_score = 0;
	let mut trending_score = 0;

	for domain in links.into_iter().filter_map(SourceDomain::parse) {
		if !seen.insert(domain.base.clone()) {
			continue;
		}
		if domain.is_listed(authoritative) {
			hot_score += 1;
		}

		trending_score += 1;
	}

	ClusterScore {
		hot_score,
		trending_score,
		hot: hot_score >= thresholds.hot_min_score,
		trending: trending_score >= thresholds.trending_min_score,
	}
}
