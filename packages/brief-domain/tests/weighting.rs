use std::collections::HashSet;

use brief_domain::weighting::{
	self, ActionKind, MAX_WEIGHT, UnknownAction, completeness, completeness_bonus, is_completed,
	replay_damping,
};

fn actions(kinds: &[ActionKind]) -> HashSet<ActionKind> {
	kinds.iter().copied().collect()
}

fn approx(actual: f32, expected: f32) {
	assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
}

#[test]
fn like_without_listening_weighs_one() {
	approx(weighting::weight(&actions(&[ActionKind::Like]), 0.0, 1, false), 1.0);
}

#[test]
fn near_complete_listen_weighs_one() {
	approx(weighting::weight(&actions(&[]), 0.9, 1, false), 1.0);
}

#[test]
fn autoplay_halves_weight_of_exactly_one() {
	approx(weighting::weight(&actions(&[]), 0.9, 1, true), 0.5);
	approx(weighting::weight(&actions(&[ActionKind::Like]), 0.0, 1, true), 0.5);
}

#[test]
fn autoplay_leaves_other_weights_untouched() {
	approx(weighting::weight(&actions(&[ActionKind::Like]), 0.9, 1, true), 2.0);
	approx(weighting::weight(&actions(&[]), 0.6, 1, true), 0.5);
}

#[test]
fn autoplay_compares_undamped_weight() {
	approx(weighting::weight(&actions(&[]), 0.9, 2, true), 0.5 * (-1.0_f32).exp());
}

#[test]
fn replay_damping_is_exponential() {
	let set = actions(&[ActionKind::Share]);
	let first = weighting::weight(&set, 0.6, 1, false);

	approx(weighting::weight(&set, 0.6, 2, false), first * (-1.0_f32).exp());
	approx(weighting::weight(&set, 0.6, 3, false), first * (-2.0_f32).exp());
	approx(weighting::weight(&set, 0.6, 0, false), first);
	approx(replay_damping(0), 1.0);
}

#[test]
fn combined_weight_is_clamped_without_floor() {
	let generous =
		actions(&[ActionKind::Like, ActionKind::Share, ActionKind::Download, ActionKind::AddToPlaylist]);

	approx(weighting::weight(&generous, 1.0, 1, false), MAX_WEIGHT);
	approx(weighting::weight(&actions(&[ActionKind::Dislike]), 0.1, 1, false), -1.5);
}

#[test]
fn completeness_bonus_steps() {
	for (fraction, bonus) in [
		(0.0, 0.0),
		(0.04, 0.0),
		(0.05, -0.5),
		(0.29, -0.5),
		(0.3, 0.0),
		(0.49, 0.0),
		(0.5, 0.5),
		(0.79, 0.5),
		(0.8, 1.0),
		(1.2, 1.0),
	] {
		approx(completeness_bonus(fraction), bonus);
	}
}

#[test]
fn completeness_guards_zero_duration() {
	approx(completeness(30.0, 0.0), 0.0);
	approx(completeness(30.0, 120.0), 0.25);
	assert!(is_completed(completeness(108.0, 120.0)));
	assert!(!is_completed(completeness(100.0, 120.0)));
}

#[test]
fn parses_action_names() {
	assert_eq!("add_to_playlist".parse::<ActionKind>(), Ok(ActionKind::AddToPlaylist));
	assert_eq!(" Like ".parse::<ActionKind>(), Ok(ActionKind::Like));
	assert_eq!("rate".parse::<ActionKind>(), Err(UnknownAction("rate".to_string())));

	let parsed: ActionKind = serde_json::from_str("\"dislike\"").expect("Action must deserialize.");

	assert_eq!(parsed, ActionKind::Dislike);
}
