//! Fold arithmetic over accumulator snapshots.
//!
//! Every function here returns a fresh vector and never yields a non-finite
//! component: any result that would contain NaN or infinity collapses to zeros.

/// `acc + embedding * weight`, component-wise.
pub fn add_scaled(acc: &[f32], embedding: &[f32], weight: f32) -> Vec<f32> {
	let out: Vec<f32> = acc.iter().zip(embedding).map(|(a, e)| a + e * weight).collect();

	finite_or_zero(out, acc.len())
}

/// Weighted mean of an accumulator, zero when the total weight is zero.
pub fn weighted_mean(sum: &[f32], total_weight: f32) -> Vec<f32> {
	if total_weight == 0.0 || !total_weight.is_finite() {
		return vec![0.0; sum.len()];
	}

	finite_or_zero(sum.iter().map(|value| value / total_weight).collect(), sum.len())
}

/// `previous * (1 - ratio) + current * ratio`.
pub fn mix(previous: &[f32], current: &[f32], ratio: f32) -> Vec<f32> {
	let keep = 1.0 - ratio;
	let out = previous.iter().zip(current).map(|(p, c)| p * keep + c * ratio).collect();

	finite_or_zero(out, previous.len())
}

/// Mixes the weighted mean of an accumulator into an authoritative vector.
pub fn fold(authoritative: &[f32], accumulator: &[f32], total_weight: f32, ratio: f32) -> Vec<f32> {
	mix(authoritative, &weighted_mean(accumulator, total_weight), ratio)
}

fn finite_or_zero(values: Vec<f32>, dim: usize) -> Vec<f32> {
	if values.iter().all(|value| value.is_finite()) { values } else { vec![0.0; dim] }
}
