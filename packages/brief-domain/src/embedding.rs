use serde::{Deserialize, Serialize};

/// Term-index to weight mapping, kept sorted by index with no duplicates.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SparseVector {
	pub indices: Vec<u32>,
	pub values: Vec<f32>,
}
impl SparseVector {
	/// Builds a sparse vector from unordered pairs. Duplicate indices are summed and
	/// non-finite or zero weights are dropped.
	pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
		let mut pairs: Vec<(u32, f32)> =
			pairs.into_iter().filter(|(_, value)| value.is_finite()).collect();

		pairs.sort_by_key(|(index, _)| *index);

		let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
		let mut values: Vec<f32> = Vec::with_capacity(pairs.len());

		for (index, value) in pairs {
			if indices.last() == Some(&index) {
				if let Some(slot) = values.last_mut() {
					*slot += value;
				}
			} else {
				indices.push(index);
				values.push(value);
			}
		}

		let (indices, values) =
			indices.into_iter().zip(values).filter(|(_, value)| *value != 0.0).unzip();

		Self { indices, values }
	}

	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	pub fn len(&self) -> usize {
		self.indices.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
		self.indices.iter().copied().zip(self.values.iter().copied())
	}

	/// Inner product over shared indices.
	pub fn dot(&self, other: &Self) -> f32 {
		let (mut i, mut j, mut sum) = (0, 0, 0.0);

		while i < self.indices.len() && j < other.indices.len() {
			match self.indices[i].cmp(&other.indices[j]) {
				std::cmp::Ordering::Less => i += 1,
				std::cmp::Ordering::Greater => j += 1,
				std::cmp::Ordering::Equal => {
					sum += self.values[i] * other.values[j];
					i += 1;
					j += 1;
				},
			}
		}

		sum
	}
}

/// Dense and sparse representations of one text.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Embedding {
	pub dense: Vec<f32>,
	pub sparse: SparseVector,
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	let score = dot / (norm_a.sqrt() * norm_b.sqrt());

	if score.is_finite() { score } else { 0.0 }
}

pub fn is_zero(vector: &[f32]) -> bool {
	vector.iter().all(|value| *value == 0.0)
}
