pub mod decay;
pub mod embedding;
pub mod preference;
pub mod scoring;
pub mod source;
pub mod weighting;
