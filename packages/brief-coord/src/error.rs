pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to encode value for key {key}.")]
	Encode { key: String, source: serde_json::Error },
	#[error("Failed to decode value stored at key {key}.")]
	Decode { key: String, source: serde_json::Error },
}
