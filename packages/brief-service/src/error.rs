pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Retrieval failed: {message}")]
	Retrieval { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<brief_storage::Error> for Error {
	fn from(err: brief_storage::Error) -> Self {
		match err {
			brief_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			brief_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			brief_storage::Error::NotFound(message) => Self::NotFound { message },
			brief_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<brief_domain::preference::PreferenceError> for Error {
	fn from(err: brief_domain::preference::PreferenceError) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<brief_coord::Error> for Error {
	fn from(err: brief_coord::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
