use fleetcast_commons::error::{CodedError, ErrorCode, ExternalError, format_with_code};
use thiserror::Error;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("context fetch failed: {source}")]
    Context {
        #[source]
        source: ExternalError,
    },
    #[error("threshold signer error: {source}")]
    Signer {
        #[source]
        source: ExternalError,
    },
    #[error("unusable signature from threshold signer: {message}")]
    SignatureFormat { message: String },
    #[error("bundler error: {source}")]
    Bundler {
        #[source]
        source: ExternalError,
    },
}

impl ConnectorError {
    pub fn context<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        ConnectorError::Context { source: err.into() }
    }

    pub fn signer<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        ConnectorError::Signer { source: err.into() }
    }

    pub fn bundler<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        ConnectorError::Bundler { source: err.into() }
    }
}

impl From<ConnectorError> for ExternalError {
    fn from(value: ConnectorError) -> Self {
        ExternalError(value.to_string())
    }
}

impl From<ConnectorError> for String {
    fn from(value: ConnectorError) -> Self {
        format_with_code(&value)
    }
}

impl CodedError for ConnectorError {
    fn code(&self) -> ErrorCode {
        match self {
            ConnectorError::InvalidInput { .. } | ConnectorError::Context { .. } => ErrorCode::ConnectorContext,
            ConnectorError::Signer { .. } | ConnectorError::SignatureFormat { .. } => ErrorCode::ConnectorSigner,
            ConnectorError::Bundler { .. } => ErrorCode::ConnectorBundler,
        }
    }
}
