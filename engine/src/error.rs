use fleetcast_commons::error::{CodedError, ErrorCode, ExternalError};
use fleetcast_connectors::error::ConnectorError;
use fleetcast_core::error::CoreError;
use thiserror::Error;

use crate::config::ConfigError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("store error")]
    Store {
        #[source]
        source: ExternalError,
    },
    #[error("{message}")]
    Dispatch { message: String },
}

impl EngineError {
    pub fn store<E>(err: E) -> Self
    where
        E: Into<ExternalError>,
    {
        EngineError::Store { source: err.into() }
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        EngineError::Dispatch {
            message: message.into(),
        }
    }
}

impl CodedError for EngineError {
    fn code(&self) -> ErrorCode {
        match self {
            EngineError::Config(err) => err.code(),
            EngineError::Core(err) => err.code(),
            EngineError::Connector(err) => err.code(),
            EngineError::Store { .. } => ErrorCode::EngineStore,
            EngineError::Dispatch { .. } => ErrorCode::EngineDispatch,
        }
    }
}
