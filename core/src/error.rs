use fleetcast_commons::error::{CodedError, ErrorCode, format_with_code};
use thiserror::Error;

use alloy::primitives::Address;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl CodedError for CoreError {
    fn code(&self) -> ErrorCode {
        match self {
            CoreError::Template(err) => err.code(),
            CoreError::Resolve(err) => err.code(),
            CoreError::Encode(err) => err.code(),
        }
    }
}

impl From<CoreError> for String {
    fn from(value: CoreError) -> Self {
        format_with_code(&value)
    }
}

/// Errors in the placeholder grammar itself. These surface both at
/// validation time (template-fatal) and at resolution time (per-wallet).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("unknown placeholder: {name}")]
    UnknownName { name: String },
    #[error("placeholder {name} expects {expected} argument(s), got {got}")]
    WrongArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("placeholder {name}: invalid argument {arg:?}: {message}")]
    InvalidArgument {
        name: &'static str,
        arg: String,
        message: String,
    },
    #[error("unterminated placeholder starting at offset {offset}")]
    Unterminated { offset: usize },
}

/// Template-level validation errors. Fatal for the whole dispatch,
/// raised before any target exists.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid contract address {address:?}")]
    InvalidContractAddress { address: String },
    #[error("function name must not be empty")]
    EmptyFunctionName,
    #[error("interface does not declare function {name:?}")]
    FunctionNotInInterface { name: String },
    #[error("invalid interface description: {message}")]
    InvalidInterface { message: String },
    #[error("raw data is not well-formed hex: {message}")]
    InvalidDataHex { message: String },
    #[error("invalid placeholder at {path}: {source}")]
    Placeholder {
        path: String,
        #[source]
        source: PlaceholderError,
    },
}

impl CodedError for TemplateError {
    fn code(&self) -> ErrorCode {
        ErrorCode::CoreTemplate
    }
}

impl From<TemplateError> for String {
    fn from(value: TemplateError) -> Self {
        format_with_code(&value)
    }
}

/// Per-wallet resolution errors. Recorded on the failing target only.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid placeholder at {path}: {source}")]
    Placeholder {
        path: String,
        #[source]
        source: PlaceholderError,
    },
    #[error("no balance recorded for token {token} (at {path})")]
    MissingTokenBalance { token: Address, path: String },
    #[error("no balance to transfer ({source_desc})")]
    ZeroBalance { source_desc: String },
    #[error("arithmetic overflow at {path}: {message}")]
    Overflow { path: String, message: String },
}

impl CodedError for ResolveError {
    fn code(&self) -> ErrorCode {
        ErrorCode::CoreResolve
    }
}

impl From<ResolveError> for String {
    fn from(value: ResolveError) -> Self {
        format_with_code(&value)
    }
}

/// Call-encoding errors. Per-wallet at dispatch time.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid contract address {address:?}")]
    InvalidAddress { address: String },
    #[error("interface does not declare function {name:?}")]
    UnknownFunction { name: String },
    #[error("invalid interface description: {message}")]
    InterfaceParse { message: String },
    #[error("function {name} takes {expected} argument(s), got {got}")]
    ArgCountMismatch { name: String, expected: usize, got: usize },
    #[error("argument {index} does not fit parameter type {ty}: {message}")]
    ArgCoercion { index: usize, ty: String, message: String },
    #[error("abi encoding failed: {message}")]
    Abi { message: String },
    #[error("invalid call data hex: {message}")]
    DataHex { message: String },
    #[error("invalid value amount {value:?}: {message}")]
    InvalidValue { value: String, message: String },
}

impl CodedError for EncodeError {
    fn code(&self) -> ErrorCode {
        ErrorCode::CoreEncode
    }
}

impl From<EncodeError> for String {
    fn from(value: EncodeError) -> Self {
        format_with_code(&value)
    }
}
