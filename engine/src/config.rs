use std::env;
use std::io;
use std::path::PathBuf;

use fleetcast_commons::{
    env::config_dir,
    error::{CodedError, ErrorCode, ExternalError},
};
use thiserror::Error;
use tracing::debug;

fn expand_tilde(p: &str) -> PathBuf {
    if let Some(stripped) = p.strip_prefix("~/")
        && let Ok(home) = env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(p)
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    MissingEnv {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("invalid value in {var}")]
    InvalidValue {
        var: &'static str,
        #[source]
        source: ExternalError,
    },
    #[error("failed to read members file at {path:?}")]
    ReadMembers {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse members file at {path:?}")]
    ParseMembers {
        path: PathBuf,
        #[source]
        source: ExternalError,
    },
    #[error("no member with id {member_id:?} in the members file")]
    UnknownMember { member_id: String },
}

impl CodedError for ConfigError {
    fn code(&self) -> ErrorCode {
        match self {
            ConfigError::MissingEnv { .. } => ErrorCode::ConfigMissingEnv,
            ConfigError::InvalidValue { .. } => ErrorCode::ConfigInvalidValue,
            ConfigError::ReadMembers { .. }
            | ConfigError::ParseMembers { .. }
            | ConfigError::UnknownMember { .. } => ErrorCode::ConfigReadMembers,
        }
    }
}

pub struct Config {
    pub evm_rpc_url: String,
    pub signer_url: String,
    pub bundler_url: String,
    pub db_path: String,
    pub members_file: PathBuf,
    pub poll_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub chain_id: Option<u64>,
    /// When true, a percentage placeholder over a zero balance fails that
    /// member's target instead of dispatching a zero-amount call.
    pub fail_on_zero_amount: bool,
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        let home = config_dir();

        let evm_rpc_url = env::var("EVM_RPC_URL").map_err(|source| ConfigError::MissingEnv {
            var: "EVM_RPC_URL",
            source,
        })?;
        let signer_url = env::var("SIGNER_URL").map_err(|source| ConfigError::MissingEnv {
            var: "SIGNER_URL",
            source,
        })?;
        let bundler_url = env::var("BUNDLER_URL").map_err(|source| ConfigError::MissingEnv {
            var: "BUNDLER_URL",
            source,
        })?;

        let db_path = env::var("DB_PATH").unwrap_or(format!("{}/fleetcast.db", home));

        let members_file = expand_tilde(&env::var("MEMBERS_FILE").map_err(|source| ConfigError::MissingEnv {
            var: "MEMBERS_FILE",
            source,
        })?);

        let poll_interval_secs = parse_env_or("POLL_INTERVAL_SECS", 5)?;
        let http_timeout_secs = parse_env_or("HTTP_TIMEOUT_SECS", 10)?;

        let chain_id = match env::var("CHAIN_ID") {
            Ok(raw) => Some(raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                var: "CHAIN_ID",
                source: ExternalError::from(e.to_string()),
            })?),
            Err(_) => None,
        };

        let fail_on_zero_amount = env::var("FAIL_ON_ZERO_AMOUNT")
            .map(|v| v.parse().unwrap_or(true))
            .unwrap_or(true);

        debug!(db_path = %db_path, poll_interval_secs, "config loaded");

        Ok(Config {
            evm_rpc_url,
            signer_url,
            bundler_url,
            db_path,
            members_file,
            poll_interval_secs,
            http_timeout_secs,
            chain_id,
            fail_on_zero_amount,
        })
    }
}

fn parse_env_or(var: &'static str, default: u64) -> ConfigResult<u64> {
    match env::var(var) {
        Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            var,
            source: ExternalError::from(e.to_string()),
        }),
        Err(_) => Ok(default),
    }
}
