pub mod account;
pub mod bundler;
pub mod context;
pub mod error;
pub mod normalize;
pub mod signer;

pub use error::{ConnectorError, ConnectorResult};
