pub mod config;
pub mod driver;
pub mod error;
pub mod members;
pub mod poller;
pub mod store;

pub use error::{EngineError, EngineResult};
