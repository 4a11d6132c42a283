pub mod error;
pub mod math;
pub mod operation;
pub mod state;
pub mod template;
