pub mod config;
pub mod error;
pub mod rules;
pub mod stats;

pub use error::{Result, RuleError};
pub use rules::Ingestor;
