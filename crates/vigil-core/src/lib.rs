//! vigil-core: shared types and configuration for the Vigil agent.

pub mod command;
pub mod config;
pub mod error;
pub mod types;

pub use command::split_command;
pub use config::{VigilConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
