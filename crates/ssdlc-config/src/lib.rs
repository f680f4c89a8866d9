//! Configuration management for ssdlc
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > config file > defaults. The TOML file lives at `.ssdlc/config.toml`
//! and may contain `[llm]`, `[retry]`, `[intent]`, `[workflow]` and
//! `[logging]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use discovery::CONFIG_ENV_VAR;
pub use model::*;
