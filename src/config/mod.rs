//! Configuration Module
//!
//! Loads and validates configuration from TOML files and the environment.

pub mod loader;

pub use loader::{
    load_config, load_config_or_default, Config, ConfigError,
};
