//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory, supplies defaults on first run, persists the generated device
//! id, and validates the file into the provider's runtime settings.

pub mod config;
