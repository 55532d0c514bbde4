//! Configuration for Lavega.
//!
//! Provides TOML-based configuration with:
//! - OAuth client registration (`[oauth]`), falling back to the Google preset
//! - Session, storage and logging settings
//! - Config file layering (XDG user config + project-local overrides)
//! - Client secret resolution (keyring, then env var, then config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, load_config, load_config_file,
    load_config_with_options, require_config_dir, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_client_secret};
pub use types::*;
