//! Configuration system for the satchel session store.
//!
//! Provides TOML-based configuration with:
//! - Store, session and sweeper sections (`[store]`, `[session]`, `[sweeper]`)
//! - Config file layering (XDG user config + project-local overrides)
//! - Conversion into [`satchel_store::StoreConfig`] and [`satchel_store::SessionOptions`]

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, save_config, xdg_config_dir,
    xdg_config_path, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use types::*;
