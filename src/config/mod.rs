//! Client configuration: defaults, and loading from a TOML file layered under
//! `BITNODES_*` environment variables.

mod defaults;
mod loader;

pub use defaults::{ClientConfig, DEFAULT_BASE_URL};
pub use loader::{ENV_PREFIX, get_default_config, load_configuration, write_config_to};
