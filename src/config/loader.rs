//! Layered configuration loading
//!
//! Sources, weakest first:
//! 1. built-in defaults
//! 2. `/etc/procwrap/config.toml`
//! 3. `$XDG_CONFIG_HOME/procwrap/config.toml`
//! 4. `~/.procwrap.toml`
//! 5. `./.procwrap.toml`
//! 6. the file given with `--config`
//! 7. `PROCWRAP_*` environment variables

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use super::model::Config;

const APP_NAME: &str = "procwrap";

/// Prefix of environment variables that override file configuration
const ENV_PREFIX: &str = "PROCWRAP_";

/// Candidate config file locations, weakest first
pub fn config_paths() -> Vec<PathBuf> {
    let system = Some(Path::new("/etc").join(APP_NAME).join("config.toml"));
    let user = dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"));
    let home = dirs::home_dir().map(|dir| dir.join(format!(".{}.toml", APP_NAME)));
    let local = Some(PathBuf::from(format!(".{}.toml", APP_NAME)));

    [system, user, home, local].into_iter().flatten().collect()
}

/// Config files from [`config_paths`] that exist
pub fn find_config_files() -> Vec<PathBuf> {
    config_paths().into_iter().filter(|p| p.is_file()).collect()
}

/// Load the merged configuration
///
/// Environment variables use `__` between nesting levels:
/// `PROCWRAP_DEFAULTS__TIMEOUT=60` sets `defaults.timeout`.
///
/// # Errors
/// Fails when `explicit_path` does not exist, or when a source holds a
/// value of the wrong type.
pub fn load_config(explicit_path: Option<&str>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for path in find_config_files() {
        tracing::debug!("Using config file {}", path.display());
        figment = figment.merge(Toml::file(path));
    }

    if let Some(path) = explicit_path.map(PathBuf::from) {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        tracing::debug!("Using config file {} (explicit)", path.display());
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Invalid procwrap configuration")
}
