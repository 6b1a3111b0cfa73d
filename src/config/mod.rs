//! Configuration module for procwrap
//!
//! Provides XDG-compliant layered configuration for run defaults and logging.

pub mod loader;
pub mod model;

pub use loader::{config_paths, find_config_files, load_config};
pub use model::*;
