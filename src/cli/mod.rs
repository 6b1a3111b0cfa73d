//! CLI module for procwrap
//!
//! Provides command-line interface with the following subcommands:
//! - `run` - Run a command to completion
//! - `stream` - Run a command, printing output as it arrives
//! - `tokenize` - Show what an argument file expands to

pub mod commands;

pub use commands::{expand_cli_args, Cli, Commands};
