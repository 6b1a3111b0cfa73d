//! procwrap - Run external commands with an exit-code contract
//!
//! Runs programs as child processes with stdout and stderr merged into one
//! stream and checks how they exit:
//! - **Synchronous** - wait for exit, return the whole output
//! - **Streaming** - deliver output line by line as it is produced, killing
//!   the child when an optional timeout passes
//! - **Argument files** - `@path` arguments expand to the words of a file,
//!   split with shell quoting rules and `#` comments
//!
//! ## Failure policy
//!
//! Runners return [`ExecError`] values carrying the exit code the host process
//! should use. [`OrExit::or_exit`] turns them into the fail-fast behavior:
//! log the diagnostic bundle, then terminate with that code.
//!
//! ## Example
//!
//! ```no_run
//! use procwrap::{run, OrExit};
//!
//! let output = run("echo", &["hello"], "echo failed", Some(0)).or_exit();
//! assert_eq!(output, "hello\n");
//! ```

pub mod argfile;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;

pub use argfile::{expand_arg_files, read_arg_file, tokenize};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{ErrorInfo, ExecError, OrExit};
pub use executor::{
    exec_streaming, exec_sync, run, run_async, CommandSpec, ExecOptions, ExecutionResult,
    LineStream,
};
