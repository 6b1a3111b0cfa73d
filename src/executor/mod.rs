//! Command execution module
//!
//! Provides two ways of running an external command, both with stdout and
//! stderr merged into one stream:
//! - [`exec_sync`] / [`run`] - block until exit, return the whole output
//! - [`exec_streaming`] / [`run_async`] - stream lines as they arrive, with
//!   an optional deadline after which the command is killed
//!
//! Both check the exit code against an expected one and return an
//! [`ExecError`](crate::error::ExecError) on mismatch.

pub mod command;
pub mod runner;
pub mod stream;
pub mod timing;

pub use command::{
    exit_code_of, CommandSpec, ExecOptions, DEFAULT_ERROR_MESSAGE, DEFAULT_KILL_EXIT_CODE,
};
pub use runner::{exec_sync, run, ExecutionResult};
pub use stream::{exec_streaming, run_async, LineStream};
pub use timing::{timed, timed_async};
