//! CLI command definitions using clap
//!
//! Defines all CLI subcommands and their arguments.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::argfile::{expand_arg_files, ARG_FILE_PREFIX};
use crate::error::ExecError;
use crate::executor::{CommandSpec, ExecOptions};

/// Run external commands with an exit-code contract.
///
/// `run` waits for the command and prints its merged output, `stream` prints
/// output line by line and can kill the command after a timeout. Any argument
/// before `--` of the form `@path` is replaced by the arguments in that file.
#[derive(Parser, Debug)]
#[command(name = "procwrap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (overrides default XDG paths)
    #[arg(short, long, global = true, env = "PROCWRAP_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command to completion and print its output
    Run(RunArgs),

    /// Run a command and print its output as it arrives
    Stream(StreamArgs),

    /// Print the arguments an argument file expands to
    Tokenize(TokenizeArgs),
}

/// Options shared by `run` and `stream`
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Message logged when the command exits with an unexpected code
    #[arg(short, long)]
    pub message: Option<String>,

    /// Required exit code
    #[arg(long, allow_hyphen_values = true, conflicts_with = "no_expect")]
    pub expect: Option<i32>,

    /// Accept any exit code
    #[arg(long)]
    pub no_expect: bool,

    /// Working directory for the command
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,

    /// Environment variables in KEY=VALUE format
    #[arg(short, long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Executable followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ExecArgs {
    /// The command to execute
    pub fn spec(&self) -> CommandSpec {
        let (executable, args) = self
            .command
            .split_first()
            .map(|(exe, args)| (exe.as_str(), args))
            .unwrap_or(("", &[]));
        CommandSpec::new(executable, args.iter().cloned())
    }

    /// Apply these flags on top of configured options
    pub fn apply_to(&self, mut options: ExecOptions) -> ExecOptions {
        if let Some(ref message) = self.message {
            options.error_message = message.clone();
        }
        if self.no_expect {
            options.expected_exit_code = None;
        } else if let Some(code) = self.expect {
            options.expected_exit_code = Some(code);
        }
        if let Some(ref dir) = self.dir {
            options.working_dir = Some(dir.clone());
        }
        for (key, value) in &self.env {
            options.env.insert(key.clone(), value.clone());
        }
        options
    }
}

/// Arguments for the `run` subcommand
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub exec: ExecArgs,
}

/// Arguments for the `stream` subcommand
#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Timeout in seconds (0 for no timeout)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Exit code tolerated after a timeout kill
    #[arg(long, allow_hyphen_values = true)]
    pub kill_code: Option<i32>,

    /// Fail when the timeout kills the command
    #[arg(long)]
    pub fail_on_timeout: bool,

    #[command(flatten)]
    pub exec: ExecArgs,
}

impl StreamArgs {
    /// Apply these flags on top of configured options
    pub fn apply_to(&self, options: ExecOptions) -> ExecOptions {
        let mut options = self.exec.apply_to(options);
        if let Some(secs) = self.timeout {
            options = options.with_timeout_secs(secs);
        }
        if let Some(code) = self.kill_code {
            options.kill_exit_code = code;
        }
        if self.fail_on_timeout {
            options.fail_on_timeout = true;
        }
        options
    }
}

/// Arguments for the `tokenize` subcommand
#[derive(Args, Debug)]
pub struct TokenizeArgs {
    /// Argument file to read
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON output
    Json,
}

/// Parse KEY=VALUE argument
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid argument '{}': expected KEY=VALUE format", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Expand `@file` arguments that appear before the first `--`
///
/// The program name and everything from `--` on are passed through as is, so
/// arguments meant for the wrapped command are never rewritten. Arguments
/// need not be valid UTF-8; only `@file` paths are converted, lossily.
pub fn expand_cli_args(argv: Vec<OsString>) -> Result<Vec<OsString>, ExecError> {
    let mut head = argv;
    let split = head.iter().position(|a| a == "--").unwrap_or(head.len());
    let tail = head.split_off(split);

    let mut head = head.into_iter();
    let mut expanded: Vec<OsString> = head.next().into_iter().collect();
    for arg in head {
        if is_arg_file(&arg) {
            let arg = arg.to_string_lossy().into_owned();
            expanded.extend(expand_arg_files([arg])?.into_iter().map(OsString::from));
        } else {
            expanded.push(arg);
        }
    }
    expanded.extend(tail);

    Ok(expanded)
}

fn is_arg_file(arg: &OsString) -> bool {
    let mut prefix = [0; 4];
    let prefix = ARG_FILE_PREFIX.encode_utf8(&mut prefix).as_bytes();
    arg.as_encoded_bytes().starts_with(prefix)
}
