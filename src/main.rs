//! procwrap CLI entry point
//!
//! Usage:
//!   procwrap run -- <exe> [args...]       Run to completion, print output
//!   procwrap stream -- <exe> [args...]    Print output as it arrives
//!   procwrap tokenize <file>              Show what an argument file expands to

use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use procwrap::cli::{
    commands::{OutputFormat, RunArgs, StreamArgs, TokenizeArgs},
    expand_cli_args, Cli, Commands,
};
use procwrap::config::{load_config, Config, LoggingConfig};
use procwrap::error::{ErrorInfo, ExecError, OrExit};
use procwrap::executor::{
    exec_streaming, exec_sync, timed, timed_async, CommandSpec, ExecOptions,
};
use procwrap::{logging, read_arg_file};

#[tokio::main]
async fn main() -> ExitCode {
    let argv = match expand_cli_args(std::env::args_os().collect()) {
        Ok(argv) => argv,
        Err(e) => {
            // No config yet, report with default logging
            let _ = logging::try_init(&LoggingConfig::default());
            e.exit();
        }
    };
    let cli = Cli::parse_from(argv);

    let result = run(cli).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    logging::init(&logging_config);

    match cli.command {
        Commands::Run(args) => run_to_completion(args, &config, cli.verbose)?,
        Commands::Stream(args) => stream_output(args, &config, cli.verbose).await?,
        Commands::Tokenize(args) => show_tokens(args)?,
    }

    Ok(())
}

/// Run a command and print its output once it exits
fn run_to_completion(args: RunArgs, config: &Config, verbose: bool) -> Result<()> {
    let spec = args.exec.spec();
    let options = args.exec.apply_to(config.exec_options());

    let (elapsed, result) = timed(|| exec_sync(&spec, &options));

    match args.format {
        OutputFormat::Text => {
            let result = result.or_exit();
            print!("{}", result.output);
            std::io::stdout().flush()?;
        }
        OutputFormat::Json => match result {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Err(e) => fail_with_json(&e)?,
        },
    }

    if verbose {
        eprintln!(
            "{}: {} finished in {}ms",
            "success".green(),
            spec,
            elapsed.as_millis()
        );
    }

    Ok(())
}

/// Run a command and print each line as soon as it is produced
async fn stream_output(args: StreamArgs, config: &Config, verbose: bool) -> Result<()> {
    let spec = args.exec.spec();
    let options = args.apply_to(config.exec_options());

    let (elapsed, outcome) = timed_async(print_lines(&spec, &options)).await;
    let (exit_code, timed_out) = outcome.or_exit();

    if verbose {
        let status = if timed_out {
            "timeout".yellow()
        } else {
            "success".green()
        };
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "{}: {} exited with {} after {}ms",
            status,
            spec,
            code,
            elapsed.as_millis()
        );
    }

    Ok(())
}

/// Copy streamed lines to stdout, returning the exit code and whether the
/// timeout fired
async fn print_lines(
    spec: &CommandSpec,
    options: &ExecOptions,
) -> Result<(Option<i32>, bool), ExecError> {
    let mut stream = exec_streaming(spec, options).await?;
    let mut stdout = std::io::stdout();

    while let Some(line) = stream.next_line().await? {
        if writeln!(stdout, "{}", line).is_err() {
            // Reader went away, dropping the stream kills the child
            tracing::debug!("stdout closed, stopping {}", stream.command());
            return Ok((None, stream.timed_out()));
        }
    }

    Ok((stream.exit_code(), stream.timed_out()))
}

/// Print the arguments an argument file expands to
fn show_tokens(args: TokenizeArgs) -> Result<()> {
    let tokens = read_arg_file(&args.file).or_exit();

    match args.format {
        OutputFormat::Text => {
            for token in &tokens {
                println!("{}", token);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tokens)?),
    }

    Ok(())
}

/// Print the error as JSON on stdout, then apply the fail-fast policy
fn fail_with_json(err: &ExecError) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&ErrorInfo::from(err))?);
    std::io::stdout().flush()?;
    err.exit()
}
