//! Argument files
//!
//! An argument beginning with `@` names a file whose tokens replace it. Files
//! may themselves contain `@file` arguments.

use std::path::{Path, PathBuf};

use super::tokenize::tokenize;
use crate::error::ExecError;

/// Prefix marking an argument as an argument-file reference
pub const ARG_FILE_PREFIX: char = '@';

/// Maximum nesting of argument files referencing other argument files
const MAX_DEPTH: usize = 16;

/// Read an argument file and tokenize every line
///
/// # Errors
/// * `ExecError::ArgFile` - If the file can't be read
/// * `ExecError::TokenizeFailure` - If a line is malformed
pub fn read_arg_file(path: impl AsRef<Path>) -> Result<Vec<String>, ExecError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ExecError::ArgFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut args = Vec::new();
    for line in content.lines() {
        args.extend(tokenize(line)?);
    }

    Ok(args)
}

/// Replace every `@path` argument with the arguments read from `path`
///
/// `~` and environment variables in the path are expanded.
pub fn expand_arg_files<I, S>(args: I) -> Result<Vec<String>, ExecError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut expanded = Vec::new();
    expand_into(args.into_iter().map(Into::into), 0, &mut expanded)?;
    Ok(expanded)
}

fn expand_into(
    args: impl Iterator<Item = String>,
    depth: usize,
    out: &mut Vec<String>,
) -> Result<(), ExecError> {
    for arg in args {
        let Some(raw_path) = arg.strip_prefix(ARG_FILE_PREFIX) else {
            out.push(arg);
            continue;
        };

        if depth >= MAX_DEPTH {
            return Err(ExecError::ArgFile {
                path: raw_path.to_string(),
                reason: format!("argument files nested more than {} deep", MAX_DEPTH),
            });
        }

        let path = resolve_path(raw_path)?;
        let inner = read_arg_file(&path)?;
        tracing::debug!("Read {} arguments from {}", inner.len(), path.display());

        expand_into(inner.into_iter(), depth + 1, out)?;
    }

    Ok(())
}

fn resolve_path(raw: &str) -> Result<PathBuf, ExecError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ExecError::ArgFile {
            path: raw.to_string(),
            reason: e.to_string(),
        })
}
