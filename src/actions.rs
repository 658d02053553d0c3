//! Action evaluator
//!
//! Interprets `:.` statements: file creation from a content block,
//! capturing the last command's output into variables, and setting
//! environment variables for subsequent commands. Snippet invocation
//! (`:. @ name`) is handled by the engine, which owns the snippet table.

use crate::error::{ErrorKind, SpecError};
use crate::parser::{Arg, Statement};
use crate::state::State;

pub fn eval_action(stmt: &Statement, state: &mut State) -> Result<(), SpecError> {
    match stmt.target.as_str() {
        "file" => create_file(stmt, state),
        "stdout" => capture_stream(stmt, state, "stdout"),
        "stderr" => capture_stream(stmt, state, "stderr"),
        "env" => set_env(stmt, state),
        other => Err(SpecError::new(
            ErrorKind::UnknownTarget,
            format!("unknown action: {}", other),
        )),
    }
}

// ──────────────────────────────────────────────────────────
// file — write a file from the content block
// ──────────────────────────────────────────────────────────

fn create_file(stmt: &Statement, state: &mut State) -> Result<(), SpecError> {
    if stmt.args.is_empty() {
        return Err(SpecError::usage("file", "path [mode]"));
    }

    let path_arg = state.expand(&stmt.args[0])?;
    let path = state.resolve_path(&path_arg);

    let mode = match stmt.args.get(1) {
        Some(arg) => {
            let text = state.expand(arg)?;
            let mode = u32::from_str_radix(&text, 8).map_err(|_| {
                SpecError::new(
                    ErrorKind::Usage,
                    format!("invalid file mode (octal expected): {}", text),
                )
            })?;
            Some(mode)
        }
        None => None,
    };

    let content = if stmt.content.is_empty() {
        String::new()
    } else {
        let mut joined = stmt.content.join("\n");
        joined.push('\n');
        joined
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SpecError::new(
                ErrorKind::Io,
                format!("failed to create directory for {}: {}", path_arg, e),
            )
        })?;
    }
    std::fs::write(&path, &content).map_err(|e| {
        SpecError::new(
            ErrorKind::Io,
            format!("failed to create file {}: {}", path_arg, e),
        )
    })?;

    if let Some(mode) = mode {
        set_permissions(&path, mode).map_err(|e| {
            SpecError::new(
                ErrorKind::Io,
                format!("failed to chmod {}: {}", path_arg, e),
            )
        })?;
    }

    state.logf(&format!(
        "created file '{}' ({} lines)",
        path_arg,
        stmt.content.len()
    ));
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_permissions(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> {
    // File modes are a Unix concept; silently ignored elsewhere
    Ok(())
}

// ──────────────────────────────────────────────────────────
// stdout / stderr — capture output into a variable
// ──────────────────────────────────────────────────────────

fn capture_stream(stmt: &Statement, state: &mut State, which: &str) -> Result<(), SpecError> {
    let name = match stmt.args.first() {
        Some(Arg::Var(name)) => name.clone(),
        Some(other) => {
            return Err(SpecError::new(
                ErrorKind::Usage,
                format!("variable name must start with '@': {}", other.display()),
            ))
        }
        None => return Err(SpecError::usage(which, "@variable")),
    };

    let result = state.last_result()?;
    let value = if which == "stdout" {
        result.stdout.trim().to_string()
    } else {
        result.stderr.trim().to_string()
    };

    state.logf(&format!("@{} = \"{}\"", name, value));
    state.set_var(name, value);
    Ok(())
}

// ──────────────────────────────────────────────────────────
// env — set an environment variable for later commands
// ──────────────────────────────────────────────────────────

fn set_env(stmt: &Statement, state: &mut State) -> Result<(), SpecError> {
    if stmt.args.len() < 2 {
        return Err(SpecError::usage("env", "NAME value"));
    }
    let name = state.expand(&stmt.args[0])?;
    let value = state.expand(&stmt.args[1])?;
    state.logf(&format!("env {}='{}'", name, value));
    state.set_env(name, value);
    Ok(())
}
