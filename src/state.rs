//! Per-test-case execution state
//!
//! Holds everything a test case mutates while it runs: the variable
//! store, extra environment variables, the working directory, the
//! last process result, and the execution log. A fresh `State` per
//! test case is what enforces isolation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::driver::ProcessResult;
use crate::error::{ErrorKind, SpecError};
use crate::parser::Arg;

/// Mutable state for a single test case
pub struct State {
    /// The test's temporary working directory
    pub workdir: PathBuf,
    /// Variable store: bare name (no `@`) → value
    vars: HashMap<String, String>,
    /// Extra environment variables for spawned commands, in set order
    env: Vec<(String, String)>,
    /// Result of the most recent shell statement
    pub last: Option<ProcessResult>,
    /// Execution log, shown in verbose reports and on failure
    pub log: String,
}

impl State {
    pub fn new(workdir: PathBuf) -> Self {
        Self {
            workdir,
            vars: HashMap::new(),
            env: Vec::new(),
            last: None,
            log: String::new(),
        }
    }

    /// Set a variable, overwriting any existing value
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    /// Expand an argument: literals pass through, variable references
    /// resolve against the store or fail.
    pub fn expand(&self, arg: &Arg) -> Result<String, SpecError> {
        match arg {
            Arg::Literal(s) => Ok(s.clone()),
            Arg::Var(name) => self
                .get_var(name)
                .map(|v| v.to_string())
                .ok_or_else(|| SpecError::undefined_variable(name)),
        }
    }

    /// Set an environment variable for subsequent shell statements
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.env.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.env.push((key, value));
        }
    }

    /// Environment variables to layer on top of the inherited environment
    pub fn environ(&self) -> &[(String, String)] {
        &self.env
    }

    /// The last process result, or an error when no shell statement
    /// has executed yet.
    pub fn last_result(&self) -> Result<&ProcessResult, SpecError> {
        self.last.as_ref().ok_or_else(|| {
            SpecError::new(
                ErrorKind::CommandFailed,
                "no command has run yet in this test case",
            )
        })
    }

    /// Resolve a path against the working directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workdir.join(p)
        }
    }

    /// Append a log entry
    pub fn logf(&mut self, msg: &str) {
        self.log.push_str(msg);
        if !msg.ends_with('\n') {
            self.log.push('\n');
        }
    }
}
