//! Statement execution engine
//!
//! The `Engine` holds the injected configuration (alias table, timeouts)
//! and walks a stanza's statements against a [`State`]. It is stateless
//! across test cases — one engine runs many tests.
//!
//! Shell statements dispatch to the process driver: batch when the
//! statement has no interaction script, interactive otherwise. Snippet
//! invocations expand inline against the caller's state; an active-name
//! stack catches cycles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actions;
use crate::asserts;
use crate::driver::{self, Invocation, ResolvedStep};
use crate::error::{ErrorKind, SpecError};
use crate::parser::{Polarity, SpecDocument, Stanza, Statement, StatementKind};
use crate::state::State;

/// Default wall-clock timeout for batch commands and per-step timeout
/// for interactive ones
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Engine {
    /// Command aliases: first token → replacement path
    pub aliases: HashMap<String, String>,
    /// Batch-mode wall-clock timeout
    pub shell_timeout: Duration,
    /// Interactive per-step timeout
    pub expect_timeout: Duration,
    /// Directory of the spec file, for resolving relative direct
    /// command paths
    pub spec_dir: Option<PathBuf>,
    /// Base directory for relative alias replacement values. Aliases
    /// are injected configuration, so their paths anchor to wherever
    /// the alias table lives, not to the spec file that uses them.
    pub alias_dir: Option<PathBuf>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            aliases: HashMap::new(),
            shell_timeout: DEFAULT_TIMEOUT,
            expect_timeout: DEFAULT_TIMEOUT,
            spec_dir: None,
            alias_dir: None,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one test case to completion. The first failing statement
    /// stops the walk; its error carries file/line context.
    pub fn run_test_case(
        &self,
        case: &Stanza,
        doc: &SpecDocument,
        state: &mut State,
        file: &str,
    ) -> Result<(), SpecError> {
        let mut active_snippets = Vec::new();
        self.run_stanza(&case.statements, doc, state, file, &mut active_snippets)
    }

    fn run_stanza(
        &self,
        statements: &[Statement],
        doc: &SpecDocument,
        state: &mut State,
        file: &str,
        active: &mut Vec<String>,
    ) -> Result<(), SpecError> {
        for stmt in statements {
            self.run_statement(stmt, doc, state, file, active)
                .map_err(|e| annotate(e, stmt, file))?;
        }
        Ok(())
    }

    fn run_statement(
        &self,
        stmt: &Statement,
        doc: &SpecDocument,
        state: &mut State,
        file: &str,
        active: &mut Vec<String>,
    ) -> Result<(), SpecError> {
        match stmt.kind {
            StatementKind::Shell => self.run_shell(stmt, state),
            StatementKind::Assertion => asserts::eval_assertion(stmt, state),
            StatementKind::Action => {
                if stmt.target == "@" {
                    self.invoke_snippet(stmt, doc, state, file, active)
                } else {
                    actions::eval_action(stmt, state)
                }
            }
        }
    }

    // ──────────────────────────────────────────────────────────
    // Shell statements
    // ──────────────────────────────────────────────────────────

    fn run_shell(&self, stmt: &Statement, state: &mut State) -> Result<(), SpecError> {
        let program = self.resolve_program(&stmt.target);
        let mut args = Vec::with_capacity(stmt.args.len());
        for arg in &stmt.args {
            args.push(state.expand(arg)?);
        }

        let inv = Invocation {
            program,
            args,
            workdir: state.workdir.clone(),
            env: state.environ().to_vec(),
        };
        state.logf(&format!("$ {}", inv.display()));

        let result = if stmt.steps.is_empty() {
            driver::run_batch(&inv, self.shell_timeout)?
        } else {
            let mut steps = Vec::with_capacity(stmt.steps.len());
            for step in &stmt.steps {
                steps.push(ResolvedStep {
                    kind: step.kind,
                    text: state.expand(&step.text)?,
                });
            }
            driver::run_interactive(&inv, &steps, self.expect_timeout)?
        };

        if !result.stdout.is_empty() {
            state.logf(&format!("[stdout]\n{}", result.stdout));
        }
        if !result.stderr.is_empty() {
            state.logf(&format!("[stderr]\n{}", result.stderr));
        }

        let exit_code = result.exit_code;
        let diagnostics = output_dump(&result.stdout, &result.stderr);
        state.last = Some(result);

        match stmt.polarity {
            Polarity::Positive if exit_code != 0 => Err(SpecError::new(
                ErrorKind::CommandFailed,
                format!("command failed with exit code {}{}", exit_code, diagnostics),
            )),
            Polarity::Negative if exit_code == 0 => Err(SpecError::new(
                ErrorKind::UnexpectedSuccess,
                format!("command succeeded unexpectedly (exit 0){}", diagnostics),
            )),
            _ => {
                state.logf(&format!("exit: {}", exit_code));
                Ok(())
            }
        }
    }

    /// Apply the alias table and resolve relative command paths. A
    /// direct token containing `/` resolves against the spec file's
    /// directory, so a spec can run helper scripts that live next to
    /// it; a relative alias replacement resolves against `alias_dir`,
    /// the home of the alias table itself.
    fn resolve_program(&self, token: &str) -> String {
        let (name, base) = match self.aliases.get(token) {
            Some(replacement) => (replacement.as_str(), self.alias_dir.as_ref()),
            None => (token, self.spec_dir.as_ref()),
        };
        let path = Path::new(name);
        if !path.is_absolute() && name.contains('/') {
            if let Some(dir) = base {
                return dir.join(name).to_string_lossy().into_owned();
            }
        }
        name.to_string()
    }

    // ──────────────────────────────────────────────────────────
    // Snippet invocation
    // ──────────────────────────────────────────────────────────

    fn invoke_snippet(
        &self,
        stmt: &Statement,
        doc: &SpecDocument,
        state: &mut State,
        file: &str,
        active: &mut Vec<String>,
    ) -> Result<(), SpecError> {
        let name = match stmt.args.first() {
            Some(arg) => state.expand(arg)?,
            None => return Err(SpecError::usage("@", "snippet-name")),
        };

        let snippet = doc.snippets.get(&name).ok_or_else(|| {
            SpecError::new(
                ErrorKind::UnknownSnippet,
                format!("unknown snippet: {}", name),
            )
        })?;

        if active.iter().any(|n| *n == name) {
            let mut chain = active.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(&name);
            return Err(SpecError::new(
                ErrorKind::SnippetCycle,
                format!("snippet cycle: {}", chain),
            ));
        }

        state.logf(&format!("@ {}", name));
        active.push(name);
        let result = self.run_stanza(&snippet.statements, doc, state, file, active);
        active.pop();
        result
    }
}

/// Attach location and statement context to an error bubbling out of a
/// statement, unless a deeper statement already claimed it.
fn annotate(e: SpecError, stmt: &Statement, file: &str) -> SpecError {
    if e.line.is_some() {
        return e;
    }
    let mut e = e.with_location(file, stmt.line).with_statement(stmt.raw.as_str());
    if let Some(ref comment) = stmt.comment {
        e = e.with_context(comment.clone());
    }
    e
}

/// Captured output formatted for a failure diagnostic
fn output_dump(stdout: &str, stderr: &str) -> String {
    let mut s = String::new();
    if !stdout.trim().is_empty() {
        s.push_str(&format!("\nstdout:\n{}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        s.push_str(&format!("\nstderr:\n{}", stderr.trim_end()));
    }
    s
}
