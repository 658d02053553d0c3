//! shellspec: a declarative test runner for shell commands
//!
//! Test authors write `.spec` files in a line-oriented mini-language;
//! the runner parses them, executes each test case in an isolated
//! temporary working directory, drives subprocesses (batch or
//! interactive through a pseudo-terminal), and evaluates assertions.
//!
//! # Spec syntax
//!
//! ```text
//! # Comment
//! > test case name
//! $. echo hello           # run, expect exit 0
//! ?. stdout "ell"         # assert stdout contains a substring
//! $! grep -q x missing    # run, expect non-zero exit
//! :. file config.txt      # write a file from the content block
//! .. key=value
//! ?. file config.txt      # assert exact file contents
//! .. key=value
//!
//! >@ snippet name
//! $. touch marker
//! ```
//!
//! # Statement prefixes
//!
//! | Prefix | Meaning                                   |
//! |--------|-------------------------------------------|
//! | `> `   | test-case header                          |
//! | `>@ `  | snippet header                            |
//! | `$.`   | run a command, expect success             |
//! | `$!`   | run a command, expect failure             |
//! | `$<`   | expect text from the interactive child    |
//! | `$>`   | send a line to the interactive child      |
//! | `?.`   | assertion                                 |
//! | `?!`   | negated assertion                         |
//! | `:.`   | action (file / stdout / stderr / env / @) |
//! | `..`   | content-block continuation                |
//!
//! A command followed by `$<`/`$>` steps runs under a pseudo-terminal
//! and is driven by the expect/send script; otherwise it runs as a
//! plain subprocess with stdout and stderr captured separately.
//!
//! Tokens beginning with `@` are variable references, resolved from the
//! per-test variable store at execution time. `:. stdout @v` captures
//! the last command's output; `?. == @v "text"` compares it.
//!
//! # Embedding in cargo tests
//!
//! ```rust,ignore
//! #[test]
//! fn cli_specs() {
//!     shellspec::run_and_assert("tests/specs/basic.spec");
//! }
//! ```

mod actions;
mod asserts;
mod driver;
mod engine;
mod error;
mod parser;
mod report;
mod runner;
mod state;

pub use driver::{ExecMode, Invocation, ProcessResult, ResolvedStep};
pub use engine::{Engine, DEFAULT_TIMEOUT};
pub use error::{ErrorKind, SpecError};
pub use parser::{
    Arg, Polarity, SpecDocument, Stanza, Statement, StatementKind, Step, StepKind,
};
pub use report::Report;
pub use runner::{RunConfig, SuiteResult, TestCaseResult, TestRunner};
pub use state::State;

// Convenience functions for cargo test integration
pub use runner::{run_and_assert, run_and_assert_with};
