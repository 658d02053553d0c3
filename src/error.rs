//! Runner errors

use std::fmt;

/// The kind of runner error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed spec file (unknown prefix, unterminated quote, ...)
    Parse,
    /// A statement was given the wrong arguments
    Usage,
    /// Subprocess failed to run or exited with an unexpected status
    CommandFailed,
    /// Subprocess succeeded but was expected to fail ($! prefix)
    UnexpectedSuccess,
    /// An assertion predicate evaluated false
    AssertionFailed,
    /// Subprocess or expect step exceeded its timeout
    Timeout,
    /// A @variable was referenced before being set
    UndefinedVariable,
    /// Snippet invocation named an unknown snippet
    UnknownSnippet,
    /// Snippet invocation re-entered an already-active snippet
    SnippetCycle,
    /// Assertion or action named an unknown target
    UnknownTarget,
    /// IO error
    Io,
}

/// A runner error with file/line context
#[derive(Debug)]
pub struct SpecError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    /// Text of the statement that failed, for diagnostics
    pub statement: Option<String>,
    /// Trailing-comment text of the failing statement
    pub context: Option<String>,
}

impl SpecError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            statement: None,
            context: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, msg)
    }

    pub fn usage(op: &str, expected: &str) -> Self {
        Self::new(ErrorKind::Usage, format!("usage: {} {}", op, expected))
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("undefined variable @{}", name),
        )
    }

    pub fn is_parse(&self) -> bool {
        self.kind == ErrorKind::Parse
    }
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }
        if let Some(line) = self.line {
            write!(f, "{}:", line)?;
        }
        if self.file.is_some() || self.line.is_some() {
            write!(f, " ")?;
        }
        if let Some(ref stmt) = self.statement {
            write!(f, "{}: ", stmt)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref context) = self.context {
            write!(f, "\n  context: {}", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for SpecError {}

impl From<std::io::Error> for SpecError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}
