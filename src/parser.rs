//! Spec-file parser
//!
//! Parses the line-oriented test DSL:
//! - `> name` starts a test case, `>@ name` starts a snippet
//! - `$.` / `$!` run a command (expected to succeed / fail)
//! - `$<` / `$>` expect / send text on the pseudo-terminal of the
//!   preceding command
//! - `?.` / `?!` assert (positive / negated)
//! - `:.` perform an action (write a file, capture output, ...)
//! - `..` continuation lines form a content block on the preceding
//!   statement
//! - `#` at line start is a comment; ` # ` outside quotes starts a
//!   trailing comment
//!
//! Tokenization happens here: quoted strings lose their quotes and have
//! `\\` and `\<quote>` escapes resolved, `@name` tokens become variable
//! references. Variable *expansion* happens in the engine at execution
//! time — the parser only tags the reference.

use std::collections::HashMap;

use crate::error::SpecError;

/// Expected outcome modifier: `.` is positive, `!` inverts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// What a statement does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `$.` / `$!` — run a subprocess
    Shell,
    /// `?.` / `?!` — evaluate a predicate
    Assertion,
    /// `:.` — perform a side effect
    Action,
}

/// One parsed argument: a literal string or a `@name` variable reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    Var(String),
}

impl Arg {
    /// The token text as written in the source, for diagnostics
    pub fn display(&self) -> String {
        match self {
            Arg::Literal(s) => s.clone(),
            Arg::Var(name) => format!("@{}", name),
        }
    }
}

/// Direction of one interactive step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `$<` — wait until the transcript contains the text
    Expect,
    /// `$>` — write the text plus a newline to the child
    Send,
}

/// One expect/send step attached to a shell statement
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub text: Arg,
    pub line: usize,
}

/// A parsed statement: one non-blank, non-comment line plus any attached
/// content block and interaction script
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub polarity: Polarity,
    /// First token: program name (Shell), assertion target, or action verb
    pub target: String,
    /// Remaining tokens
    pub args: Vec<Arg>,
    /// Lines of the attached `..` content block (empty = no block)
    pub content: Vec<String>,
    /// Expect/send script (Shell only; empty selects batch mode)
    pub steps: Vec<Step>,
    /// Original line text, for diagnostics
    pub raw: String,
    /// Trailing-comment text, shown as context on failure
    pub comment: Option<String>,
    /// 1-based source line
    pub line: usize,
}

/// A named sequence of statements: a test case or a snippet
#[derive(Debug, Clone)]
pub struct Stanza {
    pub name: String,
    pub statements: Vec<Statement>,
    pub line: usize,
}

/// The parsed form of one spec file
#[derive(Debug, Default)]
pub struct SpecDocument {
    pub tests: Vec<Stanza>,
    pub snippets: HashMap<String, Stanza>,
}

impl SpecDocument {
    /// Parse spec-file text. `file` is used in error locations only.
    pub fn parse(text: &str, file: &str) -> Result<SpecDocument, SpecError> {
        Parser::new(text, file).parse()
    }
}

// ──────────────────────────────────────────────────────────
// Tokenizer
// ──────────────────────────────────────────────────────────

/// Result of tokenizing the part of a line after its two-character prefix
struct TokenizedLine {
    args: Vec<Arg>,
    comment: Option<String>,
}

/// Quote-aware tokenizer. Splits on unquoted whitespace; a quote character
/// at token start opens a quoted token with `\\` and `\<quote>` escapes.
/// An unquoted `#` at token start terminates the line (trailing comment).
fn tokenize(rest: &str, file: &str, line: usize) -> Result<TokenizedLine, SpecError> {
    let chars: Vec<char> = rest.chars().collect();
    let mut args = Vec::new();
    let mut comment = None;
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        if chars[i] == '#' {
            let text: String = chars[i + 1..].iter().collect();
            comment = Some(text.trim().to_string());
            break;
        }
        if chars[i] == '"' || chars[i] == '\'' {
            let (content, next) = consume_quoted(&chars, i, file, line)?;
            args.push(Arg::Literal(content));
            i = next;
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            args.push(classify_word(word, file, line)?);
        }
    }

    Ok(TokenizedLine { args, comment })
}

/// Consume a quoted token starting at `start` (the opening quote).
/// Returns the unescaped content and the index just past the closing quote.
fn consume_quoted(
    chars: &[char],
    start: usize,
    file: &str,
    line: usize,
) -> Result<(String, usize), SpecError> {
    let quote = chars[start];
    let mut content = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 1;
            if i >= chars.len() {
                break;
            }
            let next = chars[i];
            if next == '\\' || next == quote {
                content.push(next);
            } else {
                // Unrecognized escapes pass through with the backslash
                content.push('\\');
                content.push(next);
            }
            i += 1;
        } else if c == quote {
            return Ok((content, i + 1));
        } else {
            content.push(c);
            i += 1;
        }
    }

    Err(SpecError::parse("unterminated quoted string").with_location(file, line))
}

/// Turn a bare word into an argument. `@name` is a variable reference
/// (name restricted to `[A-Za-z0-9_]`), a lone `@` stays literal (it is
/// the snippet-invocation verb).
fn classify_word(word: String, file: &str, line: usize) -> Result<Arg, SpecError> {
    if let Some(name) = word.strip_prefix('@') {
        if name.is_empty() {
            return Ok(Arg::Literal(word));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(
                SpecError::parse(format!("invalid variable name: {}", word))
                    .with_location(file, line),
            );
        }
        return Ok(Arg::Var(name.to_string()));
    }
    Ok(Arg::Literal(word))
}

// ──────────────────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────────────────

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    file: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, file: &'a str) -> Self {
        // CR is stripped before classification so CRLF files parse as LF
        let lines = text.lines().map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
        Self { lines, pos: 0, file }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn consume(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    fn line_number(&self) -> usize {
        self.pos + 1
    }

    fn err(&self, msg: impl Into<String>) -> SpecError {
        SpecError::parse(msg).with_location(self.file, self.line_number())
    }

    fn parse(mut self) -> Result<SpecDocument, SpecError> {
        let mut doc = SpecDocument::default();

        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.consume();
                continue;
            }
            if line.starts_with('>') {
                self.parse_stanza(&mut doc)?;
            } else {
                return Err(self.err(format!("statement outside a test case: {}", line)));
            }
        }

        Ok(doc)
    }

    /// Parse a `>` or `>@` header and its statements up to the next header
    fn parse_stanza(&mut self, doc: &mut SpecDocument) -> Result<(), SpecError> {
        let header_line = self.line_number();
        let header = self.consume().unwrap_or_default();

        let (is_snippet, name) = if let Some(rest) = header.strip_prefix(">@") {
            (true, rest.trim())
        } else {
            (false, header[1..].trim())
        };
        if name.is_empty() {
            let what = if is_snippet { "snippet" } else { "test case" };
            return Err(SpecError::parse(format!("{} header has no name", what))
                .with_location(self.file, header_line));
        }

        let statements = self.parse_statements()?;
        let stanza = Stanza {
            name: name.to_string(),
            statements,
            line: header_line,
        };

        if is_snippet {
            if doc.snippets.contains_key(&stanza.name) {
                return Err(SpecError::parse(format!("duplicate snippet name: {}", stanza.name))
                    .with_location(self.file, header_line));
            }
            doc.snippets.insert(stanza.name.clone(), stanza);
        } else {
            doc.tests.push(stanza);
        }
        Ok(())
    }

    /// Parse statements until the next `>` header or end of file
    fn parse_statements(&mut self) -> Result<Vec<Statement>, SpecError> {
        let mut statements = Vec::new();

        while let Some(line) = self.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.consume();
                continue;
            }
            if line.starts_with('>') {
                break;
            }
            if line.starts_with("..") {
                return Err(self.err("dangling content block: no statement to attach to"));
            }
            if line.starts_with("$<") || line.starts_with("$>") {
                return Err(self.err("interactive step must follow a shell command"));
            }
            statements.push(self.parse_statement()?);
        }

        Ok(statements)
    }

    /// Parse one statement line plus its attached interaction script
    /// and content block
    fn parse_statement(&mut self) -> Result<Statement, SpecError> {
        let line_number = self.line_number();
        let line = self.consume().unwrap_or_default();

        let mut prefix_chars = line.chars();
        let head = prefix_chars.next().unwrap_or(' ');
        let modifier = prefix_chars.next().unwrap_or(' ');

        let kind = match head {
            '$' => StatementKind::Shell,
            '?' => StatementKind::Assertion,
            ':' => StatementKind::Action,
            _ => return Err(SpecError::parse(format!("unknown statement prefix: {}", line))
                .with_location(self.file, line_number)),
        };
        let polarity = match (head, modifier) {
            (_, '.') => Polarity::Positive,
            ('$', '!') | ('?', '!') => Polarity::Negative,
            _ => {
                return Err(SpecError::parse(format!(
                    "unknown statement prefix: {}{}",
                    head, modifier
                ))
                .with_location(self.file, line_number))
            }
        };

        let rest = &line[2..];
        let tokenized = tokenize(rest, self.file, line_number)?;
        let mut args = tokenized.args;
        if args.is_empty() {
            return Err(SpecError::parse("empty statement")
                .with_location(self.file, line_number));
        }
        let target = args.remove(0).display();

        let steps = if kind == StatementKind::Shell {
            self.parse_steps()?
        } else {
            Vec::new()
        };
        let content = self.parse_content_block();

        let statement = Statement {
            kind,
            polarity,
            target,
            args,
            content,
            steps,
            raw: line.trim().to_string(),
            comment: tokenized.comment,
            line: line_number,
        };
        self.validate_statement(&statement)?;
        Ok(statement)
    }

    /// Collect `$<` / `$>` steps for the shell statement just parsed.
    /// Blank lines and comments may appear between steps; any other line
    /// ends the script.
    fn parse_steps(&mut self) -> Result<Vec<Step>, SpecError> {
        let mut steps = Vec::new();

        loop {
            let mark = self.pos;
            // Skip blanks/comments, but only commit if a step follows
            while let Some(line) = self.peek() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    self.consume();
                } else {
                    break;
                }
            }
            let Some(line) = self.peek() else {
                self.pos = mark;
                break;
            };
            if !line.starts_with("$<") && !line.starts_with("$>") {
                self.pos = mark;
                break;
            }

            let step_line = self.line_number();
            let line = self.consume().unwrap_or_default();
            let step_kind = if line.starts_with("$<") {
                StepKind::Expect
            } else {
                StepKind::Send
            };
            let verb = if step_kind == StepKind::Expect { "expect" } else { "send" };

            let tokenized = tokenize(&line[2..], self.file, step_line)?;
            let mut step_args = tokenized.args;
            if step_args.is_empty() {
                return Err(SpecError::parse(format!("{} step has no text", verb))
                    .with_location(self.file, step_line));
            }
            if step_args.len() > 1 {
                return Err(SpecError::parse(format!(
                    "{} step takes a single argument (quote text containing spaces)",
                    verb
                ))
                .with_location(self.file, step_line));
            }
            steps.push(Step {
                kind: step_kind,
                text: step_args.remove(0),
                line: step_line,
            });
        }

        Ok(steps)
    }

    /// Collect the `..` lines directly following the current position.
    /// Content is everything after `.. `; a lone `..` contributes an
    /// empty line.
    fn parse_content_block(&mut self) -> Vec<String> {
        let mut content = Vec::new();
        while let Some(line) = self.peek() {
            if !line.starts_with("..") {
                break;
            }
            self.consume();
            let text = &line[2..];
            content.push(text.strip_prefix(' ').unwrap_or(text).to_string());
        }
        content
    }

    /// Reject shapes the grammar forbids: content blocks on statements
    /// that don't take one, and bodiless stream assertions.
    fn validate_statement(&self, stmt: &Statement) -> Result<(), SpecError> {
        let admits_content = match (stmt.kind, stmt.target.as_str()) {
            (StatementKind::Action, "file") => true,
            (StatementKind::Assertion, "stdout" | "stderr") => stmt.args.is_empty(),
            (StatementKind::Assertion, "file") => stmt.args.len() == 1,
            _ => false,
        };
        if !stmt.content.is_empty() && !admits_content {
            return Err(SpecError::parse(format!(
                "dangling content block: '{}' does not take one",
                stmt.raw
            ))
            .with_location(self.file, stmt.line));
        }
        if stmt.kind == StatementKind::Assertion
            && matches!(stmt.target.as_str(), "stdout" | "stderr")
            && stmt.args.is_empty()
            && stmt.content.is_empty()
        {
            return Err(SpecError::parse(format!(
                "{} assertion needs an argument or a content block",
                stmt.target
            ))
            .with_location(self.file, stmt.line));
        }
        Ok(())
    }
}
