//! Terminal report
//!
//! Renders suite results to the terminal: a header, one line per test
//! with a colored PASS/FAIL verdict, failure diagnostics, optional
//! execution logs in verbose mode, and a summary.

use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::runner::{SuiteResult, TestCaseResult};

pub struct Report {
    stdout: StandardStream,
    verbose: bool,
}

impl Report {
    pub fn new(color: bool, verbose: bool) -> Self {
        let choice = if color {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            stdout: StandardStream::stdout(choice),
            verbose,
        }
    }

    fn set_color(&mut self, color: Color) {
        let _ = self.stdout.set_color(ColorSpec::new().set_fg(Some(color)));
    }

    fn set_bold(&mut self) {
        let _ = self.stdout.set_color(ColorSpec::new().set_bold(true));
    }

    fn set_dim(&mut self) {
        let _ = self.stdout.set_color(ColorSpec::new().set_dimmed(true));
    }

    fn reset(&mut self) {
        let _ = self.stdout.reset();
    }

    pub fn header(&mut self, file: &str, tests: usize, snippets: usize) {
        self.set_bold();
        let _ = writeln!(self.stdout, "shellspec: {}", file);
        self.reset();
        let _ = writeln!(
            self.stdout,
            "found {} test case(s) and {} snippet(s)",
            tests, snippets
        );
        let _ = writeln!(self.stdout);
    }

    pub fn case(&mut self, case: &TestCaseResult, total: usize) {
        if case.passed {
            self.set_color(Color::Green);
            let _ = write!(self.stdout, "PASS");
        } else {
            self.set_color(Color::Red);
            let _ = write!(self.stdout, "FAIL");
        }
        self.reset();
        let _ = write!(self.stdout, "  [{}/{}] {}", case.index, total, case.name);
        self.set_dim();
        let _ = writeln!(self.stdout, " ({}ms)", case.duration.as_millis());
        self.reset();

        if let Some(ref error) = case.error {
            self.set_color(Color::Red);
            for line in error.lines() {
                let _ = writeln!(self.stdout, "      {}", line);
            }
            self.reset();
        }
        if (self.verbose || !case.passed) && !case.log.is_empty() {
            self.set_dim();
            for line in case.log.lines() {
                let _ = writeln!(self.stdout, "      │ {}", line);
            }
            self.reset();
        }
        if let Some(ref wd) = case.workdir {
            self.set_dim();
            let _ = writeln!(self.stdout, "      workdir: {}", wd.display());
            self.reset();
        }
        let _ = self.stdout.flush();
    }

    pub fn summary(&mut self, result: &SuiteResult) {
        let _ = writeln!(self.stdout);
        self.set_bold();
        let _ = write!(self.stdout, "Result: ");
        self.reset();
        let failed = result.failed_count();
        if failed == 0 {
            self.set_color(Color::Green);
        } else {
            self.set_color(Color::Red);
        }
        let _ = writeln!(self.stdout, "{}", result.summary());
        self.reset();
        let _ = self.stdout.flush();
    }

    pub fn error(&mut self, message: &str) {
        self.set_color(Color::Red);
        let _ = writeln!(self.stdout, "error: {}", message);
        self.reset();
        let _ = self.stdout.flush();
    }
}
