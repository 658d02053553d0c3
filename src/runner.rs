//! Test runner
//!
//! Orchestrates a spec file end to end: parse, select test cases,
//! provision a fresh temporary working directory per case, execute, and
//! aggregate results. Working directories are removed afterwards except
//! on failure or when configured to keep them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::engine::{Engine, DEFAULT_TIMEOUT};
use crate::error::SpecError;
use crate::parser::SpecDocument;
use crate::state::State;

/// Configuration for the test runner
pub struct RunConfig {
    /// Command aliases: name → replacement path
    pub aliases: HashMap<String, String>,
    /// Base directory for relative alias replacement values; `None`
    /// uses them as written
    pub alias_dir: Option<PathBuf>,
    /// Batch-mode wall-clock timeout
    pub shell_timeout: Duration,
    /// Interactive per-step timeout
    pub expect_timeout: Duration,
    /// Only run the test with this 1-based index or whose name contains
    /// this string (case-insensitive)
    pub filter: Option<String>,
    /// Verbose mode — include execution logs in the report
    pub verbose: bool,
    /// Preserve working directories after passing tests (for debugging)
    pub keep_work: bool,
    /// Root directory for temporary working directories
    pub workdir_root: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            aliases: HashMap::new(),
            alias_dir: None,
            shell_timeout: DEFAULT_TIMEOUT,
            expect_timeout: DEFAULT_TIMEOUT,
            filter: None,
            verbose: false,
            keep_work: false,
            workdir_root: None,
        }
    }
}

/// Result of a single test case
#[derive(Debug)]
pub struct TestCaseResult {
    /// Test name from the `>` header
    pub name: String,
    /// 1-based position in the spec file
    pub index: usize,
    pub passed: bool,
    /// Failure diagnostic
    pub error: Option<String>,
    /// Execution log
    pub log: String,
    pub duration: Duration,
    /// Working directory, when preserved
    pub workdir: Option<PathBuf>,
}

/// Result of running the selected tests of one spec file
#[derive(Debug)]
pub struct SuiteResult {
    pub cases: Vec<TestCaseResult>,
    /// Total number of test cases in the file (before selection)
    pub total: usize,
    /// Number of snippets defined in the file
    pub snippets: usize,
    pub duration: Duration,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed out of {} tests ({}ms)",
            self.passed_count(),
            self.failed_count(),
            self.total,
            self.duration.as_millis(),
        )
    }
}

/// The test runner
pub struct TestRunner {
    engine: Engine,
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        let engine = Engine {
            aliases: config.aliases.clone(),
            shell_timeout: config.shell_timeout,
            expect_timeout: config.expect_timeout,
            spec_dir: None,
            alias_dir: config.alias_dir.clone(),
        };
        Self { engine, config }
    }

    /// Parse and run a spec file. Parse and read errors are returned;
    /// test failures are reported in the `SuiteResult`.
    pub fn run_file(&mut self, path: &Path) -> Result<SuiteResult, SpecError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SpecError::new(
                crate::error::ErrorKind::Io,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let file = path.to_string_lossy().into_owned();
        let doc = SpecDocument::parse(&text, &file)?;
        self.engine.spec_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::current_dir().ok());
        Ok(self.run_document(&doc, &file))
    }

    /// Run the selected test cases of an already-parsed document
    pub fn run_document(&self, doc: &SpecDocument, file: &str) -> SuiteResult {
        let start = Instant::now();
        let mut cases = Vec::new();

        for (i, case) in doc.tests.iter().enumerate() {
            let index = i + 1;
            if !self.selected(index, &case.name) {
                continue;
            }
            cases.push(self.run_case(index, case, doc, file));
        }

        SuiteResult {
            cases,
            total: doc.tests.len(),
            snippets: doc.snippets.len(),
            duration: start.elapsed(),
        }
    }

    /// Check a test against the configured selector: a numeric filter
    /// matches the 1-based index, anything else is a case-insensitive
    /// substring match on the name.
    fn selected(&self, index: usize, name: &str) -> bool {
        let Some(ref filter) = self.config.filter else {
            return true;
        };
        if !filter.is_empty() && filter.chars().all(|c| c.is_ascii_digit()) {
            return filter.parse::<usize>().map(|n| n == index).unwrap_or(false);
        }
        name.to_lowercase().contains(&filter.to_lowercase())
    }

    fn run_case(
        &self,
        index: usize,
        case: &crate::parser::Stanza,
        doc: &SpecDocument,
        file: &str,
    ) -> TestCaseResult {
        let start = Instant::now();

        let tmpdir = match self.create_workdir(&case.name) {
            Ok(dir) => dir,
            Err(e) => {
                return TestCaseResult {
                    name: case.name.clone(),
                    index,
                    passed: false,
                    error: Some(format!("failed to create workdir: {}", e)),
                    log: String::new(),
                    duration: start.elapsed(),
                    workdir: None,
                };
            }
        };

        let mut state = State::new(tmpdir.path().to_path_buf());
        let result = self.engine.run_test_case(case, doc, &mut state, file);
        let (passed, error) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        // Keep the directory around for postmortems on failure or when
        // explicitly requested; otherwise TempDir removes it on drop.
        let workdir = if self.config.keep_work || !passed {
            Some(tmpdir.keep())
        } else {
            None
        };

        TestCaseResult {
            name: case.name.clone(),
            index,
            passed,
            error,
            log: state.log,
            duration: start.elapsed(),
            workdir,
        }
    }

    fn create_workdir(&self, name: &str) -> Result<tempfile::TempDir, std::io::Error> {
        let prefix = format!("shellspec-{}-", sanitize_test_name(name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        if let Some(ref root) = self.config.workdir_root {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        } else {
            builder.tempdir()
        }
    }
}

/// Replace everything outside `[A-Za-z0-9]` so a test name is usable as
/// a directory-name fragment
fn sanitize_test_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Run a spec file and integrate with `#[test]` by panicking on failure.
///
/// ```rust,ignore
/// #[test]
/// fn cli_specs() {
///     shellspec::run_and_assert("tests/specs/basic.spec");
/// }
/// ```
///
/// Environment variables:
/// - `SHELLSPEC_VERBOSE=1` — print execution logs
/// - `SHELLSPEC_WORK=1` — preserve working directories
pub fn run_and_assert(path: impl AsRef<Path>) {
    run_and_assert_with(path, |_| {});
}

/// Like [`run_and_assert`] but allows configuration tweaks first.
pub fn run_and_assert_with(path: impl AsRef<Path>, customize: impl FnOnce(&mut RunConfig)) {
    let path = path.as_ref();
    let mut config = RunConfig {
        verbose: std::env::var("SHELLSPEC_VERBOSE").is_ok(),
        keep_work: std::env::var("SHELLSPEC_WORK").is_ok(),
        ..Default::default()
    };
    customize(&mut config);
    let verbose = config.verbose;

    let mut runner = TestRunner::new(config);
    let result = match runner.run_file(path) {
        Ok(r) => r,
        Err(e) => panic!("{}", e),
    };

    for case in &result.cases {
        if case.passed {
            eprintln!("PASS  [{}] {} ({}ms)", case.index, case.name, case.duration.as_millis());
        } else {
            eprintln!("FAIL  [{}] {}", case.index, case.name);
            if let Some(ref err) = case.error {
                for line in err.lines() {
                    eprintln!("  {}", line);
                }
            }
            if !case.log.is_empty() {
                eprintln!("  --- log ---");
                for line in case.log.lines() {
                    eprintln!("  {}", line);
                }
            }
            if let Some(ref wd) = case.workdir {
                eprintln!("  workdir: {}", wd.display());
            }
        }
        if verbose && case.passed && !case.log.is_empty() {
            for line in case.log.lines() {
                eprintln!("      {}", line);
            }
        }
    }
    eprintln!("\n{}", result.summary());

    if !result.all_passed() {
        panic!("{} test(s) failed", result.failed_count());
    }
}
