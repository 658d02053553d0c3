//! shellspec CLI
//!
//! Run a `.spec` file and report results. Exit code 0 when every
//! selected test passed, 1 on test failures, 2 on parse or usage
//! errors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use shellspec::{Report, RunConfig, TestRunner, DEFAULT_TIMEOUT};

#[derive(Parser, Debug)]
#[command(name = "shellspec")]
#[command(version)]
#[command(about = "Run declarative shell-command tests from a .spec file")]
struct Cli {
    /// Spec file to run
    spec: PathBuf,

    /// Run only the test with this 1-based index or whose name contains
    /// this string
    #[arg(short = 't', long)]
    test: Option<String>,

    /// Show the execution log of every test
    #[arg(short, long)]
    verbose: bool,

    /// Keep working directories after passing tests (for debugging)
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Root directory for per-test working directories
    #[arg(long = "workdir")]
    workdir: Option<PathBuf>,

    /// Batch-command timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Interactive per-step timeout in seconds [default: same as --timeout]
    #[arg(long = "expect-timeout")]
    expect_timeout: Option<u64>,

    /// Command aliases (NAME=PATH), may be repeated
    #[arg(short = 'a', long = "alias")]
    aliases: Vec<String>,

    /// Disable colored output
    #[arg(long = "no-color")]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut report = Report::new(!cli.no_color, cli.verbose);

    let mut aliases = HashMap::new();
    for spec in &cli.aliases {
        match spec.split_once('=') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => {
                aliases.insert(name.to_string(), path.to_string());
            }
            _ => {
                report.error(&format!("invalid --alias (expected NAME=PATH): {}", spec));
                return ExitCode::from(2);
            }
        }
    }

    // Relative alias values anchor to the binary's own location;
    // direct commands with a slash anchor to the spec file instead.
    let alias_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()));

    let config = RunConfig {
        aliases,
        alias_dir,
        shell_timeout: std::time::Duration::from_secs(cli.timeout),
        expect_timeout: std::time::Duration::from_secs(
            cli.expect_timeout.unwrap_or(cli.timeout),
        ),
        filter: cli.test,
        verbose: cli.verbose,
        keep_work: cli.keep,
        workdir_root: cli.workdir,
    };

    let mut runner = TestRunner::new(config);
    let result = match runner.run_file(&cli.spec) {
        Ok(result) => result,
        Err(e) => {
            report.error(&e.to_string());
            return ExitCode::from(2);
        }
    };

    report.header(&cli.spec.to_string_lossy(), result.total, result.snippets);
    for case in &result.cases {
        report.case(case, result.total);
    }
    report.summary(&result);

    if result.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
