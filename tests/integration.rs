//! End-to-end tests: full spec files run through the public API
//! against real subprocesses.

use std::collections::HashMap;
use std::time::Duration;

use shellspec::{RunConfig, SpecDocument, SuiteResult, TestRunner};

fn run(spec: &str) -> SuiteResult {
    run_with(spec, RunConfig::default())
}

fn run_with(spec: &str, config: RunConfig) -> SuiteResult {
    let doc = SpecDocument::parse(spec, "inline.spec").expect("spec parses");
    let runner = TestRunner::new(config);
    runner.run_document(&doc, "inline.spec")
}

fn assert_all_passed(result: &SuiteResult) {
    for case in &result.cases {
        assert!(
            case.passed,
            "[{}] {} failed: {}\nlog:\n{}",
            case.index,
            case.name,
            case.error.as_deref().unwrap_or("?"),
            case.log,
        );
    }
}

#[test]
fn batch_success_with_substring_stdout() {
    let result = run("> t\n$. echo hello\n?. stdout \"ell\"\n");
    assert_all_passed(&result);
    assert_eq!(result.passed_count(), 1);
}

#[test]
fn expected_failure_with_negated_assertion() {
    // Non-zero exit satisfies $!, empty stdout satisfies ?! contains
    let result = run("> t\n$! sh -c \"exit 3\"\n?! stdout \"anything\"\n");
    assert_all_passed(&result);
    assert_eq!(result.passed_count(), 1);
}

#[test]
fn variable_capture_and_comparison() {
    let result = run("> t\n$. printf hi\n:. stdout @x\n?. == @x \"hi\"\n");
    assert_all_passed(&result);
}

#[test]
fn file_creation_round_trip() {
    let result = run(
        "> t\n:. file out.txt\n.. alpha\n.. beta\n?. file out.txt\n.. alpha\n.. beta\n",
    );
    assert_all_passed(&result);
}

#[test]
fn interactive_expect_send() {
    let spec = "> greeter\n\
                $. sh -c \"printf 'Name? '; read n; echo \\\"Hi $n\\\"\"\n\
                $< \"Name?\"\n\
                $> \"Ada\"\n\
                $< \"Hi Ada\"\n";
    let result = run(spec);
    assert_all_passed(&result);
}

#[test]
fn snippet_reuse_with_isolation() {
    let spec = ">@ write-config\n\
                :. file config.txt\n\
                .. setting=1\n\
                > first\n\
                :. @ write-config\n\
                ?. file config.txt \"setting\"\n\
                > second\n\
                :. @ write-config\n\
                ?. file config.txt \"setting\"\n\
                > without snippet\n\
                ?! file config.txt\n";
    let result = run(spec);
    assert_all_passed(&result);
    assert_eq!(result.passed_count(), 3);
}

#[test]
fn stderr_captured_separately_in_batch_mode() {
    let result = run(
        "> t\n$. sh -c \"echo out; echo err >&2\"\n?. stdout \"out\"\n?. stderr \"err\"\n?! stdout \"err\"\n",
    );
    assert_all_passed(&result);
}

#[test]
fn exact_stdout_block() {
    let result = run(
        "> t\n$. printf \"one\\ntwo\\n\"\n?. stdout\n.. one\n.. two\n",
    );
    // printf interprets its own \n escapes; the block compares exactly
    assert_all_passed(&result);
}

#[test]
fn content_block_with_zero_lines_creates_empty_file() {
    let result = run("> t\n:. file empty.txt\n?. file empty.txt\n$. test -s empty.txt\n");
    // `test -s` fails on an empty file, so the shell statement fails
    assert!(!result.cases[0].passed);

    let result = run("> t\n:. file empty.txt\n?. file empty.txt\n$! test -s empty.txt\n");
    assert_all_passed(&result);
}

#[test]
fn env_action_visible_to_commands() {
    let result = run(
        "> t\n:. env ANSWER 42\n$. sh -c \"printf %s \\\"$ANSWER\\\"\"\n?. stdout \"42\"\n",
    );
    assert_all_passed(&result);
}

#[test]
fn alias_table_resolves_commands() {
    let mut aliases = HashMap::new();
    aliases.insert("hello-tool".to_string(), "echo".to_string());
    let config = RunConfig {
        aliases,
        ..Default::default()
    };
    let result = run_with("> t\n$. hello-tool greetings\n?. stdout \"greetings\"\n", config);
    assert_all_passed(&result);
}

#[test]
fn failing_statement_skips_rest_of_case_only() {
    let spec = "> fails early\n\
                $. false\n\
                :. file never.txt\n\
                > still runs\n\
                $. true\n\
                ?! file never.txt\n";
    let result = run(spec);
    assert!(!result.cases[0].passed);
    assert!(result.cases[1].passed);
}

#[test]
fn expect_timeout_fails_with_diagnostic() {
    let config = RunConfig {
        expect_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let start = std::time::Instant::now();
    let result = run_with(
        "> t\n$. sh -c \"echo ready; sleep 30\"\n$< \"never-appears\"\n",
        config,
    );
    assert!(!result.cases[0].passed);
    let error = result.cases[0].error.as_deref().unwrap();
    assert!(error.contains("timed out"), "unexpected error: {}", error);
    assert!(error.contains("never-appears"));
    // The transcript so far is part of the diagnostic
    assert!(error.contains("ready"));
    assert!(start.elapsed() < Duration::from_secs(10));
    cleanup(&result);
}

#[test]
fn batch_timeout_leaves_no_orphan() {
    let config = RunConfig {
        shell_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let start = std::time::Instant::now();
    let result = run_with("> t\n$. sleep 30\n", config);
    assert!(!result.cases[0].passed);
    assert!(result.cases[0]
        .error
        .as_deref()
        .unwrap()
        .contains("timed out after 0s"));
    assert!(start.elapsed() < Duration::from_secs(10));
    cleanup(&result);
}

#[test]
fn parse_error_aborts_before_running() {
    let err = SpecDocument::parse("> t\n$. true\n&& bogus\n", "inline.spec").unwrap_err();
    assert!(err.is_parse());
    assert_eq!(err.line, Some(3));
    assert!(err.to_string().contains("inline.spec:3"));
}

#[test]
fn undefined_variable_fails_the_test() {
    let result = run("> t\n?. == @never \"x\"\n> next\n$. true\n");
    assert!(!result.cases[0].passed);
    assert!(result.cases[0]
        .error
        .as_deref()
        .unwrap()
        .contains("undefined variable @never"));
    assert!(result.cases[1].passed);
}

#[test]
fn executable_not_found_fails_the_test() {
    let result = run("> t\n$. no-such-binary-zzz\n");
    assert!(!result.cases[0].passed);
    assert!(result.cases[0]
        .error
        .as_deref()
        .unwrap()
        .contains("executable not found"));
}

#[test]
fn interactive_mode_merges_streams_into_transcript() {
    // Under a PTY, stderr lands in the combined transcript
    let result = run(
        "> t\n$. sh -c \"echo to-err >&2; echo to-out\"\n$< \"to-out\"\n?. stdout \"to-err\"\n?! stderr \"to-err\"\n",
    );
    assert_all_passed(&result);
}

#[test]
fn verbose_log_records_commands_and_checks() {
    let result = run("> t\n$. echo traced\n?. stdout \"traced\"\n");
    assert_all_passed(&result);
    let log = &result.cases[0].log;
    assert!(log.contains("$ echo traced"), "log:\n{}", log);
    assert!(log.contains("ok: stdout has 'traced'"), "log:\n{}", log);
}

/// Remove workdirs preserved by failing cases so test runs stay tidy
fn cleanup(result: &SuiteResult) {
    for case in &result.cases {
        if let Some(ref wd) = case.workdir {
            let _ = std::fs::remove_dir_all(wd);
        }
    }
}
