//! Pipeline integration tests.

#![cfg(unix)]

use std::fs::File;

use tempfile::tempdir;

use procexec::{
    pipe, AsyncExecutor, CommandSpec, ExecError, NullSink, Pipeline, RunOptions, SyncExecutor,
};

fn spec(program: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::new(program, args.iter().copied()).unwrap()
}

// ============================================================================
// Blocking Pipeline Tests
// ============================================================================

#[test]
fn test_count_directory_entries() {
    let dir = tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        File::create(dir.path().join(name)).unwrap();
    }

    let ls = CommandSpec::builder("ls")
        .working_directory(dir.path())
        .build()
        .unwrap();
    let result = Pipeline::new(ls)
        .pipe(spec("wc", &["-l"]))
        .run(&SyncExecutor::new().with_sink(NullSink))
        .unwrap();

    assert_eq!(result.stdout.trim(), "3");
    assert_eq!(result.command, "wc -l");
}

#[test]
fn test_three_stages() {
    let pipeline = pipe(
        spec("printf", &["b\\na\\nb\\n"]),
        [spec("sort", &[]), spec("uniq", &[])],
    );
    let result = pipeline
        .run(&SyncExecutor::new().with_sink(NullSink))
        .unwrap();

    assert_eq!(result.stdout, "a\nb\n");
}

#[test]
fn test_stage_stdin_is_replaced() {
    let second = spec("cat", &[]).with_stdin("ignored\n");
    let result = Pipeline::new(spec("echo", &["piped"]))
        .pipe(second)
        .run(&SyncExecutor::new().with_sink(NullSink))
        .unwrap();

    assert_eq!(result.stdout, "piped\n");
}

#[test]
fn test_intermediate_failure_propagates() {
    let first = spec("sh", &["-c", "echo partial; exit 4"]);
    let err = Pipeline::new(first)
        .pipe(spec("wc", &["-l"]))
        .run(&SyncExecutor::new().with_sink(NullSink))
        .unwrap_err();

    assert!(matches!(err, ExecError::CommandFailed { .. }));
    assert_eq!(err.exit_code(), Some(4));
    assert_eq!(err.command(), Some("sh -c 'echo partial; exit 4'"));
}

#[test]
fn test_intermediate_failure_ignored_by_stage_flag() {
    let first = CommandSpec::builder("sh")
        .args(["-c", "echo one; echo two; exit 4"])
        .ignore_exit_code(true)
        .build()
        .unwrap();
    let result = Pipeline::new(first)
        .pipe(spec("wc", &["-l"]))
        .run(&SyncExecutor::new().with_sink(NullSink))
        .unwrap();

    assert_eq!(result.stdout.trim(), "2");
}

#[test]
fn test_pipe_to_helper() {
    let executor = SyncExecutor::new().with_sink(NullSink);
    let listing = executor.run(&spec("printf", &["x\\ny\\nz\\n"])).unwrap();

    let count = executor
        .run(&listing.pipe_to(spec("wc", &["-l"])))
        .unwrap();
    assert_eq!(count.stdout.trim(), "3");
}

#[test]
fn test_dry_run_spawns_nothing() {
    let pipeline = Pipeline::new(spec("definitely-not-a-real-tool", &[]))
        .pipe(spec("also-not-a-real-tool", &[]));
    let result = pipeline
        .run_with(
            &SyncExecutor::new().with_sink(NullSink),
            &RunOptions::new().dry_run(true),
        )
        .unwrap();

    assert!(result.success());
}

// ============================================================================
// Async Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_async_count_directory_entries() {
    let dir = tempdir().unwrap();
    for name in ["one", "two", "three"] {
        File::create(dir.path().join(name)).unwrap();
    }

    let ls = CommandSpec::builder("ls")
        .working_directory(dir.path())
        .build()
        .unwrap();
    let result = Pipeline::new(ls)
        .pipe(spec("wc", &["-l"]))
        .run_async(&AsyncExecutor::new().with_sink(NullSink))
        .await
        .unwrap();

    assert_eq!(result.stdout.trim(), "3");
}

#[tokio::test]
async fn test_async_intermediate_spawn_failure() {
    let err = Pipeline::new(spec("echo", &["x"]))
        .pipe(spec("definitely-not-a-real-tool", &[]))
        .run_async(&AsyncExecutor::new().with_sink(NullSink))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::SpawnFailed { .. }));
}
