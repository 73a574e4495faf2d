//! Integration tests for `ExecRunner::run` and `Process::wait`.
//!
//! Drives the real helper binary against the runtime stub, which runs the
//! process directly on the host.

use procshim::{PreparedSpec, ProcessIo, ProcessSpec, ShimError};
use procshim_test_utils::{CaptureBuffer, TEST_PATH, TestContext, sh};

fn context() -> TestContext {
    TestContext::new(
        env!("CARGO_BIN_EXE_procshim-helper"),
        env!("CARGO_BIN_EXE_procshim-runtime-stub"),
    )
}

// ============================================================================
// EXIT CODES AND OUTPUT
// ============================================================================

#[tokio::test]
async fn run_reports_exit_code_and_output() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let process = ctx
        .run(
            "echo",
            sh("echo hello; exit 12"),
            ProcessIo::new().stdout(stdout.clone()),
        )
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 12);
    assert_eq!(stdout.contents(), "hello\n");
}

#[tokio::test]
async fn run_separates_stdout_and_stderr() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let stderr = CaptureBuffer::new();
    let process = ctx
        .run(
            "streams",
            sh("echo out; echo err >&2"),
            ProcessIo::new().stdout(stdout.clone()).stderr(stderr.clone()),
        )
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 0);
    assert_eq!(stdout.contents(), "out\n");
    assert_eq!(stderr.contents(), "err\n");
}

#[tokio::test]
async fn run_relays_stdin() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let process = ctx
        .run(
            "cat",
            sh("cat"),
            ProcessIo::new()
                .stdin(&b"hello world"[..])
                .stdout(stdout.clone()),
        )
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 0);
    assert_eq!(stdout.contents(), "hello world");
}

#[tokio::test]
async fn run_without_stdin_sees_end_of_input() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let process = ctx
        .run("eof", sh("cat; echo done"), ProcessIo::new().stdout(stdout.clone()))
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 0);
    assert_eq!(stdout.contents(), "done\n");
}

#[tokio::test]
async fn wait_returns_all_output_larger_than_pipe_buffer() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let process = ctx
        .run(
            "large",
            sh("head -c 200000 /dev/zero | tr '\\0' a"),
            ProcessIo::new().stdout(stdout.clone()),
        )
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 0);
    let bytes = stdout.bytes();
    assert_eq!(bytes.len(), 200_000);
    assert!(bytes.iter().all(|b| *b == b'a'));
}

#[tokio::test]
async fn process_sees_spec_env_and_cwd() {
    let ctx = context();
    let cwd = tempfile::TempDir::new().unwrap();
    let stdout = CaptureBuffer::new();
    let spec = PreparedSpec::new(
        ProcessSpec::new("/bin/sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("PATH", TEST_PATH)
            .env("GREETING", "hi")
            .cwd(cwd.path().to_string_lossy()),
    );
    let process = ctx
        .run("env", spec, ProcessIo::new().stdout(stdout.clone()))
        .await
        .unwrap();

    assert_eq!(process.wait().await.unwrap(), 0);
    let canonical = cwd.path().canonicalize().unwrap();
    assert_eq!(
        stdout.contents(),
        format!("hi\n{}\n", canonical.display())
    );
}

// ============================================================================
// WAIT SEMANTICS
// ============================================================================

#[tokio::test]
async fn wait_is_idempotent_and_removes_directory() {
    let ctx = context();
    let process = ctx.run("twice", sh("exit 7"), ProcessIo::new()).await.unwrap();
    assert!(ctx.process_dir("twice").is_dir());

    assert_eq!(process.wait().await.unwrap(), 7);
    assert_eq!(process.wait().await.unwrap(), 7);
    assert!(!ctx.process_dir("twice").exists());

    let err = ctx.attach("twice", ProcessIo::new()).await.unwrap_err();
    assert!(matches!(err, ShimError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn concurrent_waits_share_one_result() {
    let ctx = context();
    let process = ctx
        .run("concurrent", sh("sleep 0.2; exit 4"), ProcessIo::new())
        .await
        .unwrap();

    let (a, b) = tokio::join!(process.wait(), process.wait());
    assert_eq!(a.unwrap(), 4);
    assert_eq!(b.unwrap(), 4);
}

#[tokio::test]
async fn run_records_pid_of_process() {
    let ctx = context();
    let stdout = CaptureBuffer::new();
    let process = ctx
        .run("pid", sh("echo $$"), ProcessIo::new().stdout(stdout.clone()))
        .await
        .unwrap();
    let pid = process.pid().unwrap();
    assert!(process.helper_pid().is_some());

    assert_eq!(process.wait().await.unwrap(), 0);
    assert_eq!(stdout.contents().trim(), pid.to_string());
}

// ============================================================================
// LAUNCH FAILURES
// ============================================================================

#[tokio::test]
async fn run_missing_binary_fails_with_runtime_message() {
    let ctx = context();
    let spec = PreparedSpec::new(ProcessSpec::new("potato").env("PATH", TEST_PATH));
    let err = ctx.run("potato", spec, ProcessIo::new()).await.unwrap_err();

    match err {
        ShimError::LaunchFailed { cause, message } => {
            assert_eq!(cause, "exit status 127");
            assert!(message.contains("potato"), "message: {message}");
        }
        other => panic!("expected LaunchFailed, got {other:?}"),
    }
    // Kept for inspection.
    assert!(ctx.process_dir("potato").is_dir());
}

#[tokio::test]
async fn run_with_missing_runtime_fails() {
    let temp = tempfile::TempDir::new().unwrap();
    let ctx = TestContext::new(
        env!("CARGO_BIN_EXE_procshim-helper"),
        temp.path().join("no-such-runtime"),
    );
    let err = ctx.run("noruntime", sh("true"), ProcessIo::new()).await.unwrap_err();
    assert!(
        matches!(err, ShimError::LaunchFailed { ref cause, .. } if cause == "exit status 127"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn run_rejects_existing_process_directory() {
    let ctx = context();
    std::fs::create_dir_all(ctx.process_dir("taken")).unwrap();

    let err = ctx.run("taken", sh("true"), ProcessIo::new()).await.unwrap_err();
    assert!(matches!(err, ShimError::DirectoryCreate(_)), "got {err:?}");
    // Someone else's directory is left alone.
    assert!(ctx.process_dir("taken").is_dir());
}

#[tokio::test]
async fn run_rejects_invalid_process_id() {
    let ctx = context();
    let err = ctx.run("../escape", sh("true"), ProcessIo::new()).await.unwrap_err();
    assert!(matches!(err, ShimError::Setup(_)), "got {err:?}");
}
