//! Integration tests for driving solver child processes.
//!
//! Most tests use a tiny `sh` script standing in for the solver, so they
//! only need a POSIX shell. `test_z3_roundtrip` talks to a real z3 and is
//! skipped when `z3` is not on PATH.
//!
//! # Running
//!
//! ```bash
//! cargo test --test solver_integration -- --nocapture
//! ```
//!
//! Set `SOLVERPIPE_SKIP_PROCESS_TESTS=1` to skip everything that spawns a
//! process.

use std::time::Duration;

use tokio::time::timeout;

use solverpipe::config::SolverConfig;
use solverpipe::process::SolverProcess;
use solverpipe::session::{PendingReply, Reply, SessionError};
use solverpipe::wire::Sexp;

/// Test timeout to prevent hanging tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Answers a fixed set of commands, splitting the check-sat reply over two
/// writes.
const FAKE_SOLVER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    "(check-sat)") printf '(sa'; printf 't)\n' ;;
    "(get-value"*) printf '((x 42))\n' ;;
    "(get-model)") printf '(error "model generation not enabled")\n' ;;
    "(exit)") exit 0 ;;
  esac
done
"#;

fn should_skip_process_tests() -> bool {
    std::env::var("SOLVERPIPE_SKIP_PROCESS_TESTS").is_ok()
}

fn shell_available() -> bool {
    std::path::Path::new("/bin/sh").exists()
}

fn z3_available() -> bool {
    std::process::Command::new("which")
        .arg("z3")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn shell_solver(script: &str) -> SolverConfig {
    SolverConfig {
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    }
}

async fn wait(reply: PendingReply) -> Reply {
    timeout(TEST_TIMEOUT, reply).await.expect("Test timed out")
}

fn msg(text: &str) -> Sexp {
    text.parse().expect("valid s-expression")
}

/// Test: the documented scenario against a scripted solver.
///
/// Verifies that:
/// - fire-and-forget commands and queries share one ordered stream
/// - a reply split across writes resolves the check-sat query
/// - an error reply only fails the query it answers
/// - shutdown sees the solver exit cleanly after `(exit)`
#[tokio::test]
async fn test_scripted_solver_session() {
    if should_skip_process_tests() || !shell_available() {
        println!("Skipping process test");
        return;
    }

    let solver = SolverProcess::spawn(&shell_solver(FAKE_SOLVER)).expect("Solver should start");
    assert!(solver.id().is_some());
    let handle = solver.handle();

    handle.declare_const("x", "Int").await.unwrap();
    let sat = handle.check_sat().await.unwrap();
    handle.push(1).await.unwrap();
    let model = handle.get_model().await.unwrap();
    let values = handle.get_value([Sexp::atom("x")]).await.unwrap();
    handle.pop(1).await.unwrap();

    assert_eq!(wait(sat).await, Ok(msg("(sat)")));

    let err = wait(model).await.unwrap_err();
    assert_eq!(
        err.solver_message().as_deref(),
        Some("model generation not enabled")
    );

    assert_eq!(wait(values).await, Ok(msg("((x 42))")));

    let status = solver.shutdown().await.expect("Shutdown should succeed");
    assert!(status.map(|s| s.success()).unwrap_or(false));
}

/// Test: a solver that exits without answering fails the pending query
/// instead of leaving it hanging.
#[tokio::test]
async fn test_solver_exit_fails_pending_queries() {
    if should_skip_process_tests() || !shell_available() {
        println!("Skipping process test");
        return;
    }

    let solver = SolverProcess::spawn(&shell_solver("exit 0")).expect("Solver should start");
    let handle = solver.handle();

    match handle.check_sat().await {
        Ok(reply) => assert_eq!(wait(reply).await, Err(SessionError::Closed)),
        // The solver may already be gone when the command is written.
        Err(err) => assert!(
            matches!(err, SessionError::Closed | SessionError::Transport(_)),
            "unexpected error: {}",
            err
        ),
    }

    let _ = solver.shutdown().await;
}

/// Test: a missing executable is reported at spawn time.
#[tokio::test]
async fn test_spawn_missing_executable() {
    if should_skip_process_tests() {
        println!("Skipping process test");
        return;
    }

    let config = SolverConfig {
        command: "/nonexistent/solverpipe-no-such-solver".to_string(),
        args: vec![],
    };
    let err = SolverProcess::spawn(&config).err().expect("spawn should fail");
    assert!(
        err.to_string().contains("Failed to spawn solver process"),
        "Unexpected error: {}",
        err
    );
}

/// Test: real z3 round trip with scopes and an error reply.
#[tokio::test]
async fn test_z3_roundtrip() {
    if should_skip_process_tests() {
        println!("Skipping process test");
        return;
    }
    if !z3_available() {
        println!("Skipping z3 test (z3 not in PATH)");
        return;
    }

    let solver = SolverProcess::spawn(&SolverConfig::default()).expect("z3 should start");
    let handle = solver.handle();

    handle.declare_const("x", "Int").await.unwrap();
    handle.assert(msg("(> x 2)")).await.unwrap();
    let first = handle.check_sat().await.unwrap();

    handle.push(1).await.unwrap();
    handle.assert(msg("(< x 0)")).await.unwrap();
    let scoped = handle.check_sat().await.unwrap();
    handle.pop(1).await.unwrap();

    let unknown = handle.get_value([Sexp::atom("y")]).await.unwrap();
    let again = handle.check_sat().await.unwrap();
    let value = handle.get_value([Sexp::atom("x")]).await.unwrap();

    assert_eq!(wait(first).await, Ok(Sexp::atom("sat")));
    assert_eq!(wait(scoped).await, Ok(Sexp::atom("unsat")));
    assert!(matches!(
        wait(unknown).await,
        Err(SessionError::Solver { .. })
    ));
    assert_eq!(wait(again).await, Ok(Sexp::atom("sat")));

    let value = wait(value).await.expect("get-value should succeed");
    let pair = &value.as_list().expect("list of pairs")[0];
    assert_eq!(pair.as_list().map(|p| &p[0]), Some(&Sexp::atom("x")));

    let status = solver.shutdown().await.expect("Shutdown should succeed");
    assert!(status.is_some());
}
