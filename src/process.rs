//! Solver subprocess driver.
//!
//! Spawns the configured solver with piped stdio and runs one session task
//! per process. The task exclusively owns the [`Session`] and the solver's
//! stdout, so parsing and reply correlation happen on a single logical
//! thread without locks. Callers talk to it through a cloneable
//! [`SolverHandle`]; requests are served strictly in the order they were
//! sent.
//!
//! ```text
//! ┌──────────────┐  mpsc   ┌──────────────┐  mpsc   ┌──────────────┐
//! │ SolverHandle │ ──────► │ session task │ ──────► │ stdin writer │ ──► solver
//! └──────────────┘         │  (Session)   │         └──────────────┘
//!        ▲  PendingReply   │              │ ◄──────────── stdout ◄──────┘
//!        └──────────────── └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let solver = SolverProcess::spawn(&SolverConfig::load()?)?;
//! let handle = solver.handle();
//! handle.declare_const("x", "Int").await?;
//! handle.assert("(> x 2)".parse::<Sexp>()?).await?;
//! let verdict = handle.check_sat().await?.await?;
//! solver.shutdown().await?;
//! ```

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SolverConfig;
use crate::session::{ChannelOutbound, PendingReply, Session, SessionError, SessionState};
use crate::wire::{Command, Sexp};

/// Bytes requested from the solver's stdout per read.
const READ_CHUNK: usize = 8 * 1024;

/// How long `shutdown` waits for the solver to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
enum Request {
    Execute {
        command: Command,
        respond: oneshot::Sender<Result<Option<PendingReply>, SessionError>>,
    },
    Close {
        respond: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Cloneable front end to a running session task.
///
/// Each method resolves once the command has been handed to the solver's
/// input. Query methods return a [`PendingReply`] to await separately, so
/// several queries can be in flight at once.
#[derive(Debug, Clone)]
pub struct SolverHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl SolverHandle {
    /// Start a session task over an arbitrary byte stream pair.
    ///
    /// Must be called within a tokio runtime.
    pub fn attach<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, chunks) = ChannelOutbound::channel();
        let (requests, inbox) = mpsc::unbounded_channel();

        tokio::spawn(write_input(writer, chunks));
        tokio::spawn(run_session(Session::new(outbound), reader, inbox));

        Self { requests }
    }

    pub async fn push(&self, n: u32) -> Result<(), SessionError> {
        self.send(Command::Push(n)).await
    }

    pub async fn pop(&self, n: u32) -> Result<(), SessionError> {
        self.send(Command::Pop(n)).await
    }

    pub async fn declare_const(&self, name: &str, sort: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::DeclareConst {
            name: name.to_string(),
            sort: sort.into(),
        })
        .await
    }

    pub async fn declare_fun(
        &self,
        name: &str,
        params: Vec<Sexp>,
        sort: impl Into<Sexp>,
    ) -> Result<(), SessionError> {
        self.send(Command::DeclareFun {
            name: name.to_string(),
            params,
            sort: sort.into(),
        })
        .await
    }

    pub async fn assert(&self, formula: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::Assert(formula.into())).await
    }

    pub async fn set_option(&self, option: &str, value: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::SetOption {
            option: option.to_string(),
            value: value.into(),
        })
        .await
    }

    pub async fn set_logic(&self, logic: &str) -> Result<(), SessionError> {
        self.send(Command::SetLogic(logic.to_string())).await
    }

    pub async fn check_sat(&self) -> Result<PendingReply, SessionError> {
        self.query(Command::CheckSat).await
    }

    pub async fn get_value(
        &self,
        terms: impl IntoIterator<Item = Sexp>,
    ) -> Result<PendingReply, SessionError> {
        self.query(Command::GetValue(terms.into_iter().collect()))
            .await
    }

    pub async fn get_model(&self) -> Result<PendingReply, SessionError> {
        self.query(Command::GetModel).await
    }

    /// Issue any command; returns a reply handle if the command expects one.
    pub async fn execute(&self, command: Command) -> Result<Option<PendingReply>, SessionError> {
        let (respond, response) = oneshot::channel();
        self.requests
            .send(Request::Execute { command, respond })
            .map_err(|_| SessionError::Closed)?;
        response.await.unwrap_or(Err(SessionError::Closed))
    }

    /// Send `(exit)` and close the solver's input.
    pub async fn close(&self) -> Result<(), SessionError> {
        let (respond, response) = oneshot::channel();
        self.requests
            .send(Request::Close { respond })
            .map_err(|_| SessionError::Closed)?;
        response.await.unwrap_or(Err(SessionError::Closed))
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.execute(command).await.map(|_| ())
    }

    async fn query(&self, command: Command) -> Result<PendingReply, SessionError> {
        self.execute(command).await?.ok_or(SessionError::Closed)
    }
}

/// A running solver child process.
pub struct SolverProcess {
    child: Child,
    handle: SolverHandle,
}

impl SolverProcess {
    /// Spawn the solver and start its session task.
    ///
    /// The child is killed if this value is dropped without
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(config: &SolverConfig) -> Result<Self> {
        info!("Starting solver: {} {}", config.command, config.args.join(" "));

        let mut child = ProcessCommand::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn solver process `{}`", config.command))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to get stdin handle for solver")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to get stdout handle for solver")?;

        Ok(Self {
            child,
            handle: SolverHandle::attach(stdout, stdin),
        })
    }

    pub fn handle(&self) -> SolverHandle {
        self.handle.clone()
    }

    /// OS process id, while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the session and wait for the solver to exit, killing it after a
    /// short grace period. Returns the exit status, or `None` if killed.
    pub async fn shutdown(mut self) -> Result<Option<ExitStatus>> {
        match self.handle.close().await {
            Ok(()) | Err(SessionError::Closed) => {}
            Err(err) => warn!("Error while closing solver session: {}", err),
        }

        match timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for solver process")?;
                info!("Solver exited ({})", status);
                Ok(Some(status))
            }
            Err(_) => {
                warn!("Solver didn't exit gracefully, killing");
                self.child
                    .kill()
                    .await
                    .context("Failed to kill solver process")?;
                Ok(None)
            }
        }
    }
}

/// Session task: serves handle requests and feeds solver output to the
/// session until both sides are done.
async fn run_session<R>(
    mut session: Session<ChannelOutbound>,
    mut reader: R,
    mut inbox: mpsc::UnboundedReceiver<Request>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut accepting = true;
    let mut reading = true;

    while accepting || reading {
        tokio::select! {
            request = inbox.recv(), if accepting => match request {
                Some(request) => serve(&mut session, request),
                None => {
                    accepting = false;
                    if session.state() == SessionState::Open {
                        debug!("All solver handles dropped; closing session");
                        let _ = session.close();
                    }
                }
            },
            read = reader.read(&mut buf), if reading => match read {
                Ok(0) => {
                    reading = false;
                    let _ = session.finish();
                }
                Ok(n) => {
                    // Faults are logged and recorded by the session itself.
                    let _ = session.receive(&buf[..n]);
                }
                Err(err) => {
                    reading = false;
                    error!("Failed to read solver output: {}", err);
                    session.fail(err.into());
                    let _ = session.finish();
                }
            },
        }
    }

    debug!("Solver session task finished");
}

fn serve(session: &mut Session<ChannelOutbound>, request: Request) {
    match request {
        Request::Execute { command, respond } => {
            let _ = respond.send(session.execute(command));
        }
        Request::Close { respond } => {
            let _ = respond.send(session.close());
        }
    }
}

/// Stdin writer task. Closes the solver's input when the session ends its
/// outbound stream.
async fn write_input<W>(mut writer: W, mut chunks: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = chunks.recv().await {
        if let Err(err) = write_chunk(&mut writer, &chunk).await {
            // Dropping the receiver makes later session writes fail.
            error!("Failed to write to solver stdin: {}", err);
            return;
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!("Failed to close solver stdin: {}", err);
    }
    debug!("Solver stdin closed");
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{duplex, DuplexStream};

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// A handle wired to in-memory pipes.
    /// Returns (handle, solver_stdin, solver_stdout) from the solver's side.
    fn fake_solver() -> (SolverHandle, DuplexStream, DuplexStream) {
        let (client_writer, solver_stdin) = duplex(4096);
        let (solver_stdout, client_reader) = duplex(4096);
        (
            SolverHandle::attach(client_reader, client_writer),
            solver_stdin,
            solver_stdout,
        )
    }

    async fn expect_input(solver_stdin: &mut DuplexStream, expected: &str) {
        let mut got = vec![0u8; expected.len()];
        timeout(TEST_TIMEOUT, solver_stdin.read_exact(&mut got))
            .await
            .expect("Test timed out")
            .expect("Read failed");
        assert_eq!(String::from_utf8(got).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_check_sat_reply_split_across_writes() {
        let (handle, mut solver_stdin, mut solver_stdout) = fake_solver();

        handle.declare_const("x", "Int").await.unwrap();
        let reply = handle.check_sat().await.unwrap();
        expect_input(&mut solver_stdin, "(declare-const x Int)\n(check-sat)\n").await;

        solver_stdout.write_all(b"(sa").await.unwrap();
        solver_stdout.flush().await.unwrap();
        tokio::task::yield_now().await;
        solver_stdout.write_all(b"t)").await.unwrap();

        let got = timeout(TEST_TIMEOUT, reply).await.expect("Test timed out");
        assert_eq!(got, Ok(Sexp::list([Sexp::atom("sat")])));
    }

    #[tokio::test]
    async fn test_pipelined_queries_resolve_in_order() {
        let (handle, mut solver_stdin, mut solver_stdout) = fake_solver();

        let first = handle.check_sat().await.unwrap();
        handle.push(1).await.unwrap();
        let second = handle.get_value([Sexp::atom("x")]).await.unwrap();
        let third = handle.get_model().await.unwrap();
        expect_input(
            &mut solver_stdin,
            "(check-sat)\n(push 1)\n(get-value (x))\n(get-model)\n",
        )
        .await;

        solver_stdout
            .write_all(b"sat\n((x 3))\n(error \"model is not available\")\n")
            .await
            .unwrap();

        assert_eq!(first.await, Ok(Sexp::atom("sat")));
        assert_eq!(second.await, Ok("((x 3))".parse::<Sexp>().unwrap()));
        let err = third.await.unwrap_err();
        assert_eq!(err.solver_message().as_deref(), Some("model is not available"));
    }

    #[tokio::test]
    async fn test_close_ends_input_and_eof_fails_pending() {
        let (handle, mut solver_stdin, solver_stdout) = fake_solver();

        let pending = handle.get_model().await.unwrap();
        handle.close().await.unwrap();

        let mut input = String::new();
        timeout(TEST_TIMEOUT, solver_stdin.read_to_string(&mut input))
            .await
            .expect("Test timed out")
            .unwrap();
        assert_eq!(input, "(get-model)\n(exit)\n");

        assert_eq!(handle.push(1).await, Err(SessionError::Closed));

        drop(solver_stdout);
        let got = timeout(TEST_TIMEOUT, pending).await.expect("Test timed out");
        assert_eq!(got, Err(SessionError::Closed));
        assert_eq!(handle.close().await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn test_garbage_output_faults_session() {
        let (handle, mut solver_stdin, mut solver_stdout) = fake_solver();

        let pending = handle.check_sat().await.unwrap();
        expect_input(&mut solver_stdin, "(check-sat)\n").await;
        solver_stdout.write_all(b")").await.unwrap();

        let err = timeout(TEST_TIMEOUT, pending)
            .await
            .expect("Test timed out")
            .unwrap_err();
        assert!(matches!(err, SessionError::Syntax(_)));
        assert_eq!(handle.push(1).await, Err(err));
    }

    #[tokio::test]
    async fn test_dropping_all_handles_sends_exit() {
        let (handle, mut solver_stdin, _solver_stdout) = fake_solver();
        handle.set_logic("QF_LIA").await.unwrap();
        drop(handle);

        let mut input = String::new();
        timeout(TEST_TIMEOUT, solver_stdin.read_to_string(&mut input))
            .await
            .expect("Test timed out")
            .unwrap();
        assert_eq!(input, "(set-logic QF_LIA)\n(exit)\n");
    }
}
