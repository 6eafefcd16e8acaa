//! The solver session state machine.
//!
//! [`Session`] owns one outbound sink, one [`Parser`], and one
//! [`Correlator`]. It never blocks and never spawns: whoever owns it calls
//! the command methods as the caller issues them and [`Session::receive`]
//! as solver output arrives. Each `receive` runs the parser and completes
//! replies before returning.
//!
//! # Lifecycle
//!
//! ```text
//!   Open ──close()──► Closing ──finish()──► Closed
//!     └─────────────finish()─────────────────┘
//! ```
//!
//! Commands are accepted only while `Open`. Responses keep flowing while
//! `Closing`, so queries issued before `close()` still get their answers.

use tracing::{debug, error, info, warn};

use super::correlator::{Correlator, PendingReply};
use super::error::SessionError;
use super::outbound::Outbound;
use crate::wire::{Command, Parser, Sexp};

/// Session lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// `(exit)` sent and input ended; waiting for solver output to end.
    Closing,
    Closed,
}

/// A conversation with one solver process.
pub struct Session<O: Outbound> {
    outbound: O,
    parser: Parser,
    correlator: Correlator,
    state: SessionState,
    /// First stream-fatal fault, handed to every later operation.
    fault: Option<SessionError>,
    outbound_ended: bool,
}

impl<O: Outbound> Session<O> {
    pub fn new(outbound: O) -> Self {
        Self {
            outbound,
            parser: Parser::new(),
            correlator: Correlator::new(),
            state: SessionState::Open,
            fault: None,
            outbound_ended: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The stream-fatal fault that poisoned this session, if any.
    pub fn fault(&self) -> Option<&SessionError> {
        self.fault.as_ref()
    }

    /// Number of queries still waiting for a response.
    pub fn pending(&self) -> usize {
        self.correlator.len()
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    /// `(push n)`
    pub fn push(&mut self, n: u32) -> Result<(), SessionError> {
        self.send(Command::Push(n))
    }

    /// `(pop n)`
    pub fn pop(&mut self, n: u32) -> Result<(), SessionError> {
        self.send(Command::Pop(n))
    }

    pub fn declare_const(&mut self, name: &str, sort: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::DeclareConst {
            name: name.to_string(),
            sort: sort.into(),
        })
    }

    pub fn declare_fun(
        &mut self,
        name: &str,
        params: Vec<Sexp>,
        sort: impl Into<Sexp>,
    ) -> Result<(), SessionError> {
        self.send(Command::DeclareFun {
            name: name.to_string(),
            params,
            sort: sort.into(),
        })
    }

    pub fn assert(&mut self, formula: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::Assert(formula.into()))
    }

    pub fn set_option(&mut self, option: &str, value: impl Into<Sexp>) -> Result<(), SessionError> {
        self.send(Command::SetOption {
            option: option.to_string(),
            value: value.into(),
        })
    }

    pub fn set_logic(&mut self, logic: &str) -> Result<(), SessionError> {
        self.send(Command::SetLogic(logic.to_string()))
    }

    /// `(check-sat)`; resolves to `sat`, `unsat`, or `unknown`.
    pub fn check_sat(&mut self) -> Result<PendingReply, SessionError> {
        self.query(Command::CheckSat)
    }

    /// `(get-value (terms...))`; resolves to `((term value) ...)`.
    pub fn get_value(
        &mut self,
        terms: impl IntoIterator<Item = Sexp>,
    ) -> Result<PendingReply, SessionError> {
        self.query(Command::GetValue(terms.into_iter().collect()))
    }

    /// `(get-model)`
    pub fn get_model(&mut self) -> Result<PendingReply, SessionError> {
        self.query(Command::GetModel)
    }

    /// Issue any command, returning a reply handle if it expects one.
    pub fn execute(&mut self, command: Command) -> Result<Option<PendingReply>, SessionError> {
        if command.expects_reply() {
            self.query(command).map(Some)
        } else {
            self.send(command).map(|()| None)
        }
    }

    /// Send a fire-and-forget command.
    pub fn send(&mut self, command: Command) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.transmit(&command)
    }

    /// Send a query. The reply slot is reserved before any byte is written.
    pub fn query(&mut self, command: Command) -> Result<PendingReply, SessionError> {
        self.ensure_open()?;
        let reply = self.correlator.enqueue();
        self.transmit(&command)?;
        Ok(reply)
    }

    /// Send `(exit)`, end the outbound stream, and move to `Closing`.
    ///
    /// The state changes even if the write fails; the write error is
    /// returned after the transition.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Open {
            return Err(SessionError::Closed);
        }

        let sent = match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => self.transmit(&Command::Exit),
        };
        self.end_outbound();
        self.state = SessionState::Closing;
        info!(pending = self.correlator.len(), "Solver session closing");
        sent
    }

    /// Feed a chunk of solver output, completing replies for every message
    /// it finishes. Returns the number of responses delivered.
    ///
    /// # Errors
    ///
    /// A syntax error or an unsolicited response poisons the session: every
    /// outstanding reply and every later operation fail with that fault.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<usize, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        let mut messages = Vec::new();
        let parsed = self.parser.feed_into(chunk, &mut messages);
        let delivered = self.deliver_all(messages)?;

        if let Err(err) = parsed {
            return Err(self.poison(err.into()));
        }
        Ok(delivered)
    }

    /// Solver output has ended. Completes a trailing message if one is
    /// buffered, fails remaining replies with [`SessionError::Closed`], and
    /// moves to `Closed`.
    pub fn finish(&mut self) -> Result<usize, SessionError> {
        if self.state == SessionState::Closed {
            return Ok(0);
        }

        let mut result = Ok(0);
        if self.fault.is_none() {
            if !self.parser.is_idle() {
                debug!(
                    depth = self.parser.depth(),
                    "Solver output ended inside a message"
                );
            }
            result = match self.parser.finish() {
                Ok(messages) => self.deliver_all(messages),
                Err(err) => Err(self.poison(err.into())),
            };
        }

        let outstanding = self.correlator.fail_all(&SessionError::Closed);
        if outstanding > 0 {
            warn!(outstanding, "Solver output ended with requests still pending");
        }
        self.end_outbound();
        self.state = SessionState::Closed;
        info!(
            delivered = self.correlator.delivered(),
            "Solver session closed"
        );
        result
    }

    /// Record a transport failure reported by the driver.
    pub fn fail(&mut self, err: SessionError) -> SessionError {
        self.poison(err)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closing | SessionState::Closed => Err(SessionError::Closed),
        }
    }

    fn transmit(&mut self, command: &Command) -> Result<(), SessionError> {
        let line = command.encode();
        debug!(command = line.trim_end(), "-> solver");
        self.outbound
            .send(line.as_bytes())
            .map_err(|err| self.poison(err.into()))
    }

    fn deliver_all(&mut self, messages: Vec<Sexp>) -> Result<usize, SessionError> {
        let mut delivered = 0;
        for message in messages {
            debug!(response = %message, "<- solver");
            if let Err(err) = self.correlator.deliver(message) {
                return Err(self.poison(err));
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    fn end_outbound(&mut self) {
        if self.outbound_ended {
            return;
        }
        self.outbound_ended = true;
        if let Err(err) = self.outbound.end() {
            warn!("Failed to end solver input: {}", err);
        }
    }

    /// Record a stream-fatal fault and fail everything waiting on the stream.
    fn poison(&mut self, err: SessionError) -> SessionError {
        if err.is_stream_fatal() && self.fault.is_none() {
            error!("Solver session faulted: {}", err);
            let failed = self.correlator.fail_all(&err);
            if failed > 0 {
                warn!(failed, "Failed outstanding requests after fault");
            }
            self.fault = Some(err.clone());
        }
        err
    }
}
