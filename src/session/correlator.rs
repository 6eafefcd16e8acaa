//! FIFO matching of responses to outstanding queries.
//!
//! The solver answers strictly in the order it receives commands, so each
//! response belongs to the oldest query still waiting. A slot must be
//! enqueued *before* its command is written; otherwise a fast reply could
//! arrive ahead of its slot and complete the wrong query.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use super::error::SessionError;
use crate::wire::{Sexp, ERROR_MARKER};

/// Outcome of one query.
pub type Reply = Result<Sexp, SessionError>;

/// Handle to the eventual response of one query.
///
/// Resolves to the response message, to [`SessionError::Solver`] for an
/// `(error ...)` response, or to a session fault. Dropping it does not
/// withdraw the request: the slot still consumes its response in order.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// Take the reply if it has already arrived, without waiting.
    pub fn try_take(&mut self) -> Option<Reply> {
        match self.rx.try_recv() {
            Ok(reply) => Some(reply),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Closed)),
        }
    }
}

impl Future for PendingReply {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SessionError::Closed)))
    }
}

/// Ordered queue of completion slots.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: VecDeque<oneshot::Sender<Reply>>,
    delivered: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot. Call before transmitting the query.
    pub fn enqueue(&mut self) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        self.pending.push_back(tx);
        PendingReply { rx }
    }

    /// Complete the oldest slot with `message`.
    ///
    /// # Errors
    ///
    /// [`SessionError::ProtocolViolation`] if no slot is outstanding.
    pub fn deliver(&mut self, message: Sexp) -> Result<(), SessionError> {
        let slot = self.pending.pop_front().ok_or_else(|| {
            SessionError::ProtocolViolation(format!(
                "unsolicited response with no request outstanding: {}",
                message
            ))
        })?;

        self.delivered += 1;
        if slot.send(classify(message)).is_err() {
            debug!(
                seq = self.delivered,
                "Reply receiver dropped; discarding response"
            );
        }
        Ok(())
    }

    /// Complete every outstanding slot with `err`. Returns how many there were.
    pub fn fail_all(&mut self, err: &SessionError) -> usize {
        let count = self.pending.len();
        for slot in self.pending.drain(..) {
            let _ = slot.send(Err(err.clone()));
        }
        count
    }

    /// Number of queries awaiting a response.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Responses delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

/// Turn an `(error ...)` response into a solver fault.
fn classify(message: Sexp) -> Reply {
    if message.head() != Some(ERROR_MARKER) {
        return Ok(message);
    }
    let detail = message
        .into_list()
        .map(|items| items.into_iter().skip(1).collect())
        .unwrap_or_default();
    Err(SessionError::Solver { detail })
}
