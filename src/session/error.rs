//! Session-level error types.

use thiserror::Error;

use crate::wire::{Sexp, SyntaxError};

/// Everything a session operation or a pending reply can fail with.
///
/// `Clone` so one stream-fatal fault can complete every outstanding reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Solver output could not be parsed. Fatal to the stream.
    #[error("Syntax error in solver output: {0}")]
    Syntax(#[from] SyntaxError),

    /// More responses arrived than requests were outstanding. Fatal to the
    /// stream.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The solver answered this request with `(error ...)`.
    #[error("Solver error: {}", render_detail(.detail))]
    Solver {
        /// Everything after the `error` marker, usually one string atom.
        detail: Vec<Sexp>,
    },

    /// The session is closing or closed, or the solver exited before
    /// answering.
    #[error("Session closed")]
    Closed,

    /// Reading from or writing to the solver failed. Fatal to the stream.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Faults that leave the stream unusable rather than failing one request.
    pub fn is_stream_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Syntax(_) | SessionError::ProtocolViolation(_) | SessionError::Transport(_)
        )
    }

    /// The solver's error text, unquoted, for [`SessionError::Solver`].
    pub fn solver_message(&self) -> Option<String> {
        match self {
            SessionError::Solver { detail } => Some(render_detail(detail)),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

/// Solver error detail for display: a lone string atom is shown without its
/// quotes, anything else in wire syntax.
fn render_detail(detail: &[Sexp]) -> String {
    match detail {
        [single] => single.unquoted().unwrap_or_else(|| single.to_string()),
        _ => detail
            .iter()
            .map(Sexp::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    }
}
