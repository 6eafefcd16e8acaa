//! Request/response plumbing for one solver conversation.
//!
//! - [`Session`]: lifecycle and command API, driven by its owner
//! - [`Correlator`]: FIFO queue of reply slots
//! - [`Outbound`]: where encoded commands go
//!
//! # Ordering
//!
//! A query's reply slot is enqueued before its bytes are handed to the
//! outbound sink. Provided the solver answers in request order, the n-th
//! response completes the n-th query, no matter how many fire-and-forget
//! commands were sent in between.

mod correlator;
mod error;
mod outbound;
mod solver;

pub use correlator::{Correlator, PendingReply, Reply};
pub use error::SessionError;
pub use outbound::{ChannelOutbound, Outbound};
pub use solver::{Session, SessionState};
