//! SMT-LIB wire syntax: messages, the streaming parser, and command encoding.
//!
//! ```text
//!  caller ──► Command ──► encoder ──► "(check-sat)\n" ──► solver stdin
//!                                                            │
//!  PendingReply ◄── Sexp ◄── Parser::feed ◄── "sa" "t\n" ◄── solver stdout
//! ```
//!
//! Nothing here performs I/O; see [`crate::session`] for the state machine
//! that ties these pieces to a byte stream.

mod command;
mod encoder;
mod message;
mod parser;

pub use command::Command;
pub use encoder::{command, encode, encode_line};
pub use message::{Sexp, ERROR_MARKER};
pub use parser::{parse_all, Parser, SyntaxError};
