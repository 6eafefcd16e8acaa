//! Rendering of outbound commands.
//!
//! A command is a name atom followed by its arguments, sent as one top-level
//! list on its own line: `["declare-const", "x", "Int"]` becomes
//! `(declare-const x Int)\n`.

use super::message::{write_list, Sexp};

/// Render `command` as a single parenthesised form.
pub fn encode(command: &[Sexp]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_list(&mut out, command);
    out
}

/// Render `command` followed by the newline a line-oriented solver waits for.
pub fn encode_line(command: &[Sexp]) -> String {
    let mut line = encode(command);
    line.push('\n');
    line
}

/// Join a command name and its arguments into one form.
pub fn command(name: &str, args: impl IntoIterator<Item = Sexp>) -> Vec<Sexp> {
    std::iter::once(Sexp::atom(name)).chain(args).collect()
}
