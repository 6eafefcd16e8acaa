//! Structured values exchanged with the solver.
//!
//! A message is either an atom (identifier, number, keyword, quoted string,
//! `|quoted symbol|`) or a parenthesised list of messages. Atoms keep their
//! exact source text, so a quoted string atom still carries its quotes.
//!
//! Nesting depth is unbounded: dropping and displaying a message walk it
//! with an explicit stack. The derived `Clone`, `PartialEq` and `Debug`
//! impls and `Serialize` still recurse once per level.

use std::fmt;
use std::mem;
use std::str::FromStr;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use super::parser::{Parser, SyntaxError};

/// Head atom that marks an error response, e.g. `(error "unknown constant x")`.
pub const ERROR_MARKER: &str = "error";

/// An S-expression: the unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sexp {
    /// Indivisible token, stored verbatim.
    Atom(String),
    /// Ordered sequence of nested messages.
    List(Vec<Sexp>),
}

impl Sexp {
    /// Build an atom from raw token text. The caller is responsible for
    /// quoting text that contains whitespace or delimiters.
    pub fn atom(token: impl Into<String>) -> Self {
        Sexp::Atom(token.into())
    }

    pub fn list(items: impl IntoIterator<Item = Sexp>) -> Self {
        Sexp::List(items.into_iter().collect())
    }

    /// Build a string-literal atom, doubling embedded quotes.
    pub fn string(text: &str) -> Self {
        Sexp::Atom(format!("\"{}\"", text.replace('"', "\"\"")))
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(token) => Some(token),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::Atom(_) => None,
            Sexp::List(items) => Some(items),
        }
    }

    /// True if this is an atom with exactly the given text.
    pub fn is_atom(&self, token: &str) -> bool {
        self.as_atom() == Some(token)
    }

    /// Head atom of a list, if any.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// Whether this message has the error-response shape `(error ...)`.
    pub fn is_error(&self) -> bool {
        self.head() == Some(ERROR_MARKER)
    }

    /// Take the items out of a list, or hand back the atom unchanged.
    pub fn into_list(mut self) -> Result<Vec<Sexp>, Sexp> {
        if let Sexp::List(items) = &mut self {
            return Ok(mem::take(items));
        }
        Err(self)
    }

    /// Text of a string-literal atom with the surrounding quotes removed and
    /// doubled quotes collapsed. Returns `None` for anything else.
    pub fn unquoted(&self) -> Option<String> {
        let token = self.as_atom()?;
        let inner = token.strip_prefix('"')?.strip_suffix('"')?;
        Some(inner.replace("\"\"", "\""))
    }
}

/// Write `items` as one parenthesised, space-separated list.
pub(crate) fn write_list(f: &mut impl fmt::Write, items: &[Sexp]) -> fmt::Result {
    f.write_char('(')?;
    // One iterator per open list, plus whether a separator is due.
    let mut open = vec![(items.iter(), false)];
    while let Some((iter, separate)) = open.last_mut() {
        let Some(item) = iter.next() else {
            f.write_char(')')?;
            open.pop();
            continue;
        };
        if *separate {
            f.write_char(' ')?;
        }
        *separate = true;
        match item {
            Sexp::Atom(token) => f.write_str(token)?,
            Sexp::List(children) => {
                f.write_char('(')?;
                open.push((children.iter(), false));
            }
        }
    }
    Ok(())
}

fn write_sexp(f: &mut impl fmt::Write, sexp: &Sexp) -> fmt::Result {
    match sexp {
        Sexp::Atom(token) => f.write_str(token),
        Sexp::List(items) => write_list(f, items),
    }
}

impl Drop for Sexp {
    fn drop(&mut self) {
        let Sexp::List(items) = self else {
            return;
        };
        if items.iter().all(|item| matches!(item, Sexp::Atom(_))) {
            return;
        }
        // Flatten descendants so each one is dropped with no children left.
        let mut pending = mem::take(items);
        while let Some(mut item) = pending.pop() {
            if let Sexp::List(children) = &mut item {
                pending.append(children);
            }
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sexp(f, self)
    }
}

impl FromStr for Sexp {
    type Err = SyntaxError;

    /// Decode exactly one message from `text`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new();
        let mut messages = parser.feed(text.as_bytes())?;
        messages.extend(parser.finish()?);

        match messages.len() {
            0 => Err(SyntaxError::Empty),
            1 => Ok(messages.remove(0)),
            count => Err(SyntaxError::TrailingInput { count }),
        }
    }
}

impl From<&str> for Sexp {
    fn from(token: &str) -> Self {
        Sexp::Atom(token.to_string())
    }
}

impl From<String> for Sexp {
    fn from(token: String) -> Self {
        Sexp::Atom(token)
    }
}

impl From<Vec<Sexp>> for Sexp {
    fn from(items: Vec<Sexp>) -> Self {
        Sexp::List(items)
    }
}

/// Atoms serialize as strings and lists as arrays, so `((x 1))` becomes
/// `[["x","1"]]`.
impl Serialize for Sexp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sexp::Atom(token) => serializer.serialize_str(token),
            Sexp::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}
