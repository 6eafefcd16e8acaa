//! Incremental S-expression parser for solver output.
//!
//! The solver's stdout arrives in chunks of arbitrary size. [`Parser`] keeps
//! the unfinished token, the stack of open lists, and the quoting mode between
//! calls to [`Parser::feed`], and hands back every top-level message the
//! moment its last byte has been seen.
//!
//! # Grammar
//!
//! ```text
//! message  := atom | '(' message* ')'
//! atom     := bare | string | symbol
//! bare     := any run of bytes up to whitespace, '(', ')', '"', '|' or ';'
//! string   := '"' ( any byte except '"' | '""' )* '"'
//! symbol   := '|' any byte except '|' '|'
//! comment  := ';' up to end of line (skipped)
//! ```
//!
//! All delimiters are ASCII, so scanning works on bytes and a chunk boundary
//! in the middle of a multi-byte UTF-8 character is harmless; tokens are only
//! decoded once they are complete.

use std::mem;

use thiserror::Error;

use super::message::Sexp;

/// Malformed solver output. Once raised, the stream cannot be resynchronised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// `)` with no open list.
    #[error("unbalanced ')' at byte {offset}")]
    UnbalancedClose { offset: u64 },

    /// Stream ended inside a `"string"`.
    #[error("unterminated string literal at end of stream")]
    UnterminatedString,

    /// Stream ended inside a `|quoted symbol|`.
    #[error("unterminated quoted symbol at end of stream")]
    UnterminatedSymbol,

    /// Stream ended with lists still open.
    #[error("{depth} unclosed '(' at end of stream")]
    UnclosedList { depth: usize },

    /// A completed atom was not valid UTF-8.
    #[error("invalid UTF-8 in atom ending at byte {offset}")]
    InvalidUtf8 { offset: u64 },

    /// Input held no message where one was required.
    #[error("expected one expression, found none")]
    Empty,

    /// Input held more than the single message that was required.
    #[error("expected one expression, found {count}")]
    TrailingInput { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Between tokens.
    Between,
    /// Inside an unquoted atom.
    Bare,
    /// Inside a string literal.
    Str,
    /// Just saw a `"` inside a string: either the terminator or the first
    /// half of a doubled quote, decided by the next byte.
    StrQuote,
    /// Inside a `|quoted symbol|`.
    Symbol,
    /// Inside a `;` comment.
    Comment,
}

/// Streaming parser state. One instance per inbound stream.
#[derive(Debug)]
pub struct Parser {
    mode: Mode,
    /// Bytes of the atom currently being scanned.
    token: Vec<u8>,
    /// One entry per open `(`, holding the elements collected so far.
    open: Vec<Vec<Sexp>>,
    /// Total bytes consumed, for error positions.
    offset: u64,
    fault: Option<SyntaxError>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            mode: Mode::Between,
            token: Vec::new(),
            open: Vec::new(),
            offset: 0,
            fault: None,
        }
    }

    /// Consume one chunk and return the top-level messages it completed, in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] on malformed input. The parser is poisoned
    /// afterwards and every further call returns the same error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Sexp>, SyntaxError> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out)?;
        Ok(out)
    }

    /// Like [`feed`](Self::feed), but appends to `out`. Messages completed
    /// earlier in the chunk stay in `out` even when a later byte is malformed.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Sexp>) -> Result<(), SyntaxError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        for &byte in chunk {
            if let Err(err) = self.step(byte, out) {
                self.fault = Some(err.clone());
                return Err(err);
            }
            self.offset += 1;
        }
        Ok(())
    }

    /// Signal end of stream.
    ///
    /// A trailing top-level atom with no delimiter after it is completed and
    /// returned. An open string, quoted symbol, or list is an error.
    pub fn finish(&mut self) -> Result<Vec<Sexp>, SyntaxError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        let mut out = Vec::new();
        let result = match self.mode {
            Mode::Str => Err(SyntaxError::UnterminatedString),
            Mode::Symbol => Err(SyntaxError::UnterminatedSymbol),
            Mode::Bare | Mode::StrQuote => self.complete_atom(&mut out),
            Mode::Between | Mode::Comment => Ok(()),
        }
        .and_then(|()| match self.open.len() {
            0 => Ok(()),
            depth => Err(SyntaxError::UnclosedList { depth }),
        });

        match result {
            Ok(()) => {
                self.mode = Mode::Between;
                Ok(out)
            }
            Err(err) => {
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Current list nesting depth.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// True when no partial message is buffered.
    pub fn is_idle(&self) -> bool {
        self.open.is_empty() && matches!(self.mode, Mode::Between | Mode::Comment)
    }

    fn step(&mut self, byte: u8, out: &mut Vec<Sexp>) -> Result<(), SyntaxError> {
        match self.mode {
            Mode::Comment => {
                if byte == b'\n' {
                    self.mode = Mode::Between;
                }
                Ok(())
            }
            Mode::Str => {
                self.token.push(byte);
                if byte == b'"' {
                    self.mode = Mode::StrQuote;
                }
                Ok(())
            }
            Mode::StrQuote => {
                if byte == b'"' {
                    // Doubled quote: literal `"`, string continues.
                    self.token.push(byte);
                    self.mode = Mode::Str;
                    Ok(())
                } else {
                    self.complete_atom(out)?;
                    self.mode = Mode::Between;
                    self.step(byte, out)
                }
            }
            Mode::Symbol => {
                self.token.push(byte);
                if byte == b'|' {
                    self.complete_atom(out)?;
                    self.mode = Mode::Between;
                }
                Ok(())
            }
            Mode::Bare => {
                if is_delimiter(byte) {
                    self.complete_atom(out)?;
                    self.mode = Mode::Between;
                    self.step(byte, out)
                } else {
                    self.token.push(byte);
                    Ok(())
                }
            }
            Mode::Between => {
                match byte {
                    b'(' => self.open.push(Vec::new()),
                    b')' => {
                        let items = self
                            .open
                            .pop()
                            .ok_or(SyntaxError::UnbalancedClose {
                                offset: self.offset,
                            })?;
                        self.emit(Sexp::List(items), out);
                    }
                    b'"' => {
                        self.token.push(byte);
                        self.mode = Mode::Str;
                    }
                    b'|' => {
                        self.token.push(byte);
                        self.mode = Mode::Symbol;
                    }
                    b';' => self.mode = Mode::Comment,
                    b if b.is_ascii_whitespace() => {}
                    b => {
                        self.token.push(b);
                        self.mode = Mode::Bare;
                    }
                }
                Ok(())
            }
        }
    }

    fn complete_atom(&mut self, out: &mut Vec<Sexp>) -> Result<(), SyntaxError> {
        let bytes = mem::take(&mut self.token);
        let token = String::from_utf8(bytes).map_err(|_| SyntaxError::InvalidUtf8 {
            offset: self.offset,
        })?;
        self.emit(Sexp::Atom(token), out);
        Ok(())
    }

    /// Attach a finished value to the innermost open list, or hand it out
    /// if it is top-level.
    fn emit(&mut self, value: Sexp, out: &mut Vec<Sexp>) {
        match self.open.last_mut() {
            Some(items) => items.push(value),
            None => out.push(value),
        }
    }
}

fn is_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'(' | b')' | b'"' | b'|' | b';')
}

/// Decode every message in `text`, treating it as a complete stream.
pub fn parse_all(text: &str) -> Result<Vec<Sexp>, SyntaxError> {
    let mut parser = Parser::new();
    let mut messages = parser.feed(text.as_bytes())?;
    messages.extend(parser.finish()?);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn atom(token: &str) -> Sexp {
        Sexp::atom(token)
    }

    const TRANSCRIPT: &str = concat!(
        "sat\n",
        "(error \"line 3 column 8: unknown constant \"\"y\"\"\")\n",
        "((x 1) (|weird name| (- 2)))\n",
        "(model\n  (define-fun x () Int\n    1) ; trailing comment\n)\n",
        "\"caf\u{e9} \u{2713}\"\n",
    );

    fn transcript_messages() -> Vec<Sexp> {
        parse_all(TRANSCRIPT).expect("transcript parses")
    }

    #[test]
    fn test_parse_transcript() {
        let messages = transcript_messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0], atom("sat"));
        assert_eq!(
            messages[1],
            Sexp::list([
                atom("error"),
                atom("\"line 3 column 8: unknown constant \"\"y\"\"\""),
            ])
        );
        assert_eq!(
            messages[2],
            Sexp::list([
                Sexp::list([atom("x"), atom("1")]),
                Sexp::list([
                    atom("|weird name|"),
                    Sexp::list([atom("-"), atom("2")]),
                ]),
            ])
        );
        assert_eq!(
            messages[3],
            Sexp::list([
                atom("model"),
                Sexp::list([
                    atom("define-fun"),
                    atom("x"),
                    Sexp::list([]),
                    atom("Int"),
                    atom("1"),
                ]),
            ])
        );
        assert_eq!(messages[4], atom("\"caf\u{e9} \u{2713}\""));
    }

    #[test]
    fn test_every_two_way_split_yields_same_messages() {
        let expected = transcript_messages();
        let bytes = TRANSCRIPT.as_bytes();

        for split in 0..=bytes.len() {
            let mut parser = Parser::new();
            let mut got = parser.feed(&bytes[..split]).unwrap();
            got.extend(parser.feed(&bytes[split..]).unwrap());
            got.extend(parser.finish().unwrap());
            assert_eq!(got, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut parser = Parser::new();
        let mut got = Vec::new();
        for byte in TRANSCRIPT.as_bytes() {
            got.extend(parser.feed(std::slice::from_ref(byte)).unwrap());
        }
        got.extend(parser.finish().unwrap());
        assert_eq!(got, transcript_messages());
    }

    #[test]
    fn test_emits_as_soon_as_complete() {
        let mut parser = Parser::new();
        assert_eq!(parser.feed(b"(sa").unwrap(), vec![]);
        assert_eq!(parser.depth(), 1);
        assert_eq!(parser.feed(b"t)").unwrap(), vec![Sexp::list([atom("sat")])]);
        assert!(parser.is_idle());

        // A bare top-level atom needs its delimiter.
        assert_eq!(parser.feed(b"unsat").unwrap(), vec![]);
        assert!(!parser.is_idle());
        assert_eq!(parser.feed(b"\n").unwrap(), vec![atom("unsat")]);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut parser = Parser::new();
        let got = parser.feed(b"sat (a) unknown\n(b (c)").unwrap();
        assert_eq!(
            got,
            vec![atom("sat"), Sexp::list([atom("a")]), atom("unknown")]
        );
        assert_eq!(parser.depth(), 1);
    }

    #[test]
    fn test_doubled_quote_split_across_chunks() {
        let mut parser = Parser::new();
        assert!(parser.feed(b"(error \"a\"").unwrap().is_empty());
        assert!(parser.feed(b"\"b\")").unwrap().len() == 1);

        let mut parser = Parser::new();
        assert!(parser.feed(b"(error \"a\"").unwrap().is_empty());
        let got = parser.feed(b")").unwrap();
        assert_eq!(got, vec![Sexp::list([atom("error"), atom("\"a\"")])]);
    }

    #[test]
    fn test_delimiters_inside_quotes_are_literal() {
        let got = parse_all("(\"a (b) ; c\" |x)y; z|)").unwrap();
        assert_eq!(
            got,
            vec![Sexp::list([atom("\"a (b) ; c\""), atom("|x)y; z|")])]
        );
    }

    #[test]
    fn test_unbalanced_close_poisons_parser() {
        let mut parser = Parser::new();
        let err = parser.feed(b"sat\n)").unwrap_err();
        assert_eq!(err, SyntaxError::UnbalancedClose { offset: 4 });
        assert_eq!(parser.feed(b"(ok)").unwrap_err(), err);
        assert_eq!(parser.finish().unwrap_err(), err);
    }

    #[test]
    fn test_feed_into_keeps_messages_before_fault() {
        let mut parser = Parser::new();
        let mut out = Vec::new();
        let result = parser.feed_into(b"(a) b )", &mut out);
        assert!(result.is_err());
        assert_eq!(out, vec![Sexp::list([atom("a")]), atom("b")]);
    }

    #[test]
    fn test_finish_reports_unterminated_input() {
        let mut parser = Parser::new();
        parser.feed(b"(error \"oops").unwrap();
        assert_eq!(parser.finish(), Err(SyntaxError::UnterminatedString));

        let mut parser = Parser::new();
        parser.feed(b"|half").unwrap();
        assert_eq!(parser.finish(), Err(SyntaxError::UnterminatedSymbol));

        let mut parser = Parser::new();
        parser.feed(b"((a) (b").unwrap();
        assert_eq!(parser.finish(), Err(SyntaxError::UnclosedList { depth: 2 }));
    }

    #[test]
    fn test_finish_completes_trailing_atoms() {
        let mut parser = Parser::new();
        parser.feed(b"sat").unwrap();
        assert_eq!(parser.finish().unwrap(), vec![atom("sat")]);

        let mut parser = Parser::new();
        parser.feed(b"\"done\"").unwrap();
        assert_eq!(parser.finish().unwrap(), vec![atom("\"done\"")]);
    }

    #[test]
    fn test_invalid_utf8_atom() {
        let mut parser = Parser::new();
        let err = parser.feed(b"(\xff\xfe )").unwrap_err();
        assert!(matches!(err, SyntaxError::InvalidUtf8 { .. }));
    }

    #[test]
    fn test_deep_nesting() {
        let depth = 500;
        let text = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        let got = parse_all(&text).unwrap();
        assert_eq!(got.len(), 1);

        let mut cursor = &got[0];
        for _ in 0..depth {
            cursor = &cursor.as_list().unwrap()[0];
        }
        assert_eq!(cursor, &atom("x"));
    }
}
