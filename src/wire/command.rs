//! The solver commands this crate knows how to issue.

use super::encoder::{command, encode_line};
use super::message::Sexp;

/// One outbound command.
///
/// Query commands ([`expects_reply`](Command::expects_reply)) are answered by
/// exactly one message; everything else is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `(push n)`: open `n` assertion scopes.
    Push(u32),
    /// `(pop n)`: discard `n` assertion scopes.
    Pop(u32),
    CheckSat,
    DeclareConst { name: String, sort: Sexp },
    DeclareFun {
        name: String,
        params: Vec<Sexp>,
        sort: Sexp,
    },
    Assert(Sexp),
    /// `(get-value (t1 t2 ...))`
    GetValue(Vec<Sexp>),
    GetModel,
    /// `(set-option :key value)`; `option` includes the leading colon.
    SetOption { option: String, value: Sexp },
    SetLogic(String),
    /// Termination command, sent by `close`.
    Exit,
    /// Any other form. The caller states whether the solver answers it.
    Raw { form: Vec<Sexp>, expects_reply: bool },
}

impl Command {
    /// Whether the solver sends one response message for this command.
    pub fn expects_reply(&self) -> bool {
        match self {
            Command::CheckSat | Command::GetValue(_) | Command::GetModel => true,
            Command::Raw { expects_reply, .. } => *expects_reply,
            _ => false,
        }
    }

    /// Command name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Command::Push(_) => "push",
            Command::Pop(_) => "pop",
            Command::CheckSat => "check-sat",
            Command::DeclareConst { .. } => "declare-const",
            Command::DeclareFun { .. } => "declare-fun",
            Command::Assert(_) => "assert",
            Command::GetValue(_) => "get-value",
            Command::GetModel => "get-model",
            Command::SetOption { .. } => "set-option",
            Command::SetLogic(_) => "set-logic",
            Command::Exit => "exit",
            Command::Raw { form, .. } => form.first().and_then(Sexp::as_atom).unwrap_or(""),
        }
    }

    /// The command as a list of name plus arguments.
    pub fn to_form(&self) -> Vec<Sexp> {
        let name = self.name();
        match self {
            Command::Push(n) | Command::Pop(n) => command(name, [Sexp::atom(n.to_string())]),
            Command::CheckSat | Command::GetModel | Command::Exit => command(name, []),
            Command::DeclareConst { name: constant, sort } => {
                command(name, [Sexp::atom(constant.as_str()), sort.clone()])
            }
            Command::DeclareFun {
                name: function,
                params,
                sort,
            } => command(
                name,
                [
                    Sexp::atom(function.as_str()),
                    Sexp::List(params.clone()),
                    sort.clone(),
                ],
            ),
            Command::Assert(formula) => command(name, [formula.clone()]),
            Command::GetValue(terms) => command(name, [Sexp::List(terms.clone())]),
            Command::SetOption { option, value } => {
                command(name, [Sexp::atom(option.as_str()), value.clone()])
            }
            Command::SetLogic(logic) => command(name, [Sexp::atom(logic.as_str())]),
            Command::Raw { form, .. } => form.clone(),
        }
    }

    /// Wire text for this command, newline included.
    pub fn encode(&self) -> String {
        encode_line(&self.to_form())
    }

    /// Interpret a parsed script form as a command.
    ///
    /// Recognised shapes become typed variants; any other list headed by an
    /// atom becomes [`Command::Raw`], answered if its name reads like a query
    /// (`check-sat*`, `get-*`, `eval`, `simplify`, `echo`). Returns `None` for
    /// forms that are not commands at all.
    pub fn from_form(form: Sexp) -> Option<Self> {
        let Ok(items) = form.into_list() else {
            return None;
        };
        let name = items.first()?.as_atom()?.to_string();
        let args = &items[1..];

        let typed = match (name.as_str(), args) {
            ("push", [n]) => n.as_atom().and_then(|n| n.parse().ok()).map(Command::Push),
            ("pop", [n]) => n.as_atom().and_then(|n| n.parse().ok()).map(Command::Pop),
            ("check-sat", []) => Some(Command::CheckSat),
            ("get-model", []) => Some(Command::GetModel),
            ("exit", []) => Some(Command::Exit),
            ("declare-const", [constant, sort]) => constant.as_atom().map(|c| Command::DeclareConst {
                name: c.to_string(),
                sort: sort.clone(),
            }),
            ("declare-fun", [function, Sexp::List(params), sort]) => {
                function.as_atom().map(|f| Command::DeclareFun {
                    name: f.to_string(),
                    params: params.clone(),
                    sort: sort.clone(),
                })
            }
            ("assert", [formula]) => Some(Command::Assert(formula.clone())),
            ("get-value", [Sexp::List(terms)]) => Some(Command::GetValue(terms.clone())),
            ("set-option", [option, value]) => option.as_atom().map(|o| Command::SetOption {
                option: o.to_string(),
                value: value.clone(),
            }),
            ("set-logic", [logic]) => logic.as_atom().map(|l| Command::SetLogic(l.to_string())),
            _ => None,
        };

        Some(typed.unwrap_or_else(|| {
            let expects_reply = name.starts_with("check-sat")
                || name.starts_with("get-")
                || matches!(name.as_str(), "eval" | "simplify" | "echo");
            Command::Raw {
                form: items,
                expects_reply,
            }
        }))
    }
}
