//! solverpipe - run an SMT-LIB script against an interactive solver.
//!
//! Every command in the script is sent without waiting for earlier answers;
//! replies are printed in order once they arrive.
//!
//! ```text
//! solverpipe [--json] [SCRIPT]
//! ```
//!
//! Reads the script from stdin when no path is given. The solver is chosen by
//! `SOLVERPIPE_SOLVER` or the config file (see `solverpipe::config`).

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solverpipe::config::SolverConfig;
use solverpipe::process::SolverProcess;
use solverpipe::session::SessionError;
use solverpipe::wire::{parse_all, Command, Sexp, ERROR_MARKER};

const USAGE: &str = "usage: solverpipe [--json] [SCRIPT]";

/// Command-line options.
#[derive(Debug, Default, PartialEq)]
struct Options {
    json: bool,
    script: Option<PathBuf>,
}

impl Options {
    /// Returns `None` when help was requested.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut options = Options::default();
        for arg in args {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--json" => options.json = true,
                flag if flag.starts_with('-') && flag != "-" => {
                    bail!("unknown option `{}`\n{}", flag, USAGE)
                }
                path => {
                    if options.script.is_some() {
                        bail!("only one script may be given\n{}", USAGE);
                    }
                    if path != "-" {
                        options.script = Some(PathBuf::from(path));
                    }
                }
            }
        }
        Ok(Some(options))
    }
}

fn read_script(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read script from stdin")?;
            Ok(text)
        }
    }
}

fn print_reply(out: &mut impl Write, message: &Sexp, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(message)?)?;
    } else {
        writeln!(out, "{}", message)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "solverpipe=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let Some(options) = Options::parse(std::env::args().skip(1))? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let script = read_script(options.script.as_ref())?;
    let forms = parse_all(&script).context("Failed to parse script")?;
    let config = SolverConfig::load().context("Failed to load solver configuration")?;

    let solver = SolverProcess::spawn(&config)?;
    let handle = solver.handle();

    let mut replies = Vec::new();
    for form in forms {
        let command = Command::from_form(form.clone())
            .with_context(|| format!("Not a command: {}", form))?;
        if command == Command::Exit {
            break;
        }
        if let Some(reply) = handle.execute(command).await? {
            replies.push(reply);
        }
    }
    info!(queries = replies.len(), "Script sent");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut solver_errors = 0usize;
    for reply in replies {
        match reply.await {
            Ok(message) => print_reply(&mut out, &message, options.json)?,
            Err(SessionError::Solver { detail }) => {
                solver_errors += 1;
                let message = Sexp::list(std::iter::once(Sexp::atom(ERROR_MARKER)).chain(detail));
                warn!("Solver reported an error: {}", message);
                print_reply(&mut out, &message, options.json)?;
            }
            Err(err) => return Err(err).context("Solver session failed"),
        }
    }
    out.flush()?;
    drop(out);

    solver.shutdown().await?;
    if solver_errors > 0 {
        info!(solver_errors, "Script finished with solver errors");
    }
    Ok(())
}
