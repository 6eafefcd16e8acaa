//! solverpipe library
//!
//! Drives an interactive SMT-LIB solver (z3, cvc5, yices, ...) over its
//! stdin/stdout without blocking the caller while answers are pending:
//!
//! - `wire` - S-expression messages, streaming parser, command encoding
//! - `session` - FIFO reply correlation and the session state machine
//! - `process` - tokio driver that spawns the solver and runs a session task
//! - `config` - solver executable configuration
//!
//! # Example
//!
//! ```ignore
//! use solverpipe::{config::SolverConfig, process::SolverProcess, wire::Sexp};
//!
//! let solver = SolverProcess::spawn(&SolverConfig::load()?)?;
//! let handle = solver.handle();
//! handle.declare_const("x", "Int").await?;
//! handle.assert("(> x 2)".parse::<Sexp>()?).await?;
//! let verdict = handle.check_sat().await?;
//! let values = handle.get_value([Sexp::atom("x")]).await?;
//! println!("{} {}", verdict.await?, values.await?);
//! solver.shutdown().await?;
//! ```

pub mod config;
pub mod process;
pub mod session;
pub mod wire;
