//! matshell: a scripting front-end for an external numerical engine.
//!
//! The crate sits between a line-oriented text stream (a scripting window, a
//! script file, a pipe) and a separately hosted compute engine that speaks an
//! M-style language. It decides, line by line, whether input is an internal
//! command handled locally or a command to forward to the engine verbatim,
//! buffers multi-line `for`/`if`/`while` blocks and `%{ … %}` block comments
//! until they are complete, and wraps engine evaluation in a fixed-capacity
//! output capture with byte-exact truncation detection and best-effort
//! extraction of the engine's own error diagnostics.
//!
//! # Quick start
//!
//! ```rust
//! use matshell::config::Settings;
//! use matshell::engine::MockEngine;
//! use matshell::session::Session;
//!
//! let mut session = Session::new(Box::new(MockEngine::new()), Settings::default());
//! let mut output = Vec::new();
//! let ok = session.execute_scoped_command(
//!     "x = 42",
//!     |text| output.push(text.to_owned()),
//!     |_| {},
//! );
//! assert!(ok);
//! assert!(output[0].starts_with("x ="));
//! ```
//!
//! The engine boundary is the [`engine::Engine`] trait; production embedders
//! implement it over the engine's native C API, while [`engine::MockEngine`]
//! backs the test suite and the demo binary.

pub mod channel;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod parser;
pub mod session;

// Re-exports for convenience.
pub use command::{CommandSet, InternalCommand};
pub use config::Settings;
pub use engine::{Engine, EngineValue, MockEngine};
pub use session::Session;
