//! Engine collaborator contract and the built-in mock engine.
//!
//! The front-end never evaluates M-language code itself. Everything that is
//! not an internal command is handed to an [`Engine`], which is expected to
//! behave like the native engine C API: evaluation returns an integer status
//! code (0 = protocol success), and textual output is written into a
//! caller-supplied byte buffer without any terminator guarantee.
//!
//! [`MockEngine`] is a small scriptable stand-in used by the test suite and
//! the demo binary. It understands just enough of the language (numeric and
//! string literals, variables, `ischar`/`isempty`, `lasterror`) to exercise
//! the parser, the dispatcher, and the output channel end to end.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// ── EngineValue ───────────────────────────────────────────────────────────────

/// An opaque engine value, as seen through the variable get/set operations.
///
/// Multi-dimensional array marshalling is a separate concern and is not
/// modelled here; scalar numbers, character strings, and logicals cover the
/// front-end's needs.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Num(f64),
    Str(String),
    Logical(bool),
}

impl EngineValue {
    /// Render the value the way the engine would echo it, without the
    /// `name =` prefix.
    pub fn display_text(&self) -> String {
        match self {
            EngineValue::Num(v) => format!("{v}"),
            EngineValue::Str(s) => s.clone(),
            EngineValue::Logical(b) => if *b { "1" } else { "0" }.to_owned(),
        }
    }

    fn is_str(&self) -> bool {
        matches!(self, EngineValue::Str(_))
    }
}

// ── Engine trait ──────────────────────────────────────────────────────────────

/// The external compute engine, reduced to the operations the front-end uses.
///
/// Status-code convention: `0` means the evaluation call itself succeeded at
/// the protocol level. A nonzero code means the engine is unreachable or has
/// died, which the session treats as fatal. A *logical* script error (bad
/// variable name, syntax error in forwarded code) still returns `0`; it is
/// only visible through the output text and the engine's own diagnostic
/// state.
pub trait Engine {
    /// Human-readable engine name, used in the startup banner.
    fn name(&self) -> &str;

    /// Start the engine. Idempotent; returns `false` if it cannot be started.
    fn start(&mut self) -> bool;

    /// Returns `true` while the engine is available for evaluation.
    fn is_running(&self) -> bool;

    /// Evaluate `command`.
    ///
    /// When `output` is `Some`, the engine writes its textual output into the
    /// slice, byte by byte, stopping when the slice is exhausted. The engine
    /// does **not** write a terminator; the caller must pre-zero the slice
    /// and detect truncation itself. When `output` is `None`, output capture
    /// is unbound and any output is discarded.
    fn evaluate(&mut self, command: &str, output: Option<&mut [u8]>) -> i32;

    /// Fetch a variable as an opaque value. `None` if it does not exist.
    fn get_variable(&mut self, name: &str) -> Option<EngineValue>;

    /// Store a variable. Returns `false` on failure.
    fn set_variable(&mut self, name: &str, value: EngineValue) -> bool;

    /// Show or hide the engine's native console window.
    fn set_visible(&mut self, visible: bool) -> bool;
}

// ── MockEngine ────────────────────────────────────────────────────────────────

/// Shared, inspectable state of a [`MockEngine`].
///
/// The mock hands out [`Rc`] clones of this state so a test can keep a handle
/// for inspection after the engine itself has been boxed into a session.
#[derive(Debug, Default)]
pub struct MockState {
    /// Variable store.
    pub vars: HashMap<String, EngineValue>,
    /// Every command passed to [`Engine::evaluate`], in order.
    pub log: Vec<String>,
    /// Exact-match canned responses, consulted before the built-in behaviour.
    pub canned: HashMap<String, String>,
    /// The message of the most recent logical error, if any.
    pub last_error: Option<String>,
    /// Console window visibility.
    pub visible: bool,
    /// Engine liveness. `false` makes every evaluation a protocol failure.
    pub running: bool,
}

/// A scriptable in-process engine for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Rc<RefCell<MockState>>,
}

impl MockEngine {
    /// A running mock, with only the `version` variable defined.
    pub fn new() -> Self {
        let engine = Self::default();
        {
            let mut state = engine.state.borrow_mut();
            state.running = true;
            state
                .vars
                .insert("version".to_owned(), EngineValue::Str("1.0 (mock)".to_owned()));
        }
        engine
    }

    /// Builder-style canned response: `command` (matched exactly) produces
    /// `text` instead of the built-in behaviour.
    pub fn with_response(self, command: &str, text: &str) -> Self {
        self.state
            .borrow_mut()
            .canned
            .insert(command.to_owned(), text.to_owned());
        self
    }

    /// Builder-style variable definition.
    pub fn with_variable(self, name: &str, value: EngineValue) -> Self {
        self.state.borrow_mut().vars.insert(name.to_owned(), value);
        self
    }

    /// A handle to the shared state, for inspection and for simulating
    /// failures mid-test.
    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    /// Evaluate a statement and produce the engine's textual output.
    fn respond(state: &mut MockState, command: &str) -> String {
        if let Some(text) = state.canned.get(command.trim()) {
            return text.clone();
        }

        let mut stmt = command.trim();
        let suppress = stmt.ends_with(';');
        if suppress {
            stmt = stmt[..stmt.len() - 1].trim_end();
        }

        match stmt {
            "" | "format compact" => return String::new(),
            "lasterror('reset')" => {
                state.last_error = None;
                return String::new();
            }
            "lasterror" => {
                let message = state.last_error.as_deref().unwrap_or("");
                return format!(
                    "ans = \n    message: '{message}'\n    identifier: 'mock:lasterror'\n"
                );
            }
            _ => {}
        }

        // Assignment: `name = expr`.
        if let Some((lhs, rhs)) = stmt.split_once('=') {
            let name = lhs.trim();
            if is_identifier(name) && !rhs.starts_with('=') {
                return match eval_expr(state, rhs.trim()) {
                    Ok(value) => {
                        state.vars.insert(name.to_owned(), value.clone());
                        if suppress {
                            String::new()
                        } else {
                            echo(name, &value)
                        }
                    }
                    Err(message) => logical_error(state, message),
                };
            }
        }

        // Bare expression. A bare variable echoes under its own name,
        // anything else under `ans`.
        match eval_expr(state, stmt) {
            Ok(value) => {
                let name = if is_identifier(stmt) { stmt } else { "ans" };
                state.vars.insert("ans".to_owned(), value.clone());
                if suppress {
                    String::new()
                } else {
                    echo(name, &value)
                }
            }
            Err(message) => logical_error(state, message),
        }
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        "Mock engine"
    }

    fn start(&mut self) -> bool {
        self.state.borrow_mut().running = true;
        true
    }

    fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    fn evaluate(&mut self, command: &str, output: Option<&mut [u8]>) -> i32 {
        let mut state = self.state.borrow_mut();
        state.log.push(command.to_owned());
        if !state.running {
            return 1;
        }

        let text = Self::respond(&mut state, command);
        if let Some(buf) = output {
            let bytes = text.as_bytes();
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
        }
        0
    }

    fn get_variable(&mut self, name: &str) -> Option<EngineValue> {
        self.state.borrow().vars.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: EngineValue) -> bool {
        self.state
            .borrow_mut()
            .vars
            .insert(name.to_owned(), value);
        true
    }

    fn set_visible(&mut self, visible: bool) -> bool {
        self.state.borrow_mut().visible = visible;
        true
    }
}

// ── Mock evaluation helpers ──────────────────────────────────────────────────

/// Record a logical error and produce the classic console error text.
fn logical_error(state: &mut MockState, message: String) -> String {
    let text = format!("??? {message}\n");
    state.last_error = Some(message);
    text
}

/// Echo a value the way the engine prints an unsuppressed result.
fn echo(name: &str, value: &EngineValue) -> String {
    match value {
        EngineValue::Str(s) => format!("{name} =\n\n{s}\n\n"),
        other => format!("{name} =\n\n     {}\n\n", other.display_text()),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Evaluate the expression subset the mock understands.
fn eval_expr(state: &MockState, expr: &str) -> Result<EngineValue, String> {
    // 'string literal' with '' as the embedded-quote escape
    if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
        let inner = &expr[1..expr.len() - 1];
        return Ok(EngineValue::Str(inner.replace("''", "'")));
    }

    if let Ok(v) = expr.parse::<f64>() {
        return Ok(EngineValue::Num(v));
    }

    if let Some(inner) = call_argument(expr, "ischar") {
        let value = eval_expr(state, inner)?;
        return Ok(EngineValue::Logical(value.is_str()));
    }

    if let Some(inner) = call_argument(expr, "isempty") {
        let empty = match eval_expr(state, inner)? {
            EngineValue::Str(s) => s.is_empty(),
            _ => false,
        };
        return Ok(EngineValue::Logical(empty));
    }

    if is_identifier(expr) {
        if let Some(value) = state.vars.get(expr) {
            return Ok(value.clone());
        }
    }

    Err(format!("Undefined function or variable '{expr}'."))
}

/// For `name(arg)`, return `arg`; otherwise `None`.
fn call_argument<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    expr.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

// ── Tests ─────────────────────────────────────────────────────────────────────
