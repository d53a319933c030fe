//! Interpreter session: the public entry point around parser and engine.
//!
//! A [`Session`] owns one engine, one parser, one output channel, and the
//! internal command registry. Text submitted through
//! [`Session::execute_command`] is split into lines and fed through the
//! parser; ready commands are evaluated through the output channel and the
//! resulting text is routed to the output or error sink.
//!
//! ## Scoped execution
//!
//! [`Session::execute_scoped_command`] runs the same pipeline but delivers
//! output to a caller-supplied pair of sinks for the duration of the call.
//! Scoped calls nest (a script run from within a scoped command re-enters
//! the session); nesting is tracked with a depth counter and the inner calls
//! share the outermost caller's sinks. While a scoped command is active the
//! global sinks only see traffic when [`Session::show_global_output`] is on.
//!
//! Everything is synchronous and single-threaded: one command evaluates at a
//! time on the calling thread, and re-entrancy is strictly nested, so a
//! depth counter is all the bookkeeping required.

use std::path::Path;

use crate::channel::{EvalOutcome, OutputChannel};
use crate::command::{CommandSet, InternalCommand, SessionAction};
use crate::config::Settings;
use crate::engine::{Engine, EngineValue};
use crate::parser::Parser;

// ── SessionContext ────────────────────────────────────────────────────────────

/// The engine-facing half of a session, handed to internal commands.
///
/// Splitting this out of [`Session`] lets the parser borrow it mutably while
/// the session still owns the parser, and keeps command handlers away from
/// the output routing they must not touch.
pub struct SessionContext {
    engine: Box<dyn Engine>,
    pub settings: Settings,
    channel: OutputChannel,
    /// Configuration errors raised mid-evaluation (buffer allocation
    /// failures), drained by the session into the error sink.
    alerts: Vec<String>,
    /// Names of the registered internal commands, for the listing command.
    pub command_names: Vec<String>,
}

impl SessionContext {
    pub fn new(engine: Box<dyn Engine>, settings: Settings) -> Self {
        Self {
            engine,
            settings,
            channel: OutputChannel::new(),
            alerts: Vec::new(),
            command_names: Vec::new(),
        }
    }

    /// Evaluate with buffered output capture.
    pub fn evaluate(&mut self, command: &str) -> EvalOutcome {
        self.channel
            .evaluate(self.engine.as_mut(), &self.settings, command, &mut self.alerts)
    }

    /// Evaluate discarding all output. Returns protocol success.
    pub fn evaluate_quiet(&mut self, command: &str) -> bool {
        self.channel.evaluate_quiet(self.engine.as_mut(), command)
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn engine_name(&self) -> String {
        self.engine.name().to_owned()
    }

    pub fn start_engine(&mut self) -> bool {
        self.engine.start()
    }

    pub fn set_visible(&mut self, visible: bool) -> bool {
        self.engine.set_visible(visible)
    }

    pub fn get_variable(&mut self, name: &str) -> Option<EngineValue> {
        self.engine.get_variable(name)
    }

    pub fn set_variable(&mut self, name: &str, value: EngineValue) -> bool {
        self.engine.set_variable(name, value)
    }

    /// Fetch a variable's value as display text, by evaluating the bare name
    /// and massaging the echo.
    ///
    /// Probes `ischar(name)` to decide whitespace handling: non-character
    /// values lose all spaces, character values keep interior spacing and
    /// are additionally checked with `isempty(name)` because an empty string
    /// echoes nothing useful. Everything up to and including the first `=`
    /// of the echo is dropped. `None` when any probe fails at the protocol
    /// level, reports an error, truncates, or captures nothing.
    pub fn variable_as_string(&mut self, name: &str) -> Option<String> {
        let value = self.checked_capture(name)?;
        let ischar = self.checked_capture(&format!("ischar({name})"))?;

        let mut formatted: String = value.chars().filter(|&c| c != '\n').collect();
        let ischar: String = ischar
            .chars()
            .filter(|&c| c != '\n' && c != ' ')
            .collect();

        if !ischar.contains("ans=1") {
            formatted.retain(|c| c != ' ');
        } else {
            // Character value: an empty string cannot be told apart from a
            // string of quote characters by its echo, so ask the engine.
            let isempty = self.checked_capture(&format!("isempty({name})"))?;
            let isempty: String = isempty
                .chars()
                .filter(|&c| c != '\n' && c != ' ')
                .collect();
            if isempty.contains("ans=1") {
                return Some(String::new());
            }
        }

        let formatted = formatted.trim();
        let value = match formatted.find('=') {
            Some(pos) => formatted[pos + 1..].to_owned(),
            None => formatted.to_owned(),
        };
        Some(value)
    }

    fn checked_capture(&mut self, command: &str) -> Option<String> {
        let outcome = self.evaluate(command);
        if !outcome.success
            || outcome.output_is_error
            || outcome.output_truncated
            || outcome.output.is_empty()
        {
            return None;
        }
        Some(outcome.output)
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

enum Scoped {
    Output(String),
    Error(String),
}

/// One interpreter session: engine, parser, registry, and output routing.
pub struct Session {
    ctx: SessionContext,
    parser: Parser,
    commands: CommandSet,
    scoped_depth: u32,
    scoped_buf: Vec<Scoped>,
    global_output_shown: bool,
    startup_message: String,
    on_output: Option<Box<dyn FnMut(&str)>>,
    on_error: Option<Box<dyn FnMut(&str)>>,
}

impl Session {
    /// Build a session over `engine` with the built-in command catalog.
    pub fn new(engine: Box<dyn Engine>, settings: Settings) -> Self {
        let commands = CommandSet::with_builtins();
        let mut ctx = SessionContext::new(engine, settings);
        ctx.command_names = commands.names().map(str::to_owned).collect();
        Self {
            ctx,
            parser: Parser::new(),
            commands,
            scoped_depth: 0,
            scoped_buf: Vec::new(),
            global_output_shown: false,
            startup_message: String::new(),
            on_output: None,
            on_error: None,
        }
    }

    /// Register an additional internal command.
    pub fn register_command(&mut self, command: Box<dyn InternalCommand>) {
        self.commands.register(command);
        self.ctx.command_names = self.commands.names().map(str::to_owned).collect();
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    /// Settings take effect on the next command; the capture buffer resizes
    /// lazily when its configured size changes.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.ctx.settings
    }

    /// Attach the global output sink.
    pub fn on_output(&mut self, f: impl FnMut(&str) + 'static) {
        self.on_output = Some(Box::new(f));
    }

    /// Attach the global error sink.
    pub fn on_error(&mut self, f: impl FnMut(&str) + 'static) {
        self.on_error = Some(Box::new(f));
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Start the engine and prepare the session.
    ///
    /// Issues `format compact` to keep echoes tight, hides the engine's
    /// console window, and probes the `version` variable for the startup
    /// banner. Idempotent once the engine is up.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return true;
        }

        if !self.ctx.start_engine() {
            self.startup_message = "Unable to start the engine. Please check your \
                                    configuration and license settings and try again."
                .to_owned();
            return false;
        }

        self.ctx.evaluate_quiet("format compact");
        self.ctx.set_visible(false);

        self.startup_message = self.ctx.engine_name();
        if let Some(version) = self.ctx.variable_as_string("version") {
            if !version.is_empty() {
                self.startup_message.push(' ');
                self.startup_message.push_str(&version);
            }
        }

        if !self.ctx.settings.interactive_available {
            self.startup_message
                .push_str("\nThe ability to type commands into the scripting window has been disabled.");
        }

        self.drain_alerts();
        self.is_running()
    }

    /// The banner (or failure explanation) from the last [`Session::start`].
    pub fn startup_message(&self) -> &str {
        &self.startup_message
    }

    /// The prompt reflecting the parser's buffering state: `">> "` at rest,
    /// three dots per open block or comment level while buffering.
    pub fn prompt(&self) -> String {
        let depth = (self.parser.command_depth() + self.parser.comment_depth()) as usize;
        if depth > 0 {
            ".".repeat(depth * 3)
        } else {
            ">> ".to_owned()
        }
    }

    /// While a scoped command is running, also mirror its output to the
    /// global sinks.
    pub fn show_global_output(&mut self, shown: bool) {
        self.global_output_shown = shown;
    }

    pub fn is_global_output_shown(&self) -> bool {
        self.global_output_shown
    }

    pub fn get_variable(&mut self, name: &str) -> Option<EngineValue> {
        self.ctx.get_variable(name)
    }

    pub fn set_variable(&mut self, name: &str, value: EngineValue) -> bool {
        self.ctx.set_variable(name, value)
    }

    /// Fetch a variable's value as display text. See
    /// [`SessionContext::variable_as_string`].
    pub fn variable_as_string(&mut self, name: &str) -> Option<String> {
        let result = self.ctx.variable_as_string(name);
        self.drain_alerts();
        result
    }

    /// Execute one or more lines of command text.
    ///
    /// Returns `true` only if every line parsed and evaluated without error.
    /// A parse or dispatch error, a protocol failure, or a logical script
    /// error stops the remaining lines; only the protocol failure is fatal
    /// beyond this call.
    pub fn execute_command(&mut self, command: &str) -> bool {
        for line in command.split('\n') {
            let parsed = self.parser.parse_line(&mut self.ctx, &self.commands, line);
            self.drain_alerts();

            if parsed.output_is_error {
                if parsed.output.is_empty() {
                    self.send_error("Unknown parse error.");
                } else {
                    let output = parsed.output;
                    self.send_error(&output);
                }
                return false;
            }

            if !parsed.output.is_empty() {
                let output = parsed.output;
                self.send_output(&output);
            }

            if let Some(action) = parsed.action {
                match action {
                    SessionAction::RunScript(path) => {
                        if let Err(message) = self.run_script(&path) {
                            self.send_error(&message);
                            return false;
                        }
                    }
                }
            }

            let Some(mut ready) = parsed.command else {
                continue;
            };

            // Keep statement suppression consistent: a command rewritten by a
            // directive inherits the original line's trailing semicolon.
            if line.ends_with(';') && !ready.ends_with(';') {
                ready.push(';');
            }

            let outcome = self.ctx.evaluate(&ready);
            self.drain_alerts();

            let mut output = outcome.output;
            if outcome.output_is_error && output.is_empty() {
                output = "Unknown engine error.".to_owned();
            }

            if !output.is_empty() {
                if outcome.output_is_error {
                    self.send_error(&output);
                } else {
                    self.send_output(&output);
                }
            }

            if outcome.output_truncated {
                // The newline keeps the warning off the truncated line, which
                // almost certainly did not end with one.
                self.send_error(
                    "\nThe previous output was truncated. Please increase the \
                     output buffer size and try again.",
                );
            }

            if !outcome.success {
                self.send_error("The engine is no longer running.");
                return false;
            }

            if outcome.output_is_error {
                return false;
            }
        }

        true
    }

    /// Run `command` with `output`/`error` receiving everything the call
    /// produces. Nested scoped calls deliver to the outermost caller's
    /// sinks.
    pub fn execute_scoped_command(
        &mut self,
        command: &str,
        mut output: impl FnMut(&str),
        mut error: impl FnMut(&str),
    ) -> bool {
        self.scoped_depth += 1;
        let result = self.execute_command(command);
        self.scoped_depth -= 1;

        if self.scoped_depth == 0 {
            for item in std::mem::take(&mut self.scoped_buf) {
                match item {
                    Scoped::Output(text) => output(&text),
                    Scoped::Error(text) => error(&text),
                }
            }
        }

        result
    }

    // ── Script execution ──────────────────────────────────────────────────

    /// Execute a script file line by line, stopping early at `return`.
    fn run_script(&mut self, path: &Path) -> Result<(), String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| "Unable to open the input file".to_owned())?;

        for (index, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }

            if !self.execute_command(line) {
                return Err(format!(
                    "\n\nError running script: \"{}\", Line {}: \"{}\"",
                    path.display(),
                    index + 1,
                    line.trim()
                ));
            }

            let lower = line.trim().to_ascii_lowercase();
            if lower == "return" || lower.starts_with("return;") || lower.starts_with("return,") {
                break;
            }
        }

        Ok(())
    }

    // ── Output routing ────────────────────────────────────────────────────

    fn drain_alerts(&mut self) {
        for message in std::mem::take(&mut self.ctx.alerts) {
            self.send_error(&message);
        }
    }

    fn send_output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.scoped_depth > 0 {
            self.scoped_buf.push(Scoped::Output(text.to_owned()));
        }

        if self.scoped_depth == 0 || self.global_output_shown {
            if let Some(f) = self.on_output.as_mut() {
                f(text);
            }
        }
    }

    fn send_error(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.scoped_depth > 0 {
            self.scoped_buf.push(Scoped::Error(text.to_owned()));
        }

        if self.scoped_depth == 0 || self.global_output_shown {
            if let Some(f) = self.on_error.as_mut() {
                f(text);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
