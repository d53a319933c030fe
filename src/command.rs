//! Internal commands: the contract, the registry, and the built-in catalog.
//!
//! An internal command is a named directive the front-end intercepts before
//! the line reaches the engine. Each one is an independent object behind the
//! [`InternalCommand`] trait, registered by name in a [`CommandSet`] and
//! looked up by exact match. Host applications embed their own commands
//! (window, layer, and animation control live with the host); the catalog
//! here covers the engine-neutral ones.

use std::path::PathBuf;

use crate::session::SessionContext;

// ── Contract ──────────────────────────────────────────────────────────────────

/// What an internal command produced.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Text for the engine to evaluate next, or empty if nothing further is
    /// needed. Statement-suppression normalisation is applied by the caller.
    pub command: String,
    /// Locally generated output.
    pub output: String,
    /// `true` when `output` is an error message.
    pub output_is_error: bool,
    /// A side effect that must run outside the parse call.
    pub action: Option<SessionAction>,
}

impl CommandOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            output_is_error: true,
            ..Self::default()
        }
    }
}

/// A side effect a command defers to the session.
///
/// Commands execute while the parser is mid-line, so anything that must feed
/// new lines through the full pipeline is queued here and carried out by the
/// session afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Execute a script file line by line.
    RunScript(PathBuf),
}

/// A locally handled directive.
///
/// The name is fixed at construction. `execute` receives the parsed tokens
/// (index 0 is the command's own name, already resolved) and the assignment
/// target list; it must not rely on mutating either.
pub trait InternalCommand {
    fn name(&self) -> &str;

    fn execute(
        &self,
        ctx: &mut SessionContext,
        args: &[String],
        bindings: &[String],
    ) -> CommandOutcome;
}

/// `args[index]`, or `default` when the list is too short.
pub fn arg_or_default(args: &[String], index: usize, default: &str) -> String {
    args.get(index).cloned().unwrap_or_else(|| default.to_owned())
}

/// Quote a value as an engine string literal: wrapped in single quotes, with
/// embedded single quotes doubled.
pub fn to_engine_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ── CommandSet ────────────────────────────────────────────────────────────────

/// Ordered collection of internal commands, looked up by exact name.
#[derive(Default)]
pub struct CommandSet {
    commands: Vec<Box<dyn InternalCommand>>,
}

impl CommandSet {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry pre-loaded with the built-in catalog.
    pub fn with_builtins() -> Self {
        let mut set = Self::new();
        set.register(Box::new(ListCommands::new("commands")));
        set.register(Box::new(GetSettingCommand::new("get_configuration_setting")));
        set.register(Box::new(HideWindowCommand::new("hide_command_window")));
        set.register(Box::new(RunCommand::new("run")));
        set.register(Box::new(ShowWindowCommand::new("show_command_window")));
        set
    }

    pub fn register(&mut self, command: Box<dyn InternalCommand>) {
        self.commands.push(command);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn find(&self, name: &str) -> Option<&dyn InternalCommand> {
        self.commands
            .iter()
            .map(|c| c.as_ref())
            .find(|c| c.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Resolve and invoke a classified internal command.
    ///
    /// Every argument after the name is first probed against the engine as a
    /// variable name; when the probe succeeds the token is replaced by the
    /// variable's string value, so callers can pass variables by name.
    /// A failed probe leaves the token to be used literally. The probing is
    /// deliberate and observable: it costs extra evaluations per argument.
    pub fn dispatch(
        &self,
        ctx: &mut SessionContext,
        tokens: &mut [String],
        bindings: &[String],
    ) -> CommandOutcome {
        if tokens.is_empty() {
            return CommandOutcome::error("Internal error parsing the command");
        }

        for token in tokens.iter_mut().skip(1) {
            if let Some(value) = ctx.variable_as_string(token) {
                *token = value;
            }
        }

        match self.find(&tokens[0]) {
            Some(command) => command.execute(ctx, tokens, bindings),
            None => {
                CommandOutcome::error(format!("Internal error running command {}", tokens[0]))
            }
        }
    }
}

// ── Built-in catalog ──────────────────────────────────────────────────────────

/// `commands`: list every registered internal command.
pub struct ListCommands {
    name: String,
}

impl ListCommands {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl InternalCommand for ListCommands {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &mut SessionContext,
        _args: &[String],
        _bindings: &[String],
    ) -> CommandOutcome {
        let mut output = "Available internal commands: \n".to_owned();
        for name in &ctx.command_names {
            output.push_str("   ");
            output.push_str(name);
            output.push('\n');
        }

        // Display-only: nothing for the engine to evaluate.
        CommandOutcome {
            output,
            ..CommandOutcome::default()
        }
    }
}

/// `run(file)`: execute a script file through the full command pipeline.
pub struct RunCommand {
    name: String,
}

impl RunCommand {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl InternalCommand for RunCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        _ctx: &mut SessionContext,
        args: &[String],
        _bindings: &[String],
    ) -> CommandOutcome {
        let filename = arg_or_default(args, 1, "");
        if filename.is_empty() {
            return CommandOutcome::error("No file specified");
        }

        CommandOutcome {
            action: Some(SessionAction::RunScript(PathBuf::from(filename))),
            ..CommandOutcome::default()
        }
    }
}

/// `get_configuration_setting(name)`: hand a setting's value to the engine
/// as `var = '<value>'`.
pub struct GetSettingCommand {
    name: String,
}

impl GetSettingCommand {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl InternalCommand for GetSettingCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &mut SessionContext,
        args: &[String],
        bindings: &[String],
    ) -> CommandOutcome {
        if args.len() == 1 {
            return CommandOutcome::error(format!("Usage: {}(setting_name)", args[0]));
        }

        let setting_name = arg_or_default(args, 1, "");
        if setting_name.is_empty() {
            return CommandOutcome::error("No setting specified");
        }

        let Some(value) = ctx.settings.display(&setting_name) else {
            return CommandOutcome::error("Unknown setting");
        };

        let mut var_name = arg_or_default(bindings, 0, "");
        if !var_name.is_empty() {
            var_name += " = ";
        }

        CommandOutcome {
            command: var_name + &to_engine_string(&value),
            ..CommandOutcome::default()
        }
    }
}

/// `show_command_window`: reveal the engine's native console.
pub struct ShowWindowCommand {
    name: String,
}

impl ShowWindowCommand {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl InternalCommand for ShowWindowCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &mut SessionContext,
        _args: &[String],
        _bindings: &[String],
    ) -> CommandOutcome {
        if !ctx.set_visible(true) {
            return CommandOutcome::error("Unable to show the command window.");
        }
        CommandOutcome::default()
    }
}

/// `hide_command_window`: hide the engine's native console.
pub struct HideWindowCommand {
    name: String,
}

impl HideWindowCommand {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl InternalCommand for HideWindowCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        ctx: &mut SessionContext,
        _args: &[String],
        _bindings: &[String],
    ) -> CommandOutcome {
        if !ctx.set_visible(false) {
            return CommandOutcome::error("Unable to hide the command window.");
        }
        CommandOutcome::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
