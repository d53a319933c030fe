//! Line classifier and buffering state machine.
//!
//! [`Parser::parse_line`] takes one raw line at a time and decides what it
//! is: a comment to discard, the opener or body of a multi-line control
//! block to buffer, an internal command to dispatch locally, or a
//! pass-through command ready to forward to the engine. State persists
//! across calls so that `for`/`if`/`while` blocks and `%{ … %}` block
//! comments spanning many lines are accumulated and released as a unit.
//!
//! ## Known limitations, kept on purpose
//!
//! Existing scripts depend on the exact behaviour of two shortcuts, so they
//! are preserved rather than fixed:
//!
//! - Whether a `%` comment marker sits inside a string literal is decided by
//!   counting the single quotes before it on the line: an even count means
//!   outside, odd means inside. Lines with several literals or escaped
//!   quotes can be misjudged.
//! - Every block opener bumps a single counter and only the literal token
//!   `end` (optionally followed by `;` or `,`) closes one level. The parser
//!   does not check that an `end` matches the kind of block it closes.

use crate::command::{CommandSet, SessionAction};
use crate::session::SessionContext;

// ── ParsedLine ────────────────────────────────────────────────────────────────

/// What one call to [`Parser::parse_line`] produced.
#[derive(Debug, Default)]
pub struct ParsedLine {
    /// A command ready to forward to the engine: the comment-stripped line
    /// itself, a completed multi-line block, or text generated by an
    /// internal command. `None` while buffering or after a local-only line.
    pub command: Option<String>,
    /// Locally generated output (internal command results or diagnostics).
    pub output: String,
    /// `true` when `output` is an error message; the caller must stop
    /// feeding lines from the current submission.
    pub output_is_error: bool,
    /// A deferred side effect the session must carry out (script execution).
    pub action: Option<SessionAction>,
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Per-session parse state. Mutated only by [`Parser::parse_line`].
#[derive(Debug, Default)]
pub struct Parser {
    /// Open, unterminated control blocks currently being buffered.
    command_depth: u32,
    /// Open block comments; while nonzero all input is discarded.
    comment_depth: u32,
    /// Accumulated text of the open control block, newline-terminated per
    /// line. Non-empty only while `command_depth > 0`.
    buffered: String,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_depth(&self) -> u32 {
        self.command_depth
    }

    pub fn comment_depth(&self) -> u32 {
        self.comment_depth
    }

    /// Classify one line and advance the buffering state machine.
    ///
    /// Internal commands are dispatched from here (they need the engine for
    /// argument substitution), so the returned [`ParsedLine`] may carry local
    /// output in addition to, or instead of, a ready command.
    pub fn parse_line(
        &mut self,
        ctx: &mut SessionContext,
        commands: &CommandSet,
        line: &str,
    ) -> ParsedLine {
        let mut parsed = ParsedLine::default();
        if line.is_empty() {
            return parsed;
        }

        let mut command = line.to_owned();

        // Comment handling. The quote-parity test below is the documented
        // string-literal heuristic.
        if let Some(index) = command.find('%') {
            if command == "%{" {
                self.comment_depth += 1;
            } else if self.comment_depth > 0 && command == "%}" {
                self.comment_depth -= 1;
            }

            if index == 0 {
                return parsed;
            }

            let outside_string = command[..index].chars().filter(|&c| c == '\'').count() % 2 == 0;
            if outside_string {
                command.truncate(index);
            }
        }

        if self.comment_depth > 0 {
            return parsed;
        }

        // Internal command? Checked before anything else so a directive typed
        // mid-block is rejected rather than buffered.
        let (bindings, mut tokens) = split_input(&command);
        if !tokens.is_empty() && commands.contains(&tokens[0]) {
            if self.command_depth > 0 {
                // The whole buffered block must reach the engine in one piece.
                parsed.output_is_error = true;
                parsed.output =
                    "Unable to run this command while buffering commands for the engine".to_owned();
                return parsed;
            }

            let outcome = commands.dispatch(ctx, &mut tokens, &bindings);
            parsed.output = outcome.output;
            parsed.output_is_error = outcome.output_is_error;
            parsed.action = outcome.action;
            if !outcome.command.is_empty() {
                parsed.command = Some(outcome.command);
            }
            return parsed;
        }

        // Block opener: start (or deepen) buffering.
        if starts_with_block_keyword(&command) {
            self.command_depth += 1;
            self.buffered.push_str(&command);
            self.buffered.push('\n');
            return parsed;
        }

        if self.command_depth == 0 {
            parsed.command = Some(command);
            return parsed;
        }

        // Inside a block: `end` closes one level; the outermost close
        // releases the whole buffered text as a single command.
        let lower = command.trim().to_ascii_lowercase();
        if lower == "end" || lower.starts_with("end;") || lower.starts_with("end,") {
            self.command_depth -= 1;
            if self.command_depth == 0 {
                let mut complete = std::mem::take(&mut self.buffered);
                complete.push_str(&command);
                parsed.command = Some(complete);
                return parsed;
            }
        }

        self.buffered.push_str(&command);
        self.buffered.push('\n');
        parsed
    }
}

// ── Line splitting ────────────────────────────────────────────────────────────

/// Split a comment-stripped line into assignment targets and command tokens.
///
/// With an `=` past position zero, the left side is parsed as a variable
/// list and the right side as a command; otherwise the whole line is the
/// command and the target list is empty.
pub(crate) fn split_input(command: &str) -> (Vec<String>, Vec<String>) {
    match command.find('=') {
        Some(index) if index > 0 => {
            let tokens = parse_command_line(&command[index + 1..]);
            let bindings = parse_var_list(&command[..index]);
            (bindings, tokens)
        }
        _ => (Vec::new(), parse_command_line(command)),
    }
}

/// Tokenize a command: `name(arg1, arg2)` becomes `[name, arg1, arg2]` with
/// each argument trimmed; anything without a usable `(…)` pair is a single
/// token. A `(` with no closing `)` on the line yields no tokens at all, so
/// the line falls through to pass-through handling.
pub(crate) fn parse_command_line(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    match command.find('(') {
        Some(open) if open > 0 => {
            if matches!(command.find(')'), Some(close) if close > 0) {
                tokens.push(command[..open].trim().to_owned());
                if let Some(last) = command.rfind(')') {
                    if last > open + 1 {
                        for arg in command[open + 1..last].split(',') {
                            tokens.push(arg.trim().to_owned());
                        }
                    }
                }
            }
        }
        _ => tokens.push(command.trim().to_owned()),
    }

    tokens
}

/// Parse an assignment target list: `[a b c]` or a single bare name.
pub(crate) fn parse_var_list(vars: &str) -> Vec<String> {
    let mut trimmed = vars.trim();
    if trimmed.starts_with('[') && trimmed.find(']') == Some(trimmed.len() - 1) {
        trimmed = &trimmed[1..trimmed.len() - 1];
    }
    trimmed.split_whitespace().map(str::to_owned).collect()
}

/// `for `, `if `, `while `, case-insensitive, space-terminated.
fn starts_with_block_keyword(command: &str) -> bool {
    let lower = command.trim().to_ascii_lowercase();
    lower.starts_with("for ") || lower.starts_with("if ") || lower.starts_with("while ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutcome, InternalCommand};
    use crate::config::Settings;
    use crate::engine::MockEngine;

    /// Test directive: produces local output and optionally engine text.
    struct Ping {
        name: String,
    }

    impl InternalCommand for Ping {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(
            &self,
            _ctx: &mut SessionContext,
            args: &[String],
            _bindings: &[String],
        ) -> CommandOutcome {
            CommandOutcome {
                output: format!("pong {}", args.len()),
                ..CommandOutcome::default()
            }
        }
    }

    fn ctx() -> SessionContext {
        SessionContext::new(Box::new(MockEngine::new()), Settings::default())
    }

    fn registry(names: &[&str]) -> CommandSet {
        let mut commands = CommandSet::new();
        for name in names {
            commands.register(Box::new(Ping {
                name: (*name).to_owned(),
            }));
        }
        commands
    }

    fn parse(parser: &mut Parser, line: &str) -> ParsedLine {
        parser.parse_line(&mut ctx(), &CommandSet::new(), line)
    }

    // -- basics ---------------------------------------------------------------

    #[test]
    fn empty_line_is_ignored() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "");
        assert_eq!(parsed.command, None);
        assert_eq!(parsed.output, "");
        assert!(!parsed.output_is_error);
    }

    #[test]
    fn plain_line_passes_through_verbatim() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "x = foo(1,2)");
        assert_eq!(parsed.command.as_deref(), Some("x = foo(1,2)"));
        assert_eq!(parser.command_depth(), 0);
    }

    // -- comments -------------------------------------------------------------

    #[test]
    fn pure_comment_line_is_discarded() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "% just a note");
        assert_eq!(parsed.command, None);
    }

    #[test]
    fn trailing_comment_is_stripped() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "y = 5 % comment");
        assert_eq!(parsed.command.as_deref(), Some("y = 5 "));
    }

    #[test]
    fn marker_inside_string_literal_is_kept() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "s = '5%5'");
        assert_eq!(parsed.command.as_deref(), Some("s = '5%5'"));
    }

    #[test]
    fn marker_after_closed_literal_is_stripped() {
        // Two quotes before the marker: even count, so it is a comment.
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "s = 'ok' % trailing");
        assert_eq!(parsed.command.as_deref(), Some("s = 'ok' "));
    }

    #[test]
    fn block_comment_swallows_lines() {
        let mut parser = Parser::new();
        assert_eq!(parse(&mut parser, "%{").command, None);
        assert_eq!(parser.comment_depth(), 1);
        assert_eq!(parse(&mut parser, "x = 1").command, None);
        assert_eq!(parse(&mut parser, "anything at all").command, None);
        // The closing line itself is also discarded.
        assert_eq!(parse(&mut parser, "%}").command, None);
        assert_eq!(parser.comment_depth(), 0);
        assert_eq!(parse(&mut parser, "x = 1").command.as_deref(), Some("x = 1"));
    }

    #[test]
    fn nested_block_comments() {
        let mut parser = Parser::new();
        parse(&mut parser, "%{");
        parse(&mut parser, "%{");
        assert_eq!(parser.comment_depth(), 2);
        parse(&mut parser, "%}");
        assert_eq!(parser.comment_depth(), 1);
        assert_eq!(parse(&mut parser, "x = 1").command, None);
        parse(&mut parser, "%}");
        assert_eq!(parser.comment_depth(), 0);
    }

    #[test]
    fn stray_block_comment_closer_does_not_underflow() {
        let mut parser = Parser::new();
        let parsed = parse(&mut parser, "%}");
        assert_eq!(parsed.command, None);
        assert_eq!(parser.comment_depth(), 0);
    }

    // -- block buffering ------------------------------------------------------

    #[test]
    fn balanced_for_block_is_released_whole() {
        let mut parser = Parser::new();
        assert_eq!(parse(&mut parser, "for i = 1:3").command, None);
        assert_eq!(parser.command_depth(), 1);
        assert_eq!(parse(&mut parser, "  x = 1").command, None);
        let parsed = parse(&mut parser, "end");
        assert_eq!(parsed.command.as_deref(), Some("for i = 1:3\n  x = 1\nend"));
        assert_eq!(parser.command_depth(), 0);
    }

    #[test]
    fn nested_blocks_share_one_counter() {
        let mut parser = Parser::new();
        parse(&mut parser, "if a > 0");
        parse(&mut parser, "  while b < 10");
        assert_eq!(parser.command_depth(), 2);
        assert_eq!(parse(&mut parser, "  end").command, None);
        assert_eq!(parser.command_depth(), 1);
        let parsed = parse(&mut parser, "end");
        assert_eq!(
            parsed.command.as_deref(),
            Some("if a > 0\n  while b < 10\n  end\nend")
        );
    }

    #[test]
    fn end_with_separator_suffix_closes() {
        for closer in ["end;", "end, disp(i)", "END"] {
            let mut parser = Parser::new();
            parse(&mut parser, "while 1");
            let parsed = parse(&mut parser, closer);
            assert!(parsed.command.is_some(), "{closer:?} should close the block");
            assert_eq!(parser.command_depth(), 0);
        }
    }

    #[test]
    fn endx_does_not_close() {
        let mut parser = Parser::new();
        parse(&mut parser, "for i = 1:3");
        assert_eq!(parse(&mut parser, "endless = 1").command, None);
        assert_eq!(parser.command_depth(), 1);
    }

    #[test]
    fn keywords_are_case_insensitive_and_need_a_space() {
        let mut parser = Parser::new();
        parse(&mut parser, "FOR i = 1:3");
        assert_eq!(parser.command_depth(), 1);
        parse(&mut parser, "end");

        // `format` starts with "for" but is not a block opener.
        let parsed = parse(&mut parser, "format compact");
        assert_eq!(parsed.command.as_deref(), Some("format compact"));
        assert_eq!(parser.command_depth(), 0);
    }

    #[test]
    fn comment_only_lines_inside_block_are_dropped() {
        let mut parser = Parser::new();
        parse(&mut parser, "for i = 1:2");
        parse(&mut parser, "% inner note");
        let parsed = parse(&mut parser, "end");
        assert_eq!(parsed.command.as_deref(), Some("for i = 1:2\nend"));
    }

    // -- internal command classification --------------------------------------

    #[test]
    fn registered_name_dispatches() {
        let mut parser = Parser::new();
        let commands = registry(&["ping"]);
        let parsed = parser.parse_line(&mut ctx(), &commands, "ping");
        assert_eq!(parsed.command, None);
        assert_eq!(parsed.output, "pong 1");
        assert!(!parsed.output_is_error);
    }

    #[test]
    fn call_syntax_reaches_dispatch_with_args() {
        let mut parser = Parser::new();
        let commands = registry(&["ping"]);
        let parsed = parser.parse_line(&mut ctx(), &commands, "ping(1, 2)");
        assert_eq!(parsed.output, "pong 3");
    }

    #[test]
    fn unregistered_name_passes_through() {
        let mut parser = Parser::new();
        let commands = registry(&["ping"]);
        let parsed = parser.parse_line(&mut ctx(), &commands, "pong");
        assert_eq!(parsed.command.as_deref(), Some("pong"));
        assert_eq!(parsed.output, "");
    }

    #[test]
    fn directive_while_buffering_is_an_error() {
        let mut parser = Parser::new();
        let commands = registry(&["ping"]);
        let mut ctx = ctx();
        parser.parse_line(&mut ctx, &commands, "if x > 0");
        let parsed = parser.parse_line(&mut ctx, &commands, "ping");
        assert!(parsed.output_is_error);
        assert_eq!(parsed.command, None);
        assert_eq!(parser.command_depth(), 1);

        // The buffer is untouched: closing the block releases only the
        // lines that were actually buffered.
        let parsed = parser.parse_line(&mut ctx, &commands, "end");
        assert_eq!(parsed.command.as_deref(), Some("if x > 0\nend"));
    }

    // -- split_input / parse_command_line / parse_var_list --------------------

    #[test]
    fn split_plain_call() {
        let (bindings, tokens) = split_input("size(x)");
        assert!(bindings.is_empty());
        assert_eq!(tokens, ["size", "x"]);
    }

    #[test]
    fn split_assignment_with_bracketed_targets() {
        let (bindings, tokens) = split_input("[rows cols] = array_size(data, 2)");
        assert_eq!(bindings, ["rows", "cols"]);
        assert_eq!(tokens, ["array_size", "data", "2"]);
    }

    #[test]
    fn split_single_target() {
        let (bindings, tokens) = split_input("n = get_num_layers()");
        assert_eq!(bindings, ["n"]);
        assert_eq!(tokens, ["get_num_layers"]);
    }

    #[test]
    fn leading_equals_is_not_an_assignment() {
        let (bindings, tokens) = split_input("= size(x)");
        assert!(bindings.is_empty());
        assert_eq!(tokens, ["= size", "x"]);
    }

    #[test]
    fn empty_parens_give_bare_name() {
        assert_eq!(parse_command_line("run()"), ["run"]);
    }

    #[test]
    fn no_parens_give_single_token() {
        assert_eq!(parse_command_line("  commands  "), ["commands"]);
    }

    #[test]
    fn args_are_trimmed() {
        assert_eq!(
            parse_command_line("f( a , b ,c )"),
            ["f", "a", "b", "c"]
        );
    }

    #[test]
    fn unclosed_paren_yields_no_tokens() {
        assert!(parse_command_line("foo(1, 2").is_empty());
    }

    #[test]
    fn paren_at_start_is_single_token() {
        assert_eq!(parse_command_line("(x)"), ["(x)"]);
    }

    #[test]
    fn last_close_paren_bounds_args() {
        assert_eq!(parse_command_line("f(g(x))"), ["f", "g(x)"]);
    }

    #[test]
    fn var_list_forms() {
        assert_eq!(parse_var_list("a"), ["a"]);
        assert_eq!(parse_var_list(" [a b c] "), ["a", "b", "c"]);
        assert_eq!(parse_var_list("[a] extra"), ["[a]", "extra"]);
        assert!(parse_var_list("  ").is_empty());
        assert!(parse_var_list("[]").is_empty());
    }
}
