//! Interpreter settings and the config file parser.
//!
//! Recognised keys (one `name = value` pair per line):
//!
//! | Key | Type | Default | Meaning |
//! |-----|------|---------|---------|
//! | `output_buffer_size` | integer | `16384` | capture buffer capacity in bytes; `0` disables capture |
//! | `check_errors` | bool | `false` | query the engine's diagnostic state after each command |
//! | `clear_errors` | bool | `false` | reset the diagnostic state after each successful command |
//! | `interactive_available` | bool | `true` | allow typed commands in the interactive shell |
//!
//! Lines starting with `%` are comments. Unknown keys are silently skipped so
//! a shared config file can carry settings for other tools.

use std::path::{Path, PathBuf};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Recognised interpreter settings.
///
/// The output channel re-reads `output_buffer_size` before every command, so
/// changing it between commands takes effect without restarting the session.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Capture buffer capacity in bytes. `0` disables buffered capture.
    pub output_buffer_size: usize,
    /// Run a diagnostic query after each successful command to surface
    /// logical script errors that the evaluation status code does not report.
    pub check_errors: bool,
    /// Reset the engine's diagnostic state after each successful command.
    pub clear_errors: bool,
    /// Whether typed commands are accepted in the interactive shell.
    pub interactive_available: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_buffer_size: 16384,
            check_errors: false,
            clear_errors: false,
            interactive_available: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string. Returns the settings and any per-line errors on
    /// recognised keys; parsing never fails as a whole.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut settings = Settings::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('%') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected `name = value`, got \"{line}\""),
                });
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            let result = match key.as_str() {
                "output_buffer_size" => value
                    .parse::<usize>()
                    .map(|n| settings.output_buffer_size = n)
                    .map_err(|_| format!("invalid buffer size \"{value}\"")),
                "check_errors" => parse_bool(value).map(|b| settings.check_errors = b),
                "clear_errors" => parse_bool(value).map(|b| settings.clear_errors = b),
                "interactive_available" => {
                    parse_bool(value).map(|b| settings.interactive_available = b)
                }
                _ => Ok(()), // silently skip unknown keys
            };

            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (settings, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// The display string of a setting by key, for the
    /// `get_configuration_setting` internal command. `None` for unknown keys.
    pub fn display(&self, key: &str) -> Option<String> {
        match key.to_ascii_lowercase().as_str() {
            "output_buffer_size" => Some(self.output_buffer_size.to_string()),
            "check_errors" => Some(self.check_errors.to_string()),
            "clear_errors" => Some(self.clear_errors.to_string()),
            "interactive_available" => Some(self.interactive_available.to_string()),
            _ => None,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(format!("invalid boolean \"{value}\"")),
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_default();
    [format!("{home}/.matshellrc"), "./.matshellrc".to_owned()]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
