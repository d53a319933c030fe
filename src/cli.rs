//! Command-line argument parsing.
//!
//! Usage:
//!   matshell [-f[<file>]] [-c<cmd>] [-q] [<script>]

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Command to execute instead of entering the shell (`-c<cmd>`).
    pub command: Option<String>,
    /// Quiet startup: no banner (`-q`).
    pub quiet: bool,
    /// A script file to run before entering the shell.
    pub script: Option<PathBuf>,
}

/// How to choose the config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search `~/.matshellrc`, `./.matshellrc` in order (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'q' => args.quiet = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        // Embedded: -f<file>
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len(); // consumed rest of this arg
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        // Separate: -f <file>
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        // -f alone → skip user config
                        args.config = ConfigFile::Skip;
                    }
                }

                // -c<cmd>
                'c' => {
                    let cmd = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a command argument".to_owned());
                    };
                    args.command = Some(cmd);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => args.script = Some(PathBuf::from(positional.remove(0))),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn no_args() {
        let args = parse_argv(&argv(&[])).unwrap();
        assert!(matches!(args.config, ConfigFile::Search));
        assert!(args.command.is_none());
        assert!(args.script.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn script_positional() {
        let args = parse_argv(&argv(&["analysis.m"])).unwrap();
        assert_eq!(args.script.as_deref(), Some(std::path::Path::new("analysis.m")));
    }

    #[test]
    fn command_embedded_and_separate() {
        let args = parse_argv(&argv(&["-cx = 1"])).unwrap();
        assert_eq!(args.command.as_deref(), Some("x = 1"));
        let args = parse_argv(&argv(&["-c", "x = 1"])).unwrap();
        assert_eq!(args.command.as_deref(), Some("x = 1"));
    }

    #[test]
    fn config_forms() {
        let args = parse_argv(&argv(&["-f"])).unwrap();
        assert!(matches!(args.config, ConfigFile::Skip));
        let args = parse_argv(&argv(&["-fmy.rc"])).unwrap();
        assert!(matches!(args.config, ConfigFile::Explicit(p) if p.to_str() == Some("my.rc")));
        let args = parse_argv(&argv(&["-f", "my.rc"])).unwrap();
        assert!(matches!(args.config, ConfigFile::Explicit(p) if p.to_str() == Some("my.rc")));
    }

    #[test]
    fn combined_flags() {
        let args = parse_argv(&argv(&["-qf"])).unwrap();
        assert!(args.quiet);
        assert!(matches!(args.config, ConfigFile::Skip));
    }

    #[test]
    fn double_dash_ends_flags() {
        let args = parse_argv(&argv(&["--", "-weird.m"])).unwrap();
        assert_eq!(args.script.as_deref(), Some(std::path::Path::new("-weird.m")));
    }

    #[test]
    fn unknown_flag_is_error() {
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }

    #[test]
    fn too_many_positionals_is_error() {
        assert!(parse_argv(&argv(&["a.m", "b.m"])).is_err());
    }

    #[test]
    fn missing_command_argument_is_error() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
    }
}
