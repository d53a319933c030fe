use std::io::{BufRead, Write};

use matshell::cli::{self, ConfigFile};
use matshell::command::to_engine_string;
use matshell::config::{self, Settings};
use matshell::engine::MockEngine;
use matshell::session::Session;

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("matshell: {e}");
            eprintln!("Usage: matshell [-f[<file>]] [-c<cmd>] [-q] [<script>]");
            std::process::exit(1);
        }
    };

    if !args.quiet {
        let ver = env!("CARGO_PKG_VERSION");
        println!("matshell {ver}");
    }

    // ── Load settings ─────────────────────────────────────────────────────────
    let settings = match args.config {
        ConfigFile::Skip => Settings::default(),
        ConfigFile::Explicit(path) => match Settings::load_file(&path) {
            Ok((settings, errors)) => {
                for e in &errors {
                    eprintln!("matshell: warning: {}: {e}", path.display());
                }
                settings
            }
            Err(e) => {
                eprintln!("matshell: {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        ConfigFile::Search => match config::find_user_config() {
            Some(path) => match Settings::load_file(&path) {
                Ok((settings, errors)) => {
                    for e in &errors {
                        eprintln!("matshell: warning: {}: {e}", path.display());
                    }
                    settings
                }
                Err(e) => {
                    eprintln!("matshell: warning: {}: {e}", path.display());
                    Settings::default()
                }
            },
            None => Settings::default(),
        },
    };

    // The binary drives the front-end against the built-in mock engine so the
    // parser and command catalog can be exercised offline. Embedders bind a
    // live engine through the `Engine` trait instead.
    let mut session = Session::new(Box::new(MockEngine::new()), settings);
    session.on_output(|text| {
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    });
    session.on_error(|text| {
        eprint!("{text}");
        if !text.ends_with('\n') {
            eprintln!();
        }
    });

    if !session.start() {
        eprintln!("matshell: {}", session.startup_message());
        std::process::exit(1);
    }
    if !args.quiet && !session.startup_message().is_empty() {
        println!("{}", session.startup_message());
    }

    // ── One-shot command (-c<cmd>) ────────────────────────────────────────────
    if let Some(command) = args.command {
        let ok = session.execute_command(&command);
        std::process::exit(if ok { 0 } else { 1 });
    }

    // ── Script file ───────────────────────────────────────────────────────────
    if let Some(script) = args.script {
        let command = format!("run({})", to_engine_string(&script.display().to_string()));
        let ok = session.execute_command(&command);
        std::process::exit(if ok { 0 } else { 1 });
    }

    // ── Interactive shell ─────────────────────────────────────────────────────
    if !session.settings().interactive_available {
        eprintln!("matshell: interactive input is disabled by the current settings.");
        std::process::exit(1);
    }

    let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) != 0 };
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        if interactive {
            print!("{}", session.prompt());
            let _ = std::io::stdout().flush();
        }

        let Some(Ok(line)) = lines.next() else {
            break;
        };

        // Session shutdown is handled here; the mock engine has no process
        // of its own to stop.
        let trimmed = line.trim();
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }

        session.execute_command(&line);
    }
}
