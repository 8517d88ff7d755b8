//! CLI entry point (§6 "CLI", §6.1 "CLI argv and help text"). Wires
//! together session/signal setup (C5), the shared job table and prompt
//! hint, the monitor thread (C6), and the read-eval loop (§2), then
//! dispatches to interactive mode, script mode, or `-h`/`--help`.

mod builtins;
mod error;
mod execution;
mod home;
mod job_control;
mod line_source;
mod log_sink;
mod monitor;
mod parse;
mod prompt;
mod repl;
mod signals;
mod workers;

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use nix::unistd::isatty;

use repl::{run_once, run_script, ShellState};
use signals::{init_session, install_signal_handlers};

const USAGE: &str = "\
myshell [script]

With no argument, runs interactively against the controlling terminal.
With one argument, treats it as a script path: lines are trimmed and
executed in sequence, skipping blank lines and '#' comments.

On startup, $HOME/.myshellrc is read with the same rules, if present.";

fn main() {
    init_logging();

    let mut script_path: Option<String> = None;
    for arg in env::args().skip(1) {
        if arg == "-h" || arg == "--help" {
            println!("{USAGE}");
            return;
        }
        script_path = Some(arg);
        break;
    }

    let interactive = script_path.is_none() && isatty(libc::STDIN_FILENO).unwrap_or(false);

    if let Err(err) = install_signal_handlers() {
        eprintln!("myshell: {err}");
        std::process::exit(1);
    }
    let shell_pgid = match init_session(interactive) {
        Ok(pgid) => pgid,
        Err(err) => {
            eprintln!("myshell: {err}");
            std::process::exit(1);
        }
    };
    let mut state = match ShellState::new(interactive, shell_pgid) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("myshell: {err}");
            std::process::exit(1);
        }
    };

    let _monitor = monitor::spawn(Arc::clone(state.jobs()), Arc::clone(state.prompt_hint()));

    run_startup_script(&mut state);

    let exit_code = match script_path {
        Some(path) => run_script_mode(&mut state, &path),
        None => run_interactive(&mut state),
    };
    std::process::exit(exit_code);
}

/// `$HOME/.myshellrc`, read with the same line rules as script mode.
/// Absence is not an error (§6).
fn run_startup_script(state: &mut ShellState) {
    let rc_path = home::home_dir().join(".myshellrc");
    if let Ok(file) = File::open(&rc_path) {
        if let Err(err) = run_script(state, BufReader::new(file)) {
            eprintln!("myshell: error reading {}: {err}", rc_path.display());
        }
    }
}

fn run_script_mode(state: &mut ShellState, path: &str) -> i32 {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("myshell: cannot open script: {path}: {err}");
            return 1;
        }
    };
    if let Err(err) = run_script(state, BufReader::new(file)) {
        eprintln!("myshell: error reading {path}: {err}");
        return 1;
    }
    0
}

fn run_interactive(state: &mut ShellState) -> i32 {
    loop {
        match run_once(state) {
            Ok(true) => continue,
            Ok(false) => {
                let _ = state.line_source.save();
                return 0;
            }
            Err(err) => {
                eprintln!("myshell: {err}");
            }
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::default().filter_or("MYSHELL_LOG", "info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
