//! Built-in dispatcher (C2, §4.2). Built-ins run in the shell process and
//! are recognized by an exact match against the closed set named in the
//! spec; a single-command Pipeline whose first argument is a builtin
//! bypasses the launcher (C3) entirely. Grounded on
//! `examples/original_source/myshell/src/shell.cpp: run_builtin` and its
//! `builtin_*` family.

mod job_cmds;

use crate::home::home_dir;
use crate::job_control::JobStatus;
use crate::repl::ShellState;

const BUILTIN_NAMES: &[&str] = &["cd", "pwd", "exit", "jobs", "fg", "bg", "kill", "history"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Dispatches a recognized builtin. `args[0]` is the builtin's own name.
/// Updates `state.last_status` per §7's error table; never itself returns
/// an error that would need the read-eval loop to print anything — each
/// builtin prints its own diagnostic.
pub fn execute_builtin(state: &mut ShellState, args: &[String]) {
    match args[0].as_str() {
        "cd" => builtin_cd(state, args),
        "pwd" => builtin_pwd(state),
        "exit" => builtin_exit(state),
        "jobs" => builtin_jobs(state),
        "fg" => job_cmds::handle_fg(state, args),
        "bg" => job_cmds::handle_bg(state, args),
        "kill" => state.last_status = job_cmds::handle_kill(&state.jobs, args),
        "history" => builtin_history(state),
        other => unreachable!("execute_builtin dispatched on non-builtin {other:?}"),
    }
}

/// cd [path] — absent argument means the home directory (§4.2). Failure is
/// non-fatal: a diagnostic to stderr, but `last_status` stays 0 per §7
/// ("cd failure ... returns 0").
fn builtin_cd(state: &mut ShellState, args: &[String]) {
    let target = args.get(1).cloned().unwrap_or_else(|| home_dir().display().to_string());
    if let Err(err) = std::env::set_current_dir(&target) {
        eprintln!("cd: {target}: {err}");
    }
    state.last_status = 0;
}

fn builtin_pwd(state: &mut ShellState) {
    match std::env::current_dir() {
        Ok(cwd) => println!("{}", cwd.display()),
        Err(err) => eprintln!("pwd: {err}"),
    }
    state.last_status = 0;
}

/// exit — a courtesy message, then terminate. Per §4.2 the destructor path
/// must still persist history: `std::process::exit` runs no destructors,
/// so the save is explicit here rather than left to `Drop`.
fn builtin_exit(state: &mut ShellState) {
    println!("Bye!");
    let _ = state.line_source.save();
    std::process::exit(state.last_status);
}

/// jobs — one line per Job under the job table's lock (§4.2):
/// `[id] pgid status command [&]`.
fn builtin_jobs(state: &mut ShellState) {
    for job in state.jobs.list() {
        let status = match job.status {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        };
        let suffix = if job.background { " &" } else { "" };
        println!("[{}] {} {} {}{}", job.id, job.pgid, status, job.command, suffix);
    }
    state.last_status = 0;
}

/// history — ask the line-source collaborator to enumerate its remembered
/// lines (§4.2), one per line, 1-indexed, matching the original's
/// `History::print`.
fn builtin_history(state: &mut ShellState) {
    for (idx, line) in state.line_source.enumerate().iter().enumerate() {
        println!("{}  {line}", idx + 1);
    }
    state.last_status = 0;
}
