//! `fg`, `bg`, and `kill` (§4.2, §4.2.1) — the three builtins that act on
//! an existing [`Job`](crate::job_control::Job) rather than launching a new
//! one. Grounded on `examples/original_source/myshell/src/shell.cpp:
//! builtin_fg/builtin_bg/builtin_kill`.

use crate::job_control::{
    continue_group, set_terminal_foreground, terminate_group, wait_for_job, JobTable, TermiosGuard,
    WaitOutcome,
};
use crate::repl::ShellState;

/// Parses the `%<id>` / bare-decimal grammar shared by `fg`, `bg`, and the
/// job-id half of `kill` (§4.2.1). Returns `None` for a missing or
/// unparseable argument — the "missing argument" diagnostic (§7).
fn parse_job_arg(arg: Option<&String>) -> Option<usize> {
    let arg = arg?;
    let digits = arg.strip_prefix('%').unwrap_or(arg);
    digits.parse::<usize>().ok()
}

pub(crate) fn handle_fg(state: &mut ShellState, args: &[String]) {
    let Some(id) = parse_job_arg(args.get(1)) else {
        eprintln!("fg: usage: fg %jobid");
        state.last_status = 1;
        return;
    };
    let Some(job) = state.jobs.find_by_id(id) else {
        eprintln!("fg: no such job");
        state.last_status = 1;
        return;
    };

    let _termios_guard = TermiosGuard::new();
    if state.interactive {
        if let Err(err) = set_terminal_foreground(job.pgid) {
            eprintln!("fg: {err}");
        }
    }
    if matches!(job.status, crate::job_control::JobStatus::Stopped) {
        if let Err(err) = continue_group(job.pgid) {
            eprintln!("fg: {err}");
            state.last_status = 1;
            return;
        }
        state.jobs.mark_running(id);
    }

    let count = job.pids.len();
    let last_pid = *job.pids.last().unwrap_or(&job.pgid);
    match wait_for_job(&state.jobs, id, job.pgid, count, last_pid) {
        Ok(result) => {
            if state.interactive {
                if let Err(err) = set_terminal_foreground(state.shell_pgid) {
                    eprintln!("fg: {err}");
                }
            }
            state.last_status = match result.outcome {
                WaitOutcome::Stopped => {
                    println!("[{id}] Stopped {}", job.command);
                    128 + libc::SIGTSTP
                }
                WaitOutcome::Exited => result.status_code.unwrap_or(0),
            };
        }
        Err(err) => {
            eprintln!("fg: {err}");
            state.last_status = 1;
        }
    }
}

pub(crate) fn handle_bg(state: &mut ShellState, args: &[String]) {
    let Some(id) = parse_job_arg(args.get(1)) else {
        eprintln!("bg: usage: bg %jobid");
        state.last_status = 1;
        return;
    };
    let Some(job) = state.jobs.find_by_id(id) else {
        eprintln!("bg: no such job");
        state.last_status = 1;
        return;
    };
    if !matches!(job.status, crate::job_control::JobStatus::Running) {
        if let Err(err) = continue_group(job.pgid) {
            eprintln!("bg: {err}");
            state.last_status = 1;
            return;
        }
        state.jobs.mark_running(id);
    }
    state.jobs.mark_background(id, true);
    println!("[{id}] {} &", job.command);
    state.last_status = 0;
}

pub(crate) fn handle_kill(table: &JobTable, args: &[String]) -> i32 {
    let Some(arg) = args.get(1) else {
        eprintln!("kill: usage: kill %jobid|pgid");
        return 1;
    };
    let pgid = if let Some(rest) = arg.strip_prefix('%') {
        let Ok(id) = rest.parse::<usize>() else {
            eprintln!("kill: usage: kill %jobid|pgid");
            return 1;
        };
        let Some(job) = table.find_by_id(id) else {
            eprintln!("kill: no such job");
            return 1;
        };
        job.pgid
    } else {
        match arg.parse::<i32>() {
            Ok(pgid) => pgid,
            Err(_) => {
                eprintln!("kill: usage: kill %jobid|pgid");
                return 1;
            }
        }
    };
    if let Err(err) = terminate_group(pgid) {
        eprintln!("kill: {err}");
        return 1;
    }
    0
}
