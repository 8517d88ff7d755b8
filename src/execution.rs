//! Pipeline launcher (C3, §4.3).
//!
//! Forks (via `std::process::Command` + `pre_exec`, the idiomatic Rust
//! stand-in for raw fork/pipe/dup2/execvp — also the teacher's own idiom in
//! the module of the same name) a chain of processes, wires them with
//! `Stdio::piped()`, applies redirections so they override pipe wiring, and
//! installs the chain into its own process group. Registers the resulting
//! Job unconditionally (foreground or background) and, for a foreground
//! pipeline, hands off the terminal and blocks on the wait path (C5, §4.5).

use std::fs::OpenOptions;
use std::io;
use std::os::fd::IntoRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::process::{Command, ChildStdout, Stdio};

use log::{debug, warn};
use nix::unistd::{dup2, setpgid, Pid};

use crate::error::{ErrorKind, ShellError, ShellResult};
use crate::job_control::{
    reset_job_control_signals, set_terminal_foreground, wait_for_job, JobTable, SignalMaskGuard,
    TerminalGuard, TermiosGuard, WaitOutcome,
};
use crate::parse::Pipeline;

struct SpawnedPipeline {
    pgid: i32,
    pids: Vec<i32>,
    last_pid: i32,
}

/// Opens redirection targets in the child, pre-exec (§4.3 step 2b: "apply
/// redirections last so they override pipe wiring"). A failure here is
/// fatal to the child per §7 ("child exits 1") — there is no parent to
/// report back to once we're this deep in `pre_exec`, so the diagnostic
/// goes straight to stderr and the process exits immediately rather than
/// unwinding through a `Result`.
fn apply_redirections(in_path: Option<&str>, out_path: Option<&str>, append: bool) -> io::Result<()> {
    if let Some(path) = in_path {
        match OpenOptions::new().read(true).open(path) {
            Ok(file) => {
                let fd = file.into_raw_fd();
                dup2(fd, libc::STDIN_FILENO).map_err(|err| io::Error::other(err.to_string()))?;
            }
            Err(err) => {
                eprintln!("{path}: {err}");
                std::process::exit(1);
            }
        }
    }
    if let Some(path) = out_path {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).mode(0o644);
        if append {
            opts.append(true);
        } else {
            opts.truncate(true);
        }
        match opts.open(path) {
            Ok(file) => {
                let fd = file.into_raw_fd();
                dup2(fd, libc::STDOUT_FILENO).map_err(|err| io::Error::other(err.to_string()))?;
            }
            Err(err) => {
                eprintln!("{path}: {err}");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn spawn_pipeline(pipeline: &Pipeline, foreground: bool) -> ShellResult<SpawnedPipeline> {
    let n = pipeline.commands.len();
    let mut prev_stdout: Option<ChildStdout> = None;
    let mut pgid: Option<i32> = None;
    let mut pids = Vec::with_capacity(n);
    let mut last_pid = 0;

    for (idx, cmd) in pipeline.commands.iter().enumerate() {
        let mut command = Command::new(&cmd.args[0]);
        command.args(&cmd.args[1..]);

        if let Some(stdout) = prev_stdout.take() {
            command.stdin(Stdio::from(stdout));
        }
        if idx + 1 < n {
            command.stdout(Stdio::piped());
        }

        let target_pgid = pgid.unwrap_or(0);
        let in_path = cmd.in_path.clone();
        let out_path = cmd.out_path.clone();
        let append = cmd.append_out;
        let is_leader = pgid.is_none();
        unsafe {
            command.pre_exec(move || {
                reset_job_control_signals()?;
                setpgid(Pid::from_raw(0), Pid::from_raw(target_pgid))
                    .map_err(|err| io::Error::other(err.to_string()))?;
                if foreground && is_leader {
                    let _ = set_terminal_foreground(std::process::id() as i32);
                }
                apply_redirections(in_path.as_deref(), out_path.as_deref(), append)
            });
        }

        let mut child = command.spawn().map_err(|err| wrap_spawn_error(&cmd.args[0], err))?;
        let pid = child.id() as i32;
        if pgid.is_none() {
            pgid = Some(pid);
        }
        // Parent closes its half of the terminal-handoff race (§9).
        let _ = setpgid(Pid::from_raw(pid), Pid::from_raw(pgid.unwrap()));
        debug!(
            "job event=spawn idx={idx} pid={pid} pgid={}",
            pgid.unwrap()
        );
        pids.push(pid);
        last_pid = pid;
        prev_stdout = child.stdout.take();
    }

    Ok(SpawnedPipeline {
        pgid: pgid.unwrap_or(0),
        pids,
        last_pid,
    })
}

fn wrap_spawn_error(cmd: &str, err: io::Error) -> ShellError {
    let kind = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorKind::Exec,
        _ => ErrorKind::Launch,
    };
    let message = match err.kind() {
        io::ErrorKind::NotFound => format!("{cmd}: command not found"),
        io::ErrorKind::PermissionDenied => format!("{cmd}: permission denied"),
        _ => format!("{cmd}: {err}"),
    };
    ShellError::new(kind, message)
}

/// Launches `pipeline`, registers its Job, and — for a foreground pipeline
/// with an interactive shell — hands off the terminal and blocks until the
/// group yields it back. Returns the exit status to feed the prompt's
/// `last_status`, printing its own diagnostics per §7's error table.
pub fn launch(pipeline: &Pipeline, display: &str, table: &JobTable, shell_pgid: i32, interactive: bool) -> i32 {
    let foreground = !pipeline.background;
    let spawned = match spawn_pipeline(pipeline, foreground && interactive) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{err}");
            return err.kind.default_exit_code();
        }
    };

    let job_id = table.add(
        spawned.pgid,
        pipeline.display(),
        pipeline.background,
        spawned.pids.clone(),
    );

    if pipeline.background {
        println!("[{job_id}] {} {display} &", spawned.pgid);
        return 0;
    }

    // Block SIGCHLD for the duration of the synchronous wait so the async
    // reaper (signals.rs) can't steal the exit status out from under the
    // blocking waitpid below — see DESIGN.md.
    let handoff_guard = match SignalMaskGuard::new() {
        Ok(guard) => Some(guard),
        Err(err) => {
            warn!("signal event=mask-block error={err}");
            None
        }
    };
    let _termios_guard = TermiosGuard::new();
    let mut tty_guard = TerminalGuard::new(shell_pgid);
    if interactive {
        if let Err(err) = tty_guard.set_foreground(spawned.pgid) {
            warn!("tty event=handoff error={err}");
        }
    }

    let count = spawned.pids.len();
    let result = wait_for_job(table, job_id, spawned.pgid, count, spawned.last_pid);
    drop(handoff_guard);

    match result {
        Ok(r) => match r.outcome {
            WaitOutcome::Stopped => {
                println!("[{job_id}] Stopped {display}");
                128 + libc::SIGTSTP
            }
            WaitOutcome::Exited => r.status_code.unwrap_or(0),
        },
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Command as ParsedCommand;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn input_redirection_reads_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "hello").unwrap();

        let pipeline = Pipeline {
            commands: vec![ParsedCommand {
                args: vec!["cat".into()],
                in_path: Some(input.display().to_string()),
                out_path: Some(output.display().to_string()),
                append_out: false,
            }],
            background: false,
        };
        let table = JobTable::new();
        let status = launch(&pipeline, "cat < in.txt > out.txt", &table, 0, false);
        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "hello");
    }

    #[test]
    fn exec_failure_reports_127() {
        let pipeline = Pipeline {
            commands: vec![ParsedCommand {
                args: vec!["nonexistent_cmd_xyz".into()],
                in_path: None,
                out_path: None,
                append_out: false,
            }],
            background: false,
        };
        let table = JobTable::new();
        let status = launch(&pipeline, "nonexistent_cmd_xyz", &table, 0, false);
        assert_eq!(status, 127);
    }
}
