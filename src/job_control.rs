//! Job table (C4) and the terminal/signal wait path (C5, §4.5).
//!
//! Grounded on the teacher's `job_control.rs` for the RAII terminal/signal
//! guards and the waitpid-loop shape, and on
//! `examples/original_source/myshell/include/shell.hpp` /
//! `src/shell.cpp` for the Job/JobStatus layout, the dual-index job table,
//! and the background-counter transition semantics (§4.5.1).

use std::collections::HashMap;
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use log::{debug, warn};
use nix::sys::signal::{
    kill, sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, Signal, SigmaskHow,
};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{setpgid, tcsetpgrp, Pid};

/// Installed in each child's `pre_exec`: reset signal dispositions the shell
/// ignores back to default, then join the pipeline's process group. Both the
/// parent and the child set the child's group (§4.3, §9 "Terminal handoff
/// race") — this half closes the child's side of that race.
pub fn set_process_group(command: &mut Command, pgid: i32) {
    unsafe {
        command.pre_exec(move || {
            reset_job_control_signals()?;
            setpgid(Pid::from_raw(0), Pid::from_raw(pgid))
                .map_err(|err| io::Error::other(err.to_string()))
        });
    }
}

pub(crate) fn reset_job_control_signals() -> io::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for &sig in &[
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGQUIT,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ] {
        unsafe { sigaction(sig, &action) }.map_err(|err| io::Error::other(err.to_string()))?;
    }
    Ok(())
}

pub fn set_terminal_foreground(pgid: i32) -> io::Result<()> {
    let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
    match tcsetpgrp(fd, Pid::from_raw(pgid)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ENOTTY) => Ok(()),
        Err(err) => Err(io::Error::other(err.to_string())),
    }
}

/// Blocks SIGINT/SIGCHLD for the brief window between deciding on a new
/// foreground group and actually handing the terminal to it, so a signal
/// can't arrive mid-handoff and confuse the wait path.
pub struct SignalMaskGuard {
    old: SigSet,
}

impl SignalMaskGuard {
    pub fn new() -> io::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        set.add(Signal::SIGCHLD);
        let mut old = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old))
            .map_err(|err| io::Error::other(err.to_string()))?;
        Ok(Self { old })
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        if let Err(err) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.old), None) {
            warn!("signal event=restore-mask error={err}");
        }
    }
}

pub struct TermiosGuard {
    saved: Option<Termios>,
}

impl TermiosGuard {
    pub fn new() -> Self {
        Self {
            saved: tcgetattr(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }).ok(),
        }
    }
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        if let Some(ref termios) = self.saved {
            let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
            if let Err(err) = tcsetattr(fd, SetArg::TCSANOW, termios) {
                warn!("termios event=restore error={err}");
            }
        }
    }
}

/// Restores the terminal to the shell's process group on drop, if and only
/// if it was ever handed away (§4.5 "restore... if and only if interactive").
pub struct TerminalGuard {
    shell_pgid: i32,
    active: bool,
}

impl TerminalGuard {
    pub fn new(shell_pgid: i32) -> Self {
        Self {
            shell_pgid,
            active: false,
        }
    }

    pub fn set_foreground(&mut self, pgid: i32) -> io::Result<()> {
        set_terminal_foreground(pgid)?;
        self.active = true;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = set_terminal_foreground(self.shell_pgid) {
                warn!("tty event=restore error={err}");
            }
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

#[derive(Clone, Debug)]
pub struct Job {
    pub id: usize,
    pub pgid: i32,
    pub command: String,
    pub status: JobStatus,
    pub background: bool,
    pub pids: Vec<i32>,
}

struct Inner {
    jobs: HashMap<usize, Job>,
    pgid_index: HashMap<i32, usize>,
    next_id: usize,
}

/// The job table (C4): a mapping from id to Job plus a secondary pgid
/// index, behind one mutex. `background_counter` is a separate atomic
/// (§5 "unordered with respect to Job table changes, only used for
/// display").
pub struct JobTable {
    inner: Mutex<Inner>,
    background_counter: AtomicI32,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                pgid_index: HashMap::new(),
                next_id: 1,
            }),
            background_counter: AtomicI32::new(0),
        }
    }

    pub fn add(&self, pgid: i32, command: String, background: bool, pids: Vec<i32>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.jobs.insert(
            id,
            Job {
                id,
                pgid,
                command,
                status: JobStatus::Running,
                background,
                pids,
            },
        );
        inner.pgid_index.insert(pgid, id);
        drop(inner);
        // §4.5.1 / shell.cpp:363 "active_bg_jobs.fetch_add(1)": a job
        // registered directly into the background counts immediately, the
        // same way `on_stop` counts a job that becomes background-ish later.
        if background {
            self.background_counter.fetch_add(1, Ordering::SeqCst);
        }
        debug!("job event=add id={id} pgid={pgid} background={background}");
        id
    }

    pub fn find_by_id(&self, id: usize) -> Option<Job> {
        self.inner.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn find_by_pgid(&self, pgid: i32) -> Option<Job> {
        let inner = self.inner.lock().unwrap();
        let id = *inner.pgid_index.get(&pgid)?;
        inner.jobs.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// §4.5: on Stop, mark the job Stopped, clear its background flag, and
    /// increment the background counter — it remains "outstanding" for the
    /// prompt hint even though it is no longer formally a background job.
    pub fn on_stop(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.status = JobStatus::Stopped;
            job.background = false;
        }
        drop(inner);
        self.background_counter.fetch_add(1, Ordering::SeqCst);
        debug!("job event=stop id={id}");
    }

    /// §4.5/§4.5.1: on exit or termination, mark Done; decrement the
    /// background counter only if the job's background flag is *still* true
    /// at this instant — a job that was stopped and resumed to completion
    /// already had its flag cleared by `on_stop` and does not decrement
    /// again. This reproduces the original's eventually-consistent hint
    /// rather than correcting it.
    pub fn on_done(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        let was_background = inner
            .jobs
            .get_mut(&id)
            .map(|job| {
                job.status = JobStatus::Done;
                job.background
            })
            .unwrap_or(false);
        drop(inner);
        if was_background {
            self.background_counter.fetch_sub(1, Ordering::SeqCst);
        }
        debug!("job event=done id={id} was_background={was_background}");
    }

    pub fn mark_running(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.status = JobStatus::Running;
        }
    }

    pub fn mark_background(&self, id: usize, background: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.background = background;
        }
    }

    pub fn remove(&self, id: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.remove(&id) {
            inner.pgid_index.remove(&job.pgid);
        }
    }

    /// C4's `mark_done_if_no_pids_alive`: the liveness-probe sweep driven by
    /// the monitor (§4.6), never by the SIGCHLD handler. For each job not
    /// already Done, zero-signal-probe each of its pids; if none answer,
    /// transition to Done (applying the same background-counter rule as
    /// `on_done`) and erase it from both indices. Returns the ids removed.
    pub fn mark_done_if_no_pids_alive(&self) -> Vec<usize> {
        let candidates: Vec<(usize, Vec<i32>, bool)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .jobs
                .values()
                .filter(|job| job.status != JobStatus::Done)
                .map(|job| (job.id, job.pids.clone(), job.background))
                .collect()
        };

        let mut removed = Vec::new();
        for (id, pids, _background) in candidates {
            let any_alive = pids.iter().any(|&pid| process_alive(pid));
            if !any_alive {
                self.on_done(id);
                let mut inner = self.inner.lock().unwrap();
                if let Some(job) = inner.jobs.remove(&id) {
                    inner.pgid_index.remove(&job.pgid);
                }
                removed.push(id);
            }
        }
        removed
    }

    /// `max(0, background_counter)` (§4.6 point 2).
    pub fn background_count(&self) -> i32 {
        self.background_counter.load(Ordering::SeqCst).max(0)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

pub fn continue_group(pgid: i32) -> io::Result<()> {
    debug!("job event=cont pgid={pgid}");
    kill(Pid::from_raw(-pgid), Signal::SIGCONT).map_err(|err| io::Error::other(err.to_string()))
}

pub fn terminate_group(pgid: i32) -> io::Result<()> {
    debug!("job event=kill pgid={pgid}");
    kill(Pid::from_raw(-pgid), Signal::SIGTERM).map_err(|err| io::Error::other(err.to_string()))
}

pub enum WaitOutcome {
    Exited,
    Stopped,
}

pub struct WaitResult {
    pub outcome: WaitOutcome,
    pub status_code: Option<i32>,
}

/// The raw group wait: loops on `waitpid(-pgid, WUNTRACED)` reaping exits
/// and signals until every member of the pipeline has been accounted for,
/// or until the whole group stops (which ends the wait immediately, leaving
/// the rest of the group stopped too). Grounded on the teacher's
/// `wait_for_process_group`, simplified to drop the teacher's pipefail
/// bookkeeping (not part of this spec's data model).
fn wait_for_group(pgid: i32, expected_count: usize, last_pid: i32) -> io::Result<WaitResult> {
    debug!("job event=wait pgid={pgid} expected_count={expected_count} last_pid={last_pid}");
    let mut exited = 0usize;
    let mut status_code = None;
    loop {
        match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                if pid.as_raw() == last_pid {
                    status_code = Some(code);
                }
                exited += 1;
                if expected_count > 0 && exited >= expected_count {
                    break;
                }
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                if pid.as_raw() == last_pid {
                    status_code = Some(128 + sig as i32);
                }
                exited += 1;
                if expected_count > 0 && exited >= expected_count {
                    break;
                }
            }
            Ok(WaitStatus::Stopped(_, _)) => {
                return Ok(WaitResult {
                    outcome: WaitOutcome::Stopped,
                    status_code: None,
                });
            }
            Ok(WaitStatus::PtraceEvent(_, _, _)) | Ok(WaitStatus::PtraceSyscall(_)) => continue,
            Ok(WaitStatus::StillAlive) | Ok(WaitStatus::Continued(_)) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => break,
            Err(err) => return Err(io::Error::other(err.to_string())),
        }
    }
    Ok(WaitResult {
        outcome: WaitOutcome::Exited,
        status_code: Some(status_code.unwrap_or(0)),
    })
}

/// §4.5 `wait_for_job`: wait on the group, then apply the Job-table
/// transition (Stop increments the prompt hint, Exit/Signal decrements it
/// conditionally) before returning the raw result to the caller.
pub fn wait_for_job(
    table: &JobTable,
    id: usize,
    pgid: i32,
    expected_count: usize,
    last_pid: i32,
) -> io::Result<WaitResult> {
    let result = wait_for_group(pgid, expected_count, last_pid)?;
    match result.outcome {
        WaitOutcome::Stopped => table.on_stop(id),
        WaitOutcome::Exited => table.on_done(id),
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_in_own_pgid(command: &str, args: &[&str]) -> io::Result<i32> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        set_process_group(&mut cmd, 0);
        let child = cmd.spawn()?;
        Ok(child.id() as i32)
    }

    fn reap_pgid(pgid: i32) {
        loop {
            match waitpid(Pid::from_raw(-pgid), None) {
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                _ => break,
            }
        }
    }

    #[test]
    fn wait_for_group_reports_exit_code() {
        let pid = spawn_in_own_pgid("sh", &["-c", "exit 3"]).unwrap();
        let result = wait_for_group(pid, 1, pid).unwrap();
        assert!(matches!(result.outcome, WaitOutcome::Exited));
        assert_eq!(result.status_code, Some(3));
    }

    #[test]
    fn wait_for_group_detects_stop() {
        let pid = spawn_in_own_pgid("sh", &["-c", "kill -STOP $$; sleep 1"]).unwrap();
        let result = wait_for_group(pid, 1, pid).unwrap();
        assert!(matches!(result.outcome, WaitOutcome::Stopped));
        continue_group(pid).unwrap();
        let _ = kill(Pid::from_raw(-pid), Signal::SIGTERM);
        reap_pgid(pid);
    }

    #[test]
    fn job_table_ids_are_fresh_and_indices_agree() {
        let table = JobTable::new();
        let id1 = table.add(100, "a".into(), false, vec![100]);
        let id2 = table.add(101, "b".into(), true, vec![101]);
        assert!(id2 > id1);
        assert_eq!(table.find_by_pgid(100).unwrap().id, id1);
        assert_eq!(table.find_by_pgid(101).unwrap().id, id2);
    }

    #[test]
    fn stop_then_resume_then_exit_never_decrements() {
        // The quirk in §4.5.1: a foreground job stopped once (counter += 1,
        // background flag set true) whose background flag is cleared by
        // the stop, then later exits, does not decrement the counter again
        // because its background flag is no longer true at that point.
        let table = JobTable::new();
        let id = table.add(200, "sleep 5".into(), false, vec![200]);
        table.on_stop(id);
        assert_eq!(table.background_count(), 1);
        table.mark_running(id);
        table.on_done(id);
        assert_eq!(table.background_count(), 1);
    }

    #[test]
    fn background_job_exit_decrements_counter() {
        let table = JobTable::new();
        let id = table.add(300, "sleep 5".into(), true, vec![300]);
        table.on_done(id);
        assert_eq!(table.background_count(), 0);
    }

    #[test]
    fn mark_done_if_no_pids_alive_sweeps_dead_jobs() {
        let pid = spawn_in_own_pgid("sh", &["-c", "exit 0"]).unwrap();
        reap_pgid(pid);
        let table = JobTable::new();
        let id = table.add(pid, "sh -c exit 0".into(), true, vec![pid]);
        let removed = table.mark_done_if_no_pids_alive();
        assert_eq!(removed, vec![id]);
        assert!(table.find_by_id(id).is_none());
        assert_eq!(table.background_count(), 0);
    }
}
