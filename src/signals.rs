//! Terminal/signal controller (C5): shell-level signal discipline and
//! session/terminal acquisition at startup (§4.5).
//!
//! Adapted from the teacher's `signals.rs` for the ignore-set installation
//! and session setup, and from
//! `examples/original_source/myshell/src/shell.cpp: init_shell()` for the
//! SIGTTIN acquisition loop, which the teacher does not have.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{getpgrp, getpid, getsid, setpgid, setsid, tcgetpgrp, tcsetpgrp, Pid};

/// Non-blocking reap only. Async-signal-safe: no allocation, no logging, no
/// lock acquisition (§4.6, §5 "Signal-safety"). State reconciliation for
/// stopped/continued/exited jobs is entirely the monitor's job (`monitor.rs`).
extern "C" fn reap_sigchld(_signum: libc::c_int) {
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe {
            libc::waitpid(
                -1,
                &mut status,
                libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
            )
        };
        if pid <= 0 {
            break;
        }
    }
}

pub fn install_signal_handlers() -> io::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    for sig in [
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGQUIT,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        install_action(sig, &ignore)?;
    }
    let sigchld = SigAction::new(
        SigHandler::Handler(reap_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    install_action(Signal::SIGCHLD, &sigchld)?;
    debug!("signal event=install mode=ignore+reap");
    Ok(())
}

fn install_action(signal: Signal, action: &SigAction) -> io::Result<()> {
    unsafe { sigaction(signal, action) }
        .map(|_| ())
        .map_err(|err| io::Error::other(err.to_string()))
}

/// §4.5: claim the controlling terminal at startup, detaching from a
/// non-cooperating parent session. Returns the shell's own process-group id.
pub fn init_session(interactive: bool) -> io::Result<i32> {
    let pid = getpid();
    if !interactive {
        let sid = getsid(None).map_err(|err| io::Error::other(err.to_string()))?;
        if sid != pid {
            if let Err(err) = setsid() {
                if err != Errno::EPERM {
                    return Err(io::Error::other(err.to_string()));
                }
            }
        }
        return Ok(getpgrp().as_raw());
    }

    let stdin = std::io::stdin();
    let fd = stdin.as_fd();
    const MAX_ATTEMPTS: u32 = 64;
    for _ in 0..MAX_ATTEMPTS {
        let shell_pgid = getpgrp();
        match tcgetpgrp(fd) {
            Ok(tty_pgid) if tty_pgid == shell_pgid => break,
            Ok(_) => {
                let _ = kill(Pid::from_raw(-shell_pgid.as_raw()), Signal::SIGTTIN);
            }
            Err(Errno::ENOTTY) => break,
            Err(err) => return Err(io::Error::other(err.to_string())),
        }
    }

    if getpgrp() != pid {
        setpgid(Pid::from_raw(0), Pid::from_raw(0))
            .map_err(|err| io::Error::other(err.to_string()))?;
    }
    let pgid = getpgrp();
    if let Err(err) = tcsetpgrp(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }, pgid) {
        if err != Errno::ENOTTY {
            warn!("tty event=claim error={err}");
        }
    }
    Ok(pgid.as_raw())
}
