//! The background monitor (C6, §4.6): a dedicated thread, detached for the
//! shell's lifetime, that wakes once a second, sweeps the job table for
//! jobs whose children have all exited, and republishes the background
//! counter into the prompt hint. Ported from
//! `examples/original_source/myshell/src/shell.cpp: run()`'s monitor thread
//! (`std::thread` + one-second sleep loop) and `update_prompt_jobs_hint()`.
//!
//! Deliberately separate from the SIGCHLD handler in `signals.rs`: the
//! handler may not take the job table's lock, so all state reconciliation
//! — including the prompt hint refresh — happens here instead.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::job_control::JobTable;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns the monitor thread. The handle is intentionally leaked by the
/// caller (the shell never joins it, matching the original's detached
/// `std::thread`); it is returned only so tests can observe the thread was
/// created.
pub fn spawn(table: Arc<JobTable>, prompt_hint: Arc<AtomicI32>) -> JoinHandle<()> {
    thread::spawn(move || loop {
        thread::sleep(SWEEP_INTERVAL);
        let removed = table.mark_done_if_no_pids_alive();
        if !removed.is_empty() {
            debug!("monitor event=sweep removed={removed:?}");
        }
        prompt_hint.store(table.background_count(), Ordering::SeqCst);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sweep_removes_job_with_no_live_pids() {
        let table = Arc::new(JobTable::new());
        // A pid this large is exceedingly unlikely to be alive on the
        // test host; the liveness probe treats it as already dead.
        let id = table.add(999_999, "dead job".into(), true, vec![999_999]);
        let prompt_hint = Arc::new(AtomicI32::new(-1));

        let _handle = spawn(Arc::clone(&table), Arc::clone(&prompt_hint));

        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline && table.find_by_id(id).is_some() {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(table.find_by_id(id).is_none());
        assert!(prompt_hint.load(Ordering::SeqCst) >= 0);
    }
}
