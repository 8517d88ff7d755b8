//! Append-only activity log (§1 exclusion, §6 "Log sink collaborator",
//! §6.1 supplement). A fire-and-forget sink: `log()` sends on a channel and
//! returns immediately; a background thread drains the channel and writes
//! each line with a timestamp prefix. Ported from
//! `examples/original_source/myshell/include/logger.hpp` /
//! `src/logger.cpp`'s background-thread-plus-queue shape into Rust's
//! `std::thread` + `std::sync::mpsc`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use chrono::Local;
use log::warn;

pub struct Logger {
    sender: Sender<String>,
    worker: Option<JoinHandle<()>>,
}

impl Logger {
    /// Opens (creating if necessary) the append-only log at `path` and
    /// starts the background writer thread.
    pub fn new(path: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel::<String>();
        let worker = thread::spawn(move || {
            let file = OpenOptions::new().create(true).append(true).open(&path);
            let mut file = match file {
                Ok(file) => file,
                Err(err) => {
                    warn!("log event=open-failed path={} error={err}", path.display());
                    return;
                }
            };
            for line in receiver {
                let stamped = format!("{} | {line}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
                if let Err(err) = file.write_all(stamped.as_bytes()) {
                    warn!("log event=write-failed error={err}");
                }
            }
        });
        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Non-blocking; lossless under normal operation (the channel is
    /// unbounded, so a slow or absent reader never drops a line).
    pub fn log(&self, line: impl Into<String>) {
        let _ = self.sender.send(line.into());
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // Dropping `sender` (implicitly, as part of `self`) closes the
        // channel; join so the last few lines are flushed before exit.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

pub fn default_log_path() -> PathBuf {
    crate::home::home_dir().join(".myshell.log")
}
