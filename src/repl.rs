//! The read-eval loop and [`ShellState`] (§2 "Control flow", §3.1).
//!
//! `run_once` is one trip around the loop: obtain a line from the line
//! source (C1's input side), hand it to the parser, then dispatch either
//! to the builtin dispatcher (C2) or the pipeline launcher (C3). No error
//! from any of those stages escapes this function — per §7, "No error
//! propagates out of the read-eval loop; each line is executed
//! independently."

use std::env;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::info;

use crate::builtins::{execute_builtin, is_builtin};
use crate::execution;
use crate::job_control::JobTable;
use crate::line_source::{default_history_path, LineSource, ReadlineSource, StdinSource};
use crate::log_sink::{default_log_path, Logger};
use crate::parse::parse_line;
use crate::prompt;

/// Bundles the ambient collaborators (§3.1) alongside the core shell state
/// named in §3: the job table and prompt hint are `Arc`-shared with the
/// monitor thread (`monitor.rs`); everything else is owned outright by the
/// main thread.
pub struct ShellState {
    pub(crate) line_source: Box<dyn LineSource>,
    pub(crate) logger: Logger,
    pub(crate) jobs: Arc<JobTable>,
    pub(crate) prompt_hint: Arc<AtomicI32>,
    pub(crate) shell_pgid: i32,
    pub(crate) interactive: bool,
    pub(crate) last_status: i32,
}

impl ShellState {
    pub fn new(interactive: bool, shell_pgid: i32) -> io::Result<Self> {
        let line_source: Box<dyn LineSource> = if interactive {
            Box::new(ReadlineSource::new(default_history_path())?)
        } else {
            Box::new(StdinSource)
        };
        Ok(Self {
            line_source,
            logger: Logger::new(default_log_path()),
            jobs: Arc::new(JobTable::new()),
            prompt_hint: Arc::new(AtomicI32::new(0)),
            shell_pgid,
            interactive,
            last_status: 0,
        })
    }

    pub fn jobs(&self) -> &Arc<JobTable> {
        &self.jobs
    }

    pub fn prompt_hint(&self) -> &Arc<AtomicI32> {
        &self.prompt_hint
    }
}

/// One trip around the read-eval loop (interactive mode only — script mode
/// uses [`run_script`] directly, since it has no prompt to render).
/// Returns `Ok(false)` on EOF, at which point the caller should exit.
pub fn run_once(state: &mut ShellState) -> io::Result<bool> {
    let cwd = env::current_dir().unwrap_or_else(|_| "/".into());
    let prompt_text = prompt::render(&cwd, state.prompt_hint.load(Ordering::SeqCst));

    let line = match state.line_source.read_line(&prompt_text)? {
        Some(line) => line,
        None => {
            println!();
            return Ok(false);
        }
    };

    let trimmed = line.trim();
    if !trimmed.is_empty() {
        state.line_source.add(trimmed);
        state.logger.log(trimmed);
        info!("shell event=input line={trimmed:?}");
        execute_line(state, trimmed);
    }
    Ok(true)
}

/// Parses and executes one logical line, applying §4.2's builtin-bypass
/// rule before falling through to the launcher (C3). Shared between the
/// interactive loop and script/startup-rc processing (§6).
pub fn execute_line(state: &mut ShellState, line: &str) {
    let pipeline = parse_line(line);
    if pipeline.commands.is_empty() {
        // §7: "Parse produced an empty Pipeline — silently ignored,
        // returns 0."
        state.last_status = 0;
        return;
    }

    if pipeline.commands.len() == 1 && is_builtin(pipeline.commands[0].args[0].as_str()) {
        let args = pipeline.commands[0].args.clone();
        execute_builtin(state, &args);
        return;
    }

    let display = pipeline.display();
    state.last_status = execution::launch(&pipeline, &display, &state.jobs, state.shell_pgid, state.interactive);
}

/// Runs a sequence of lines from `reader`, one line at a time, skipping
/// blank lines and `#` comments (§6, shared by script mode and the
/// `$HOME/.myshellrc` startup reader). Grounded on
/// `examples/original_source/myshell/src/shell.cpp: run()`'s script-mode
/// branch and `load_rc()`, which apply identical line-processing rules.
pub fn run_script<R: io::BufRead>(state: &mut ShellState, reader: R) -> io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        state.logger.log(trimmed);
        execute_line(state, trimmed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn run_script_skips_blank_and_comment_lines() {
        let mut state = ShellState::new(false, 0).unwrap();
        let script = "# a comment\n\npwd\n";
        run_script(&mut state, Cursor::new(script)).unwrap();
        assert_eq!(state.last_status, 0);
    }

    #[test]
    fn empty_pipeline_is_silently_ignored() {
        let mut state = ShellState::new(false, 0).unwrap();
        state.last_status = 7;
        execute_line(&mut state, "   ");
        assert_eq!(state.last_status, 0);
    }
}
