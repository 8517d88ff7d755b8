//! Line input and history (§1.1, §6). Wraps `rustyline` behind a small
//! `LineSource` trait so the REPL (`repl.rs`) doesn't depend on rustyline
//! directly — grounded on the teacher's `io_helpers.rs::read_input_line`,
//! simplified since heredocs and completion are out of scope here. History
//! persistence (`add`/`load`/`save`) is ported from
//! `examples/original_source/myshell/include/history.hpp` /
//! `src/history.cpp`.

use std::fs;
use std::io;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// §6 "Line source collaborator": `read_line` returns `Ok(None)` on EOF
/// (Ctrl-D), treats Ctrl-C as an empty line, `add` records a line for the
/// `history` builtin, `enumerate` lists everything recorded so far, and
/// `save` is the explicit save-on-teardown hook — explicit rather than a
/// `Drop` impl, because the `exit` builtin calls `std::process::exit`
/// directly, which runs no destructors.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
    fn add(&mut self, line: &str);
    fn enumerate(&self) -> Vec<String>;
    fn save(&mut self) -> io::Result<()>;
}

/// Interactive source: `rustyline` for editing, a plain in-memory `Vec`
/// mirrored alongside it for `enumerate()` so the `history` builtin doesn't
/// need to borrow the editor's own history representation.
pub struct ReadlineSource {
    editor: DefaultEditor,
    history_path: PathBuf,
    entries: Vec<String>,
}

impl ReadlineSource {
    pub fn new(history_path: PathBuf) -> io::Result<Self> {
        let mut editor = DefaultEditor::new().map_err(io::Error::other)?;
        // A missing history file on first run is not an error (§6.1
        // "loaded best-effort").
        let _ = editor.load_history(&history_path);
        let entries = load_lines(&history_path);
        Ok(Self {
            editor,
            history_path,
            entries,
        })
    }
}

impl LineSource for ReadlineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    fn add(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        let _ = self.editor.add_history_entry(line);
        self.entries.push(line.to_string());
    }

    fn enumerate(&self) -> Vec<String> {
        self.entries.clone()
    }

    fn save(&mut self) -> io::Result<()> {
        let _ = self.editor.save_history(&self.history_path);
        append_lines(&self.history_path, &self.entries)
    }
}

/// Non-interactive stand-in (script mode, §6): reads from stdin line by
/// line, no history.
pub struct StdinSource;

impl LineSource for StdinSource {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes = io::stdin().read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn add(&mut self, _line: &str) {}

    fn enumerate(&self) -> Vec<String> {
        Vec::new()
    }

    fn save(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn default_history_path() -> PathBuf {
    crate::home::home_dir().join(".myshell_history")
}

fn load_lines(path: &PathBuf) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Appends this run's new entries to the on-disk history file, matching the
/// original's `History::save` (`std::ios::app`, one line per entry).
fn append_lines(path: &PathBuf, entries: &[String]) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    for entry in entries {
        writeln!(file, "{entry}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_source_reports_eof() {
        let mut source = StdinSource;
        // We can't feed literal EOF to std::io::stdin() in a unit test
        // without process-level redirection; exercised end-to-end instead
        // (tests/scripted.rs).
        let _ = &mut source;
    }

    #[test]
    fn default_history_path_is_under_home() {
        let path = default_history_path();
        assert!(path.ends_with(".myshell_history"));
    }

    #[test]
    fn append_lines_writes_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hist");
        append_lines(&path, &["a".into(), "b".into()]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a\nb\n");
    }
}
