//! Error types and reporting for the shell.
//!
//! Every fallible internal operation returns `ShellError` so the read-eval
//! loop has one place to turn a failure into the exact user-visible
//! diagnostic and exit-code bookkeeping the shell promises; no error is
//! allowed to escape that loop and abort the process.

use std::fmt;
use std::io;

/// Categorized error kinds, matching the error-handling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The parser could not make sense of a redirection or otherwise
    /// malformed fragment (an empty Pipeline is not an error — see callers).
    Parse,
    /// Pipe allocation or fork failure in the launcher.
    Launch,
    /// A redirection target could not be opened.
    Redirection,
    /// exec() failed in the child.
    Exec,
    /// A builtin (fg/bg/kill/cd/...) failed.
    Builtin,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "parse error"),
            ErrorKind::Launch => write!(f, "launch error"),
            ErrorKind::Redirection => write!(f, "redirection error"),
            ErrorKind::Exec => write!(f, "exec error"),
            ErrorKind::Builtin => write!(f, "builtin error"),
        }
    }
}

impl ErrorKind {
    /// The exit status the read-eval loop reports when this kind of error
    /// reaches it unattached to a more specific code, matching §7's error
    /// table (exec failures are 127, everything else in the launcher is 1).
    pub fn default_exit_code(self) -> i32 {
        match self {
            ErrorKind::Exec => 127,
            ErrorKind::Parse => 2,
            ErrorKind::Launch | ErrorKind::Redirection | ErrorKind::Builtin => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Option<String>,
}

impl ShellError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ShellError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShellError {}

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::new(ErrorKind::Launch, err.to_string())
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
