//! Home-directory resolution (§9 Open Question (c)): prefer `$HOME`, else
//! the password database entry for the current uid, else `.`. Every
//! collaborator that needs a home directory (history file, activity log,
//! startup script, `cd` with no argument) goes through this one function so
//! none of them invent their own fallback order.

use std::env;
use std::ffi::CStr;
use std::path::PathBuf;

pub fn home_dir() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    if let Some(dir) = passwd_home_dir() {
        return dir;
    }
    PathBuf::from(".")
}

fn passwd_home_dir() -> Option<PathBuf> {
    unsafe {
        let uid = libc::getuid();
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        let dir = (*pw).pw_dir;
        if dir.is_null() {
            return None;
        }
        let cstr = CStr::from_ptr(dir);
        let s = cstr.to_str().ok()?;
        if s.is_empty() {
            None
        } else {
            Some(PathBuf::from(s))
        }
    }
}
