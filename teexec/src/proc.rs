//! Executable discovery, mirroring `original_source/src/proc.c`'s
//! `proc_find`: try the literal path first, then (for a bare command name)
//! walk `$PATH`, checking `X_OK` access before accepting a candidate.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolves `command` to an executable path. `command` containing a `/` is
/// tried as-is (matching `execve`'s own rule that a path with a slash is
/// never looked up on `$PATH`); otherwise every `$PATH` entry is checked in
/// order and the first accessible match wins.
pub fn find_executable(command: &str) -> Result<PathBuf> {
    if command.contains('/') {
        return accessible(Path::new(command)).ok_or_else(|| Error::ExecutableNotFound(command.to_string()));
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(command);
        if let Some(found) = accessible(&candidate) {
            return Ok(found);
        }
    }

    Err(Error::ExecutableNotFound(command.to_string()))
}

fn accessible(path: &Path) -> Option<PathBuf> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes()).ok()?;
    let rc = unsafe { libc::access(c_path.as_ptr(), libc::X_OK) };
    if rc == 0 {
        Some(path.to_path_buf())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_path_to_accessible_binary_is_accepted() {
        let found = find_executable("/bin/sh").or_else(|_| find_executable("/usr/bin/sh"));
        assert!(found.is_ok());
    }

    #[test]
    fn literal_nonexistent_path_is_rejected() {
        let err = find_executable("/no/such/teexec-test-binary").unwrap_err();
        assert!(matches!(err, Error::ExecutableNotFound(_)));
    }

    #[test]
    fn bare_name_is_found_on_path() {
        let found = find_executable("sh");
        assert!(found.is_ok());
    }

    #[test]
    fn unknown_bare_name_is_rejected() {
        let err = find_executable("teexec-definitely-not-a-real-command").unwrap_err();
        assert!(matches!(err, Error::ExecutableNotFound(_)));
    }
}
