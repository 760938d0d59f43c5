//! Hand-rolled error type, in the style of `rpc_protocol::Error`: a plain
//! enum with manual `Display`/`std::error::Error` impls rather than pulling
//! in an error-boilerplate crate. The launcher is a small, short-lived
//! process with a handful of failure modes, so there's little for a crate
//! like `thiserror` to save here.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    ExecutableNotFound(String),
    InvalidTraceAddress(String),
    CoreLibraryNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::ExecutableNotFound(cmd) => write!(f, "executable not found: {cmd}"),
            Error::InvalidTraceAddress(addr) => write!(f, "invalid --trace address: {addr}"),
            Error::CoreLibraryNotFound(path) => {
                write!(f, "teexec-core shared library not found: {path}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
