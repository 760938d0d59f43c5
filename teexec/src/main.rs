//! `teexec` — launches a target command with the tracing core preloaded.
//!
//! Owns the entire user-facing configuration surface: CLI parsing, logging,
//! executable discovery, trace-socket setup and environment assembly. The
//! core itself (`teexec-core`) never sees any of this except through the
//! single `TEEXEC_INIT=<fd>:<mode>` handoff.

mod error;
mod proc;
mod sock;

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use clap::Parser;
use log::{debug, info};

use error::{Error, Result};

const MODE_DEBUG: u32 = 1 << 0;
const MODE_DEBUG_MORE: u32 = 1 << 1;
const MODE_MULTIPLEX: u32 = 1 << 2;

const DEFAULT_TRACE_PATH: &str = "/tmp/teexec.sock";

/// Runs `command` with its `read`/`recv`/`accept`/`close` family of syscalls
/// mirrored to a trace consumer.
#[derive(Debug, Parser)]
#[command(name = "teexec", version, about)]
struct Cli {
    /// Increase tracer verbosity (repeatable: -v enables info logging for
    /// the launcher itself, -vv enables the core's DEBUG sink, -vvv
    /// additionally enables DEBUG_MORE).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Trace consumer endpoint: a filesystem path for an AF_UNIX socket, or
    /// a `host:port` pair for TCP.
    #[arg(short, long, default_value = DEFAULT_TRACE_PATH)]
    trace: String,

    /// Multiplex all traced connections onto a single consumer connection,
    /// framed as `@<id>#<len>\r\n<payload>`.
    #[arg(short, long)]
    multiplex: bool,

    /// Preserve the launcher's environment for the target (by default the
    /// target gets a minimal, explicitly-constructed environment).
    #[arg(short = 'E', long)]
    preserve_env: bool,

    /// Command to run under the tracer.
    command: String,

    /// Arguments passed through to `command`.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let executable = proc::find_executable(&cli.command)?;
    debug!("resolved executable: {}", executable.display());

    let listener_fd = sock::bind_trace_listener(&cli.trace)?;
    info!("trace listener bound: {} (fd {})", cli.trace, listener_fd);

    let core_lib = find_core_library()?;
    debug!("teexec-core library: {}", core_lib.display());

    let mode = mode_bits(cli.verbose, cli.multiplex);
    let mut command = Command::new(&executable);
    command.arg0(&cli.command).args(&cli.args);

    if cli.preserve_env {
        command.env_remove("TEEXEC_INIT");
    } else {
        command.env_clear();
    }
    command.env(preload_var_name(), &core_lib);
    command.env("TEEXEC_INIT", format!("{}:{}", listener_fd, mode));

    info!("executing {} under teexec", executable.display());
    let err = command.exec();
    // `exec` only returns on failure; a successful call never comes back here.
    Err(Error::Io(err))
}

/// Raises the launcher's own logging threshold and maps `-v`/`-vv`/`-vvv`
/// onto the core's DEBUG/DEBUG_MORE bits, matching the original `teexec
/// -vvv` convention: `verbose > 1` enables DEBUG, `verbose > 2` enables
/// DEBUG_MORE.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 | 3 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn mode_bits(verbose: u8, multiplex: bool) -> u32 {
    let mut mode = 0;
    if verbose > 1 {
        mode |= MODE_DEBUG;
    }
    if verbose > 2 {
        mode |= MODE_DEBUG_MORE;
    }
    if multiplex {
        mode |= MODE_MULTIPLEX;
    }
    mode
}

#[cfg(target_os = "macos")]
fn preload_var_name() -> &'static str {
    "DYLD_INSERT_LIBRARIES"
}

#[cfg(not(target_os = "macos"))]
fn preload_var_name() -> &'static str {
    "LD_PRELOAD"
}

#[cfg(target_os = "macos")]
const CORE_LIB_FILENAME: &str = "libteexec_core.dylib";
#[cfg(not(target_os = "macos"))]
const CORE_LIB_FILENAME: &str = "libteexec_core.so";

/// Locates the core cdylib: an explicit `TEEXEC_CORE_LIB` override first,
/// then the same directory as this binary (the layout `cargo build`
/// produces when both crates share a workspace target directory).
fn find_core_library() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("TEEXEC_CORE_LIB") {
        let path = PathBuf::from(path);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(Error::CoreLibraryNotFound(path.display().to_string()))
        };
    }

    let exe_dir = std::env::current_exe()?
        .parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| Error::CoreLibraryNotFound(CORE_LIB_FILENAME.to_string()))?;
    let candidate = exe_dir.join(CORE_LIB_FILENAME);
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(Error::CoreLibraryNotFound(candidate.display().to_string()))
    }
}

