//! Detaching from the terminal.
//!
//! `--daemon` re-executes the binary as a detached child with stdio on
//! `/dev/null` and exits the foreground process; the child starts a new
//! session so it sheds the controlling terminal. The marker environment
//! variable keeps the child from re-spawning itself.

use std::process::{Command, Stdio};

use anyhow::Context;

const DAEMON_MARKER: &str = "COURIERD_DAEMONIZED";

/// Detaches from the tty. In the foreground process this spawns the
/// detached copy and exits; it returns only in the detached child.
pub fn daemonize() -> anyhow::Result<()> {
    if std::env::var_os(DAEMON_MARKER).is_none() {
        let exe = std::env::current_exe().context("resolving own executable")?;
        let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();
        Command::new(exe)
            .args(args)
            .env(DAEMON_MARKER, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawning detached server process")?;
        std::process::exit(0);
    }

    #[cfg(unix)]
    {
        // shed the controlling terminal; failure (already a session
        // leader) is not fatal
        let _ = nix::unistd::setsid();
    }
    Ok(())
}
