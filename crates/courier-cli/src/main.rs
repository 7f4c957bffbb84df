//! courierd — the courier chat message delivery daemon.
//!
//! Startup order matters and mirrors what operators expect from the
//! config: flags, optional daemonization, config load, storage, logger,
//! pid file, server, signals. Anything fatal before the server is up
//! exits with status 1 and writes the error plus a captured backtrace to
//! stderr.

mod daemon;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use courier_config::CourierConfig;
use courier_runtime::{at_exit, Thread};
use courier_server::{OsGroups, Server};
use courier_storage::open_storage;

/// The courier chat message delivery server.
#[derive(Parser)]
#[command(name = "courierd", version, about)]
struct Cli {
    /// Detach from the terminal and run in the background.
    #[arg(long)]
    daemon: bool,

    /// Path to the INI configuration file.
    #[arg(long, default_value = "config.ini")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!("{}", std::backtrace::Backtrace::force_capture());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.daemon {
        daemon::daemonize()?;
    }

    let config = CourierConfig::load(&cli.config)
        .with_context(|| format!("loading config from `{}`", cli.config.display()))?;

    let storage = open_storage(
        &config.storage.storage_library,
        &config.storage.storage_config,
    )
    .context("opening storage backend")?;

    logging::init(&config.logger).context("initializing logger")?;
    info!("finished loading configs");

    write_pid_file(&config.server.pid)?;
    info!(pid = std::process::id(), "finished writing pidfile");

    let mut server = Server::start(
        config.server.threads,
        config.server.port,
        Arc::new(storage),
        Arc::new(OsGroups),
    )
    .context("starting rpc server")?;
    info!(port = config.server.port, "server is listening");

    install_signal_handlers(&server)?;
    server.wait_for_stop();

    at_exit::drain();
    Ok(())
}

fn write_pid_file(path: &std::path::Path) -> anyhow::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
        .with_context(|| format!("writing pid file `{}`", path.display()))
}

#[cfg(unix)]
fn install_signal_handlers(server: &Server) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let handle = server.shutdown_handle();
    let mut signals = Signals::new([SIGTERM, SIGINT]).context("installing signal handlers")?;
    let mut thread = Thread::named("signal-handler", move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "shutdown signal received");
            handle.request_stop();
        }
    });
    thread
        .start()
        .map_err(|e| anyhow::anyhow!("spawning signal thread: {e}"))?;
    // the thread blocks until a signal; it must not be joined on drop
    thread.detach();
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_server: &Server) -> anyhow::Result<()> {
    Ok(())
}
