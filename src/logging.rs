use color_eyre::eyre::Result;
use std::{
    path::Path,
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "dream-ops.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Logs go to stderr, and additionally to a daily file under `log_dir`.
/// `RUST_LOG` overrides the verbosity flag.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file = log_dir.map(|dir| {
        let (writer, guard) = tracing_appender::non_blocking(rolling::daily(
            dir,
            LOG_FILE_PREFIX,
        ));
        let _ = FILE_GUARD.set(guard);
        fmt::layer().with_writer(writer).with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()?;
    Ok(())
}
