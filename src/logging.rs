use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

pub const LOG_FILENAME: &str = "HDR-SDR-Brightness.log";

/// `-debug` / `--debug` anywhere on the command line.
pub fn debug_requested<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .any(|a| matches!(a.as_ref().trim().to_ascii_lowercase().as_str(), "-debug" | "--debug"))
}

fn writable(dir: &Path) -> bool {
    let probe = dir.join(".log-probe");
    let ok = OpenOptions::new().create(true).write(true).open(&probe).is_ok();
    let _ = std::fs::remove_file(probe);
    ok
}

/// Initialise logging.
///
/// With `debug` an `info` log (overridable through `RUST_LOG`) goes to
/// `HDR-SDR-Brightness.log` in the first writable of `dirs`; the returned
/// guard must live until exit so buffered lines get flushed. Otherwise only
/// warnings reach stderr.
pub fn init(debug: bool, dirs: &[PathBuf]) -> Option<WorkerGuard> {
    if !debug {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_writer(std::io::stderr)
            .try_init();
        return None;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let dir = dirs.iter().find(|d| writable(d))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILENAME)
        .max_log_files(3)
        .build(dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
    tracing::info!("logger-initialized dir={}", dir.display());
    Some(guard)
}
