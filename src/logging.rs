use std::ffi::OsString;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::DebuggingConfig;

/// Initializes the global tracing subscriber from `RUST_LOG`, falling back
/// to `debugging.debug_level`. Writes to `debugging.log_file` when set,
/// otherwise to stdout.
///
/// When logging to a file the returned guard must be kept alive for the
/// process lifetime — it owns the non-blocking writer's flush thread and
/// drops pending output when dropped.
#[must_use]
pub fn init(debugging: &DebuggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(debugging.debug_level.clone()));

    match &debugging.log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name: OsString = path
                .file_name()
                .map(OsString::from)
                .unwrap_or_else(|| OsString::from("vmcad.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}
