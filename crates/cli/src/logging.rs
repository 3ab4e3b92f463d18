//! Logging setup for the tzsync CLI
//!
//! Two sinks: operator messages on stderr, and a per-run trace file under
//! `/tmp` that keeps reload timings, fallbacks and fetch details for later.

use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_DIR: &str = "/tmp";

/// File filter when `RUST_LOG` is unset: everything from our crates
const FILE_DIRECTIVES: &str = "warn,tzsync=trace,tzsync_core=trace,tzsync_transport=trace";

/// Keeps the trace file writer alive; drop it last
pub struct Session {
    pub log_path: PathBuf,
    _guard: WorkerGuard,
}

/// Install the console and trace-file layers.
///
/// `verbose` lowers the console threshold to debug. `RUST_LOG` replaces the
/// trace-file filter.
pub fn init(verbose: bool) -> Session {
    let log_path = session_log_path(Path::new(LOG_DIR), uuid::Uuid::new_v4());
    let file_name = log_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(LOG_DIR, file_name));

    tracing_subscriber::registry()
        .with(trace_file_layer(writer, file_filter(std::env::var("RUST_LOG").ok())))
        .with(console_layer(console_level(verbose)))
        .init();

    Session {
        log_path,
        _guard: guard,
    }
}

fn session_log_path(dir: &Path, session: uuid::Uuid) -> PathBuf {
    dir.join(format!("tzsync-{session}.log"))
}

fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

fn file_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(FILE_DIRECTIVES))
}

fn trace_file_layer<S>(writer: NonBlocking, filter: EnvFilter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter)
}

fn console_layer<S>(level: LevelFilter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level)
}
