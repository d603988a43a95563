//! Structured JSON logging: a `slog::Logger` built from a `sloggers` config
//! emitting one JSON object per line (timestamp, level, category, message,
//! optional correlation id and entity/player/session ids, free-form extra
//! fields), plus a thread-local correlation id scope inspired by
//! `original_source/include/cgs/foundation/json_log_formatter.hpp`.

use crate::error::{Error, ErrorKind, Result};
use slog::{Drain, Logger};
use std::cell::RefCell;
use std::io;
use std::sync::Mutex;

thread_local! {
    static CORRELATION_ID: RefCell<Option<String>> = RefCell::new(None);
}

/// Set the correlation id for the current thread for the lifetime of the
/// returned guard; clears it on drop, restoring whatever id (if any) was
/// active before. Intended to be held across the handling of one gateway
/// message or one plugin operation.
pub struct CorrelationScope {
    previous: Option<String>,
}

impl CorrelationScope {
    pub fn enter(id: impl Into<String>) -> Self {
        let previous = CORRELATION_ID.with(|cell| cell.replace(Some(id.into())));
        CorrelationScope { previous }
    }

    pub fn current() -> Option<String> {
        CORRELATION_ID.with(|cell| cell.borrow().clone())
    }
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        CORRELATION_ID.with(|cell| *cell.borrow_mut() = self.previous.take());
    }
}

/// Return a child logger carrying the current thread's correlation id (if
/// any) as a `correlation_id` key on every record logged through it. Call
/// sites that dispatch a gateway message or a plugin operation should enter
/// a `CorrelationScope` and then derive their working logger with this.
pub fn with_correlation(logger: &Logger) -> Logger {
    match CorrelationScope::current() {
        Some(id) => logger.new(slog::o!("correlation_id" => id)),
        None => logger.clone(),
    }
}

/// Build a `slog::Logger` that writes one JSON object per line to `writer`,
/// matching the field set (`timestamp`, `level`, `category`, `message`,
/// plus whatever key-value pairs the call site attaches).
pub fn build_json_logger<W>(writer: W) -> Logger
where
    W: io::Write + Send + 'static,
{
    let json_drain = slog_json::Json::new(writer)
        .add_default_keys()
        .build()
        .fuse();
    let drain = Mutex::new(json_drain).fuse();
    Logger::root(drain, slog::o!("category" => "server"))
}

/// Build the default stderr JSON logger used by the service binaries.
pub fn init() -> Logger {
    build_json_logger(io::stderr())
}

/// Build a logger from a `sloggers`-style TOML snippet (terminal or file
/// destination), as `flux::logging::init` did, but return the logger
/// instead of discarding it.
pub fn init_from_toml(toml: &str) -> Result<Logger> {
    use sloggers::Config;

    let config: sloggers::LoggerConfig = serdeconv::from_toml_str(toml)
        .map_err(|e| Error::new(ErrorKind::LoggerError, format!("invalid logger config: {e}")))?;
    config
        .build_logger()
        .map_err(|e| Error::new(ErrorKind::LoggerError, format!("failed to build logger: {e}")))
}
