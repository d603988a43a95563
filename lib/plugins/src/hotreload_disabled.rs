//! Disabled-build stand-in for `hotreload.rs`. Compiled in whenever the
//! `hot-reload` feature is off, so `HotReloadOrchestrator` keeps the same
//! public surface either way and callers never need to conditionally
//! compile against it. Every fallible method returns `HotReloadDisabled`.

use crate::manager::PluginManager;
use aether::{Error, ErrorKind, Result};
use slog::Logger;
use std::path::Path;
use std::time::Duration;

pub struct HotReloadOrchestrator<'a> {
    _manager: &'a PluginManager,
    log: Logger,
}

impl<'a> HotReloadOrchestrator<'a> {
    pub fn new(manager: &'a PluginManager, log: &Logger) -> Self {
        HotReloadOrchestrator {
            _manager: manager,
            log: log.new(slog::o!("component" => "hot-reload")),
        }
    }

    pub fn with_debounce(manager: &'a PluginManager, _debounce: Duration, log: &Logger) -> Self {
        Self::new(manager, log)
    }

    pub fn watch_plugin(&self, _name: &str, _path: impl AsRef<Path>) {
        slog::warn!(self.log, "hot reload disabled; ignoring watch_plugin");
    }

    pub fn unwatch_plugin(&self, _name: &str) {}

    pub fn poll_and_reload(&self) -> Vec<String> {
        Vec::new()
    }

    pub fn reload_plugin(&self, _name: &str) -> Result<()> {
        Err(Error::new(ErrorKind::HotReloadDisabled, "hot-reload feature is disabled"))
    }

    pub fn watched_plugin_count(&self) -> usize {
        0
    }

    pub fn reload_count(&self) -> u64 {
        0
    }
}
