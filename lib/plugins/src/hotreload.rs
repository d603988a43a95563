//! Hot-reload orchestrator. Feature-gated: a build without the
//! `hot-reload` feature carries the plugin manager and watcher but never
//! links this module in.

use crate::manager::PluginManager;
use crate::plugin::PluginState;
use crate::watcher::FileWatcher;
use aether::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use slog::Logger;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

pub struct HotReloadOrchestrator<'a> {
    manager: &'a PluginManager,
    watcher: FileWatcher,
    sources: RwLock<HashMap<String, PathBuf>>,
    reload_count: AtomicU64,
    log: Logger,
}

impl<'a> HotReloadOrchestrator<'a> {
    pub fn new(manager: &'a PluginManager, log: &Logger) -> Self {
        HotReloadOrchestrator {
            manager,
            watcher: FileWatcher::new(log),
            sources: RwLock::new(HashMap::new()),
            reload_count: AtomicU64::new(0),
            log: log.new(slog::o!("component" => "hot-reload")),
        }
    }

    pub fn with_debounce(manager: &'a PluginManager, debounce: Duration, log: &Logger) -> Self {
        HotReloadOrchestrator {
            manager,
            watcher: FileWatcher::with_debounce(debounce, log),
            sources: RwLock::new(HashMap::new()),
            reload_count: AtomicU64::new(0),
            log: log.new(slog::o!("component" => "hot-reload")),
        }
    }

    /// Number of plugins currently registered for hot reload.
    pub fn watched_plugin_count(&self) -> usize {
        self.sources.read().unwrap().len()
    }

    /// Number of reloads completed successfully since construction.
    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::SeqCst)
    }

    /// Registers `path` as the library backing `name`'s hot reloads.
    pub fn watch_plugin(&self, name: &str, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.watcher.watch(&path);
        self.sources.write().unwrap().insert(name.to_string(), path);
    }

    pub fn unwatch_plugin(&self, name: &str) {
        if let Some(path) = self.sources.write().unwrap().remove(name) {
            self.watcher.unwatch(path);
        }
    }

    /// Polls the file watcher and reloads every plugin whose backing library
    /// changed. Returns the names successfully reloaded; a reload failure is
    /// logged and the plugin is left in whatever state `reload_plugin` left
    /// it, it does not stop the remaining reloads.
    pub fn poll_and_reload(&self) -> Vec<String> {
        let changes = self.watcher.poll();
        let mut reloaded = Vec::new();

        for change in changes {
            let name = {
                let sources = self.sources.read().unwrap();
                sources.iter().find(|(_, p)| **p == change.path).map(|(n, _)| n.clone())
            };
            if let Some(name) = name {
                match self.reload_plugin(&name) {
                    Ok(()) => reloaded.push(name),
                    Err(e) => slog::warn!(self.log, "hot reload failed"; "name" => %name, "error" => %e),
                }
            }
        }
        reloaded
    }

    /// 1. capture state (if the plugin opts in) 2. shut the running plugin
    /// down 3. unload it 4. load the library fresh from its source path
    /// 5. initialize the new instance 6. restore state if the state
    /// version still matches 7. reactivate it.
    pub fn reload_plugin(&self, name: &str) -> Result<()> {
        let path = self
            .sources
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::PluginNotFound, name))?;

        let snapshot = self.manager.capture_state(name);
        let was_active = self.manager.plugin_state(name) == Some(PluginState::Active);

        if self.manager.plugin_state(name).is_some() {
            let _ = self.manager.shutdown_plugin(name);
            self.manager.unload_plugin(name)?;
        }

        // Safety: the reloaded library is expected to export the same
        // factory contract as the one originally loaded from this path.
        let loaded_name = unsafe { self.manager.load_plugin(&path)? };
        if loaded_name != name {
            return Err(Error::new(
                ErrorKind::HotReloadFailed,
                format!("reloaded library reports name {loaded_name}, expected {name}"),
            ));
        }

        self.manager.init_plugin(name)?;

        if let Some(snapshot) = snapshot {
            if !self.manager.restore_state(name, &snapshot) {
                slog::warn!(self.log, "state snapshot rejected after reload"; "name" => name);
            }
        }

        if was_active {
            self.manager.activate_plugin(name)?;
        }

        self.reload_count.fetch_add(1, Ordering::SeqCst);
        slog::info!(self.log, "reloaded plugin"; "name" => name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Plugin, PluginContext, PluginInfo, Version};

    struct StubPlugin {
        name: &'static str,
    }

    impl Plugin for StubPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo {
                name: self.name.to_string(),
                description: "stub".to_string(),
                version: Version::new(1, 0, 0),
                dependencies: vec![],
                api_version: 1,
            }
        }
        fn on_load(&mut self, _ctx: &PluginContext) -> bool {
            true
        }
        fn on_init(&mut self) -> bool {
            true
        }
        fn on_update(&mut self, _dt: f64) {}
        fn on_shutdown(&mut self) {}
        fn on_unload(&mut self) {}
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn watch_and_unwatch_plugin_tracks_source() {
        let manager = PluginManager::new(&test_logger());
        manager
            .register_static_plugin(Box::new(StubPlugin { name: "combat" }))
            .unwrap();
        let orchestrator = HotReloadOrchestrator::new(&manager, &test_logger());
        orchestrator.watch_plugin("combat", "/tmp/does-not-exist.so");
        assert_eq!(orchestrator.sources.read().unwrap().len(), 1);
        orchestrator.unwatch_plugin("combat");
        assert!(orchestrator.sources.read().unwrap().is_empty());
    }

    #[test]
    fn reload_unknown_plugin_fails() {
        let manager = PluginManager::new(&test_logger());
        let orchestrator = HotReloadOrchestrator::new(&manager, &test_logger());
        assert!(orchestrator.reload_plugin("combat").is_err());
    }

    #[test]
    fn poll_and_reload_with_no_changes_is_empty() {
        let manager = PluginManager::new(&test_logger());
        let orchestrator = HotReloadOrchestrator::new(&manager, &test_logger());
        assert!(orchestrator.poll_and_reload().is_empty());
    }

    #[test]
    fn watched_plugin_count_tracks_sources() {
        let manager = PluginManager::new(&test_logger());
        let orchestrator = HotReloadOrchestrator::new(&manager, &test_logger());
        assert_eq!(orchestrator.watched_plugin_count(), 0);
        orchestrator.watch_plugin("combat", "/tmp/does-not-exist.so");
        assert_eq!(orchestrator.watched_plugin_count(), 1);
        orchestrator.unwatch_plugin("combat");
        assert_eq!(orchestrator.watched_plugin_count(), 0);
    }

    #[test]
    fn reload_count_starts_at_zero_and_is_unaffected_by_failed_reloads() {
        let manager = PluginManager::new(&test_logger());
        let orchestrator = HotReloadOrchestrator::new(&manager, &test_logger());
        assert_eq!(orchestrator.reload_count(), 0);
        let _ = orchestrator.reload_plugin("combat");
        assert_eq!(orchestrator.reload_count(), 0);
    }
}
