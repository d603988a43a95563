//! Plugin manager: load/init/activate/shutdown/unload lifecycle
//! transitions, static registration, dependency-ordered bulk operations, and
//! queries over the registered set.

use crate::plugin::{DependencySpec, Plugin, PluginContext, PluginState, StateSnapshot, Version};
use aether::time::timestamp_secs;
use aether::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use libloading::{Library, Symbol};
use slog::Logger;
use std::collections::HashMap as StdHashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// The symbol a dynamic plugin library must export: `extern "C" fn() -> *mut dyn Plugin`.
pub const FACTORY_SYMBOL: &[u8] = b"CgsCreatePlugin";

/// Plugin API version this manager accepts. Plugins built against a
/// different version are rejected during loading.
pub const DEFAULT_API_VERSION: u32 = 1;

type PluginFactory = unsafe extern "C" fn() -> *mut (dyn Plugin + 'static);

struct Entry {
    plugin: Box<dyn Plugin>,
    state: PluginState,
    dependencies: Vec<String>,
    version: Version,
    // Keeps the dynamic library mapped for the plugin's lifetime. `None` for
    // statically registered plugins.
    _library: Option<Library>,
}

pub struct PluginManager {
    entries: RwLock<HashMap<String, Entry>>,
    // The order produced by the last successful `dependency_order()` run
    // (via `initialize_all`). Bulk operations iterate this order, reversed
    // for shutdown/unload, falling back to registry order when it's empty.
    order: RwLock<Vec<String>>,
    expected_api_version: u32,
    log: Logger,
}

impl PluginManager {
    pub fn new(log: &Logger) -> Self {
        Self::with_expected_api_version(log, DEFAULT_API_VERSION)
    }

    pub fn with_expected_api_version(log: &Logger, expected_api_version: u32) -> Self {
        PluginManager {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            expected_api_version,
            log: log.new(slog::o!("component" => "plugins")),
        }
    }

    /// Registers an in-process plugin instance (no dynamic library involved).
    /// Checks duplicate registration and API version, then calls `on_load`
    /// before the entry lands in the `Loaded` state.
    pub fn register_static_plugin(&self, mut plugin: Box<dyn Plugin>) -> Result<()> {
        let info = plugin.info();
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&info.name) {
            return Err(Error::new(ErrorKind::PluginAlreadyLoaded, info.name));
        }
        if info.api_version != self.expected_api_version {
            return Err(Error::new(
                ErrorKind::PluginVersionMismatch,
                format!(
                    "API version mismatch for '{}': expected {}, got {}",
                    info.name, self.expected_api_version, info.api_version
                ),
            ));
        }

        let context = PluginContext { log: &self.log };
        if !plugin.on_load(&context) {
            return Err(Error::new(ErrorKind::PluginLoadFailed, format!("on_load failed for plugin: {}", info.name)));
        }

        entries.insert(
            info.name.clone(),
            Entry {
                plugin,
                state: PluginState::Loaded,
                dependencies: info.dependencies,
                version: info.version,
                _library: None,
            },
        );
        slog::info!(self.log, "registered static plugin"; "name" => %info.name, "version" => %info.version);
        Ok(())
    }

    /// Loads a dynamic library, invokes its `CgsCreatePlugin` factory, and
    /// registers the resulting plugin in the `Loaded` state. Checks
    /// duplicate registration and API version, calls `on_load`, and unloads
    /// the library again on any of those failures.
    ///
    /// # Safety
    /// The library at `path` must export `CgsCreatePlugin` with the exact
    /// signature `extern "C" fn() -> *mut dyn Plugin`, and the returned
    /// pointer must be uniquely owned by the caller.
    pub unsafe fn load_plugin<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let library = Library::new(path.as_ref())
            .map_err(|e| Error::new(ErrorKind::PluginLoadFailed, e.to_string()))?;

        let factory: Symbol<PluginFactory> = library
            .get(FACTORY_SYMBOL)
            .map_err(|e| Error::new(ErrorKind::PluginLoadFailed, e.to_string()))?;

        let raw = factory();
        if raw.is_null() {
            return Err(Error::new(ErrorKind::PluginLoadFailed, "factory returned null"));
        }
        let mut plugin = Box::from_raw(raw);
        let info = plugin.info();

        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&info.name) {
            return Err(Error::new(ErrorKind::PluginAlreadyLoaded, info.name));
        }
        if info.api_version != self.expected_api_version {
            return Err(Error::new(
                ErrorKind::PluginVersionMismatch,
                format!(
                    "API version mismatch for '{}': expected {}, got {}",
                    info.name, self.expected_api_version, info.api_version
                ),
            ));
        }

        let context = PluginContext { log: &self.log };
        if !plugin.on_load(&context) {
            return Err(Error::new(ErrorKind::PluginLoadFailed, format!("on_load failed for plugin: {}", info.name)));
        }

        let name = info.name.clone();
        entries.insert(
            name.clone(),
            Entry {
                plugin,
                state: PluginState::Loaded,
                dependencies: info.dependencies,
                version: info.version,
                _library: Some(library),
            },
        );
        slog::info!(self.log, "loaded plugin library"; "name" => %name, "version" => %info.version);
        Ok(name)
    }

    pub fn init_plugin(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::new(ErrorKind::PluginNotFound, name))?;
        if entry.state != PluginState::Loaded {
            return Err(Error::new(ErrorKind::PluginInvalidState, name));
        }

        let ok = entry.plugin.on_init();
        entry.state = if ok { PluginState::Initialized } else { PluginState::Error };
        if !ok {
            return Err(Error::new(ErrorKind::PluginInitFailed, name));
        }
        Ok(())
    }

    pub fn activate_plugin(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::new(ErrorKind::PluginNotFound, name))?;
        if entry.state != PluginState::Initialized {
            return Err(Error::new(ErrorKind::PluginInvalidState, name));
        }
        entry.state = PluginState::Active;
        Ok(())
    }

    pub fn shutdown_plugin(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::new(ErrorKind::PluginNotFound, name))?;
        if !matches!(entry.state, PluginState::Active | PluginState::Initialized) {
            return Err(Error::new(ErrorKind::PluginInvalidState, name));
        }
        entry.state = PluginState::ShuttingDown;
        entry.plugin.on_shutdown();
        entry.state = PluginState::Loaded;
        Ok(())
    }

    pub fn unload_plugin(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let mut entry = entries
            .remove(name)
            .ok_or_else(|| Error::new(ErrorKind::PluginNotFound, name))?;
        entry.plugin.on_unload();
        drop(entries);
        self.order.write().unwrap().retain(|n| n != name);
        slog::info!(self.log, "unloaded plugin"; "name" => name);
        Ok(())
    }

    /// Topologically orders every `Loaded` plugin by its dependency spec
    /// strings, initializes each in turn, and retains the order as the
    /// canonical iteration order for later bulk operations. A failure in
    /// one plugin does not roll back plugins already initialized.
    pub fn initialize_all(&self) -> Result<Vec<String>> {
        let order = self.dependency_order()?;
        *self.order.write().unwrap() = order.clone();
        let mut initialized = Vec::new();
        for name in order {
            self.init_plugin(&name)?;
            initialized.push(name);
        }
        Ok(initialized)
    }

    /// Names in the retained load order, falling back to registry order if
    /// no `initialize_all` has run yet.
    fn ordered_names(&self) -> Vec<String> {
        let order = self.order.read().unwrap();
        if order.is_empty() {
            self.all_plugin_names()
        } else {
            order.clone()
        }
    }

    pub fn activate_all(&self) -> Result<()> {
        for name in self.ordered_names() {
            if self.plugin_state(&name) == Some(PluginState::Initialized) {
                self.activate_plugin(&name)?;
            }
        }
        Ok(())
    }

    pub fn update_all(&self, dt: f64) {
        let entries = self.entries.read().unwrap();
        for name in self.ordered_names() {
            if let Some(entry) = entries.get(&name) {
                if entry.state == PluginState::Active {
                    entry.plugin.on_update(dt);
                }
            }
        }
    }

    pub fn shutdown_all(&self) {
        let mut names = self.ordered_names();
        names.reverse();
        for name in names {
            let _ = self.shutdown_plugin(&name);
        }
    }

    pub fn unload_all(&self) {
        let mut names = self.ordered_names();
        names.reverse();
        for name in names {
            let _ = self.unload_plugin(&name);
        }
        self.order.write().unwrap().clear();
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.entries.read().unwrap().get(name).map(|e| e.state)
    }

    pub fn plugin_version(&self, name: &str) -> Option<Version> {
        self.entries.read().unwrap().get(name).map(|e| e.version)
    }

    pub fn all_plugin_names(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Captures state from a plugin that opts into serialization. Returns
    /// `None` if the plugin has no state or is not registered.
    pub fn capture_state(&self, name: &str) -> Option<StateSnapshot> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(name)?;
        let bytes = entry.plugin.serialize_state()?;
        Some(StateSnapshot {
            plugin_version: entry.version,
            state_version: entry.plugin.state_version(),
            bytes,
            captured_at: timestamp_secs(),
        })
    }

    /// Restores a previously captured snapshot into the currently registered
    /// plugin of the same name. Returns `false` if the state versions don't
    /// match or the plugin rejects the bytes.
    pub fn restore_state(&self, name: &str, snapshot: &StateSnapshot) -> bool {
        let mut entries = self.entries.write().unwrap();
        let entry = match entries.get_mut(name) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.plugin.state_version() != snapshot.state_version {
            return false;
        }
        entry.plugin.deserialize_state(&snapshot.bytes)
    }

    fn dependency_order(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap();

        let mut specs: StdHashMap<String, Vec<DependencySpec>> = StdHashMap::new();
        for (name, entry) in entries.iter() {
            let parsed = entry
                .dependencies
                .iter()
                .map(|d| DependencySpec::parse(d))
                .collect::<Result<Vec<_>>>()?;
            specs.insert(name.clone(), parsed);
        }

        // Dependency graph edges are name-only: a constraint that a
        // registered dependency fails to satisfy is logged but does not
        // block ordering. Only a missing (unregistered) dependency does.
        for (name, deps) in &specs {
            for dep in deps {
                match entries.get(&dep.name) {
                    Some(candidate) if dep.is_satisfied_by(candidate.version) => {}
                    Some(candidate) => {
                        slog::warn!(
                            self.log,
                            "dependency version constraint not satisfied";
                            "plugin" => name.as_str(),
                            "requires" => dep.name.as_str(),
                            "constraint" => version_constraint_text(dep),
                            "found" => %candidate.version,
                        );
                    }
                    None => {
                        return Err(Error::new(
                            ErrorKind::DependencyError,
                            format!("{name} depends on unregistered plugin {}", dep.name),
                        ));
                    }
                }
            }
        }

        let mut in_degree: StdHashMap<&str, usize> = StdHashMap::new();
        let mut dependents: StdHashMap<&str, Vec<&str>> = StdHashMap::new();
        for name in entries.keys() {
            in_degree.entry(name).or_insert(0);
        }
        for (name, deps) in &specs {
            for dep in deps {
                *in_degree.entry(name.as_str()).or_insert(0) += 1;
                dependents.entry(dep.name.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: Vec<&str> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(&n, _)| n).collect();
        ready.sort();

        let mut order = Vec::new();
        while let Some(name) = ready.pop() {
            order.push(name.to_string());
            if let Some(children) = dependents.get(name) {
                for &child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(child);
                        ready.sort();
                    }
                }
            }
        }

        if order.len() != entries.len() {
            return Err(Error::new(ErrorKind::DependencyError, "cyclic plugin dependency graph"));
        }
        Ok(order)
    }
}

fn version_constraint_text(dep: &DependencySpec) -> String {
    dep.constraints
        .iter()
        .map(|c| format!("{:?} {}", c.op, c.version))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginInfo, Version};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StubPlugin {
        name: &'static str,
        dependencies: Vec<String>,
        loaded: AtomicBool,
        initialized: AtomicBool,
        updates: AtomicUsize,
        fail_init: bool,
    }

    impl Plugin for StubPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo {
                name: self.name.to_string(),
                description: "stub".to_string(),
                version: Version::new(1, 0, 0),
                dependencies: self.dependencies.clone(),
                api_version: 1,
            }
        }
        fn on_load(&mut self, _ctx: &PluginContext) -> bool {
            self.loaded.store(true, Ordering::SeqCst);
            true
        }
        fn on_init(&mut self) -> bool {
            self.initialized.store(true, Ordering::SeqCst);
            !self.fail_init
        }
        fn on_update(&mut self, _dt: f64) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        fn on_shutdown(&mut self) {}
        fn on_unload(&mut self) {}
    }

    fn stub(name: &'static str, dependencies: Vec<String>) -> Box<StubPlugin> {
        Box::new(StubPlugin {
            name,
            dependencies,
            loaded: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            updates: AtomicUsize::new(0),
            fail_init: false,
        })
    }

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn lifecycle_transitions_happy_path() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec![])).unwrap();
        manager.init_plugin("combat").unwrap();
        assert_eq!(manager.plugin_state("combat"), Some(PluginState::Initialized));
        manager.activate_plugin("combat").unwrap();
        assert_eq!(manager.plugin_state("combat"), Some(PluginState::Active));
        manager.shutdown_plugin("combat").unwrap();
        assert_eq!(manager.plugin_state("combat"), Some(PluginState::Loaded));
        manager.unload_plugin("combat").unwrap();
        assert_eq!(manager.plugin_state("combat"), None);
    }

    #[test]
    fn activate_before_init_is_rejected() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec![])).unwrap();
        assert!(manager.activate_plugin("combat").is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec![])).unwrap();
        assert!(manager.register_static_plugin(stub("combat", vec![])).is_err());
    }

    #[test]
    fn initialize_all_respects_dependency_order() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec!["economy".to_string()])).unwrap();
        manager.register_static_plugin(stub("economy", vec![])).unwrap();
        let order = manager.initialize_all().unwrap();
        let economy_idx = order.iter().position(|n| n == "economy").unwrap();
        let combat_idx = order.iter().position(|n| n == "combat").unwrap();
        assert!(economy_idx < combat_idx);
    }

    #[test]
    fn initialize_all_rejects_missing_dependency() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec!["economy".to_string()])).unwrap();
        assert!(manager.initialize_all().is_err());
    }

    #[test]
    fn cyclic_dependencies_are_rejected() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("a", vec!["b".to_string()])).unwrap();
        manager.register_static_plugin(stub("b", vec!["a".to_string()])).unwrap();
        assert!(manager.initialize_all().is_err());
    }

    #[test]
    fn update_all_only_runs_active_plugins() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec![])).unwrap();
        manager.update_all(1.0 / 20.0);
        manager.init_plugin("combat").unwrap();
        manager.activate_plugin("combat").unwrap();
        manager.update_all(1.0 / 20.0);
    }

    #[test]
    fn all_plugin_names_and_count_reflect_registry() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec![])).unwrap();
        manager.register_static_plugin(stub("economy", vec![])).unwrap();
        assert_eq!(manager.plugin_count(), 2);
        let mut names = manager.all_plugin_names();
        names.sort();
        assert_eq!(names, vec!["combat".to_string(), "economy".to_string()]);
    }

    #[test]
    fn register_static_plugin_calls_on_load_and_sets_loaded() {
        let manager = PluginManager::new(&test_logger());
        let plugin = stub("combat", vec![]);
        manager.register_static_plugin(plugin).unwrap();
        assert_eq!(manager.plugin_state("combat"), Some(PluginState::Loaded));
    }

    #[test]
    fn api_version_mismatch_is_rejected() {
        let manager = PluginManager::with_expected_api_version(&test_logger(), 2);
        assert!(manager.register_static_plugin(stub("combat", vec![])).is_err());
        assert_eq!(manager.plugin_count(), 0);
    }

    #[test]
    fn dependency_version_constraint_mismatch_does_not_block_ordering() {
        let manager = PluginManager::new(&test_logger());
        manager
            .register_static_plugin(stub("combat", vec!["economy>=2.0.0".to_string()]))
            .unwrap();
        manager.register_static_plugin(stub("economy", vec![])).unwrap();
        let order = manager.initialize_all().unwrap();
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn shutdown_all_and_unload_all_run_in_reverse_load_order() {
        let manager = PluginManager::new(&test_logger());
        manager.register_static_plugin(stub("combat", vec!["economy".to_string()])).unwrap();
        manager.register_static_plugin(stub("economy", vec![])).unwrap();
        manager.initialize_all().unwrap();
        manager.activate_all().unwrap();
        manager.shutdown_all();
        assert_eq!(manager.plugin_state("combat"), Some(PluginState::Loaded));
        assert_eq!(manager.plugin_state("economy"), Some(PluginState::Loaded));
        manager.unload_all();
        assert_eq!(manager.plugin_count(), 0);
    }
}
