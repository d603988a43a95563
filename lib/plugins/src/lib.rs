//! Plugin system: versioned metadata and lifecycle trait, the
//! manager driving load/init/activate/shutdown/unload and dependency-ordered
//! bulk operations, and a polling file watcher with an optional
//! hot-reload orchestrator built on top of it.

pub mod manager;
pub mod plugin;
pub mod watcher;

#[cfg(feature = "hot-reload")]
pub mod hotreload;
#[cfg(not(feature = "hot-reload"))]
#[path = "hotreload_disabled.rs"]
pub mod hotreload;

pub use manager::{PluginManager, FACTORY_SYMBOL};
pub use plugin::{
    DependencySpec, Operator, Plugin, PluginContext, PluginInfo, PluginState, StateSnapshot, Version,
    VersionConstraint,
};
pub use watcher::{FileChange, FileWatcher, DEFAULT_DEBOUNCE_MS};

// `HotReloadOrchestrator` is always exported, with or without the
// `hot-reload` feature, so callers never need to conditionally compile
// against it; the disabled build's methods just report `HotReloadDisabled`.
pub use hotreload::HotReloadOrchestrator;
