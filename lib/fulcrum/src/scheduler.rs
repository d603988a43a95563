//! Parallel-safe system scheduler.
//! Builds a layered batch plan from declared read/write access sets,
//! ordering dependencies, and sync points, then executes each batch either
//! sequentially or via a configured parallel executor (this crate wires in
//! `rayon`, the pairing valence-rs-valence uses for its ECS scheduler).

use aether::{Error, ErrorKind, Result};
use hashbrown::HashSet;
use std::collections::HashMap as StdHashMap;

/// Opaque component type identifier. Runtime-assigned small integers, per
/// the data model's note that these are cheaply represented as sorted sets.
pub type ComponentId = u32;

#[derive(Clone, Debug, Default)]
pub struct AccessDescriptor {
    pub reads: HashSet<ComponentId>,
    pub writes: HashSet<ComponentId>,
}

impl AccessDescriptor {
    pub fn new(reads: impl IntoIterator<Item = ComponentId>, writes: impl IntoIterator<Item = ComponentId>) -> Self {
        AccessDescriptor {
            reads: reads.into_iter().collect(),
            writes: writes.into_iter().collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }

    /// An empty descriptor conflicts with every other descriptor, including
    /// itself: "undeclared" is treated as "touches everything".
    fn conflicts_with(&self, other: &AccessDescriptor) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }
        !self.writes.is_disjoint(&other.writes)
            || !self.reads.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.reads)
    }
}

pub trait System: Send + Sync {
    fn name(&self) -> &str;
    fn access(&self) -> AccessDescriptor;
    fn execute(&self, dt: f64);
}

struct Registration {
    system: Box<dyn System>,
    dependencies: Vec<String>,
    sync_point: bool,
}

/// A `(tasks) -> void` callable that must run every task and return only
/// after all have completed. `rayon::scope`-backed implementations satisfy
/// this; see `ParallelExecutor::rayon`.
pub type ParallelExecutor = Box<dyn Fn(Vec<Box<dyn FnOnce() + Send + '_>>) + Send + Sync>;

pub fn rayon_executor() -> ParallelExecutor {
    Box::new(|tasks| {
        rayon::scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    })
}

pub struct Scheduler {
    registrations: StdHashMap<String, Registration>,
    order: Vec<String>,
    batches: Vec<Vec<String>>,
    parallel: bool,
    executor: Option<ParallelExecutor>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            registrations: StdHashMap::new(),
            order: Vec::new(),
            batches: Vec::new(),
            parallel: true,
            executor: None,
        }
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn set_executor(&mut self, executor: ParallelExecutor) {
        self.executor = Some(executor);
    }

    pub fn register(&mut self, system: Box<dyn System>) {
        let name = system.name().to_string();
        self.registrations.insert(
            name,
            Registration {
                system,
                dependencies: Vec::new(),
                sync_point: false,
            },
        );
    }

    /// `dependent` runs after `dependency`.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        if let Some(registration) = self.registrations.get_mut(dependent) {
            registration.dependencies.push(dependency.to_string());
        }
    }

    /// Nothing else may share a batch with `name`, or with any system after
    /// it in build order.
    pub fn add_sync_point(&mut self, name: &str) {
        if let Some(registration) = self.registrations.get_mut(name) {
            registration.sync_point = true;
        }
    }

    /// Topologically sorts systems respecting dependencies, then performs
    /// layered batch assignment.
    pub fn build(&mut self) -> Result<()> {
        let order = topological_sort(&self.registrations)?;

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut batch_of: StdHashMap<String, usize> = StdHashMap::new();
        let mut min_batch_floor = 0usize;

        for name in &order {
            let registration = &self.registrations[name];

            let mut lowest = min_batch_floor;
            for dep in &registration.dependencies {
                if let Some(&dep_batch) = batch_of.get(dep) {
                    lowest = lowest.max(dep_batch + 1);
                }
            }

            // A sync point always starts a fresh batch containing only
            // itself, never joining an earlier non-conflicting batch.
            let target = if registration.sync_point {
                batches.push(Vec::new());
                batches.len() - 1
            } else {
                let mut placed = None;
                for (idx, batch) in batches.iter().enumerate().skip(lowest) {
                    let access = registration.system.access();
                    let conflicts = batch
                        .iter()
                        .any(|other_name| access.conflicts_with(&self.registrations[other_name].system.access()));
                    if !conflicts {
                        placed = Some(idx);
                        break;
                    }
                }

                match placed {
                    Some(idx) => idx,
                    None => {
                        batches.push(Vec::new());
                        batches.len() - 1
                    }
                }
            };

            batches[target].push(name.clone());
            batch_of.insert(name.clone(), target);

            if registration.sync_point {
                min_batch_floor = target + 1;
            }
        }

        self.order = order;
        self.batches = batches;
        Ok(())
    }

    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    pub fn execute(&self, dt: f64) {
        if !self.parallel || self.executor.is_none() {
            for name in &self.order {
                self.registrations[name].system.execute(dt);
            }
            return;
        }

        let executor = self.executor.as_ref().unwrap();
        for batch in &self.batches {
            let tasks: Vec<Box<dyn FnOnce() + Send + '_>> = batch
                .iter()
                .map(|name| {
                    let system = &self.registrations[name].system;
                    Box::new(move || system.execute(dt)) as Box<dyn FnOnce() + Send + '_>
                })
                .collect();
            executor(tasks);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn topological_sort(registrations: &StdHashMap<String, Registration>) -> Result<Vec<String>> {
    let mut in_degree: StdHashMap<&str, usize> = StdHashMap::new();
    let mut dependents: StdHashMap<&str, Vec<&str>> = StdHashMap::new();

    for name in registrations.keys() {
        in_degree.entry(name).or_insert(0);
    }
    for (name, registration) in registrations {
        for dep in &registration.dependencies {
            *in_degree.entry(name.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
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

    if order.len() != registrations.len() {
        return Err(Error::new(ErrorKind::InvalidArgument, "cyclic system dependency graph"));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSystem {
        name: String,
        access: AccessDescriptor,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl System for RecordingSystem {
        fn name(&self) -> &str {
            &self.name
        }
        fn access(&self) -> AccessDescriptor {
            self.access.clone()
        }
        fn execute(&self, _dt: f64) {
            self.log.lock().unwrap().push(self.name.clone());
        }
    }

    #[test]
    fn disjoint_reads_batch_together() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([1], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([2], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.build().unwrap();
        assert_eq!(scheduler.batches().len(), 1);
        assert_eq!(scheduler.batches()[0].len(), 2);
    }

    #[test]
    fn write_write_conflict_forces_separate_batches() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([], [1]),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([], [1]),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.build().unwrap();
        assert_eq!(scheduler.batches().len(), 2);
    }

    #[test]
    fn read_read_is_not_a_conflict() {
        let descriptor_a = AccessDescriptor::new([1], []);
        let descriptor_b = AccessDescriptor::new([1], []);
        assert!(!descriptor_a.conflicts_with(&descriptor_b));
    }

    #[test]
    fn read_write_is_a_conflict() {
        let reader = AccessDescriptor::new([1], []);
        let writer = AccessDescriptor::new([], [1]);
        assert!(reader.conflicts_with(&writer));
    }

    #[test]
    fn empty_descriptor_conflicts_with_everything_including_itself() {
        let empty = AccessDescriptor::default();
        assert!(empty.conflicts_with(&empty));
        assert!(empty.conflicts_with(&AccessDescriptor::new([1], [])));
    }

    #[test]
    fn undeclared_systems_get_singleton_batches() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::default(),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::default(),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.build().unwrap();
        assert_eq!(scheduler.batches().len(), 2);
    }

    #[test]
    fn dependency_forces_later_batch() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([1], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([2], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.add_dependency("b", "a");
        scheduler.build().unwrap();
        let batch_of_a = scheduler.batches().iter().position(|b| b.contains(&"a".to_string())).unwrap();
        let batch_of_b = scheduler.batches().iter().position(|b| b.contains(&"b".to_string())).unwrap();
        assert!(batch_of_b > batch_of_a);
    }

    #[test]
    fn sync_point_forces_subsequent_systems_into_later_batches() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([1], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([2], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.add_sync_point("a");
        scheduler.build().unwrap();
        let batch_of_a = scheduler.batches().iter().position(|b| b.contains(&"a".to_string())).unwrap();
        let batch_of_b = scheduler.batches().iter().position(|b| b.contains(&"b".to_string())).unwrap();
        assert!(batch_of_b > batch_of_a);
        assert_eq!(scheduler.batches()[batch_of_a], vec!["a".to_string()]);
    }

    #[test]
    fn sync_point_does_not_join_an_earlier_non_conflicting_batch() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "x".into(),
            access: AccessDescriptor::new([1], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([2], []),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.add_sync_point("a");
        scheduler.build().unwrap();
        let batch_of_a = scheduler.batches().iter().position(|b| b.contains(&"a".to_string())).unwrap();
        assert_eq!(scheduler.batches()[batch_of_a], vec!["a".to_string()]);
    }

    #[test]
    fn cyclic_dependencies_are_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::default(),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::default(),
            log: Arc::new(Mutex::new(Vec::new())),
        }));
        scheduler.add_dependency("a", "b");
        scheduler.add_dependency("b", "a");
        assert!(scheduler.build().is_err());
    }

    #[test]
    fn sequential_execution_runs_every_system_in_build_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.set_parallel(false);
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([1], []),
            log: log.clone(),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([2], []),
            log: log.clone(),
        }));
        scheduler.build().unwrap();
        scheduler.execute(1.0 / 20.0);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn parallel_execution_runs_every_system_via_executor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.set_executor(rayon_executor());
        scheduler.register(Box::new(RecordingSystem {
            name: "a".into(),
            access: AccessDescriptor::new([1], []),
            log: log.clone(),
        }));
        scheduler.register(Box::new(RecordingSystem {
            name: "b".into(),
            access: AccessDescriptor::new([2], []),
            log: log.clone(),
        }));
        scheduler.build().unwrap();
        scheduler.execute(1.0 / 20.0);
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
