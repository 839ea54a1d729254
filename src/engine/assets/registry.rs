// Priority-ordered registry of task types

use super::descriptor::AssetDescriptor;
use super::task::TaskType;
use std::rc::Rc;

/// A registered task type
struct RegistryEntry {
    task_type: Rc<dyn TaskType>,
    priority: i32,
    /// Registration sequence, breaks priority ties
    order: usize,
}

/// Ordered list of task types, scanned for the first whose predicate matches
///
/// Sorted by descending priority. Equal priorities keep registration order,
/// so the earlier registration wins.
#[derive(Default)]
pub struct TaskRegistry {
    entries: Vec<RegistryEntry>,
    next_order: usize,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type at a priority
    pub fn register(&mut self, task_type: Rc<dyn TaskType>, priority: i32) {
        debug_assert!(
            !task_type.name().is_empty(),
            "task types must be named to be registered"
        );
        log::debug!("Registering task type '{}' at priority {}", task_type.name(), priority);

        self.entries.push(RegistryEntry {
            task_type,
            priority,
            order: self.next_order,
        });
        self.next_order += 1;
        self.entries
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
    }

    /// Find the task type for a descriptor
    pub fn find(&self, asset: &AssetDescriptor) -> Option<Rc<dyn TaskType>> {
        self.entries
            .iter()
            .find(|entry| entry.task_type.test(asset))
            .map(|entry| entry.task_type.clone())
    }

    /// Names of registered types, in match order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.task_type.name()).collect()
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
