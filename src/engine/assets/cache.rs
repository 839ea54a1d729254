// Id-keyed store for results that outlive a single load

use super::content::{AssetContent, AssetRef};
use super::descriptor::AssetDescriptor;
use std::cell::RefCell;
use std::collections::HashMap;

/// Cross-session asset cache
///
/// At most one value lives per id. Replacing or deleting a value destroys it.
/// Values are removed from the map before they are destroyed, so a
/// resource's `destroy` may touch the cache again.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: RefCell<HashMap<String, AssetRef>>,
}

impl AssetCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, destroying whatever the id held before
    pub fn write(&self, id: &str, content: AssetRef) {
        let previous = self.entries.borrow_mut().insert(id.to_string(), content.clone());

        if let Some(previous) = previous {
            if !std::rc::Rc::ptr_eq(&previous, &content) {
                log::debug!("Replacing cached asset '{}'", id);
                destroy_value(&previous);
            }
        }
    }

    /// Read a value by id
    pub fn read(&self, id: &str) -> Option<AssetRef> {
        let value = self.entries.borrow().get(id).cloned();
        if value.is_none() {
            log::debug!("No cached asset for id '{}'", id);
        }
        value
    }

    /// Check if an id has a cached value
    pub fn contains(&self, id: &str) -> bool {
        self.entries.borrow().contains_key(id)
    }

    /// Remove and destroy a value by id
    ///
    /// Returns true if something was removed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.entries.borrow_mut().remove(id);
        match removed {
            Some(value) => {
                destroy_value(&value);
                true
            }
            None => false,
        }
    }

    /// Remove and destroy the value cached under a descriptor's id
    pub fn delete_asset(&self, asset: &AssetDescriptor) -> bool {
        match asset.id.as_deref() {
            Some(id) => self.delete(id),
            None => false,
        }
    }

    /// Remove and destroy every value
    pub fn empty(&self) {
        let drained: Vec<AssetRef> = self.entries.borrow_mut().drain().map(|(_, v)| v).collect();
        for value in &drained {
            destroy_value(value);
        }
    }

    /// Get the number of cached values
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Get all cached ids
    pub fn ids(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

/// Destroy a cached value, one level into list and map results
fn destroy_value(value: &AssetContent) {
    match value {
        AssetContent::List(items) => {
            for item in items.iter().flatten() {
                item.destroy();
            }
        }
        AssetContent::Map(items) => {
            for item in items.values().flatten() {
                item.destroy();
            }
        }
        other => other.destroy(),
    }
}
