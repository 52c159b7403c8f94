use std::collections::BTreeMap;

use storage::repository::UiStateRecord;
use walkthrough_core::model::{ComponentId, UiStateBag};

/// Per-component UI-state bags with merge-on-write semantics.
///
/// Pure in-memory map; the controller persists and notifies after each write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiStateStore {
    bags: BTreeMap<ComponentId, UiStateBag>,
}

impl UiStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_record(record: UiStateRecord) -> Self {
        Self {
            bags: record.components,
        }
    }

    #[must_use]
    pub fn to_record(&self) -> UiStateRecord {
        UiStateRecord {
            components: self.bags.clone(),
        }
    }

    /// Bag for `id`, or an empty bag if nothing was ever written.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> UiStateBag {
        self.bags.get(id).cloned().unwrap_or_default()
    }

    /// Shallow-merge `partial` into the bag for `id`, creating it if absent.
    pub fn set(&mut self, id: ComponentId, partial: UiStateBag) {
        self.bags.entry(id).or_default().merge(partial);
    }

    /// Drop one component's bag. Returns whether it existed.
    pub fn remove(&mut self, id: &ComponentId) -> bool {
        self.bags.remove(id).is_some()
    }

    pub fn reset(&mut self) {
        self.bags.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    pub fn component_ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.bags.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_component_reads_as_empty_bag() {
        let store = UiStateStore::new();
        assert!(store.get(&ComponentId::new("never-written")).is_empty());
    }

    #[test]
    fn writes_merge_per_component() {
        let mut store = UiStateStore::new();
        let x = ComponentId::new("x");
        store.set(x.clone(), UiStateBag::new().with("a", 1));
        store.set(x.clone(), UiStateBag::new().with("b", 2));
        store.set(ComponentId::new("y"), UiStateBag::new().with("a", 9));

        let bag = store.get(&x);
        assert_eq!(bag.get("a"), Some(&json!(1)));
        assert_eq!(bag.get("b"), Some(&json!(2)));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn same_field_is_last_write_wins() {
        let mut store = UiStateStore::new();
        let x = ComponentId::new("x");
        store.set(x.clone(), UiStateBag::new().with("isExpanded", true));
        store.set(x.clone(), UiStateBag::new().with("isExpanded", false));
        assert_eq!(store.get(&x).get("isExpanded"), Some(&json!(false)));
    }

    #[test]
    fn empty_write_still_creates_the_entry() {
        let mut store = UiStateStore::new();
        store.set(ComponentId::new("x"), UiStateBag::new());
        assert_eq!(store.component_ids().count(), 1);
        assert!(store.get(&ComponentId::new("x")).is_empty());
    }

    #[test]
    fn record_round_trip_preserves_bags() {
        let mut store = UiStateStore::new();
        store.set(ComponentId::new("x"), UiStateBag::new().with("a", 1));
        let restored = UiStateStore::from_record(store.to_record());
        assert_eq!(restored, store);
    }
}
