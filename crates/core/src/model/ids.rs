use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, caller-chosen key for a UI component's state bag
/// (e.g. `"problems-slide"`, `"collision-counter"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one tour definition; persisted records are namespaced by it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TourKey(String);

impl TourKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key of the tour-progress record.
    #[must_use]
    pub fn progress_key(&self) -> String {
        format!("{}/progress", self.0)
    }

    /// Storage key of the UI-state record. Independent of the progress record.
    #[must_use]
    pub fn ui_state_key(&self) -> String {
        format!("{}/ui-state", self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TourKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TourKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({:?})", self.0)
    }
}

impl fmt::Debug for TourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TourKey({:?})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tour_key_namespaces_both_records() {
        let key = TourKey::new("gas-laws");
        assert_eq!(key.progress_key(), "gas-laws/progress");
        assert_eq!(key.ui_state_key(), "gas-laws/ui-state");
        assert_ne!(key.progress_key(), key.ui_state_key());
    }

    #[test]
    fn component_id_serializes_as_plain_string() {
        let id = ComponentId::from("collision-counter");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"collision-counter\"");
        assert_eq!(format!("{id}"), "collision-counter");
    }
}
