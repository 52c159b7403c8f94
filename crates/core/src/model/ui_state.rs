use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UiStateError {
    #[error("a typed UI view must serialize to a JSON object")]
    NotAnObject,
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Opaque per-component presentation state.
///
/// The engine never interprets the fields; each collaborator owns its schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiStateBag(BTreeMap<String, Value>);

impl UiStateBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for partial writes.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Shallow merge: keys in `partial` overwrite, every other key stays.
    pub fn merge(&mut self, partial: UiStateBag) {
        self.0.extend(partial.0);
    }

    /// Serialize a typed view into a partial bag.
    ///
    /// # Errors
    ///
    /// Returns `UiStateError::NotAnObject` if `view` does not serialize to a
    /// JSON object, or `UiStateError::Serde` if serialization fails.
    pub fn from_view<T: Serialize>(view: &T) -> Result<Self, UiStateError> {
        match serde_json::to_value(view)? {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            _ => Err(UiStateError::NotAnObject),
        }
    }

    /// Read the bag through a collaborator's typed view.
    ///
    /// # Errors
    ///
    /// Returns `UiStateError::Serde` if stored fields do not fit the view.
    pub fn to_view<T: DeserializeOwned>(&self) -> Result<T, UiStateError> {
        let map: Map<String, Value> = self.0.clone().into_iter().collect();
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

impl FromIterator<(String, Value)> for UiStateBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PanelPosition {
    pub x: f64,
    pub y: f64,
}

/// Standard typed view for collapsible, movable panels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelState {
    pub is_expanded: bool,
    pub is_minimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PanelPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_shallow_and_keeps_untouched_keys() {
        let mut bag = UiStateBag::new().with("a", 1);
        bag.merge(UiStateBag::new().with("b", 2));
        assert_eq!(bag.get("a"), Some(&json!(1)));
        assert_eq!(bag.get("b"), Some(&json!(2)));

        bag.merge(UiStateBag::new().with("a", json!({"nested": true})));
        assert_eq!(bag.get("a"), Some(&json!({"nested": true})));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn panel_view_round_trips_through_camel_case_fields() {
        let view = PanelState {
            is_expanded: true,
            is_minimized: false,
            position: Some(PanelPosition { x: 12.0, y: 40.5 }),
        };
        let bag = UiStateBag::from_view(&view).unwrap();
        assert_eq!(bag.get("isExpanded"), Some(&json!(true)));
        assert_eq!(bag.to_view::<PanelState>().unwrap(), view);
    }

    #[test]
    fn panel_view_defaults_missing_fields() {
        let bag = UiStateBag::new().with("isMinimized", true).with("other", "x");
        let view: PanelState = bag.to_view().unwrap();
        assert!(view.is_minimized);
        assert!(!view.is_expanded);
        assert!(view.position.is_none());
    }

    #[test]
    fn scalar_views_are_rejected() {
        assert!(matches!(
            UiStateBag::from_view(&42),
            Err(UiStateError::NotAnObject)
        ));
    }
}
