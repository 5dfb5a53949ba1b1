use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Manual node placements keyed by node id.
///
/// Entries are only written when a drag ends and are never pruned when their
/// node disappears; a stale entry is unreachable because ids are not reused.
/// Only an explicit reset empties the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionStore(HashMap<String, Position>);

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-entry mapping, the shape a completed drag reports.
    pub fn single(id: impl Into<String>, position: Position) -> Self {
        let mut store = Self::new();
        store.insert(id, position);
        store
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        self.0.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Last write wins.
    pub fn insert(&mut self, id: impl Into<String>, position: Position) {
        self.0.insert(id.into(), position);
    }

    /// Fold a partial mapping into this one.
    pub fn merge(&mut self, update: PositionStore) {
        self.0.extend(update.0);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Position)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, Position)> for PositionStore {
    fn from_iter<I: IntoIterator<Item = (String, Position)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_keeps_others() {
        let mut store = PositionStore::single("a", Position::new(1.0, 2.0));
        store.insert("b", Position::new(3.0, 4.0));
        store.merge(PositionStore::single("a", Position::new(9.0, 9.0)));
        assert_eq!(store.get("a"), Some(Position::new(9.0, 9.0)));
        assert_eq!(store.get("b"), Some(Position::new(3.0, 4.0)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn serializes_as_plain_map() {
        let store = PositionStore::single("n1", Position::new(100.0, 200.0));
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json, serde_json::json!({"n1": {"x": 100.0, "y": 200.0}}));
        let back: PositionStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
