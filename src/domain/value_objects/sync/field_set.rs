use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ミューテーションが触れるカウンター・フラグ名の集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet(BTreeSet<String>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(names: &[&str]) -> Self {
        Self(names.iter().map(|name| name.to_string()).collect())
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn union(&self, other: &FieldSet) -> FieldSet {
        Self(self.0.union(&other.0).cloned().collect())
    }
}
