//! Selection manager: the set of selected item ids, in selection order.

use indexmap::IndexSet;

use crate::models::{DatasetItem, ItemId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionManager {
    selected: IndexSet<ItemId>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the id if absent, removes it if present. Returns whether the id
    /// is selected afterwards.
    pub fn toggle(&mut self, item_id: &str) -> bool {
        if self.selected.shift_remove(item_id) {
            false
        } else {
            self.selected.insert(item_id.to_string());
            true
        }
    }

    pub fn select_all(&mut self, items: &[DatasetItem]) {
        self.replace(items.iter().map(|i| i.item_id.clone()));
    }

    /// Replaces the selection wholesale.
    pub fn replace(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.selected = ids.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Drops ids for which `keep` is false.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.selected.retain(|id| keep(id));
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.selected.contains(item_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<ItemId> {
        self.selected.iter().cloned().collect()
    }

    /// The only selected id, if exactly one is selected.
    pub fn single(&self) -> Option<&str> {
        if self.selected.len() == 1 {
            self.selected.first().map(String::as_str)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
