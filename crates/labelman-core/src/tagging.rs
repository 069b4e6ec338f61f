//! Tagging engine: individual, bulk-over-selection and group-over-cluster
//! strategies, all writing through the gateway.
//!
//! Individual adds and deletes patch the store only after the remote
//! confirms. Bulk and group writes never patch locally; callers reload.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::dataset::{Collection, DatasetStore};
use crate::error::{LabelmanError, Result};
use crate::gateway::{BulkTagRequest, Gateway};
use crate::models::{ClusterGrouping, GroupTagMap, ItemId, TaggingMode};
use crate::notify::Notifier;
use crate::selection::SelectionManager;

/// Result of an individual add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    Added,
    /// The item already carried the label; nothing was sent.
    AlreadyPresent,
}

/// Per-item results of a bulk application. Partial application is a
/// normal outcome: successful items stay tagged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub label: String,
    pub applied: Vec<ItemId>,
    pub failed: Vec<(ItemId, String)>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// Trims a label and rejects it if nothing is left.
pub fn normalize_label(label: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(LabelmanError::validation("Tag label cannot be empty"));
    }
    Ok(label.to_string())
}

/// Whether the session may move on to training.
pub fn is_ready(
    mode: &TaggingMode,
    group_tags: &GroupTagMap,
    bulk_label: &str,
    selection: &SelectionManager,
) -> bool {
    match mode {
        TaggingMode::Group => group_tags.has_any_label(),
        TaggingMode::Individual(_) | TaggingMode::Bulk => {
            !bulk_label.trim().is_empty() && !selection.is_empty()
        }
    }
}

/// AI-suggested labels across the given items, most frequent first. Ties
/// keep first-seen order.
pub fn common_suggestions<'a>(
    collection: &Collection,
    item_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<(String, usize)> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for item in item_ids.into_iter().filter_map(|id| collection.item(id)) {
        for tag in &item.ai_suggested_tags {
            *counts.entry(tag.label.as_str()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, n)| (label.to_string(), n))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[derive(Clone)]
pub struct TaggingEngine {
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
}

impl TaggingEngine {
    pub fn new(gateway: Arc<dyn Gateway>, notifier: Notifier) -> Self {
        Self { gateway, notifier }
    }

    /// Adds a custom tag to one item. Duplicate labels short-circuit with
    /// [`TagOutcome::AlreadyPresent`] and an informational notification.
    pub async fn add_tag(
        &self,
        store: &mut DatasetStore,
        item_id: &str,
        label: &str,
    ) -> Result<TagOutcome> {
        let label = match normalize_label(label) {
            Ok(label) => label,
            Err(e) => {
                self.notifier.warn(e.to_string());
                return Err(e);
            }
        };
        let item = store
            .item(item_id)
            .ok_or_else(|| LabelmanError::UnknownItem(item_id.to_string()))?;
        if item.has_tag(&label) {
            self.notifier
                .info(format!("Tag '{label}' is already on this image"));
            return Ok(TagOutcome::AlreadyPresent);
        }

        if let Err(e) = self.gateway.add_tag(item_id, &label).await {
            self.notifier.error(format!("Could not add tag '{label}': {e}"));
            return Err(e);
        }

        store.patch_custom_tags(item_id, |tags| {
            tags.insert(label.clone());
        })?;
        info!(item = %item_id, label = %label, "Tag added");
        self.notifier.success(format!("Tag '{label}' added"));
        Ok(TagOutcome::Added)
    }

    /// Adds one of the item's AI-suggested labels as a custom tag.
    pub async fn add_from_suggestion(
        &self,
        store: &mut DatasetStore,
        item_id: &str,
        label: &str,
    ) -> Result<TagOutcome> {
        let item = store
            .item(item_id)
            .ok_or_else(|| LabelmanError::UnknownItem(item_id.to_string()))?;
        if !item.has_suggestion(label) {
            return Err(LabelmanError::validation(format!(
                "'{label}' is not a suggestion for this image"
            )));
        }
        self.add_tag(store, item_id, label).await
    }

    /// Deletes a custom tag. The store is only touched once the remote
    /// confirms; on failure local state is left as it was.
    pub async fn delete_tag(
        &self,
        store: &mut DatasetStore,
        item_id: &str,
        label: &str,
    ) -> Result<()> {
        if !store.collection().contains(item_id) {
            return Err(LabelmanError::UnknownItem(item_id.to_string()));
        }

        if let Err(e) = self.gateway.delete_tag(item_id, label).await {
            self.notifier
                .error(format!("Could not delete tag '{label}': {e}"));
            return Err(e);
        }

        store.patch_custom_tags(item_id, |tags| {
            tags.shift_remove(label);
        })?;
        info!(item = %item_id, label = %label, "Tag deleted");
        self.notifier.success(format!("Tag '{label}' removed"));
        Ok(())
    }

    /// Applies `label` to every id, one request at a time, in order. A failed
    /// item does not stop the rest; failures are reported in the outcome and
    /// through a single notification.
    pub async fn apply_bulk_tag(&self, label: &str, item_ids: &[ItemId]) -> Result<BulkOutcome> {
        let label = normalize_label(label)?;
        if item_ids.is_empty() {
            return Err(LabelmanError::validation("Select at least one image to tag"));
        }

        let mut outcome = BulkOutcome {
            label: label.clone(),
            ..Default::default()
        };
        for item_id in item_ids {
            match self.gateway.add_tag(item_id, &label).await {
                Ok(()) => outcome.applied.push(item_id.clone()),
                Err(e) => {
                    warn!(item = %item_id, label = %label, error = %e, "Bulk tag failed for item");
                    outcome.failed.push((item_id.clone(), e.to_string()));
                }
            }
        }

        if outcome.is_complete() {
            self.notifier.success(format!(
                "Tagged {} images with '{label}'",
                outcome.applied.len()
            ));
        } else {
            self.notifier.error(format!(
                "Tagged {} of {} images with '{label}'; {} failed",
                outcome.applied.len(),
                outcome.attempted(),
                outcome.failed.len()
            ));
        }
        Ok(outcome)
    }

    /// Sends every labeled group in one request; the server tags members.
    pub async fn apply_group_tags(
        &self,
        grouping: &ClusterGrouping,
        group_tags: &GroupTagMap,
    ) -> Result<String> {
        let labeled: GroupTagMap = group_tags
            .labeled()
            .iter()
            .filter(|(cluster, _)| {
                let known = grouping.contains_group(*cluster);
                if !known {
                    debug!(cluster, "Skipping label for unknown cluster");
                }
                known
            })
            .map(|(cluster, label)| (cluster, label.to_string()))
            .collect();
        if labeled.is_empty() {
            return Err(LabelmanError::validation(
                "Enter a label for at least one group",
            ));
        }

        let request = BulkTagRequest {
            cluster_result_id: grouping.cluster_result_id.clone(),
            group_labels: labeled,
        };
        match self.gateway.bulk_tag_by_cluster(&request).await {
            Ok(message) => {
                info!(
                    cluster_result = %request.cluster_result_id,
                    groups = request.group_labels.len(),
                    "Group tags applied"
                );
                let shown = if message.is_empty() {
                    format!("Tagged {} groups", request.group_labels.len())
                } else {
                    message.clone()
                };
                self.notifier.success(shown);
                Ok(message)
            }
            Err(e) => {
                self.notifier.error(format!("Could not tag groups: {e}"));
                Err(e)
            }
        }
    }
}
