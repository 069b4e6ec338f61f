//! Page-scoped labeling workflow.
//!
//! Owns the dataset store together with the state that only makes sense
//! for one dataset at a time: selection, proposed group labels, the active
//! group, the bulk-tag field and the explicit view and tagging modes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::dataset::{ApplyOutcome, DatasetStore, LoadRequest};
use crate::error::{LabelmanError, Result};
use crate::gateway::Gateway;
use crate::models::{ClusterId, DatasetItem, GroupTagMap, ItemId, TaggingMode, ViewMode};
use crate::notify::Notifier;
use crate::selection::SelectionManager;
use crate::tagging::{self, BulkOutcome, TagOutcome, TaggingEngine};
use crate::training::TrainingInput;
use crate::viewport::{Activation, Cell, Viewport};

/// What a grid activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationEffect {
    Toggled { item_id: ItemId, selected: bool },
    OpenedDetail(ItemId),
}

pub struct LabelingWorkflow {
    gateway: Arc<dyn Gateway>,
    notifier: Notifier,
    tagging: TaggingEngine,
    store: DatasetStore,
    selection: SelectionManager,
    group_tags: GroupTagMap,
    active_group: Option<ClusterId>,
    bulk_label: String,
    view_mode: ViewMode,
    tagging_mode: TaggingMode,
    viewport: Viewport,
}

impl LabelingWorkflow {
    pub fn new(gateway: Arc<dyn Gateway>, notifier: Notifier, column_count: usize) -> Self {
        Self {
            tagging: TaggingEngine::new(Arc::clone(&gateway), notifier.clone()),
            gateway,
            notifier,
            store: DatasetStore::new(),
            selection: SelectionManager::new(),
            group_tags: GroupTagMap::new(),
            active_group: None,
            bulk_label: String::new(),
            view_mode: ViewMode::Gallery,
            tagging_mode: TaggingMode::Bulk,
            viewport: Viewport::new(column_count),
        }
    }

    pub fn from_config(gateway: Arc<dyn Gateway>, notifier: Notifier, config: &ClientConfig) -> Self {
        Self::new(gateway, notifier, config.column_count)
    }

    // ─── Loading ─────────────────────────────────────────────────────────────

    /// Loads a dataset. Every successful load clears the selection;
    /// switching to a different dataset also drops the group labels.
    pub async fn open_dataset(&mut self, request: LoadRequest) -> Result<ApplyOutcome> {
        let same_dataset = self.store.dataset_id() == Some(request.dataset_id.as_str());
        if !same_dataset {
            self.selection.clear();
            self.group_tags.clear();
            self.active_group = None;
            self.bulk_label.clear();
            self.viewport.scroll_to(0.0);
        }
        let result = self.store.load(self.gateway.as_ref(), request).await;
        self.after_load(result, same_dataset)
    }

    /// Re-runs the current load, e.g. after bulk or group tagging.
    pub async fn reload(&mut self) -> Result<ApplyOutcome> {
        let result = self.store.reload(self.gateway.as_ref()).await;
        self.after_load(result, true)
    }

    fn after_load(
        &mut self,
        result: Result<ApplyOutcome>,
        same_dataset: bool,
    ) -> Result<ApplyOutcome> {
        match result {
            Ok(ApplyOutcome::Applied) => {}
            Ok(ApplyOutcome::Stale) => return Ok(ApplyOutcome::Stale),
            Err(e) => {
                self.selection.clear();
                self.active_group = None;
                self.view_mode = ViewMode::Gallery;
                self.tagging_mode = TaggingMode::Bulk;
                self.notifier.error(format!("Could not load dataset: {e}"));
                return Err(e);
            }
        }

        let collection = self.store.collection();
        if let Some(warning) = collection.cluster_warning() {
            self.notifier
                .warn(format!("Cluster groups unavailable: {warning}"));
        }

        // Ids from the previous collection must not resolve against the new one.
        self.selection.clear();
        if same_dataset {
            for (cluster, tag) in collection.hydrated_group_tags().iter() {
                let empty = self.group_tags.get(cluster).map_or(true, |t| t.trim().is_empty());
                if empty {
                    self.group_tags.set(cluster, tag);
                }
            }
        } else {
            self.group_tags = collection.hydrated_group_tags().clone();
        }

        match collection.grouping() {
            Some(grouping) => {
                let known: Vec<ClusterId> = self.group_tags.iter().map(|(c, _)| c).collect();
                for cluster in known {
                    if !grouping.contains_group(cluster) {
                        self.group_tags.remove(cluster);
                    }
                }
                if !self.active_group.is_some_and(|g| grouping.contains_group(g)) {
                    self.active_group = grouping.first_group();
                }
            }
            None => {
                self.group_tags.clear();
                self.active_group = None;
            }
        }

        self.view_mode = ViewMode::Gallery;
        self.tagging_mode = self.collection_mode();
        Ok(ApplyOutcome::Applied)
    }

    /// Tagging mode implied by the collection itself, outside detail view.
    fn collection_mode(&self) -> TaggingMode {
        match self.store.grouping() {
            Some(g) if !g.is_empty() => TaggingMode::Group,
            _ => TaggingMode::Bulk,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn group_tags(&self) -> &GroupTagMap {
        &self.group_tags
    }

    pub fn active_group(&self) -> Option<ClusterId> {
        self.active_group
    }

    pub fn bulk_label(&self) -> &str {
        &self.bulk_label
    }

    pub fn view_mode(&self) -> &ViewMode {
        &self.view_mode
    }

    pub fn tagging_mode(&self) -> &TaggingMode {
        &self.tagging_mode
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    // ─── Presentation ────────────────────────────────────────────────────────

    /// Items the gallery draws from: the active group when a grouping is
    /// loaded, the whole collection otherwise. Detail view shows one item.
    pub fn source_items(&self) -> Vec<&DatasetItem> {
        let collection = self.store.collection();
        if let ViewMode::Detail(id) = &self.view_mode {
            return collection.item(id).into_iter().collect();
        }
        match self.active_group {
            Some(group) if collection.grouping().is_some() => collection.group_items(group),
            _ => collection.items().iter().collect(),
        }
    }

    /// Cells inside the render window with their items.
    pub fn visible_cells(&self) -> Vec<(Cell, &DatasetItem)> {
        let items = self.source_items();
        self.viewport
            .visible_cells(items.len())
            .into_iter()
            .filter_map(|cell| items.get(cell.index).map(|item| (cell, *item)))
            .collect()
    }

    /// Single activation toggles selection; double activation opens the
    /// detail view. Cells past the end of the list do nothing.
    pub fn activate(
        &mut self,
        row: usize,
        column: usize,
        activation: Activation,
    ) -> Option<ActivationEffect> {
        if !matches!(self.view_mode, ViewMode::Gallery) {
            return None;
        }
        let item_id = {
            let items = self.source_items();
            self.viewport.cell(&items, row, column)?.item_id.clone()
        };
        match activation {
            Activation::Single => {
                let selected = self.selection.toggle(&item_id);
                Some(ActivationEffect::Toggled { item_id, selected })
            }
            Activation::Double => {
                self.enter_detail(item_id.clone());
                Some(ActivationEffect::OpenedDetail(item_id))
            }
        }
    }

    fn enter_detail(&mut self, item_id: ItemId) {
        debug!(item = %item_id, "Entering detail view");
        self.selection.clear();
        self.tagging_mode = TaggingMode::Individual(item_id.clone());
        self.view_mode = ViewMode::Detail(item_id);
    }

    pub fn open_detail(&mut self, item_id: &str) -> Result<()> {
        if !self.store.collection().contains(item_id) {
            return Err(LabelmanError::UnknownItem(item_id.to_string()));
        }
        self.enter_detail(item_id.to_string());
        Ok(())
    }

    /// Returns to the gallery; the loaded collection is untouched.
    pub fn back_to_gallery(&mut self) {
        self.view_mode = ViewMode::Gallery;
        self.tagging_mode = self.collection_mode();
    }

    // ─── Selection & modes ───────────────────────────────────────────────────

    pub fn toggle_selection(&mut self, item_id: &str) -> Result<bool> {
        if !self.store.collection().contains(item_id) {
            return Err(LabelmanError::UnknownItem(item_id.to_string()));
        }
        Ok(self.selection.toggle(item_id))
    }

    /// Selects every item the gallery currently draws from.
    pub fn select_all(&mut self) {
        let ids: Vec<ItemId> = self
            .source_items()
            .into_iter()
            .map(|i| i.item_id.clone())
            .collect();
        self.selection.replace(ids);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn set_tagging_mode(&mut self, mode: TaggingMode) -> Result<()> {
        match &mode {
            TaggingMode::Group => {
                if self.store.grouping().map_or(true, |g| g.is_empty()) {
                    return Err(self.rejected(LabelmanError::NoGrouping));
                }
                self.view_mode = ViewMode::Gallery;
            }
            TaggingMode::Individual(id) => {
                if !self.store.collection().contains(id) {
                    return Err(self.rejected(LabelmanError::UnknownItem(id.clone())));
                }
            }
            TaggingMode::Bulk => {
                self.view_mode = ViewMode::Gallery;
            }
        }
        self.tagging_mode = mode;
        Ok(())
    }

    pub fn set_active_group(&mut self, cluster: ClusterId) -> Result<()> {
        self.require_group(cluster)?;
        self.active_group = Some(cluster);
        self.viewport.scroll_to(0.0);
        Ok(())
    }

    pub fn set_group_label(&mut self, cluster: ClusterId, label: impl Into<String>) -> Result<()> {
        self.require_group(cluster)?;
        self.group_tags.set(cluster, label);
        Ok(())
    }

    fn require_group(&self, cluster: ClusterId) -> Result<()> {
        let known = match self.store.grouping() {
            Some(grouping) => grouping.contains_group(cluster),
            None => return Err(self.rejected(LabelmanError::NoGrouping)),
        };
        if !known {
            return Err(self.rejected(LabelmanError::validation(format!(
                "Unknown cluster: {cluster}"
            ))));
        }
        Ok(())
    }

    /// Warns the user about a rejected action and hands the error back.
    fn rejected(&self, e: LabelmanError) -> LabelmanError {
        self.notifier.warn(e.to_string());
        e
    }

    pub fn set_bulk_label(&mut self, label: impl Into<String>) {
        self.bulk_label = label.into();
    }

    /// The item individual tagging applies to: the detail item, or the only
    /// selected item.
    pub fn focused_item(&self) -> Option<&str> {
        match &self.tagging_mode {
            TaggingMode::Individual(id) => Some(id.as_str()),
            _ => self.selection.single(),
        }
    }

    // ─── Tagging ─────────────────────────────────────────────────────────────

    /// AI-suggested labels across the selection, most frequent first.
    pub fn common_suggestions(&self) -> Vec<(String, usize)> {
        tagging::common_suggestions(self.store.collection(), self.selection.ids())
    }

    /// Fills the bulk-tag field with the most common suggestion.
    pub fn prefill_bulk_label(&mut self) -> Option<&str> {
        let (top, _) = self.common_suggestions().into_iter().next()?;
        self.bulk_label = top;
        Some(self.bulk_label.as_str())
    }

    pub async fn add_tag(&mut self, label: &str) -> Result<TagOutcome> {
        let item_id = self.require_focus()?;
        self.tagging.add_tag(&mut self.store, &item_id, label).await
    }

    pub async fn add_tag_to(&mut self, item_id: &str, label: &str) -> Result<TagOutcome> {
        self.tagging.add_tag(&mut self.store, item_id, label).await
    }

    pub async fn add_suggestion(&mut self, item_id: &str, label: &str) -> Result<TagOutcome> {
        self.tagging
            .add_from_suggestion(&mut self.store, item_id, label)
            .await
    }

    pub async fn delete_tag(&mut self, item_id: &str, label: &str) -> Result<()> {
        self.tagging.delete_tag(&mut self.store, item_id, label).await
    }

    fn require_focus(&self) -> Result<ItemId> {
        self.focused_item()
            .map(str::to_string)
            .ok_or_else(|| self.rejected(LabelmanError::validation("Select exactly one image to tag")))
    }

    /// Tags the selection with the bulk label, then reloads.
    pub async fn apply_bulk_tag(&mut self) -> Result<BulkOutcome> {
        let ids = self.selection.to_vec();
        let outcome = match self.tagging.apply_bulk_tag(&self.bulk_label, &ids).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.rejected(e)),
        };
        if let Err(e) = self.reload().await {
            warn!(error = %e, "Reload after bulk tagging failed");
        }
        Ok(outcome)
    }

    /// Sends the labeled groups in one request, then reloads.
    pub async fn apply_group_tags(&mut self) -> Result<String> {
        let Some(grouping) = self.store.grouping().cloned() else {
            return Err(self.rejected(LabelmanError::NoGrouping));
        };
        let message = match self.tagging.apply_group_tags(&grouping, &self.group_tags).await {
            Ok(message) => message,
            Err(e @ LabelmanError::Validation(_)) => return Err(self.rejected(e)),
            Err(e) => return Err(e),
        };
        if let Err(e) = self.reload().await {
            warn!(error = %e, "Reload after group tagging failed");
        }
        Ok(message)
    }

    // ─── Training gate ───────────────────────────────────────────────────────

    /// The mode readiness is judged in. The detail view of a grouped
    /// dataset still trains from the group labels.
    fn readiness_mode(&self) -> TaggingMode {
        match &self.tagging_mode {
            TaggingMode::Individual(_) => self.collection_mode(),
            mode => mode.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        tagging::is_ready(
            &self.readiness_mode(),
            &self.group_tags,
            &self.bulk_label,
            &self.selection,
        )
    }

    /// Where training should take its labels from, if tagging is ready.
    pub fn training_input(&self) -> Result<TrainingInput> {
        let mode = self.readiness_mode();
        if !self.is_ready() {
            return Err(self.rejected(LabelmanError::validation(match mode {
                TaggingMode::Group => "Label at least one group before training",
                _ => "Select images and enter a tag before training",
            })));
        }
        Ok(match mode {
            TaggingMode::Group => {
                TrainingInput::from_grouping(self.store.grouping(), &self.group_tags)
            }
            _ => TrainingInput::custom_tags(),
        })
    }
}
