//! Dataset store: loads and merges item metadata, signed display URLs and
//! optional cluster assignments into one canonical collection.
//!
//! A load is three steps so callers can run the fetch detached:
//! [`DatasetStore::begin_load`] hands out a [`LoadTicket`],
//! [`DatasetStore::fetch`] talks to the gateway without touching the store,
//! and [`DatasetStore::apply`] publishes the result only if the ticket is
//! still the latest one. [`DatasetStore::load`] chains the three.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::error::{LabelmanError, Result};
use crate::gateway::{ClusterAssignment, DatasetPayload, Gateway};
use crate::models::{ClusterGrouping, ClusterId, DatasetItem, GroupTagMap, ItemId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub dataset_id: String,
    pub cluster_result_id: Option<String>,
}

impl LoadRequest {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            cluster_result_id: None,
        }
    }

    pub fn with_clusters(mut self, cluster_result_id: impl Into<String>) -> Self {
        self.cluster_result_id = Some(cluster_result_id.into());
        self
    }
}

/// Identifies one load attempt; only the latest ticket may publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    request: LoadRequest,
}

impl LoadTicket {
    pub fn request(&self) -> &LoadRequest {
        &self.request
    }
}

/// Raw results of the concurrent fetches, not yet merged.
#[derive(Debug)]
pub struct FetchOutcome {
    items: Result<DatasetPayload>,
    clusters: Option<Result<Vec<ClusterAssignment>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer load started meanwhile; the result was discarded.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// The published, merged collection. Replaced wholesale on every load.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub dataset_id: String,
    pub dataset_name: Option<String>,
    items: Vec<DatasetItem>,
    index: HashMap<ItemId, usize>,
    path_index: HashMap<String, usize>,
    grouping: Option<ClusterGrouping>,
    hydrated_group_tags: GroupTagMap,
    /// Why the optional cluster fetch was dropped, if it was.
    cluster_warning: Option<String>,
}

impl Collection {
    /// Merges a dataset payload with an optional cluster result.
    pub fn build(
        dataset_id: impl Into<String>,
        payload: DatasetPayload,
        clusters: Option<(&str, &[ClusterAssignment])>,
    ) -> Self {
        let dataset_id = dataset_id.into();
        let signed_urls: HashMap<&str, Option<&str>> = payload
            .image_data
            .iter()
            .map(|img| (img.id.as_str(), img.signed_url.as_deref()))
            .collect();

        let mut items: Vec<DatasetItem> = Vec::with_capacity(payload.analysis_data.len());
        let mut index = HashMap::with_capacity(payload.analysis_data.len());
        let mut path_index = HashMap::with_capacity(payload.analysis_data.len());
        for row in &payload.analysis_data {
            if index.contains_key(&row.image_id) {
                warn!(dataset = %dataset_id, item = %row.image_id, "Duplicate item id, keeping the first");
                continue;
            }
            index.insert(row.image_id.clone(), items.len());
            path_index
                .entry(row.storage_path.clone())
                .or_insert(items.len());
            items.push(DatasetItem {
                item_id: row.image_id.clone(),
                storage_path: row.storage_path.clone(),
                display_ref: signed_urls
                    .get(row.image_id.as_str())
                    .copied()
                    .flatten()
                    .map(str::to_string),
                ai_suggested_tags: row.tags_ia.clone(),
                custom_tags: row.custom_tags.iter().cloned().collect(),
                cluster_id: None,
            });
        }

        let skipped = payload
            .image_data
            .iter()
            .filter(|img| !index.contains_key(&img.id))
            .count();
        if skipped > 0 {
            debug!(dataset = %dataset_id, skipped, "Images without analysis data were skipped");
        }

        let mut collection = Self {
            dataset_id,
            dataset_name: payload.dataset_name,
            items,
            index,
            path_index,
            ..Default::default()
        };
        if let Some((cluster_result_id, assignments)) = clusters {
            collection.join_clusters(cluster_result_id, assignments);
        }
        collection
    }

    /// Assigns cluster ids by storage path and derives the grouping. The
    /// first assignment of a path wins; paths not in the collection are
    /// ignored so the grouping partitions the loaded items only.
    fn join_clusters(&mut self, cluster_result_id: &str, assignments: &[ClusterAssignment]) {
        let mut lookup: HashMap<&str, ClusterId> = HashMap::with_capacity(assignments.len());
        let mut groups: IndexMap<ClusterId, IndexSet<String>> = IndexMap::new();
        for a in assignments {
            if !self.path_index.contains_key(&a.storage_path) {
                continue;
            }
            if let Some(existing) = lookup.get(a.storage_path.as_str()) {
                if *existing != a.cluster_id {
                    warn!(path = %a.storage_path, kept = existing, dropped = a.cluster_id, "Storage path assigned to two clusters");
                }
                continue;
            }
            lookup.insert(&a.storage_path, a.cluster_id);
            groups
                .entry(a.cluster_id)
                .or_default()
                .insert(a.storage_path.clone());
        }

        for item in &mut self.items {
            item.cluster_id = lookup.get(item.storage_path.as_str()).copied();
        }

        // Session resume: a group whose first member already carries a
        // custom tag starts with that tag proposed.
        let mut hydrated = GroupTagMap::new();
        for (cluster, members) in &groups {
            let first_tag = members
                .first()
                .and_then(|path| self.path_index.get(path))
                .and_then(|&i| self.items[i].custom_tags.first());
            if let Some(tag) = first_tag {
                hydrated.set(*cluster, tag.clone());
            }
        }

        self.grouping = Some(ClusterGrouping {
            cluster_result_id: cluster_result_id.to_string(),
            groups,
        });
        self.hydrated_group_tags = hydrated;
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Option<&DatasetItem> {
        self.index.get(item_id).map(|&i| &self.items[i])
    }

    pub fn item_by_path(&self, storage_path: &str) -> Option<&DatasetItem> {
        self.path_index.get(storage_path).map(|&i| &self.items[i])
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    pub fn grouping(&self) -> Option<&ClusterGrouping> {
        self.grouping.as_ref()
    }

    pub fn hydrated_group_tags(&self) -> &GroupTagMap {
        &self.hydrated_group_tags
    }

    pub fn cluster_warning(&self) -> Option<&str> {
        self.cluster_warning.as_deref()
    }

    /// Members of one cluster, in grouping order.
    pub fn group_items(&self, cluster: ClusterId) -> Vec<&DatasetItem> {
        self.grouping
            .as_ref()
            .and_then(|g| g.members(cluster))
            .map(|paths| paths.iter().filter_map(|p| self.item_by_path(p)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug)]
pub struct DatasetStore {
    generation: u64,
    request: Option<LoadRequest>,
    state: LoadState,
    collection: Collection,
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self {
            generation: 0,
            request: None,
            state: LoadState::Idle,
            collection: Collection::default(),
        }
    }
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a load, invalidating any load still in flight.
    pub fn begin_load(&mut self, request: LoadRequest) -> LoadTicket {
        self.generation += 1;
        self.state = LoadState::Loading;
        self.request = Some(request.clone());
        debug!(dataset = %request.dataset_id, generation = self.generation, "Dataset load started");
        LoadTicket {
            generation: self.generation,
            request,
        }
    }

    /// Runs the item fetch and the optional cluster fetch concurrently and
    /// waits for both to settle.
    pub async fn fetch(gateway: &dyn Gateway, request: &LoadRequest) -> FetchOutcome {
        let items = gateway.fetch_dataset_items(&request.dataset_id);
        let clusters = async {
            match &request.cluster_result_id {
                Some(id) => Some(gateway.fetch_cluster_result(id).await),
                None => None,
            }
        };
        let (items, clusters) = tokio::join!(items, clusters);
        FetchOutcome { items, clusters }
    }

    /// Publishes a fetch result atomically. A failed item fetch empties the
    /// collection and records the error; a failed cluster fetch only drops
    /// the grouping.
    pub fn apply(&mut self, ticket: LoadTicket, outcome: FetchOutcome) -> Result<ApplyOutcome> {
        if ticket.generation != self.generation {
            debug!(
                dataset = %ticket.request.dataset_id,
                generation = ticket.generation,
                current = self.generation,
                "Discarding stale dataset load"
            );
            return Ok(ApplyOutcome::Stale);
        }
        let request = ticket.request;

        let payload = match outcome.items {
            Ok(payload) => payload,
            Err(e) => {
                warn!(dataset = %request.dataset_id, error = %e, "Dataset load failed");
                self.collection = Collection {
                    dataset_id: request.dataset_id,
                    ..Default::default()
                };
                self.state = LoadState::Failed(e.to_string());
                return Err(e);
            }
        };

        let mut cluster_warning = None;
        let assignments = match (outcome.clusters, &request.cluster_result_id) {
            (Some(Ok(assignments)), Some(id)) => Some((id.as_str(), assignments)),
            (Some(Err(e)), _) => {
                warn!(dataset = %request.dataset_id, error = %e, "Cluster result unavailable, loading without grouping");
                cluster_warning = Some(e.to_string());
                None
            }
            _ => None,
        };

        let mut collection = Collection::build(
            request.dataset_id.clone(),
            payload,
            assignments
                .as_ref()
                .map(|(id, a)| (*id, a.as_slice())),
        );
        collection.cluster_warning = cluster_warning;

        info!(
            dataset = %request.dataset_id,
            items = collection.len(),
            groups = collection.grouping().map(|g| g.len()).unwrap_or(0),
            "Dataset loaded"
        );
        self.collection = collection;
        self.state = LoadState::Ready;
        Ok(ApplyOutcome::Applied)
    }

    pub async fn load(&mut self, gateway: &dyn Gateway, request: LoadRequest) -> Result<ApplyOutcome> {
        let ticket = self.begin_load(request);
        let outcome = Self::fetch(gateway, ticket.request()).await;
        self.apply(ticket, outcome)
    }

    /// Re-runs the last load request.
    pub async fn reload(&mut self, gateway: &dyn Gateway) -> Result<ApplyOutcome> {
        let request = self
            .request
            .clone()
            .ok_or_else(|| LabelmanError::validation("No dataset has been loaded"))?;
        self.load(gateway, request).await
    }

    /// Edits one item's custom tags in place; reserved for confirmed
    /// individual tag mutations.
    pub fn patch_custom_tags(
        &mut self,
        item_id: &str,
        patch: impl FnOnce(&mut IndexSet<String>),
    ) -> Result<()> {
        let idx = *self
            .collection
            .index
            .get(item_id)
            .ok_or_else(|| LabelmanError::UnknownItem(item_id.to_string()))?;
        patch(&mut self.collection.items[idx].custom_tags);
        Ok(())
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn items(&self) -> &[DatasetItem] {
        self.collection.items()
    }

    pub fn item(&self, item_id: &str) -> Option<&DatasetItem> {
        self.collection.item(item_id)
    }

    pub fn grouping(&self) -> Option<&ClusterGrouping> {
        self.collection.grouping()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn request(&self) -> Option<&LoadRequest> {
        self.request.as_ref()
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.dataset_id.as_str())
    }
}
