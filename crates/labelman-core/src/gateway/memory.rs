//! In-process gateway over a YAML fixture.
//!
//! Backs the development server and the test suite. Every call is recorded
//! in arrival order; failures and latency can be injected per endpoint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{
    AnalysisRow, BulkTagRequest, ClusterAssignment, DatasetPayload, Gateway, ImageRef,
    SaveModelRequest, TrainRequest,
};
use crate::error::{LabelmanError, Result};
use crate::models::{ClassMetrics, ReportEntry, SuggestedTag, TrainingResults};

// ─── Fixture ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub datasets: IndexMap<String, FixtureDataset>,
    /// Cluster result id → assignments.
    #[serde(default)]
    pub cluster_results: IndexMap<String, Vec<ClusterAssignment>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureDataset {
    pub name: String,
    #[serde(default)]
    pub items: Vec<FixtureItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    pub id: String,
    pub storage_path: String,
    #[serde(default)]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub ai_tags: Vec<SuggestedTag>,
    #[serde(default)]
    pub custom_tags: Vec<String>,
}

impl Fixture {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn item_mut(&mut self, item_id: &str) -> Option<&mut FixtureItem> {
        self.datasets
            .values_mut()
            .flat_map(|d| d.items.iter_mut())
            .find(|i| i.id == item_id)
    }

    fn item(&self, item_id: &str) -> Option<&FixtureItem> {
        self.datasets
            .values()
            .flat_map(|d| d.items.iter())
            .find(|i| i.id == item_id)
    }
}

// ─── Call log ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    DatasetItems,
    ClusterResult,
    ListTags,
    AddTag,
    DeleteTag,
    BulkTag,
    Train,
    SaveModel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    DatasetItems { dataset_id: String },
    ClusterResult { cluster_result_id: String },
    ListTags { item_id: String },
    AddTag { item_id: String, label: String },
    DeleteTag { item_id: String, label: String },
    BulkTag(BulkTagRequest),
    Train(TrainRequest),
    SaveModel(SaveModelRequest),
}

impl GatewayCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            GatewayCall::DatasetItems { .. } => Endpoint::DatasetItems,
            GatewayCall::ClusterResult { .. } => Endpoint::ClusterResult,
            GatewayCall::ListTags { .. } => Endpoint::ListTags,
            GatewayCall::AddTag { .. } => Endpoint::AddTag,
            GatewayCall::DeleteTag { .. } => Endpoint::DeleteTag,
            GatewayCall::BulkTag(_) => Endpoint::BulkTag,
            GatewayCall::Train(_) => Endpoint::Train,
            GatewayCall::SaveModel(_) => Endpoint::SaveModel,
        }
    }
}

// ─── Gateway ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Backend {
    fixture: Fixture,
    calls: Vec<GatewayCall>,
    failures: HashMap<Endpoint, String>,
    item_failures: HashMap<String, String>,
    latency: HashMap<Endpoint, Duration>,
    training_response: Option<TrainingResults>,
    saved_models: Vec<SaveModelRequest>,
}

#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Backend>,
}

impl MemoryGateway {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            inner: Mutex::new(Backend {
                fixture,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every subsequent call to `endpoint` answers `success: false` with `message`.
    pub fn fail(&self, endpoint: Endpoint, message: impl Into<String>) {
        self.lock().failures.insert(endpoint, message.into());
    }

    /// Tag mutations on this item fail with `message`.
    pub fn fail_item(&self, item_id: impl Into<String>, message: impl Into<String>) {
        self.lock().item_failures.insert(item_id.into(), message.into());
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.lock().failures.remove(&endpoint);
    }

    pub fn set_latency(&self, endpoint: Endpoint, latency: Duration) {
        self.lock().latency.insert(endpoint, latency);
    }

    /// Answer training submissions with these results instead of synthesizing them.
    pub fn set_training_response(&self, results: TrainingResults) {
        self.lock().training_response = Some(results);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn saved_models(&self) -> Vec<SaveModelRequest> {
        self.lock().saved_models.clone()
    }

    /// Server-side view of an item's custom tags.
    pub fn custom_tags(&self, item_id: &str) -> Option<Vec<String>> {
        self.lock().fixture.item(item_id).map(|i| i.custom_tags.clone())
    }

    pub fn fixture(&self) -> Fixture {
        self.lock().fixture.clone()
    }

    /// Records the call, then applies injected latency and failure.
    async fn enter(&self, call: GatewayCall) -> Result<()> {
        let endpoint = call.endpoint();
        let (latency, failure) = {
            let mut backend = self.lock();
            let item_failure = match &call {
                GatewayCall::AddTag { item_id, .. } | GatewayCall::DeleteTag { item_id, .. } => {
                    backend.item_failures.get(item_id).cloned()
                }
                _ => None,
            };
            backend.calls.push(call);
            (
                backend.latency.get(&endpoint).copied(),
                backend.failures.get(&endpoint).cloned().or(item_failure),
            )
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => Err(LabelmanError::Remote(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch_dataset_items(&self, dataset_id: &str) -> Result<DatasetPayload> {
        self.enter(GatewayCall::DatasetItems {
            dataset_id: dataset_id.to_string(),
        })
        .await?;

        let backend = self.lock();
        let dataset = backend
            .fixture
            .datasets
            .get(dataset_id)
            .ok_or_else(|| LabelmanError::Remote(format!("Dataset not found: {dataset_id}")))?;

        Ok(DatasetPayload {
            dataset_name: Some(dataset.name.clone()),
            image_data: dataset
                .items
                .iter()
                .map(|i| ImageRef {
                    id: i.id.clone(),
                    signed_url: i.signed_url.clone(),
                })
                .collect(),
            analysis_data: dataset
                .items
                .iter()
                .map(|i| AnalysisRow {
                    image_id: i.id.clone(),
                    storage_path: i.storage_path.clone(),
                    tags_ia: i.ai_tags.clone(),
                    custom_tags: i.custom_tags.clone(),
                })
                .collect(),
        })
    }

    async fn fetch_cluster_result(
        &self,
        cluster_result_id: &str,
    ) -> Result<Vec<ClusterAssignment>> {
        self.enter(GatewayCall::ClusterResult {
            cluster_result_id: cluster_result_id.to_string(),
        })
        .await?;

        self.lock()
            .fixture
            .cluster_results
            .get(cluster_result_id)
            .cloned()
            .ok_or_else(|| {
                LabelmanError::Remote(format!("Cluster result not found: {cluster_result_id}"))
            })
    }

    async fn list_tags(&self, item_id: &str) -> Result<Vec<String>> {
        self.enter(GatewayCall::ListTags {
            item_id: item_id.to_string(),
        })
        .await?;

        self.custom_tags(item_id)
            .ok_or_else(|| LabelmanError::Remote(format!("Image not found: {item_id}")))
    }

    async fn add_tag(&self, item_id: &str, label: &str) -> Result<()> {
        self.enter(GatewayCall::AddTag {
            item_id: item_id.to_string(),
            label: label.to_string(),
        })
        .await?;

        let mut backend = self.lock();
        let item = backend
            .fixture
            .item_mut(item_id)
            .ok_or_else(|| LabelmanError::Remote(format!("Image not found: {item_id}")))?;
        if !item.custom_tags.iter().any(|t| t == label) {
            item.custom_tags.push(label.to_string());
        }
        Ok(())
    }

    async fn delete_tag(&self, item_id: &str, label: &str) -> Result<()> {
        self.enter(GatewayCall::DeleteTag {
            item_id: item_id.to_string(),
            label: label.to_string(),
        })
        .await?;

        let mut backend = self.lock();
        let item = backend
            .fixture
            .item_mut(item_id)
            .ok_or_else(|| LabelmanError::Remote(format!("Image not found: {item_id}")))?;
        let before = item.custom_tags.len();
        item.custom_tags.retain(|t| t != label);
        if item.custom_tags.len() == before {
            return Err(LabelmanError::Remote(format!("Tag not found: {label}")));
        }
        Ok(())
    }

    async fn bulk_tag_by_cluster(&self, request: &BulkTagRequest) -> Result<String> {
        self.enter(GatewayCall::BulkTag(request.clone())).await?;

        let mut backend = self.lock();
        let assignments = backend
            .fixture
            .cluster_results
            .get(&request.cluster_result_id)
            .cloned()
            .ok_or_else(|| {
                LabelmanError::Remote(format!(
                    "Cluster result not found: {}",
                    request.cluster_result_id
                ))
            })?;

        let labeled = request.group_labels.labeled();
        if labeled.is_empty() {
            return Err(LabelmanError::Remote("No group labels provided".into()));
        }

        let mut tagged = 0usize;
        for (cluster, label) in labeled.iter() {
            let paths: Vec<&str> = assignments
                .iter()
                .filter(|a| a.cluster_id == cluster)
                .map(|a| a.storage_path.as_str())
                .collect();
            for item in backend
                .fixture
                .datasets
                .values_mut()
                .flat_map(|d| d.items.iter_mut())
                .filter(|i| paths.contains(&i.storage_path.as_str()))
            {
                if !item.custom_tags.iter().any(|t| t == label) {
                    item.custom_tags.push(label.to_string());
                }
                tagged += 1;
            }
        }

        debug!(tagged, clusters = labeled.len(), "Bulk tag by cluster");
        Ok(format!(
            "Tagged {tagged} images across {} clusters",
            labeled.len()
        ))
    }

    async fn submit_training(&self, request: &TrainRequest) -> Result<TrainingResults> {
        self.enter(GatewayCall::Train(request.clone())).await?;

        let backend = self.lock();
        if let Some(canned) = &backend.training_response {
            return Ok(canned.clone());
        }

        let mut support: IndexMap<String, u64> = IndexMap::new();
        match (&request.source_cluster_result_id, &request.group_labels) {
            (Some(cluster_result_id), Some(group_labels)) => {
                let assignments = backend
                    .fixture
                    .cluster_results
                    .get(cluster_result_id)
                    .ok_or_else(|| {
                        LabelmanError::Remote(format!(
                            "Cluster result not found: {cluster_result_id}"
                        ))
                    })?;
                for (cluster, label) in group_labels.labeled().iter() {
                    let members = assignments.iter().filter(|a| a.cluster_id == cluster).count();
                    *support.entry(label.to_string()).or_insert(0) += members as u64;
                }
            }
            _ => {
                for item in backend.fixture.datasets.values().flat_map(|d| d.items.iter()) {
                    for tag in &item.custom_tags {
                        *support.entry(tag.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
        support.retain(|_, n| *n > 0);

        if support.len() < 2 {
            return Err(LabelmanError::Remote(
                "At least two distinct labels with tagged images are required for training"
                    .into(),
            ));
        }

        Ok(synthesize_results(&support, request.training_config.epochs))
    }

    async fn save_model(&self, request: &SaveModelRequest) -> Result<()> {
        self.enter(GatewayCall::SaveModel(request.clone())).await?;

        if request.model_display_name.trim().is_empty() {
            return Err(LabelmanError::Remote("Model name is required".into()));
        }
        self.lock().saved_models.push(request.clone());
        Ok(())
    }
}

/// Deterministic results: each class loses `support / (epochs + 2)` samples
/// to the next class.
fn synthesize_results(support: &IndexMap<String, u64>, epochs: u32) -> TrainingResults {
    let n = support.len();
    let labels: Vec<String> = support.keys().cloned().collect();
    let mut matrix = vec![vec![0u64; n]; n];
    for (i, count) in support.values().enumerate() {
        let missed = count / (u64::from(epochs) + 2);
        matrix[i][i] = count - missed;
        matrix[i][(i + 1) % n] += missed;
    }

    let total: u64 = support.values().sum();
    let correct: u64 = (0..n).map(|i| matrix[i][i]).sum();
    let accuracy = ratio(correct, total);

    let mut report = IndexMap::new();
    let mut macro_sum = (0.0, 0.0, 0.0);
    let mut weighted_sum = (0.0, 0.0, 0.0);
    for (i, label) in labels.iter().enumerate() {
        let tp = matrix[i][i];
        let predicted: u64 = (0..n).map(|r| matrix[r][i]).sum();
        let actual: u64 = matrix[i].iter().sum();
        let precision = ratio(tp, predicted);
        let recall = ratio(tp, actual);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let w = actual as f64;
        macro_sum = (macro_sum.0 + precision, macro_sum.1 + recall, macro_sum.2 + f1);
        weighted_sum = (
            weighted_sum.0 + precision * w,
            weighted_sum.1 + recall * w,
            weighted_sum.2 + f1 * w,
        );
        report.insert(
            label.clone(),
            ReportEntry::Class(ClassMetrics {
                precision,
                recall,
                f1_score: f1,
                support: w,
            }),
        );
    }
    let nf = n as f64;
    let tf = total as f64;
    report.insert("accuracy".to_string(), ReportEntry::Scalar(accuracy));
    report.insert(
        "macro avg".to_string(),
        ReportEntry::Class(ClassMetrics {
            precision: macro_sum.0 / nf,
            recall: macro_sum.1 / nf,
            f1_score: macro_sum.2 / nf,
            support: tf,
        }),
    );
    report.insert(
        "weighted avg".to_string(),
        ReportEntry::Class(ClassMetrics {
            precision: weighted_sum.0 / tf,
            recall: weighted_sum.1 / tf,
            f1_score: weighted_sum.2 / tf,
            support: tf,
        }),
    );

    let mut metrics = IndexMap::new();
    metrics.insert("accuracy".to_string(), accuracy);
    metrics.insert("macro_f1".to_string(), macro_sum.2 / nf);

    TrainingResults {
        metrics,
        classification_report: report,
        confusion_matrix: matrix,
        confusion_matrix_labels: labels,
        temp_training_id: Uuid::new_v4().to_string(),
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
