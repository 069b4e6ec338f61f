//! Data models for labelman.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LabelmanError, Result};

pub type ItemId = String;
pub type ClusterId = i64;

/// An AI-suggested label with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedTag {
    pub label: String,
    pub confidence: f64,
}

/// One labelable image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub item_id: ItemId,
    /// Join key against cluster results.
    pub storage_path: String,
    /// Time-limited signed URL; `None` until resolved.
    pub display_ref: Option<String>,
    pub ai_suggested_tags: Vec<SuggestedTag>,
    /// User-applied tags, unique per item, in application order.
    pub custom_tags: IndexSet<String>,
    pub cluster_id: Option<ClusterId>,
}

impl DatasetItem {
    pub fn has_tag(&self, label: &str) -> bool {
        self.custom_tags.contains(label)
    }

    pub fn has_suggestion(&self, label: &str) -> bool {
        self.ai_suggested_tags.iter().any(|t| t.label == label)
    }
}

/// Partition of storage paths by cluster id, in the order the cluster
/// result first mentions each cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterGrouping {
    pub cluster_result_id: String,
    pub groups: IndexMap<ClusterId, IndexSet<String>>,
}

impl ClusterGrouping {
    pub fn new(cluster_result_id: impl Into<String>) -> Self {
        Self {
            cluster_result_id: cluster_result_id.into(),
            groups: IndexMap::new(),
        }
    }

    /// The group shown first after a load.
    pub fn first_group(&self) -> Option<ClusterId> {
        self.groups.keys().next().copied()
    }

    pub fn members(&self, cluster: ClusterId) -> Option<&IndexSet<String>> {
        self.groups.get(&cluster)
    }

    pub fn contains_group(&self, cluster: ClusterId) -> bool {
        self.groups.contains_key(&cluster)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Proposed label per cluster, unconfirmed until explicitly applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupTagMap(IndexMap<ClusterId, String>);

impl GroupTagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cluster: ClusterId, label: impl Into<String>) {
        self.0.insert(cluster, label.into());
    }

    pub fn get(&self, cluster: ClusterId) -> Option<&str> {
        self.0.get(&cluster).map(String::as_str)
    }

    pub fn remove(&mut self, cluster: ClusterId) -> Option<String> {
        self.0.shift_remove(&cluster)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Entries whose trimmed label is non-empty, with labels trimmed.
    pub fn labeled(&self) -> GroupTagMap {
        GroupTagMap(
            self.0
                .iter()
                .filter_map(|(k, v)| {
                    let v = v.trim();
                    (!v.is_empty()).then(|| (*k, v.to_string()))
                })
                .collect(),
        )
    }

    pub fn has_any_label(&self) -> bool {
        self.0.values().any(|v| !v.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ClusterId, String)> for GroupTagMap {
    fn from_iter<T: IntoIterator<Item = (ClusterId, String)>>(iter: T) -> Self {
        GroupTagMap(iter.into_iter().collect())
    }
}

/// Which items the viewport presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Gallery,
    Detail(ItemId),
}

/// Active tagging strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggingMode {
    Individual(ItemId),
    Bulk,
    Group,
}

// ─── Training ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelArchitecture {
    #[serde(rename = "resnet18")]
    Resnet18,
    #[serde(rename = "resnet34")]
    Resnet34,
    #[serde(rename = "resnet50")]
    Resnet50,
    #[serde(rename = "efficientnet_b0")]
    EfficientNetB0,
    #[serde(rename = "mobilenet_v3")]
    MobileNetV3,
}

impl ModelArchitecture {
    pub const ALL: [ModelArchitecture; 5] = [
        ModelArchitecture::Resnet18,
        ModelArchitecture::Resnet34,
        ModelArchitecture::Resnet50,
        ModelArchitecture::EfficientNetB0,
        ModelArchitecture::MobileNetV3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelArchitecture::Resnet18 => "resnet18",
            ModelArchitecture::Resnet34 => "resnet34",
            ModelArchitecture::Resnet50 => "resnet50",
            ModelArchitecture::EfficientNetB0 => "efficientnet_b0",
            ModelArchitecture::MobileNetV3 => "mobilenet_v3",
        }
    }
}

impl fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelArchitecture {
    type Err = LabelmanError;

    fn from_str(s: &str) -> Result<Self> {
        ModelArchitecture::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LabelmanError::validation(format!("Unknown model architecture: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model_architecture: ModelArchitecture,
    pub epochs: u32,
}

impl TrainingConfig {
    pub fn new(model_architecture: ModelArchitecture, epochs: u32) -> Result<Self> {
        if epochs == 0 {
            return Err(LabelmanError::validation("Epochs must be a positive integer"));
        }
        Ok(Self {
            model_architecture,
            epochs,
        })
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_architecture: ModelArchitecture::Resnet18,
            epochs: 10,
        }
    }
}

/// Per-class row of a classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: f64,
}

/// Report entries are either class rows or bare scalars (e.g. `accuracy`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Class(ClassMetrics),
    Scalar(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResults {
    #[serde(default)]
    pub metrics: IndexMap<String, f64>,
    #[serde(default)]
    pub classification_report: IndexMap<String, ReportEntry>,
    #[serde(default)]
    pub confusion_matrix: Vec<Vec<u64>>,
    #[serde(default)]
    pub confusion_matrix_labels: Vec<String>,
    pub temp_training_id: String,
}

impl TrainingResults {
    pub fn accuracy(&self) -> Option<f64> {
        self.metrics.get("accuracy").copied().or_else(|| {
            match self.classification_report.get("accuracy") {
                Some(ReportEntry::Scalar(v)) => Some(*v),
                _ => None,
            }
        })
    }

    /// Per-class rows only, skipping scalar and averaged entries.
    pub fn class_rows(&self) -> impl Iterator<Item = (&str, &ClassMetrics)> {
        self.classification_report
            .iter()
            .filter_map(|(k, v)| match v {
                ReportEntry::Class(m) if !k.ends_with(" avg") => Some((k.as_str(), m)),
                _ => None,
            })
    }

    /// Default display name derived from the confusion-matrix labels.
    pub fn default_model_name(&self, architecture: ModelArchitecture) -> String {
        if self.confusion_matrix_labels.is_empty() {
            format!("{architecture} model")
        } else {
            format!("{} classifier", self.confusion_matrix_labels.join(" / "))
        }
    }
}

/// Locally synthesized summary of a just-trained model, held until the
/// backend confirms persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhantomModelRecord {
    pub id: Uuid,
    pub display_name: String,
    pub temp_training_id: String,
    pub source_dataset_id: String,
    pub model_architecture: ModelArchitecture,
    pub epochs: u32,
    pub accuracy: Option<f64>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PhantomModelRecord {
    pub fn from_results(
        display_name: impl Into<String>,
        source_dataset_id: impl Into<String>,
        config: &TrainingConfig,
        results: &TrainingResults,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            temp_training_id: results.temp_training_id.clone(),
            source_dataset_id: source_dataset_id.into(),
            model_architecture: config.model_architecture,
            epochs: config.epochs,
            accuracy: results.accuracy(),
            labels: results.confusion_matrix_labels.clone(),
            created_at: Utc::now(),
        }
    }
}
