//! Shared fixtures for the labelman-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use indexmap::IndexMap;
use labelman_core::gateway::Fixture;
use labelman_core::models::{ClassMetrics, ReportEntry};
use labelman_core::{MemoryGateway, Notification, TrainingResults};
use tokio::sync::mpsc::UnboundedReceiver;

pub const FIXTURE: &str = r#"
datasets:
  ds1:
    name: Flowers
    items:
      - id: a
        storage_path: p1
        signed_url: https://cdn.test/a.jpg
        ai_tags:
          - { label: rose, confidence: 0.91 }
          - { label: tulip, confidence: 0.40 }
        custom_tags: [rose]
      - id: b
        storage_path: p2
        signed_url: https://cdn.test/b.jpg
        ai_tags:
          - { label: rose, confidence: 0.82 }
      - id: c
        storage_path: p3
        ai_tags:
          - { label: tulip, confidence: 0.77 }
      - id: d
        storage_path: p4
        ai_tags:
          - { label: daisy, confidence: 0.66 }
      - id: e
        storage_path: p5
  ds2:
    name: Birds
    items:
      - id: x
        storage_path: q1
cluster_results:
  cr1:
    - { storage_path: p1, cluster_id: 0 }
    - { storage_path: p2, cluster_id: 0 }
    - { storage_path: p3, cluster_id: 1 }
    - { storage_path: p4, cluster_id: 1 }
  cr2:
    - { storage_path: p1, cluster_id: 0 }
    - { storage_path: p1, cluster_id: 1 }
    - { storage_path: p3, cluster_id: 1 }
    - { storage_path: p9, cluster_id: 2 }
  cr3:
    - { storage_path: p1, cluster_id: 0 }
    - { storage_path: p2, cluster_id: 0 }
    - { storage_path: p3, cluster_id: 1 }
"#;

pub fn gateway() -> Arc<MemoryGateway> {
    let fixture = Fixture::from_yaml_str(FIXTURE).unwrap();
    Arc::new(MemoryGateway::new(fixture))
}

pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

/// Three-class results with 87% accuracy.
pub fn canned_results() -> TrainingResults {
    let labels = ["cat", "dog", "bird"];
    let mut report = IndexMap::new();
    for label in labels {
        report.insert(
            label.to_string(),
            ReportEntry::Class(ClassMetrics {
                precision: 0.87,
                recall: 0.87,
                f1_score: 0.87,
                support: 10.0,
            }),
        );
    }
    report.insert("accuracy".to_string(), ReportEntry::Scalar(0.87));

    let mut metrics = IndexMap::new();
    metrics.insert("accuracy".to_string(), 0.87);

    TrainingResults {
        metrics,
        classification_report: report,
        confusion_matrix: vec![vec![9, 1, 0], vec![1, 8, 1], vec![0, 1, 9]],
        confusion_matrix_labels: labels.iter().map(|l| l.to_string()).collect(),
        temp_training_id: "tmp-42".to_string(),
    }
}
