//! labelman-core: dataset labeling and training orchestration for labelman.
//!
//! The core merges dataset items with cluster assignments, tracks selection
//! and tagging over a virtualized grid, and drives remote training jobs.
//! Everything talks to the API through the [`Gateway`] trait; saving a
//! trained model is optimistic and never blocks the caller.

pub mod config;
pub mod dataset;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod selection;
pub mod session;
pub mod tagging;
pub mod training;
pub mod viewport;
pub mod workflow;

pub use config::ClientConfig;
pub use dataset::{ApplyOutcome, Collection, DatasetStore, LoadRequest, LoadState};
pub use error::{LabelmanError, Result};
pub use gateway::{Gateway, HttpGateway, MemoryGateway};
pub use models::{
    ClusterGrouping, ClusterId, DatasetItem, GroupTagMap, ItemId, ModelArchitecture,
    PhantomModelRecord, TaggingMode, TrainingConfig, TrainingResults, ViewMode,
};
pub use notify::{Notification, Notifier, NotifyLevel};
pub use selection::SelectionManager;
pub use session::SessionStore;
pub use tagging::{BulkOutcome, TagOutcome, TaggingEngine};
pub use training::{TrainingInput, TrainingOrchestrator, TrainingSession, TrainingState};
pub use viewport::{Activation, Viewport};
pub use workflow::{ActivationEffect, LabelingWorkflow};
