//! Training orchestrator: one session per dialog, driven through
//! `Config → Submitting → Results | Error`, with an optimistic save.
//!
//! Saving writes a [`PhantomModelRecord`] to the [`SessionStore`] first and
//! only then spawns the persistence request; the caller never waits on it
//! and its outcome is reported through the notifier alone.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LabelmanError, Result};
use crate::gateway::{Gateway, SaveModelRequest, TrainRequest};
use crate::models::{ClusterGrouping, GroupTagMap, PhantomModelRecord, TrainingConfig, TrainingResults};
use crate::notify::Notifier;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Config,
    Submitting,
    Results,
    Error,
    /// Saved optimistically; terminal until the dialog closes.
    SavingModel,
}

impl TrainingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingState::Config => "Config",
            TrainingState::Submitting => "Submitting",
            TrainingState::Results => "Results",
            TrainingState::Error => "Error",
            TrainingState::SavingModel => "SavingModel",
        }
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: u64,
    pub state: TrainingState,
    pub config: TrainingConfig,
    pub results: Option<TrainingResults>,
    pub error: Option<String>,
    /// Editable display name, prefilled from the results.
    pub model_name: String,
}

impl TrainingSession {
    fn new(id: u64, config: TrainingConfig) -> Self {
        Self {
            id,
            state: TrainingState::Config,
            config,
            results: None,
            error: None,
            model_name: String::new(),
        }
    }
}

/// Where the remote trainer takes its labels from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingInput {
    pub source_cluster_result_id: Option<String>,
    pub group_labels: Option<GroupTagMap>,
}

impl TrainingInput {
    /// Labels come from per-item custom tags.
    pub fn custom_tags() -> Self {
        Self::default()
    }

    /// Labels come from cluster assignment when a grouping is active and at
    /// least one group is labeled; otherwise falls back to custom tags.
    pub fn from_grouping(grouping: Option<&ClusterGrouping>, group_tags: &GroupTagMap) -> Self {
        match grouping {
            Some(grouping) if group_tags.has_any_label() => Self {
                source_cluster_result_id: Some(grouping.cluster_result_id.clone()),
                group_labels: Some(group_tags.labeled()),
            },
            _ => Self::custom_tags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitTicket {
    session_id: u64,
    request: TrainRequest,
}

impl SubmitTicket {
    pub fn request(&self) -> &TrainRequest {
        &self.request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied(TrainingState),
    /// The session was closed or replaced while the request was in flight.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseTicket {
    session_id: u64,
}

/// Returned by [`TrainingOrchestrator::save_model`]. Dropping `task` does
/// not cancel the background save.
#[derive(Debug)]
pub struct SaveHandle {
    pub record: PhantomModelRecord,
    pub task: JoinHandle<()>,
}

pub struct TrainingOrchestrator {
    gateway: Arc<dyn Gateway>,
    sessions: SessionStore,
    notifier: Notifier,
    close_grace: Duration,
    next_id: u64,
    session: Option<TrainingSession>,
}

impl TrainingOrchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        sessions: SessionStore,
        notifier: Notifier,
        close_grace: Duration,
    ) -> Self {
        Self {
            gateway,
            sessions,
            notifier,
            close_grace,
            next_id: 0,
            session: None,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Opens the dialog with a fresh session in `Config`.
    pub fn open(&mut self, config: TrainingConfig) -> &TrainingSession {
        let id = self.next_id();
        debug!(session = id, "Training session opened");
        self.session.insert(TrainingSession::new(id, config))
    }

    pub fn session(&self) -> Option<&TrainingSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> Option<TrainingState> {
        self.session.as_ref().map(|s| s.state)
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    fn session_mut(&mut self) -> Result<&mut TrainingSession> {
        self.session
            .as_mut()
            .ok_or_else(|| LabelmanError::validation("Training dialog is not open"))
    }

    pub fn set_config(&mut self, config: TrainingConfig) -> Result<()> {
        let session = self.session_mut()?;
        match session.state {
            TrainingState::Config | TrainingState::Error => {
                session.config = config;
                Ok(())
            }
            other => Err(LabelmanError::InvalidState {
                expected: "Config or Error",
                actual: other.as_str(),
            }),
        }
    }

    pub fn set_model_name(&mut self, name: impl Into<String>) -> Result<()> {
        let session = self.session_mut()?;
        if session.state != TrainingState::Results {
            return Err(LabelmanError::InvalidState {
                expected: "Results",
                actual: session.state.as_str(),
            });
        }
        session.model_name = name.into();
        Ok(())
    }

    /// Moves `Config` or `Error` to `Submitting` and builds the request.
    pub fn begin_submit(&mut self, input: TrainingInput) -> Result<SubmitTicket> {
        let session = self.session_mut()?;
        if !matches!(session.state, TrainingState::Config | TrainingState::Error) {
            return Err(LabelmanError::InvalidState {
                expected: "Config or Error",
                actual: session.state.as_str(),
            });
        }
        session.state = TrainingState::Submitting;
        session.error = None;
        session.results = None;

        let request = TrainRequest {
            training_config: session.config,
            source_cluster_result_id: input.source_cluster_result_id,
            group_labels: input.group_labels,
        };
        info!(
            session = session.id,
            architecture = %request.training_config.model_architecture,
            epochs = request.training_config.epochs,
            grouped = request.group_labels.is_some(),
            "Submitting training job"
        );
        Ok(SubmitTicket {
            session_id: session.id,
            request,
        })
    }

    /// Lands a submission result, unless its session is gone.
    pub fn complete_submit(
        &mut self,
        ticket: SubmitTicket,
        result: Result<TrainingResults>,
    ) -> SubmitOutcome {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id == ticket.session_id && s.state == TrainingState::Submitting)
        else {
            debug!(session = ticket.session_id, "Discarding stale training result");
            return SubmitOutcome::Stale;
        };

        match result {
            Ok(results) => {
                session.model_name =
                    results.default_model_name(session.config.model_architecture);
                let summary = match results.accuracy() {
                    Some(acc) => format!("Training finished: accuracy {:.1}%", acc * 100.0),
                    None => "Training finished".to_string(),
                };
                session.results = Some(results);
                session.state = TrainingState::Results;
                self.notifier.success(summary);
            }
            Err(e) => {
                let message = remote_message(&e);
                warn!(session = session.id, error = %message, "Training failed");
                session.error = Some(message.clone());
                session.state = TrainingState::Error;
                self.notifier.error(format!("Training failed: {message}"));
            }
        }
        SubmitOutcome::Applied(session.state)
    }

    /// Submits and waits for the remote trainer. Retrying from `Error` is
    /// another call to this.
    pub async fn submit(&mut self, input: TrainingInput) -> Result<TrainingState> {
        let ticket = self.begin_submit(input)?;
        let result = self.gateway.submit_training(ticket.request()).await;
        match self.complete_submit(ticket, result) {
            SubmitOutcome::Applied(state) => Ok(state),
            SubmitOutcome::Stale => Err(LabelmanError::Other(
                "Training session was replaced during submission".into(),
            )),
        }
    }

    /// Records the phantom model locally, then persists it in the
    /// background. Returns as soon as the record is stored.
    ///
    /// Fails without recording anything when called outside a tokio runtime.
    pub fn save_model(&mut self, source_dataset_id: &str) -> Result<SaveHandle> {
        let (runtime, name, config, results) = match self.check_save() {
            Ok(checked) => checked,
            Err(e) => {
                self.notifier.warn(e.to_string());
                return Err(e);
            }
        };

        let record = PhantomModelRecord::from_results(&name, source_dataset_id, &config, &results);
        self.sessions.put(record.clone());
        if let Some(session) = self.session.as_mut() {
            session.state = TrainingState::SavingModel;
        }

        let request = SaveModelRequest {
            model_display_name: name.clone(),
            temp_training_id: results.temp_training_id.clone(),
            training_results: results,
            source_dataset_id: source_dataset_id.to_string(),
        };
        let gateway = Arc::clone(&self.gateway);
        let notifier = self.notifier.clone();
        let task = runtime.spawn(async move {
            match gateway.save_model(&request).await {
                Ok(()) => {
                    info!(model = %name, "Model saved");
                    notifier.success(format!("Model '{name}' saved"));
                }
                Err(e) => {
                    warn!(model = %name, error = %e, "Background model save failed");
                    notifier.error(format!("Model '{name}' could not be saved: {e}"));
                }
            }
        });

        info!(record = %record.id, model = %record.display_name, "Phantom model recorded");
        Ok(SaveHandle { record, task })
    }

    fn check_save(&self) -> Result<(Handle, String, TrainingConfig, TrainingResults)> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| LabelmanError::validation("Training dialog is not open"))?;
        if session.state != TrainingState::Results {
            return Err(LabelmanError::InvalidState {
                expected: "Results",
                actual: session.state.as_str(),
            });
        }
        let name = session.model_name.trim().to_string();
        if name.is_empty() {
            return Err(LabelmanError::validation("Model name cannot be empty"));
        }
        let results = session
            .results
            .clone()
            .ok_or_else(|| LabelmanError::Other("Training results are missing".into()))?;
        let runtime = Handle::try_current().map_err(|_| {
            LabelmanError::Other("Saving a model needs a running tokio runtime".into())
        })?;
        Ok((runtime, name, session.config, results))
    }

    /// Detaches the session from in-flight work. Pair with
    /// [`TrainingOrchestrator::finish_close`] once the dialog has animated out.
    pub fn request_close(&mut self) -> Option<CloseTicket> {
        let id = self.next_id();
        let session = self.session.as_mut()?;
        session.id = id;
        Some(CloseTicket { session_id: id })
    }

    /// Resets to `Config` with no results or error, unless the dialog was
    /// reopened since the close was requested.
    pub fn finish_close(&mut self, ticket: CloseTicket) -> bool {
        match self.session.as_mut() {
            Some(session) if session.id == ticket.session_id => {
                let config = session.config;
                *session = TrainingSession::new(session.id, config);
                debug!(session = session.id, "Training session reset");
                true
            }
            _ => false,
        }
    }

    /// Closes the dialog: detach now, reset after the grace delay.
    pub async fn close(&mut self) {
        if let Some(ticket) = self.request_close() {
            tokio::time::sleep(self.close_grace).await;
            self.finish_close(ticket);
        }
    }
}

/// The message shown to the user: the remote's own wording when it gave one.
fn remote_message(e: &LabelmanError) -> String {
    match e {
        LabelmanError::Remote(msg) => msg.clone(),
        LabelmanError::Http { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
