// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation orchestrator.
//!
//! Turns a prompt into store mutations: a user message, an assistant
//! placeholder that fills in as content frames arrive, progress updates, and a
//! terminal result (files with diffs, an optional execution plan). At most
//! one generation runs per session; each is identified by a
//! [`GenerationHandle`] and cancelled through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use codeplan_config::CodeplanConfig;
use codeplan_core::CodeplanError;
use codeplan_core::traits::{CapabilityGate, GenerationTransport, ProjectStore, StepExecutor};
use codeplan_core::types::{
    FailureKind, GenerationId, GenerationMode, GenerationProgress, GenerationRequest,
    GenerationResult, Message, MessageError, MessageId, NewMessage, Plan, SessionId,
};
use codeplan_plan::PlanMachine;
use codeplan_stream::{FrameSink, ReadOutcome, read_stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::SessionStore;

/// Request defaults taken from configuration.
#[derive(Debug, Clone)]
pub struct GenerationDefaults {
    pub model: String,
    pub mode: GenerationMode,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    /// Prior messages sent as history; 0 sends none.
    pub history_limit: usize,
    pub include_current_files: bool,
}

impl GenerationDefaults {
    pub fn from_config(config: &CodeplanConfig) -> Self {
        Self {
            model: config.backend.default_model.clone(),
            mode: config.backend.default_mode,
            api_key: config.backend.api_key.clone(),
            user_id: config.generation.user_id.clone(),
            history_limit: config.generation.history_limit,
            include_current_files: config.generation.include_current_files,
        }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self::from_config(&CodeplanConfig::default())
    }
}

/// Per-call overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub mode: Option<GenerationMode>,
}

/// Identifies one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    pub session_id: SessionId,
    pub generation_id: GenerationId,
    /// The assistant message the generation writes into.
    pub message_id: MessageId,
}

/// How a generation ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed {
        message_id: MessageId,
        result: Option<GenerationResult>,
    },
    Cancelled {
        message_id: MessageId,
    },
}

impl GenerationOutcome {
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Completed { message_id, .. } | Self::Cancelled { message_id } => message_id,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    generation_id: GenerationId,
    /// Set once the assistant placeholder exists.
    message_id: Option<MessageId>,
    token: CancellationToken,
    model: String,
    started: Instant,
}

/// Drives generations against a transport and records them in a [`SessionStore`].
///
/// Cloning is cheap; clones share the store and the in-flight table.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    store: Arc<SessionStore>,
    transport: Arc<dyn GenerationTransport>,
    projects: Option<Arc<dyn ProjectStore>>,
    gate: Arc<dyn CapabilityGate>,
    defaults: GenerationDefaults,
    in_flight: Arc<Mutex<HashMap<SessionId, InFlight>>>,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn GenerationTransport>,
        gate: Arc<dyn CapabilityGate>,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            store,
            transport,
            projects: None,
            gate,
            defaults,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attaches the project store used for `current_files` and plan commits.
    pub fn with_project_store(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn lock_in_flight(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<SessionId, InFlight>>, CodeplanError> {
        self.in_flight
            .lock()
            .map_err(|e| CodeplanError::Internal(format!("in-flight table lock poisoned: {e}")))
    }

    /// The handle of the generation running in `session_id`, if any.
    pub fn active_generation(&self, session_id: &SessionId) -> Option<GenerationHandle> {
        let in_flight = self.lock_in_flight().ok()?;
        let entry = in_flight.get(session_id)?;
        Some(GenerationHandle {
            session_id: session_id.clone(),
            generation_id: entry.generation_id.clone(),
            message_id: entry.message_id.clone()?,
        })
    }

    pub fn is_generating(&self, session_id: &SessionId) -> bool {
        self.active_generation(session_id).is_some()
    }

    /// Runs a non-streaming generation to its end.
    ///
    /// The assistant message is shown as thinking until the result arrives.
    /// Use [`active_generation`](Self::active_generation) from another task to
    /// obtain a handle for cancellation.
    pub async fn generate(
        &self,
        session_id: &SessionId,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome, CodeplanError> {
        let (_reservation, handle, token, request) = self
            .begin(session_id, prompt, &options, NewMessage::assistant_thinking())
            .await?;

        let reply = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            reply = self.transport.complete(request) => Some(reply),
        };

        match reply {
            None => Ok(self.settle_cancelled(&handle)),
            Some(Ok(result)) => self.settle_completed(&handle, String::new(), Some(result)),
            Some(Err(e)) => Err(self.settle_failed(&handle, e)),
        }
    }

    /// Starts a streaming generation.
    ///
    /// The user message and a streaming assistant placeholder are in the
    /// store when this returns; frames are read by
    /// [`StreamingGeneration::run`].
    pub async fn generate_with_streaming(
        &self,
        session_id: &SessionId,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<StreamingGeneration, CodeplanError> {
        let (reservation, handle, token, request) = self
            .begin(session_id, prompt, &options, NewMessage::assistant_streaming())
            .await?;
        Ok(StreamingGeneration {
            orchestrator: self.clone(),
            handle,
            token,
            request,
            reservation,
        })
    }

    /// Reserves the session, assembles the request, and adds the messages.
    ///
    /// The store is untouched when the gate refuses, another generation is in
    /// flight, or the project files cannot be listed.
    async fn begin(
        &self,
        session_id: &SessionId,
        prompt: &str,
        options: &GenerationOptions,
        placeholder: NewMessage,
    ) -> Result<Started, CodeplanError> {
        if !self.gate.may_generate() {
            warn!(session_id = %session_id, "generation refused by capability gate");
            return Err(CodeplanError::NotPermitted);
        }

        let session = self.store.session(session_id)?;
        let generation_id = GenerationId::generate();
        let token = CancellationToken::new();
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.defaults.model.clone());

        {
            let mut in_flight = self.lock_in_flight()?;
            if in_flight.contains_key(session_id) {
                warn!(session_id = %session_id, "generation already in flight");
                return Err(CodeplanError::AlreadyGenerating {
                    session_id: session_id.to_string(),
                });
            }
            in_flight.insert(
                session_id.clone(),
                InFlight {
                    generation_id: generation_id.clone(),
                    message_id: None,
                    token: token.clone(),
                    model: model.clone(),
                    started: Instant::now(),
                },
            );
        }
        // Released on every early return, including a dropped future.
        let mut reservation = Reservation {
            orchestrator: self.clone(),
            session_id: session_id.clone(),
            generation_id: generation_id.clone(),
            handle: None,
        };

        let (message_id, request) = self
            .prepare(
                &session.id,
                session.project_id.as_deref(),
                prompt,
                options,
                model,
                placeholder,
            )
            .await?;

        let handle = GenerationHandle {
            session_id: session_id.clone(),
            generation_id,
            message_id: message_id.clone(),
        };
        if let Some(entry) = self.lock_in_flight()?.get_mut(session_id) {
            entry.message_id = Some(message_id);
        }
        reservation.handle = Some(handle.clone());
        info!(
            session_id = %session_id,
            generation_id = %handle.generation_id,
            message_id = %handle.message_id,
            mode = %request.mode,
            "generation started"
        );
        Ok((reservation, handle, token, request))
    }

    async fn prepare(
        &self,
        session_id: &SessionId,
        project_id: Option<&str>,
        prompt: &str,
        options: &GenerationOptions,
        model: String,
        placeholder: NewMessage,
    ) -> Result<(MessageId, GenerationRequest), CodeplanError> {
        let history = if self.defaults.history_limit > 0 {
            Some(
                self.store
                    .conversation_history(session_id, self.defaults.history_limit)?,
            )
        } else {
            None
        };

        let current_files = match (project_id, &self.projects) {
            (Some(project_id), Some(projects)) if self.defaults.include_current_files => {
                Some(projects.list_files(project_id).await?)
            }
            _ => None,
        };

        let request = GenerationRequest {
            message: prompt.to_string(),
            model,
            api_key: self.defaults.api_key.clone(),
            current_files,
            conversation_history: history,
            mode: options.mode.unwrap_or(self.defaults.mode),
            project_id: project_id.map(str::to_string),
            user_id: self.defaults.user_id.clone(),
        };

        self.store.reset_progress(session_id)?;
        self.store.add_message(session_id, NewMessage::user(prompt))?;
        let message_id = self.store.add_message(session_id, placeholder)?;
        Ok((message_id, request))
    }

    fn release(&self, session_id: &SessionId, generation_id: &GenerationId) {
        if let Ok(mut in_flight) = self.lock_in_flight() {
            if in_flight
                .get(session_id)
                .is_some_and(|entry| &entry.generation_id == generation_id)
            {
                in_flight.remove(session_id);
            }
        }
    }

    /// Removes the in-flight entry if it still belongs to `handle` and has not
    /// been cancelled. The caller holds the table lock while settling, so
    /// settling and cancellation exclude each other.
    fn take_if_current(
        in_flight: &mut HashMap<SessionId, InFlight>,
        handle: &GenerationHandle,
    ) -> Option<InFlight> {
        let current = in_flight.get(&handle.session_id).is_some_and(|entry| {
            entry.generation_id == handle.generation_id && !entry.token.is_cancelled()
        });
        if current {
            in_flight.remove(&handle.session_id)
        } else {
            None
        }
    }

    fn settle_completed(
        &self,
        handle: &GenerationHandle,
        content: String,
        result: Option<GenerationResult>,
    ) -> Result<GenerationOutcome, CodeplanError> {
        let mut in_flight = self.lock_in_flight()?;
        let Some(entry) = Self::take_if_current(&mut in_flight, handle) else {
            return Ok(GenerationOutcome::Cancelled {
                message_id: handle.message_id.clone(),
            });
        };

        let duration_ms = entry.started.elapsed().as_millis() as u64;
        let failed_result = result.as_ref().filter(|r| !r.success).map(|r| r.message.clone());
        let content = match &result {
            Some(r) if r.success && content.is_empty() => r.message.clone(),
            _ => content,
        };
        let applied = result.clone();
        self.store
            .update_message(&handle.session_id, &handle.message_id, |message| {
                message.content = content;
                message.is_streaming = false;
                message.is_thinking = false;

                let metadata = message.metadata_mut();
                metadata.duration_ms = Some(duration_ms);
                metadata.model = Some(entry.model.clone());

                if let Some(result) = applied {
                    if let Some(model) = result.model {
                        metadata.model = Some(model);
                    }
                    metadata.tokens_used = result.tokens_used;
                    metadata.files_affected = result.files.iter().map(|f| f.path.clone()).collect();

                    let mut files = result.files;
                    files.iter_mut().for_each(codeplan_diff::annotate);
                    message.file_changes = files;
                    message.execution_plan = result
                        .execution_plan
                        .map(|plan| PlanMachine::received(plan).into_plan());
                }

                if let Some(reason) = failed_result {
                    record_failure(message, FailureKind::Server, reason);
                }
            })?;
        self.store
            .set_progress(&handle.session_id, GenerationProgress::complete())?;
        drop(in_flight);

        info!(
            session_id = %handle.session_id,
            generation_id = %handle.generation_id,
            duration_ms,
            "generation finished"
        );
        Ok(GenerationOutcome::Completed {
            message_id: handle.message_id.clone(),
            result,
        })
    }

    fn settle_failed(&self, handle: &GenerationHandle, error: CodeplanError) -> CodeplanError {
        let Ok(mut in_flight) = self.lock_in_flight() else {
            return error;
        };
        if Self::take_if_current(&mut in_flight, handle).is_none() {
            debug!(
                generation_id = %handle.generation_id,
                %error,
                "error after cancellation ignored"
            );
            return error;
        }

        let detail = match &error {
            CodeplanError::Transport { message, .. } | CodeplanError::Protocol { message } => {
                message.clone()
            }
            other => other.to_string(),
        };
        let kind = error.failure_kind();
        let recorded = self
            .store
            .update_message(&handle.session_id, &handle.message_id, |message| {
                if let Some(kind) = kind {
                    record_failure(message, kind, detail);
                }
                message.is_streaming = false;
                message.is_thinking = false;
            })
            .and_then(|()| self.store.clear_progress(&handle.session_id));
        drop(in_flight);

        if let Err(e) = recorded {
            warn!(
                session_id = %handle.session_id,
                error = %e,
                "could not record generation failure"
            );
        }
        warn!(
            session_id = %handle.session_id,
            generation_id = %handle.generation_id,
            kind = ?kind,
            %error,
            "generation failed"
        );
        error
    }

    fn settle_cancelled(&self, handle: &GenerationHandle) -> GenerationOutcome {
        // cancel_generation already released the entry and updated the store.
        debug!(generation_id = %handle.generation_id, "generation observed cancellation");
        GenerationOutcome::Cancelled {
            message_id: handle.message_id.clone(),
        }
    }

    /// Cancels the generation identified by `handle`.
    ///
    /// Content applied so far is kept; the message stops streaming and
    /// thinking, and progress becomes the terminal cancelled marker. Returns
    /// `false`, changing nothing, when the handle is stale or the generation
    /// has already finished.
    pub fn cancel_generation(&self, handle: &GenerationHandle) -> bool {
        let Ok(mut in_flight) = self.lock_in_flight() else {
            return false;
        };
        let Some(entry) = Self::take_if_current(&mut in_flight, handle) else {
            debug!(generation_id = %handle.generation_id, "cancel ignored for stale handle");
            return false;
        };
        entry.token.cancel();

        let reached = self
            .store
            .progress(&handle.session_id)
            .ok()
            .flatten()
            .map(|p| p.progress)
            .unwrap_or(0);
        let recorded = self
            .store
            .update_message(&handle.session_id, &handle.message_id, |message| {
                message.is_streaming = false;
                message.is_thinking = false;
                message.metadata_mut().error = Some(MessageError {
                    kind: FailureKind::Cancelled,
                    message: "Generation cancelled".to_string(),
                });
            })
            .and_then(|()| {
                self.store
                    .set_progress(&handle.session_id, GenerationProgress::cancelled(reached))
            });
        drop(in_flight);

        if let Err(e) = recorded {
            warn!(session_id = %handle.session_id, error = %e, "could not record cancellation");
        }
        info!(
            session_id = %handle.session_id,
            generation_id = %handle.generation_id,
            progress = reached,
            "generation cancelled"
        );
        true
    }

    /// Finishes a generation whose driver went away before it settled.
    fn abandon(&self, handle: &GenerationHandle) {
        let running = self.lock_in_flight().is_ok_and(|in_flight| {
            in_flight.get(&handle.session_id).is_some_and(|entry| {
                entry.generation_id == handle.generation_id && !entry.token.is_cancelled()
            })
        });
        if running && self.cancel_generation(handle) {
            warn!(
                session_id = %handle.session_id,
                generation_id = %handle.generation_id,
                "generation dropped before it finished, cancelled"
            );
        }
    }

    /// Cancels every in-flight generation. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<GenerationHandle> = match self.lock_in_flight() {
            Ok(in_flight) => in_flight
                .iter()
                .filter_map(|(session_id, entry)| {
                    Some(GenerationHandle {
                        session_id: session_id.clone(),
                        generation_id: entry.generation_id.clone(),
                        message_id: entry.message_id.clone()?,
                    })
                })
                .collect(),
            Err(_) => return 0,
        };
        handles
            .iter()
            .filter(|handle| self.cancel_generation(handle))
            .count()
    }

    // --- Execution plans ---

    /// Approves the plan attached to `message_id` and runs it through `executor`.
    ///
    /// The store sees a plan snapshot after every step transition. When the
    /// plan completes and the session belongs to a project, the message's file
    /// changes are written to the project store as one batch. A failed plan
    /// records the failing step on the message and writes nothing; a failed
    /// write is recorded on the message as a storage error.
    pub async fn approve_plan(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        executor: &dyn StepExecutor,
    ) -> Result<Plan, CodeplanError> {
        let mut machine = self
            .store
            .try_update_message(session_id, message_id, |message| {
                let plan = message
                    .execution_plan
                    .as_mut()
                    .ok_or_else(|| CodeplanError::PlanNotFound(message.id.to_string()))?;
                let mut machine = PlanMachine::new(plan.clone());
                machine.approve()?;
                *plan = machine.plan().clone();
                Ok(machine)
            })?;
        debug!(
            session_id = %session_id,
            message_id = %message_id,
            plan_id = machine.plan().id.as_str(),
            "executing approved plan"
        );

        let store = &self.store;
        let executed = machine
            .execute(executor, |snapshot| {
                let snapshot = snapshot.clone();
                if let Err(e) = store.update_message(session_id, message_id, |message| {
                    message.execution_plan = Some(snapshot);
                }) {
                    warn!(error = %e, "could not record plan progress");
                }
            })
            .await;
        let plan = machine.into_plan();

        if let Err(e) = executed {
            self.store.update_message(session_id, message_id, |message| {
                record_plan_failure(message, &e);
            })?;
            return Err(e);
        }

        if let Err(e) = self.commit_plan_changes(session_id, message_id).await {
            self.store.update_message(session_id, message_id, |message| {
                record_plan_failure(message, &e);
            })?;
            return Err(e);
        }
        Ok(plan)
    }

    /// Rejects the plan attached to `message_id`. Steps keep their status.
    pub fn reject_plan(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        reason: Option<String>,
    ) -> Result<Plan, CodeplanError> {
        let plan = self
            .store
            .try_update_message(session_id, message_id, |message| {
                let plan = message
                    .execution_plan
                    .as_mut()
                    .ok_or_else(|| CodeplanError::PlanNotFound(message.id.to_string()))?;
                let mut machine = PlanMachine::new(plan.clone());
                machine.reject(reason)?;
                *plan = machine.into_plan();
                Ok(plan.clone())
            })?;
        debug!(session_id = %session_id, message_id = %message_id, "plan rejection recorded");
        Ok(plan)
    }

    async fn commit_plan_changes(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<(), CodeplanError> {
        let session = self.store.session(session_id)?;
        let (Some(project_id), Some(projects)) = (session.project_id.as_deref(), &self.projects)
        else {
            return Ok(());
        };
        let changes = self.store.message(session_id, message_id)?.file_changes;
        if changes.is_empty() {
            return Ok(());
        }
        projects.write_batch(project_id, &changes).await?;
        info!(project_id, files = changes.len(), "plan changes written");
        Ok(())
    }
}

fn record_failure(message: &mut Message, kind: FailureKind, detail: String) {
    let error = MessageError {
        kind,
        message: detail,
    };
    if !message.content.is_empty() {
        message.content.push_str("\n\n");
    }
    message.content.push_str(&error.to_string());
    message.metadata_mut().error = Some(error);
}

fn record_plan_failure(message: &mut Message, error: &CodeplanError) {
    message.metadata_mut().error = Some(MessageError {
        kind: error.failure_kind().unwrap_or(FailureKind::PlanStep),
        message: error.to_string(),
    });
}

/// A started streaming generation.
///
/// [`handle`](Self::handle) is available immediately for cancellation;
/// [`run`](Self::run) reads frames until the protocol ends.
///
/// Dropping it without calling `run`, or dropping the `run` future, cancels
/// the generation.
pub struct StreamingGeneration {
    orchestrator: GenerationOrchestrator,
    handle: GenerationHandle,
    token: CancellationToken,
    request: GenerationRequest,
    reservation: Reservation,
}

impl StreamingGeneration {
    pub fn handle(&self) -> &GenerationHandle {
        &self.handle
    }

    /// Reads the stream to its end.
    ///
    /// Transport failures and server error frames are recorded on the
    /// assistant message and returned. Cancellation is not an error.
    pub async fn run(self) -> Result<GenerationOutcome, CodeplanError> {
        let Self {
            orchestrator,
            handle,
            token,
            request,
            reservation: _reservation,
        } = self;

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            opened = orchestrator.transport.stream(request) => Some(opened),
        };
        let stream = match opened {
            None => return Ok(orchestrator.settle_cancelled(&handle)),
            Some(Err(e)) => return Err(orchestrator.settle_failed(&handle, e)),
            Some(Ok(stream)) => stream,
        };

        let mut sink = StoreSink {
            store: &orchestrator.store,
            handle: &handle,
        };
        match read_stream(stream, &token, &mut sink).await {
            Ok(ReadOutcome::Completed { content, result }) => {
                orchestrator.settle_completed(&handle, content, result)
            }
            Ok(ReadOutcome::Cancelled { .. }) => Ok(orchestrator.settle_cancelled(&handle)),
            Err(e) => Err(orchestrator.settle_failed(&handle, e)),
        }
    }
}

/// What `begin` hands to the driver of a new generation.
type Started = (Reservation, GenerationHandle, CancellationToken, GenerationRequest);

/// Holds a session's in-flight slot for the generation that reserved it.
///
/// Dropping it while the generation is still running releases the slot,
/// and finishes the assistant message as cancelled once it exists. After
/// the generation settled the drop changes nothing.
struct Reservation {
    orchestrator: GenerationOrchestrator,
    session_id: SessionId,
    generation_id: GenerationId,
    handle: Option<GenerationHandle>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        match &self.handle {
            Some(handle) => self.orchestrator.abandon(handle),
            None => self
                .orchestrator
                .release(&self.session_id, &self.generation_id),
        }
    }
}

/// Applies frames to the assistant message and the session's progress.
struct StoreSink<'a> {
    store: &'a SessionStore,
    handle: &'a GenerationHandle,
}

impl FrameSink for StoreSink<'_> {
    fn on_content(&mut self, fragment: &str) -> Result<(), CodeplanError> {
        let applied = self.store.append_to_message(
            &self.handle.session_id,
            &self.handle.message_id,
            fragment,
        )?;
        if !applied {
            debug!(message_id = %self.handle.message_id, "fragment for finished message dropped");
        }
        Ok(())
    }

    fn on_progress(&mut self, progress: GenerationProgress) -> Result<(), CodeplanError> {
        self.store
            .advance_progress(&self.handle.session_id, progress)?;
        Ok(())
    }
}
