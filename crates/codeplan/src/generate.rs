// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `codeplan generate` command implementation.
//!
//! Sends one prompt to the backend, prints streamed content as it lands in
//! the session store, shows the proposed diffs, and asks before applying an
//! execution plan to the project directory.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use codeplan_agent::{
    GenerationDefaults, GenerationOptions, GenerationOrchestrator, GenerationOutcome,
    SessionStore, install_signal_handler,
};
use codeplan_config::CodeplanConfig;
use codeplan_core::CodeplanError;
use codeplan_core::traits::{AllowAll, StepExecutor};
use codeplan_core::types::{GenerationMode, MessageId, Plan, PlanStatus, SessionId, Step};
use codeplan_stream::HttpTransport;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::project_dir::DirectoryProjectStore;
use crate::render;

/// Flags of `codeplan generate`.
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub prompt: String,
    pub stream: bool,
    pub project: Option<String>,
    pub mode: Option<GenerationMode>,
    pub model: Option<String>,
}

/// Runs one generation and, if it proposes a plan, the approval round.
pub async fn run_generate(config: CodeplanConfig, args: GenerateArgs) -> Result<(), CodeplanError> {
    let transport = Arc::new(HttpTransport::new(&config.backend)?);
    info!(base_url = transport.base_url(), "using generation backend");

    let store = Arc::new(SessionStore::new());
    let orchestrator = GenerationOrchestrator::new(
        Arc::clone(&store),
        transport,
        Arc::new(AllowAll),
        GenerationDefaults::from_config(&config),
    )
    .with_project_store(Arc::new(DirectoryProjectStore::new(&config.project.root)));
    install_signal_handler(orchestrator.clone());

    let session_id = match &args.project {
        Some(project) => store.session_for_project(project)?,
        None => store.create_session(None, "codeplan")?,
    };
    let options = GenerationOptions {
        model: args.model,
        mode: args.mode,
    };

    let outcome = if args.stream {
        let generation = orchestrator
            .generate_with_streaming(&session_id, &args.prompt, options)
            .await?;
        let message_id = generation.handle().message_id.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let follower = tokio::spawn(follow_message(
            Arc::clone(&store),
            session_id.clone(),
            message_id,
            store.subscribe(),
            done_rx,
        ));
        let outcome = generation.run().await;
        let _ = done_tx.send(());
        let _ = follower.await;
        println!();
        outcome?
    } else {
        eprintln!("{}", "thinking...".dimmed());
        let outcome = orchestrator
            .generate(&session_id, &args.prompt, options)
            .await?;
        let message = store.message(&session_id, outcome.message_id())?;
        println!("{}", message.content);
        outcome
    };

    let message_id = match outcome {
        GenerationOutcome::Completed { message_id, .. } => message_id,
        GenerationOutcome::Cancelled { .. } => {
            eprintln!("{}", "generation cancelled".yellow());
            return Ok(());
        }
    };

    let message = store.message(&session_id, &message_id)?;
    render::print_diffs(&message.file_changes);
    if let Some(metadata) = &message.metadata {
        let mut footer = format!("{} file(s)", metadata.files_affected.len());
        if let Some(tokens) = metadata.tokens_used {
            footer.push_str(&format!(", {tokens} tokens"));
        }
        if let Some(ms) = metadata.duration_ms {
            footer.push_str(&format!(", {ms} ms"));
        }
        eprintln!("{}", footer.dimmed());
    }

    match &message.execution_plan {
        Some(plan) if plan.status == PlanStatus::AwaitingConfirmation => {
            render::print_plan(plan);
            if args.project.is_none() {
                eprintln!(
                    "{}",
                    "no --project given, the plan can be reviewed but changes are not written"
                        .dimmed()
                );
            }
            confirm_plan(&orchestrator, &session_id, &message_id).await
        }
        _ => Ok(()),
    }
}

/// Prints the message's new content and progress steps until `done` fires.
async fn follow_message(
    store: Arc<SessionStore>,
    session_id: SessionId,
    message_id: MessageId,
    mut revisions: watch::Receiver<u64>,
    mut done: oneshot::Receiver<()>,
) {
    let mut printer = DeltaPrinter::default();
    loop {
        printer.flush(&store, &session_id, &message_id);
        tokio::select! {
            biased;
            _ = &mut done => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    printer.flush(&store, &session_id, &message_id);
}

#[derive(Default)]
struct DeltaPrinter {
    printed: usize,
    last_step: String,
}

impl DeltaPrinter {
    fn flush(&mut self, store: &SessionStore, session_id: &SessionId, message_id: &MessageId) {
        if let Ok(Some(progress)) = store.progress(session_id) {
            if progress.step != self.last_step {
                eprintln!(
                    "{}",
                    format!("[{}% {}] {}", progress.progress, progress.step, progress.message)
                        .dimmed()
                );
                self.last_step = progress.step;
            }
        }

        let Ok(message) = store.message(session_id, message_id) else {
            return;
        };
        if let Some(delta) = self.take_delta(&message.content) {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
    }

    /// The part of `content` not printed yet.
    fn take_delta<'a>(&mut self, content: &'a str) -> Option<&'a str> {
        if content.len() <= self.printed || !content.is_char_boundary(self.printed) {
            return None;
        }
        let delta = &content[self.printed..];
        self.printed = content.len();
        Some(delta)
    }
}

async fn confirm_plan(
    orchestrator: &GenerationOrchestrator,
    session_id: &SessionId,
    message_id: &MessageId,
) -> Result<(), CodeplanError> {
    let mut rl = DefaultEditor::new()
        .map_err(|e| CodeplanError::Internal(format!("failed to initialize readline: {e}")))?;

    let approved = match rl.readline("apply plan? [y/N] ") {
        Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => false,
        Err(e) => {
            return Err(CodeplanError::Internal(format!("readline failed: {e}")));
        }
    };

    if approved {
        let plan = orchestrator
            .approve_plan(session_id, message_id, &ConsoleExecutor)
            .await?;
        println!("{} {}", "plan completed:".green().bold(), plan.title);
        return Ok(());
    }

    let reason = match rl.readline("reason (optional): ") {
        Ok(line) if !line.trim().is_empty() => Some(line.trim().to_string()),
        _ => None,
    };
    orchestrator.reject_plan(session_id, message_id, reason)?;
    println!("{}", "plan rejected".dimmed());
    Ok(())
}

/// Reports each step as it runs. File writes happen as one batch once the
/// whole plan has completed.
struct ConsoleExecutor;

#[async_trait]
impl StepExecutor for ConsoleExecutor {
    async fn execute(&self, plan: &Plan, index: usize, step: &Step) -> Result<(), String> {
        debug!(plan_id = plan.id.as_str(), step_id = step.id.as_str(), "running step");
        println!(
            "  {} {}/{} {}",
            "->".cyan(),
            index + 1,
            plan.steps.len(),
            step.description
        );
        Ok(())
    }
}
