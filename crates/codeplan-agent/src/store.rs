// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session and message store.
//!
//! Every mutation is synchronous, runs under one short-lived lock, and bumps
//! a revision counter that subscribers observe through a
//! [`tokio::sync::watch`] channel. The store performs no I/O.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use codeplan_core::CodeplanError;
use codeplan_core::types::{
    GenerationProgress, HistoryEntry, Message, MessageId, NewMessage, Session, SessionId,
};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    sessions: Vec<Session>,
    progress: HashMap<SessionId, GenerationProgress>,
}

impl StoreState {
    fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session, CodeplanError> {
        self.sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| CodeplanError::SessionNotFound(id.to_string()))
    }

    fn session(&self, id: &SessionId) -> Result<&Session, CodeplanError> {
        self.sessions
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| CodeplanError::SessionNotFound(id.to_string()))
    }
}

/// Sessions, their messages, and the ephemeral per-session progress.
#[derive(Debug)]
pub struct SessionStore {
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(StoreState::default()),
            revision,
        }
    }

    /// Receiver that changes on every mutation. The value is the revision number.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision number.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, CodeplanError> {
        self.state
            .lock()
            .map_err(|e| CodeplanError::Internal(format!("session store lock poisoned: {e}")))
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Runs `f` against one session, stamping `updated_at` and bumping the revision.
    fn mutate_session<R>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut Session) -> Result<R, CodeplanError>,
    ) -> Result<R, CodeplanError> {
        let out = {
            let mut state = self.lock()?;
            let session = state.session_mut(session_id)?;
            let out = f(session)?;
            session.updated_at = Utc::now();
            out
        };
        self.bump();
        Ok(out)
    }

    // --- Sessions ---

    pub fn create_session(
        &self,
        project_id: Option<String>,
        title: impl Into<String>,
    ) -> Result<SessionId, CodeplanError> {
        let session = Session::new(project_id, title);
        let id = session.id.clone();
        self.lock()?.sessions.push(session);
        self.bump();
        debug!(session_id = %id, "session created");
        Ok(id)
    }

    /// The first session attached to `project_id`, created if none exists.
    pub fn session_for_project(&self, project_id: &str) -> Result<SessionId, CodeplanError> {
        let id = {
            let mut state = self.lock()?;
            if let Some(existing) = state
                .sessions
                .iter()
                .find(|s| s.project_id.as_deref() == Some(project_id))
            {
                return Ok(existing.id.clone());
            }
            let session = Session::new(Some(project_id.to_string()), project_id);
            let id = session.id.clone();
            state.sessions.push(session);
            id
        };
        self.bump();
        Ok(id)
    }

    /// Snapshot of one session.
    pub fn session(&self, session_id: &SessionId) -> Result<Session, CodeplanError> {
        Ok(self.lock()?.session(session_id)?.clone())
    }

    /// Snapshot of every session, oldest first.
    pub fn sessions(&self) -> Result<Vec<Session>, CodeplanError> {
        Ok(self.lock()?.sessions.clone())
    }

    pub fn rename_session(
        &self,
        session_id: &SessionId,
        title: impl Into<String>,
    ) -> Result<(), CodeplanError> {
        let title = title.into();
        self.mutate_session(session_id, |session| {
            session.title = title;
            Ok(())
        })
    }

    pub fn delete_session(&self, session_id: &SessionId) -> Result<(), CodeplanError> {
        {
            let mut state = self.lock()?;
            let before = state.sessions.len();
            state.sessions.retain(|s| &s.id != session_id);
            if state.sessions.len() == before {
                return Err(CodeplanError::SessionNotFound(session_id.to_string()));
            }
            state.progress.remove(session_id);
        }
        self.bump();
        Ok(())
    }

    /// Drops every session and all progress.
    pub fn reset(&self) -> Result<(), CodeplanError> {
        *self.lock()? = StoreState::default();
        self.bump();
        Ok(())
    }

    // --- Messages ---

    /// Appends a message with a generated id and timestamp.
    ///
    /// A session holds at most one streaming or thinking message; adding a
    /// second fails with [`CodeplanError::AlreadyGenerating`].
    pub fn add_message(
        &self,
        session_id: &SessionId,
        new: NewMessage,
    ) -> Result<MessageId, CodeplanError> {
        self.mutate_session(session_id, |session| {
            if (new.is_streaming || new.is_thinking) && session.active_message().is_some() {
                return Err(CodeplanError::AlreadyGenerating {
                    session_id: session.id.to_string(),
                });
            }
            let id = MessageId::generate();
            session.messages.push(Message {
                id: id.clone(),
                role: new.role,
                content: new.content,
                timestamp: Utc::now(),
                is_thinking: new.is_thinking,
                is_streaming: new.is_streaming,
                metadata: new.metadata,
                execution_plan: None,
                file_changes: Vec::new(),
            });
            Ok(id)
        })
    }

    /// Concatenates onto the most recent message. No-op without messages.
    pub fn append_to_last_message(
        &self,
        session_id: &SessionId,
        fragment: &str,
    ) -> Result<(), CodeplanError> {
        self.mutate_session(session_id, |session| {
            if let Some(last) = session.messages.last_mut() {
                last.content.push_str(fragment);
            }
            Ok(())
        })
    }

    /// Concatenates onto a specific message while it is still active.
    ///
    /// Returns `false` without changing anything once the message has been
    /// finished or cancelled.
    pub fn append_to_message(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        fragment: &str,
    ) -> Result<bool, CodeplanError> {
        self.mutate_session(session_id, |session| {
            let message = session
                .message_mut(message_id)
                .ok_or_else(|| CodeplanError::MessageNotFound(message_id.to_string()))?;
            if !message.is_active() {
                return Ok(false);
            }
            message.content.push_str(fragment);
            Ok(true)
        })
    }

    /// Replaces the content of the most recent message and clears its
    /// streaming and thinking flags.
    pub fn update_last_message(
        &self,
        session_id: &SessionId,
        content: impl Into<String>,
    ) -> Result<(), CodeplanError> {
        let content = content.into();
        self.mutate_session(session_id, |session| {
            if let Some(last) = session.messages.last_mut() {
                last.content = content;
                last.is_streaming = false;
                last.is_thinking = false;
            }
            Ok(())
        })
    }

    /// Clears the streaming and thinking flags of one message, optionally
    /// replacing its content.
    pub fn finish_message(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        content: Option<String>,
    ) -> Result<(), CodeplanError> {
        self.update_message(session_id, message_id, |message| {
            if let Some(content) = content {
                message.content = content;
            }
            message.is_streaming = false;
            message.is_thinking = false;
        })
    }

    /// Applies `f` to one message.
    pub fn update_message<R>(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        f: impl FnOnce(&mut Message) -> R,
    ) -> Result<R, CodeplanError> {
        self.try_update_message(session_id, message_id, |m| Ok(f(m)))
    }

    /// Applies a fallible `f` to one message. The revision is bumped only
    /// when `f` succeeds.
    pub fn try_update_message<R>(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        f: impl FnOnce(&mut Message) -> Result<R, CodeplanError>,
    ) -> Result<R, CodeplanError> {
        self.mutate_session(session_id, |session| {
            let message = session
                .message_mut(message_id)
                .ok_or_else(|| CodeplanError::MessageNotFound(message_id.to_string()))?;
            f(message)
        })
    }

    /// Snapshot of one message.
    pub fn message(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<Message, CodeplanError> {
        let state = self.lock()?;
        state
            .session(session_id)?
            .message(message_id)
            .cloned()
            .ok_or_else(|| CodeplanError::MessageNotFound(message_id.to_string()))
    }

    pub fn remove_message(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<(), CodeplanError> {
        self.mutate_session(session_id, |session| {
            let before = session.messages.len();
            session.messages.retain(|m| &m.id != message_id);
            if session.messages.len() == before {
                return Err(CodeplanError::MessageNotFound(message_id.to_string()));
            }
            Ok(())
        })
    }

    pub fn clear_messages(&self, session_id: &SessionId) -> Result<(), CodeplanError> {
        self.mutate_session(session_id, |session| {
            session.messages.clear();
            Ok(())
        })
    }

    /// The last `limit` finished messages as request history.
    pub fn conversation_history(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, CodeplanError> {
        let state = self.lock()?;
        let session = state.session(session_id)?;
        let finished: Vec<&Message> = session
            .messages
            .iter()
            .filter(|m| !m.is_active() && !m.content.is_empty())
            .collect();
        let skip = finished.len().saturating_sub(limit);
        Ok(finished
            .into_iter()
            .skip(skip)
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect())
    }

    // --- Progress ---

    /// Current progress of the session's generation, if any.
    pub fn progress(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<GenerationProgress>, CodeplanError> {
        let state = self.lock()?;
        state.session(session_id)?;
        Ok(state.progress.get(session_id).cloned())
    }

    /// Overwrites the session's progress.
    pub fn set_progress(
        &self,
        session_id: &SessionId,
        progress: GenerationProgress,
    ) -> Result<(), CodeplanError> {
        {
            let mut state = self.lock()?;
            state.session(session_id)?;
            state.progress.insert(session_id.clone(), progress);
        }
        self.bump();
        Ok(())
    }

    /// Applies an in-flight progress update.
    ///
    /// The percentage never moves backwards within an attempt, and a terminal
    /// marker (complete or cancelled) is never overwritten. Returns whether
    /// the update was applied.
    pub fn advance_progress(
        &self,
        session_id: &SessionId,
        mut progress: GenerationProgress,
    ) -> Result<bool, CodeplanError> {
        {
            let mut state = self.lock()?;
            state.session(session_id)?;
            if let Some(current) = state.progress.get(session_id) {
                if current.is_complete {
                    return Ok(false);
                }
                progress.progress = progress.progress.max(current.progress);
            }
            state.progress.insert(session_id.clone(), progress);
        }
        self.bump();
        Ok(true)
    }

    /// Resets the session's progress to the start of a new attempt.
    pub fn reset_progress(&self, session_id: &SessionId) -> Result<(), CodeplanError> {
        self.set_progress(session_id, GenerationProgress::starting())
    }

    /// Removes the session's progress entirely.
    pub fn clear_progress(&self, session_id: &SessionId) -> Result<(), CodeplanError> {
        {
            let mut state = self.lock()?;
            state.session(session_id)?;
            state.progress.remove(session_id);
        }
        self.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeplan_core::types::Role;

    fn store_with_session() -> (SessionStore, SessionId) {
        let store = SessionStore::new();
        let id = store.create_session(None, "scratch").unwrap();
        (store, id)
    }

    #[test]
    fn add_message_fills_id_and_timestamp() {
        let (store, session) = store_with_session();
        let id = store
            .add_message(&session, NewMessage::user("add a login button"))
            .unwrap();
        let message = store.message(&session, &id).unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "add a login button");
        assert!(!message.is_active());
    }

    #[test]
    fn second_active_message_is_rejected() {
        let (store, session) = store_with_session();
        store
            .add_message(&session, NewMessage::assistant_streaming())
            .unwrap();
        let before = store.session(&session).unwrap();

        let err = store
            .add_message(&session, NewMessage::assistant_thinking())
            .unwrap_err();
        assert!(matches!(err, CodeplanError::AlreadyGenerating { .. }));
        assert_eq!(store.session(&session).unwrap().messages, before.messages);
    }

    #[test]
    fn append_to_last_message_concatenates() {
        let (store, session) = store_with_session();
        store.append_to_last_message(&session, "ignored").unwrap();
        assert!(store.session(&session).unwrap().messages.is_empty());

        store
            .add_message(&session, NewMessage::assistant_streaming())
            .unwrap();
        store.append_to_last_message(&session, "Sure, ").unwrap();
        store.append_to_last_message(&session, "adding it now.").unwrap();
        store.update_last_message(&session, "Sure, adding it now.").unwrap();

        let last = store.session(&session).unwrap().messages.pop().unwrap();
        assert_eq!(last.content, "Sure, adding it now.");
        assert!(!last.is_streaming);
        assert!(!last.is_thinking);
    }

    #[test]
    fn finished_messages_reject_targeted_appends() {
        let (store, session) = store_with_session();
        let id = store
            .add_message(&session, NewMessage::assistant_streaming())
            .unwrap();
        assert!(store.append_to_message(&session, &id, "one").unwrap());
        store.finish_message(&session, &id, None).unwrap();
        assert!(!store.append_to_message(&session, &id, "two").unwrap());
        assert_eq!(store.message(&session, &id).unwrap().content, "one");
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let (store, session) = store_with_session();
        let rx = store.subscribe();
        let start = *rx.borrow();

        let id = store.add_message(&session, NewMessage::user("hi")).unwrap();
        store.rename_session(&session, "renamed").unwrap();
        store.remove_message(&session, &id).unwrap();
        store.reset_progress(&session).unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), start + 4);
    }

    #[test]
    fn failed_mutation_does_not_bump() {
        let (store, session) = store_with_session();
        let before = store.revision();
        assert!(store.remove_message(&session, &MessageId::from("nope")).is_err());
        assert!(store.rename_session(&SessionId::from("nope"), "x").is_err());
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn session_for_project_is_find_or_create() {
        let store = SessionStore::new();
        let first = store.session_for_project("proj-1").unwrap();
        let again = store.session_for_project("proj-1").unwrap();
        let other = store.session_for_project("proj-2").unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(store.sessions().unwrap().len(), 2);
    }

    #[test]
    fn delete_and_reset() {
        let (store, session) = store_with_session();
        store.reset_progress(&session).unwrap();
        store.delete_session(&session).unwrap();
        assert!(matches!(
            store.session(&session),
            Err(CodeplanError::SessionNotFound(_))
        ));
        assert!(store.delete_session(&session).is_err());

        store.create_session(None, "a").unwrap();
        store.reset().unwrap();
        assert!(store.sessions().unwrap().is_empty());
    }

    #[test]
    fn clear_messages_empties_the_session() {
        let (store, session) = store_with_session();
        store.add_message(&session, NewMessage::user("a")).unwrap();
        store.add_message(&session, NewMessage::user("b")).unwrap();
        store.clear_messages(&session).unwrap();
        assert!(store.session(&session).unwrap().messages.is_empty());
    }

    #[test]
    fn history_skips_in_flight_and_respects_limit() {
        let (store, session) = store_with_session();
        for prompt in ["one", "two", "three"] {
            store.add_message(&session, NewMessage::user(prompt)).unwrap();
        }
        store
            .add_message(&session, NewMessage::assistant_streaming())
            .unwrap();
        store.append_to_last_message(&session, "partial").unwrap();

        let history = store.conversation_history(&session, 2).unwrap();
        let contents: Vec<_> = history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
        assert!(store.conversation_history(&session, 0).unwrap().is_empty());
    }

    #[test]
    fn progress_is_monotonic_and_terminal_markers_stick() {
        let (store, session) = store_with_session();
        store.reset_progress(&session).unwrap();

        let at = |percent| GenerationProgress {
            step: "writing".into(),
            progress: percent,
            message: String::new(),
            current_file: None,
            is_complete: false,
        };
        store.advance_progress(&session, at(60)).unwrap();
        store.advance_progress(&session, at(30)).unwrap();
        assert_eq!(store.progress(&session).unwrap().unwrap().progress, 60);

        store
            .set_progress(&session, GenerationProgress::cancelled(60))
            .unwrap();
        assert!(!store.advance_progress(&session, at(90)).unwrap());
        assert!(store.progress(&session).unwrap().unwrap().is_cancelled());

        store.reset_progress(&session).unwrap();
        assert_eq!(store.progress(&session).unwrap().unwrap().progress, 0);
        store.clear_progress(&session).unwrap();
        assert_eq!(store.progress(&session).unwrap(), None);
    }

    proptest::proptest! {
        #[test]
        fn targeted_appends_preserve_order(fragments in proptest::collection::vec(".{0,8}", 0..24)) {
            let (store, session) = store_with_session();
            let id = store.add_message(&session, NewMessage::assistant_streaming()).unwrap();
            for fragment in &fragments {
                store.append_to_message(&session, &id, fragment).unwrap();
            }
            proptest::prop_assert_eq!(store.message(&session, &id).unwrap().content, fragments.concat());
        }
    }
}
