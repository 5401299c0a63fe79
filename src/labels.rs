use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::mailbox::{MailboxClient, MailboxError};

/// Labels that mark a message as still needing attention.
pub const GENERIC_LABELS: [&str; 3] = ["UNREAD", "IMPORTANT", "INBOX"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConfig {
    pub failed: Vec<String>,
    pub processed: Vec<String>,
    /// Neutral labels for a header-only sheet. Empty keeps the failed mark.
    pub empty: Vec<String>,
}

fn generic_labels() -> Vec<String> {
    GENERIC_LABELS.iter().map(|label| label.to_string()).collect()
}

impl LabelConfig {
    pub fn failed_delta(&self) -> LabelDelta {
        LabelDelta {
            add: self.failed.clone(),
            remove: generic_labels(),
        }
    }

    pub fn processed_delta(&self) -> LabelDelta {
        let mut remove = generic_labels();
        remove.extend(self.failed.iter().cloned());
        LabelDelta {
            add: self.processed.clone(),
            remove,
        }
    }

    pub fn empty_delta(&self) -> Option<LabelDelta> {
        if self.empty.is_empty() {
            return None;
        }

        let mut remove = generic_labels();
        remove.extend(self.failed.iter().cloned());
        Some(LabelDelta {
            add: self.empty.clone(),
            remove,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelState {
    Unseen,
    MarkedFailed,
    Validating,
    MarkedProcessed,
    MarkedEmpty,
}

impl Display for LabelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unseen => write!(f, "unseen"),
            Self::MarkedFailed => write!(f, "marked-failed"),
            Self::Validating => write!(f, "validating"),
            Self::MarkedProcessed => write!(f, "marked-processed"),
            Self::MarkedEmpty => write!(f, "marked-empty"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error("label transition {from} -> {to} is not allowed for message {message_id}")]
    InvalidTransition {
        message_id: String,
        from: LabelState,
        to: LabelState,
    },
}

/// Tracks the label state of the one message a run works on.
///
/// The failed mark goes on before any risky work so that a crash during
/// validation or import leaves the message visibly failed. Every delta is
/// idempotent on the server, so once the failed mark is applied a repeat
/// request is skipped rather than re-sent.
pub struct LabelStateMachine<'a, M: MailboxClient + ?Sized> {
    mailbox: &'a M,
    labels: &'a LabelConfig,
    message_id: String,
    state: LabelState,
}

impl<'a, M: MailboxClient + ?Sized> LabelStateMachine<'a, M> {
    pub fn new(mailbox: &'a M, labels: &'a LabelConfig, message_id: impl Into<String>) -> Self {
        Self {
            mailbox,
            labels,
            message_id: message_id.into(),
            state: LabelState::Unseen,
        }
    }

    pub fn state(&self) -> LabelState {
        self.state
    }

    pub async fn mark_failed(&mut self) -> Result<(), LabelError> {
        match self.state {
            LabelState::Unseen => {
                self.apply(&self.labels.failed_delta(), "failed").await?;
                self.state = LabelState::MarkedFailed;
                Ok(())
            }
            LabelState::MarkedFailed | LabelState::Validating => {
                debug!(message_id = %self.message_id, "failed mark already applied");
                self.state = LabelState::MarkedFailed;
                Ok(())
            }
            LabelState::MarkedProcessed | LabelState::MarkedEmpty => {
                Err(self.invalid(LabelState::MarkedFailed))
            }
        }
    }

    pub fn begin_validation(&mut self) -> Result<(), LabelError> {
        if self.state != LabelState::MarkedFailed {
            return Err(self.invalid(LabelState::Validating));
        }
        self.state = LabelState::Validating;
        Ok(())
    }

    pub async fn mark_processed(&mut self) -> Result<(), LabelError> {
        if self.state != LabelState::Validating {
            return Err(self.invalid(LabelState::MarkedProcessed));
        }
        self.apply(&self.labels.processed_delta(), "processed")
            .await?;
        self.state = LabelState::MarkedProcessed;
        Ok(())
    }

    /// Applies the neutral empty-sheet labels when configured. Returns
    /// whether a label call was made.
    pub async fn mark_empty(&mut self) -> Result<bool, LabelError> {
        if !matches!(
            self.state,
            LabelState::MarkedFailed | LabelState::Validating
        ) {
            return Err(self.invalid(LabelState::MarkedEmpty));
        }

        let Some(delta) = self.labels.empty_delta() else {
            return Ok(false);
        };
        self.apply(&delta, "empty").await?;
        self.state = LabelState::MarkedEmpty;
        Ok(true)
    }

    async fn apply(&self, delta: &LabelDelta, mark: &str) -> Result<(), MailboxError> {
        self.mailbox
            .apply_label_delta(&self.message_id, &delta.add, &delta.remove)
            .await?;
        info!(
            message_id = %self.message_id,
            mark,
            added = ?delta.add,
            removed = ?delta.remove,
            "applied label mark"
        );
        Ok(())
    }

    fn invalid(&self, to: LabelState) -> LabelError {
        LabelError::InvalidTransition {
            message_id: self.message_id.clone(),
            from: self.state,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{LabelConfig, LabelError, LabelState, LabelStateMachine};
    use crate::mailbox::{MailboxClient, MailboxError, Message, MessageRef, QueryFilter};

    /// Server-side label sets plus a log of every modify call.
    #[derive(Default)]
    struct LabelServer {
        sets: Mutex<HashMap<String, BTreeSet<String>>>,
        calls: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    }

    impl LabelServer {
        fn with_labels(message_id: &str, labels: &[&str]) -> Self {
            let server = Self::default();
            server.sets.lock().expect("lock sets").insert(
                message_id.to_string(),
                labels.iter().map(|label| label.to_string()).collect(),
            );
            server
        }

        fn labels(&self, message_id: &str) -> BTreeSet<String> {
            self.sets
                .lock()
                .expect("lock sets")
                .get(message_id)
                .cloned()
                .unwrap_or_default()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("lock calls").len()
        }
    }

    #[async_trait(?Send)]
    impl MailboxClient for LabelServer {
        async fn list_candidate_messages(
            &self,
            _filter: &QueryFilter,
            _folder_labels: &[String],
        ) -> Result<Vec<MessageRef>, MailboxError> {
            Ok(vec![])
        }

        async fn fetch_message(&self, id: &str) -> Result<Message, MailboxError> {
            Err(MailboxError::NotFound(id.to_string()))
        }

        async fn fetch_attachment_bytes(
            &self,
            message_id: &str,
            _attachment_id: &str,
        ) -> Result<Vec<u8>, MailboxError> {
            Err(MailboxError::NotFound(message_id.to_string()))
        }

        async fn apply_label_delta(
            &self,
            message_id: &str,
            add: &[String],
            remove: &[String],
        ) -> Result<(), MailboxError> {
            self.calls
                .lock()
                .expect("lock calls")
                .push((add.to_vec(), remove.to_vec()));
            let mut sets = self.sets.lock().expect("lock sets");
            let set = sets.entry(message_id.to_string()).or_default();
            for label in remove {
                set.remove(label);
            }
            set.extend(add.iter().cloned());
            Ok(())
        }
    }

    fn config() -> LabelConfig {
        LabelConfig {
            failed: vec!["Label_failed".to_string()],
            processed: vec!["Label_done".to_string(), "Label_archive".to_string()],
            empty: vec![],
        }
    }

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|label| label.to_string()).collect()
    }

    #[test]
    fn deltas_follow_label_policy() {
        let config = config();

        let failed = config.failed_delta();
        assert_eq!(failed.add, vec!["Label_failed"]);
        assert_eq!(failed.remove, vec!["UNREAD", "IMPORTANT", "INBOX"]);

        let processed = config.processed_delta();
        assert_eq!(processed.add, vec!["Label_done", "Label_archive"]);
        assert_eq!(
            processed.remove,
            vec!["UNREAD", "IMPORTANT", "INBOX", "Label_failed"]
        );

        assert!(config.empty_delta().is_none());
    }

    #[tokio::test]
    async fn failed_delta_applied_twice_leaves_same_state() {
        let config = config();
        let once = LabelServer::with_labels("m1", &["INBOX", "UNREAD", "CATEGORY_UPDATES"]);
        let twice = LabelServer::with_labels("m1", &["INBOX", "UNREAD", "CATEGORY_UPDATES"]);
        let delta = config.failed_delta();

        once.apply_label_delta("m1", &delta.add, &delta.remove)
            .await
            .expect("apply once");
        for _ in 0..2 {
            twice
                .apply_label_delta("m1", &delta.add, &delta.remove)
                .await
                .expect("apply twice");
        }

        assert_eq!(once.labels("m1"), twice.labels("m1"));
        assert_eq!(once.labels("m1"), set(&["CATEGORY_UPDATES", "Label_failed"]));
    }

    #[tokio::test]
    async fn repeated_failed_mark_issues_one_call() {
        let config = config();
        let server = LabelServer::with_labels("m1", &["INBOX", "UNREAD", "IMPORTANT"]);
        let mut machine = LabelStateMachine::new(&server, &config, "m1");

        machine.mark_failed().await.expect("pre-mark");
        machine.mark_failed().await.expect("re-mark");

        assert_eq!(machine.state(), LabelState::MarkedFailed);
        assert_eq!(server.call_count(), 1);
        assert_eq!(server.labels("m1"), set(&["Label_failed"]));
    }

    #[tokio::test]
    async fn full_success_path_never_leaves_failed_and_processed_together() {
        let config = config();
        let server = LabelServer::with_labels("m1", &["INBOX", "UNREAD", "IMPORTANT"]);
        let mut machine = LabelStateMachine::new(&server, &config, "m1");

        machine.mark_failed().await.expect("pre-mark");
        machine.begin_validation().expect("validate");
        machine.mark_processed().await.expect("processed");

        assert_eq!(machine.state(), LabelState::MarkedProcessed);
        assert_eq!(server.call_count(), 2);
        assert_eq!(server.labels("m1"), set(&["Label_archive", "Label_done"]));
    }

    #[tokio::test]
    async fn processed_mark_requires_pre_mark_and_validation() {
        let config = config();
        let server = LabelServer::default();
        let mut machine = LabelStateMachine::new(&server, &config, "m1");

        let error = machine.mark_processed().await.expect_err("skip pre-mark");
        assert!(matches!(
            error,
            LabelError::InvalidTransition {
                from: LabelState::Unseen,
                to: LabelState::MarkedProcessed,
                ..
            }
        ));

        machine.mark_failed().await.expect("pre-mark");
        assert!(machine.mark_processed().await.is_err());
        assert_eq!(server.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_mark_is_noop_unless_configured() {
        let server = LabelServer::with_labels("m1", &["INBOX"]);
        let plain = config();
        let mut machine = LabelStateMachine::new(&server, &plain, "m1");
        machine.mark_failed().await.expect("pre-mark");
        assert!(!machine.mark_empty().await.expect("empty mark"));
        assert_eq!(machine.state(), LabelState::MarkedFailed);
        assert_eq!(server.labels("m1"), set(&["Label_failed"]));

        let neutral = LabelConfig {
            empty: vec!["Label_empty".to_string()],
            ..config()
        };
        let server = LabelServer::with_labels("m2", &["INBOX"]);
        let mut machine = LabelStateMachine::new(&server, &neutral, "m2");
        machine.mark_failed().await.expect("pre-mark");
        assert!(machine.mark_empty().await.expect("empty mark"));
        assert_eq!(machine.state(), LabelState::MarkedEmpty);
        assert_eq!(server.labels("m2"), set(&["Label_empty"]));
    }
}
