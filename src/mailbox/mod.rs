use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod auth;
pub mod gmail_api;

pub use gmail_api::GmailMailbox;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient mailbox api error: {0}")]
    Transient(String),

    #[error("mailbox permission denied: {0}")]
    Permission(String),

    #[error("mailbox api request rejected: {0}")]
    Rejected(String),

    #[error("decode mailbox response: {0}")]
    Decode(String),
}

/// Search expression used to find candidate messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    pub sender: String,
    pub subject: String,
    pub has_attachment: bool,
}

impl QueryFilter {
    pub fn new(sender: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.into(),
            has_attachment: true,
        }
    }

    /// Renders the filter in Gmail search syntax.
    pub fn to_query_string(&self) -> String {
        let mut terms = vec![format!("from:{}", self.sender.trim())];
        if self.has_attachment {
            terms.push("has:attachment".to_string());
        }

        let subject = self.subject.trim();
        if subject.chars().any(char::is_whitespace) {
            terms.push(format!("subject:\"{}\"", subject.replace('"', "")));
        } else if !subject.is_empty() {
            terms.push(format!("subject:{subject}"));
        }

        terms.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentPart {
    pub filename: String,
    pub attachment_id: String,
    pub size: u64,
}

/// A fetched message. Labels change server-side only; this value never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub headers: Vec<MessageHeader>,
    pub attachments: Vec<AttachmentPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("header '{name}' not found on message {message_id}")]
pub struct HeaderNotFound {
    pub message_id: String,
    pub name: String,
}

impl Message {
    pub fn header(&self, name: &str) -> Result<&str, HeaderNotFound> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
            .ok_or_else(|| HeaderNotFound {
                message_id: self.id.clone(),
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxLabel {
    pub id: String,
    pub name: String,
    pub label_type: Option<String>,
}

/// Authorized mailbox operations the import workflow depends on.
#[async_trait(?Send)]
pub trait MailboxClient {
    async fn list_candidate_messages(
        &self,
        filter: &QueryFilter,
        folder_labels: &[String],
    ) -> Result<Vec<MessageRef>, MailboxError>;

    async fn fetch_message(&self, id: &str) -> Result<Message, MailboxError>;

    async fn fetch_attachment_bytes(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError>;

    /// Adds and removes labels in a single atomic call.
    async fn apply_label_delta(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::{Message, MessageHeader, QueryFilter};

    #[test]
    fn query_string_quotes_multi_word_subjects() {
        let filter = QueryFilter::new("reports@example.com", "Pick Up Request");
        assert_eq!(
            filter.to_query_string(),
            "from:reports@example.com has:attachment subject:\"Pick Up Request\""
        );

        let single = QueryFilter::new("reports@example.com", "PickUp");
        assert_eq!(
            single.to_query_string(),
            "from:reports@example.com has:attachment subject:PickUp"
        );
    }

    #[test]
    fn header_lookup_is_by_name_not_position() {
        let message = Message {
            id: "m1".to_string(),
            headers: vec![
                MessageHeader {
                    name: "From".to_string(),
                    value: "reports@example.com".to_string(),
                },
                MessageHeader {
                    name: "Subject".to_string(),
                    value: "Pick Up Request".to_string(),
                },
                MessageHeader {
                    name: "date".to_string(),
                    value: "Wed, 01 Jan 2026 12:00:00 +0000".to_string(),
                },
            ],
            attachments: vec![],
        };

        assert_eq!(
            message.header("Date").expect("date header"),
            "Wed, 01 Jan 2026 12:00:00 +0000"
        );
        let missing = message.header("Message-ID").expect_err("missing header");
        assert_eq!(missing.name, "Message-ID");
        assert_eq!(missing.message_id, "m1");
    }
}
