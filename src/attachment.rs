use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::mailbox::{AttachmentPart, Message};

pub const DEFAULT_EXTENSION_TOKEN: &str = ".xlsx";
pub const DEFAULT_DESCRIPTION_TOKEN: &str = "Pick Up Request";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no attachment matching {matcher} on message {message_id} (saw: {})", render_filenames(.filenames))]
pub struct AttachmentNotFound {
    pub message_id: String,
    pub matcher: String,
    pub filenames: Vec<String>,
}

fn render_filenames(filenames: &[String]) -> String {
    if filenames.is_empty() {
        "no attachments".to_string()
    } else {
        filenames.join(", ")
    }
}

/// Filename predicate: both tokens must appear, case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMatcher {
    pub extension: String,
    pub description: String,
}

impl AttachmentMatcher {
    pub fn new(extension: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            description: description.into(),
        }
    }

    pub fn matches(&self, filename: &str) -> bool {
        filename.contains(&self.extension) && filename.contains(&self.description)
    }
}

impl Default for AttachmentMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION_TOKEN, DEFAULT_DESCRIPTION_TOKEN)
    }
}

impl Display for AttachmentMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "'*{}*{}'", self.description, self.extension)
    }
}

/// Returns the first attachment, in message order, whose filename satisfies
/// `predicate`.
pub fn locate<'m, P>(
    message: &'m Message,
    matcher_label: &str,
    predicate: P,
) -> Result<&'m AttachmentPart, AttachmentNotFound>
where
    P: Fn(&str) -> bool,
{
    message
        .attachments
        .iter()
        .find(|part| predicate(&part.filename))
        .ok_or_else(|| AttachmentNotFound {
            message_id: message.id.clone(),
            matcher: matcher_label.to_string(),
            filenames: message
                .attachments
                .iter()
                .map(|part| part.filename.clone())
                .collect(),
        })
}

pub fn locate_with<'m>(
    message: &'m Message,
    matcher: &AttachmentMatcher,
) -> Result<&'m AttachmentPart, AttachmentNotFound> {
    locate(message, &matcher.to_string(), |filename| {
        matcher.matches(filename)
    })
}
