use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::attachment::AttachmentMatcher;
use crate::importer::SYNCH_TYPE_GMAIL;
use crate::labels::LabelConfig;
use crate::mailbox::QueryFilter;

pub const DEFAULT_FOLDER_LABEL: &str = "INBOX";
pub const DEFAULT_PREFIX_SEPARATOR: &str = "-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to determine home directory")]
    NoHomeDir,
}

/// Sales channel the imported orders are attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesChannel {
    pub channel_id: String,
    pub order_prefix: String,
    pub prefix_separator: String,
}

impl SalesChannel {
    pub fn new(channel_id: impl Into<String>, order_prefix: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            order_prefix: order_prefix.into(),
            prefix_separator: DEFAULT_PREFIX_SEPARATOR.to_string(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.prefix_separator = separator.into();
        self
    }

    /// `RM-1001` for prefix `RM` and order reference `1001`.
    pub fn external_ref(&self, order_ref: &str) -> String {
        format!(
            "{}{}{}",
            self.order_prefix,
            self.prefix_separator,
            order_ref.trim()
        )
    }
}

/// Everything one run needs, built once before the workflow starts.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub query: QueryFilter,
    pub folder_labels: Vec<String>,
    pub labels: LabelConfig,
    pub attachment: AttachmentMatcher,
    pub channel: SalesChannel,
    pub synch_type: String,
}

impl WorkflowConfig {
    pub fn new(query: QueryFilter, labels: LabelConfig, channel: SalesChannel) -> Self {
        Self {
            query,
            folder_labels: vec![DEFAULT_FOLDER_LABEL.to_string()],
            labels,
            attachment: AttachmentMatcher::default(),
            channel,
            synch_type: SYNCH_TYPE_GMAIL.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.sender.trim().is_empty() {
            return Err(ConfigError::Missing("sender"));
        }
        if self.query.subject.trim().is_empty() {
            return Err(ConfigError::Missing("subject"));
        }
        if self.labels.failed.is_empty() {
            return Err(ConfigError::Missing("failed labels"));
        }
        if self.labels.processed.is_empty() {
            return Err(ConfigError::Missing("processed labels"));
        }
        if let Some(label) = self
            .labels
            .processed
            .iter()
            .find(|label| self.labels.failed.contains(label))
        {
            return Err(ConfigError::Invalid {
                name: "processed labels",
                reason: format!("'{label}' is also a failed label"),
            });
        }
        if let Some(label) = self
            .labels
            .empty
            .iter()
            .find(|label| self.labels.failed.contains(label))
        {
            return Err(ConfigError::Invalid {
                name: "empty labels",
                reason: format!("'{label}' is also a failed label"),
            });
        }
        if self.attachment.extension.is_empty() || self.attachment.description.is_empty() {
            return Err(ConfigError::Missing("attachment match tokens"));
        }
        if self.channel.channel_id.trim().is_empty() {
            return Err(ConfigError::Missing("channel id"));
        }
        if self.channel.order_prefix.trim().is_empty() {
            return Err(ConfigError::Missing("order prefix"));
        }
        Ok(())
    }
}

/// Splits a pipe-delimited label list, dropping blanks.
pub fn parse_label_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".ordermail"))
}

pub fn default_scratch_dir() -> Result<PathBuf, ConfigError> {
    Ok(default_data_dir()?.join("tmp"))
}

#[cfg(test)]
mod tests {
    use super::{parse_label_list, ConfigError, SalesChannel, WorkflowConfig};
    use crate::labels::LabelConfig;
    use crate::mailbox::QueryFilter;

    fn config() -> WorkflowConfig {
        WorkflowConfig::new(
            QueryFilter::new("reports@example.com", "Pick Up Request"),
            LabelConfig {
                failed: vec!["Label_1".to_string()],
                processed: vec!["Label_2".to_string()],
                empty: vec![],
            },
            SalesChannel::new("channel-7", "RM"),
        )
    }

    #[test]
    fn label_lists_split_on_pipes() {
        assert_eq!(
            parse_label_list("Label_1| Label_2 ||Label_3 "),
            vec!["Label_1", "Label_2", "Label_3"]
        );
        assert!(parse_label_list("  ").is_empty());
    }

    #[test]
    fn external_ref_joins_prefix_and_separator() {
        let channel = SalesChannel::new("channel-7", "RM");
        assert_eq!(channel.external_ref(" 1001 "), "RM-1001");
        assert_eq!(channel.with_separator("_").external_ref("1001"), "RM_1001");
    }

    #[test]
    fn defaults_target_inbox_and_gmail_synch_type() {
        let config = config();
        assert_eq!(config.folder_labels, vec!["INBOX"]);
        assert_eq!(config.synch_type, "gmail");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_missing_and_overlapping_labels() {
        let mut missing = config();
        missing.labels.failed.clear();
        assert_eq!(missing.validate(), Err(ConfigError::Missing("failed labels")));

        let mut overlap = config();
        overlap.labels.processed.push("Label_1".to_string());
        assert!(matches!(
            overlap.validate(),
            Err(ConfigError::Invalid {
                name: "processed labels",
                ..
            })
        ));

        let mut empty_overlap = config();
        empty_overlap.labels.empty.push("Label_1".to_string());
        assert_eq!(
            empty_overlap.validate(),
            Err(ConfigError::Invalid {
                name: "empty labels",
                reason: "'Label_1' is also a failed label".to_string(),
            })
        );

        let mut no_sender = config();
        no_sender.query.sender = " ".to_string();
        assert_eq!(no_sender.validate(), Err(ConfigError::Missing("sender")));
    }
}
