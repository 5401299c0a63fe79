//! One import run: take the first candidate message in API order, pre-mark it failed,
//! stage and check its pick-up request sheet, import the orders and only then
//! mark it processed.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attachment::{locate_with, AttachmentNotFound};
use crate::config::WorkflowConfig;
use crate::dataset::{Dataset, DatasetError};
use crate::importer::{ImportContext, ImportError, ImportReport, OrderImporter};
use crate::labels::{LabelError, LabelStateMachine};
use crate::mailbox::{HeaderNotFound, MailboxClient, MailboxError};
use crate::staging::{StagingError, StagingStore};
use crate::validator::{AttachmentValidator, ValidationReport};

pub const DATE_HEADER: &str = "Date";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    NoCandidateMessages,
    EmptyDataset {
        message_id: String,
        empty_label_applied: bool,
    },
    Imported {
        message_id: String,
        message_date: String,
        attachment: String,
        rows: usize,
        import: ImportReport,
    },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    AttachmentNotFound(#[from] AttachmentNotFound),

    #[error("attachment on message {message_id} failed validation: {report}")]
    ValidationFailed {
        message_id: String,
        message_date: String,
        report: ValidationReport,
    },

    #[error(transparent)]
    HeaderNotFound(#[from] HeaderNotFound),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("mailbox: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("labels: {0}")]
    Labels(#[from] LabelError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("staged sheet: {0}")]
    Dataset(#[from] DatasetError),
}

pub struct Workflow<'a, M, V, I>
where
    M: MailboxClient + ?Sized,
    V: AttachmentValidator + ?Sized,
    I: OrderImporter + ?Sized,
{
    config: &'a WorkflowConfig,
    mailbox: &'a M,
    staging: &'a StagingStore,
    validator: &'a V,
    importer: &'a I,
}

impl<'a, M, V, I> Workflow<'a, M, V, I>
where
    M: MailboxClient + ?Sized,
    V: AttachmentValidator + ?Sized,
    I: OrderImporter + ?Sized,
{
    pub fn new(
        config: &'a WorkflowConfig,
        mailbox: &'a M,
        staging: &'a StagingStore,
        validator: &'a V,
        importer: &'a I,
    ) -> Self {
        Self {
            config,
            mailbox,
            staging,
            validator,
            importer,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, WorkflowError> {
        let query = self.config.query.to_query_string();
        let candidates = self
            .mailbox
            .list_candidate_messages(&self.config.query, &self.config.folder_labels)
            .await?;

        let Some(candidate) = candidates.first() else {
            info!(query = %query, "no candidate messages");
            return Ok(RunOutcome::NoCandidateMessages);
        };
        debug!(candidates = candidates.len(), message_id = %candidate.id, "picked candidate");

        let mut labels = LabelStateMachine::new(self.mailbox, &self.config.labels, &candidate.id);
        labels.mark_failed().await?;

        let message = self.mailbox.fetch_message(&candidate.id).await?;
        let part = match locate_with(&message, &self.config.attachment) {
            Ok(part) => part,
            Err(error) => {
                labels.mark_failed().await?;
                warn!(message_id = %message.id, "{error}");
                return Err(error.into());
            }
        };

        let bytes = self
            .mailbox
            .fetch_attachment_bytes(&message.id, &part.attachment_id)
            .await?;
        let staged = self.staging.write(&bytes)?;
        info!(
            message_id = %message.id,
            attachment = %part.filename,
            bytes = bytes.len(),
            "staged attachment"
        );

        let dataset = Dataset::open(&staged)?;
        if dataset.is_empty() {
            info!(message_id = %message.id, "no orders in attachment");
            let empty_label_applied = labels.mark_empty().await?;
            return Ok(RunOutcome::EmptyDataset {
                message_id: message.id.clone(),
                empty_label_applied,
            });
        }

        let message_date = message.header(DATE_HEADER)?.to_string();

        labels.begin_validation()?;
        let report = self
            .validator
            .validate(&self.config.channel, &dataset, &message_date);
        if !report.passed() {
            for issue in &report.issues {
                warn!(message_id = %message.id, "validation: {issue}");
            }
            labels.mark_failed().await?;
            return Err(WorkflowError::ValidationFailed {
                message_id: message.id.clone(),
                message_date,
                report,
            });
        }

        let import = self.importer.import(
            &staged,
            &ImportContext {
                channel: &self.config.channel,
                source_message_id: &message.id,
                message_date: &message_date,
                synch_type: &self.config.synch_type,
            },
        )?;

        labels.mark_processed().await?;
        self.staging.cleanup(&staged)?;
        info!(
            message_id = %message.id,
            date = %message_date,
            orders = import.orders_imported,
            "processed pick up request"
        );

        Ok(RunOutcome::Imported {
            message_id: message.id.clone(),
            message_date,
            attachment: part.filename.clone(),
            rows: dataset.data_row_count(),
            import,
        })
    }
}
