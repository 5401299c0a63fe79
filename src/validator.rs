use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Serialize;

use crate::config::SalesChannel;
use crate::dataset::Dataset;

pub const DEFAULT_ORDER_COLUMN: &str = "Order Number";
pub const DEFAULT_REFERENCE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._/-]*$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Spreadsheet row number (header is row 1); `None` for sheet-level issues.
    pub row: Option<usize>,
    pub message: String,
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "row {row}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    fn sheet(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            row: None,
            message: message.into(),
        });
    }

    fn row(&mut self, data_index: usize, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            row: Some(data_index + 2),
            message: message.into(),
        });
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.passed() {
            return write!(f, "no issues");
        }
        let rendered: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{} issue(s): {}", self.issues.len(), rendered.join("; "))
    }
}

/// Content check run on the staged sheet before anything is imported.
pub trait AttachmentValidator {
    fn validate(
        &self,
        channel: &SalesChannel,
        dataset: &Dataset,
        message_date: &str,
    ) -> ValidationReport;
}

/// Structural checks on a pick-up request sheet.
#[derive(Debug, Clone)]
pub struct SheetValidator {
    required_columns: Vec<String>,
    order_column: String,
    reference_pattern: Regex,
}

impl SheetValidator {
    pub fn new(
        required_columns: Vec<String>,
        order_column: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Self::with_reference_pattern(required_columns, order_column, DEFAULT_REFERENCE_PATTERN)
    }

    pub fn with_reference_pattern(
        required_columns: Vec<String>,
        order_column: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        let order_column = order_column.into();
        let mut required_columns = required_columns;
        if !required_columns
            .iter()
            .any(|column| column.eq_ignore_ascii_case(&order_column))
        {
            required_columns.insert(0, order_column.clone());
        }

        Ok(Self {
            required_columns,
            order_column,
            reference_pattern: Regex::new(pattern)?,
        })
    }

    pub fn required_columns(&self) -> &[String] {
        &self.required_columns
    }
}

impl AttachmentValidator for SheetValidator {
    fn validate(
        &self,
        channel: &SalesChannel,
        dataset: &Dataset,
        message_date: &str,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if let Err(error) = parse_message_date(message_date) {
            report.sheet(format!("message date '{message_date}' is not RFC 2822: {error}"));
        }

        let mut columns = Vec::with_capacity(self.required_columns.len());
        for name in &self.required_columns {
            match dataset.column_index(name) {
                Some(index) => columns.push((name.as_str(), index)),
                None => report.sheet(format!("missing required column '{name}'")),
            }
        }
        if columns.len() != self.required_columns.len() {
            return report;
        }

        let order_index = columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&self.order_column))
            .map(|(_, index)| *index);

        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        for row in 0..dataset.data_row_count() {
            for (name, index) in &columns {
                if dataset.cell(row, *index).is_empty() {
                    report.row(row, format!("'{name}' is empty"));
                }
            }

            let Some(order_index) = order_index else {
                continue;
            };
            let reference = dataset.cell(row, order_index);
            if reference.is_empty() {
                continue;
            }
            if !self.reference_pattern.is_match(reference) {
                report.row(
                    row,
                    format!(
                        "order reference '{reference}' cannot form {}",
                        channel.external_ref(reference)
                    ),
                );
            }
            if let Some(previous) = first_seen.insert(reference, row) {
                report.row(
                    row,
                    format!(
                        "duplicate order reference '{reference}' (first on row {})",
                        previous + 2
                    ),
                );
            }
        }

        report
    }
}

/// Parses a `Date` header, tolerating a trailing `(UTC)` style comment.
pub fn parse_message_date(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let trimmed = raw.trim();
    let without_comment = match trimmed.rfind('(') {
        Some(start) if trimmed.ends_with(')') => trimmed[..start].trim_end(),
        _ => trimmed,
    };
    DateTime::parse_from_rfc2822(without_comment)
}
