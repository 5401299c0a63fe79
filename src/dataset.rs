use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("open workbook {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: calamine::Error,
    },

    #[error("workbook {} has no worksheets", .path.display())]
    NoWorksheet { path: PathBuf },
}

/// First worksheet of a staged workbook, read as text cells.
///
/// The first row is the header. Trailing rows with no content are dropped so
/// a sheet holding only a header reports zero data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let mut workbook = open_workbook_auto(path).map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| DatasetError::NoWorksheet {
                path: path.to_path_buf(),
            })?
            .map_err(|source| DatasetError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        while rows
            .last()
            .is_some_and(|row| row.iter().all(|cell| cell.trim().is_empty()))
        {
            rows.pop();
        }

        if rows.is_empty() {
            return Self {
                header: Vec::new(),
                rows: Vec::new(),
            };
        }

        let header = rows
            .remove(0)
            .into_iter()
            .map(|cell| cell.trim().to_string())
            .collect();
        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Rows after the header.
    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.header
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|cell| cell.trim())
            .unwrap_or("")
    }

    /// Row as a JSON object keyed by header names. Blank header columns are
    /// skipped.
    pub fn record(&self, row: usize) -> Map<String, Value> {
        self.header
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.is_empty())
            .map(|(index, column)| {
                (
                    column.clone(),
                    Value::String(self.cell(row, index).to_string()),
                )
            })
            .collect()
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(value) => value
            .as_datetime()
            .map(render_datetime)
            .unwrap_or_else(|| value.to_string()),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        other => other.to_string(),
    }
}

/// Date-formatted cells come back as calendar text, not serial numbers.
fn render_datetime(value: NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use uuid::Uuid;

    use super::{render_datetime, Dataset, DatasetError};

    fn temp_xlsx_path() -> PathBuf {
        std::env::temp_dir().join(format!("ordermail-dataset-{}.xlsx", Uuid::new_v4()))
    }

    fn write_workbook(path: &PathBuf, rows: &[&[&str]]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, value) in row.iter().enumerate() {
                sheet
                    .write_string(row_index as u32, col_index as u16, *value)
                    .expect("write cell");
            }
        }
        workbook.save(path).expect("save workbook");
    }

    #[test]
    fn reads_header_and_rows_from_first_sheet() {
        let path = temp_xlsx_path();
        write_workbook(
            &path,
            &[
                &["Order Number", "Customer", "Pick Up Date"],
                &["1001", "Alice", "2026-01-05"],
                &["1002", "Bob", "2026-01-06"],
            ],
        );

        let dataset = Dataset::open(&path).expect("open dataset");
        assert_eq!(dataset.header(), ["Order Number", "Customer", "Pick Up Date"]);
        assert_eq!(dataset.data_row_count(), 2);
        assert_eq!(dataset.column_index("order number"), Some(0));
        assert_eq!(dataset.cell(1, 1), "Bob");

        let record = dataset.record(0);
        assert_eq!(record["Customer"], "Alice");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn date_and_number_cells_read_as_text() {
        let path = temp_xlsx_path();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let pick_up = ExcelDateTime::from_ymd(2026, 1, 5).expect("valid date");
        sheet.write_string(0, 0, "Order Number").expect("write cell");
        sheet.write_string(0, 1, "Pick Up Date").expect("write cell");
        sheet.write_number(1, 0, 1001).expect("write cell");
        sheet
            .write_datetime_with_format(1, 1, &pick_up, &date_format)
            .expect("write cell");
        workbook.save(&path).expect("save workbook");

        let dataset = Dataset::open(&path).expect("open dataset");
        let record = dataset.record(0);
        assert_eq!(record["Order Number"], "1001");
        assert_eq!(record["Pick Up Date"], "2026-01-05");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn datetimes_keep_time_of_day_only_when_set() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date");
        let midnight = day.and_hms_opt(0, 0, 0).expect("valid time");
        let morning = day.and_hms_opt(8, 30, 0).expect("valid time");
        assert_eq!(render_datetime(midnight), "2026-01-05");
        assert_eq!(render_datetime(morning), "2026-01-05T08:30:00");
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let path = temp_xlsx_path();
        write_workbook(&path, &[&["Order Number", "Customer"]]);

        let dataset = Dataset::open(&path).expect("open dataset");
        assert!(dataset.is_empty());
        assert_eq!(dataset.data_row_count(), 0);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn trailing_blank_rows_are_ignored() {
        let dataset = Dataset::from_rows(vec![
            vec!["Order Number".to_string()],
            vec!["1001".to_string()],
            vec!["  ".to_string()],
            vec![String::new()],
        ]);
        assert_eq!(dataset.data_row_count(), 1);
        assert_eq!(dataset.cell(0, 0), "1001");
        assert_eq!(dataset.cell(5, 5), "");
    }

    #[test]
    fn corrupt_file_is_an_open_error() {
        let path = temp_xlsx_path();
        std::fs::write(&path, b"definitely not a zip archive").expect("write junk");

        let error = Dataset::open(&path).expect_err("junk is not a workbook");
        assert!(matches!(error, DatasetError::Open { .. }));

        let _ = std::fs::remove_file(path);
    }
}
