//! Spreadsheet import.
//!
//! - [`excel`] - Workbook reading, header detection and cell parsing
//! - [`matcher`] - Free-text violation matching
//! - [`staging`] - Stage, resolve, commit and cancel batches
//! - [`types`] - Rows, batches and reports

pub mod excel;
pub mod matcher;
pub mod staging;
pub mod types;

pub use staging::ExcelImporter;
pub use types::{BatchStatus, CommitReport, ImportBatch, Resolution, RowStatus, StagedRow};
