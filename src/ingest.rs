// Ingestion pipeline
// LOAD -> VALIDATE -> RESET_OR_KEEP_STORE -> PERSIST -> REPORT
// Row-level problems are collected, never fatal; a missing source or a
// duplicate key is.

use crate::store::FinancialStore;
use crate::validator::{validate_row, RawRow, ValidationResult};
use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Orchestrates one ingestion run over a CSV source and an explicitly
/// passed store handle.
///
/// Usage:
///     let pipeline = IngestionPipeline::new("data/financials.csv", true);
///     let result = pipeline.run(&store)?;
///     println!("{}", result.summary());
pub struct IngestionPipeline {
    csv_path: PathBuf,
    reset_store: bool,
}

impl IngestionPipeline {
    /// `reset_store` true (the default mode) drops and recreates the store
    /// before persisting; false keeps existing rows and lets the uniqueness
    /// constraint decide.
    pub fn new(csv_path: impl Into<PathBuf>, reset_store: bool) -> Self {
        IngestionPipeline {
            csv_path: csv_path.into(),
            reset_store,
        }
    }

    /// Execute the full pipeline. Returns the validation result; the store
    /// holds every valid record on success.
    pub fn run(&self, store: &FinancialStore) -> Result<ValidationResult> {
        info!("starting ingestion from {}", self.csv_path.display());

        let rows = self.load()?;
        info!("loaded {} rows", rows.len());

        let result = self.validate(&rows);
        info!(
            "validation complete: {} valid, {} errors",
            result.valid_records.len(),
            result.errors.len()
        );

        if self.reset_store {
            info!("resetting store");
            store.reset()?;
        } else {
            store.initialize()?;
        }

        if result.valid_records.is_empty() {
            warn!("no valid records to insert");
        } else {
            let inserted = store
                .insert_records(&result.valid_records)
                .context("Failed to persist validated records")?;
            info!("inserted {} records into {}", inserted, store.location());
        }

        Ok(result)
    }

    /// LOAD: read and decode the source, normalize headers, drop rows that
    /// are empty across every column. Row numbers count from the original
    /// file position (header is line 1, first data row is 2).
    pub fn load(&self) -> Result<Vec<(usize, RawRow)>> {
        let bytes = fs::read(&self.csv_path)
            .with_context(|| format!("CSV file not found: {}", self.csv_path.display()))?;
        let text = decode(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("Failed to read CSV row {}", index + 2)
            })?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let mut raw = RawRow::new();
            for (column, header) in headers.iter().enumerate() {
                let field = record.get(column).unwrap_or("");
                raw.insert(header.clone(), Value::String(field.to_string()));
            }
            rows.push((index + 2, raw));
        }
        Ok(rows)
    }

    /// VALIDATE: every row in source order, accumulated into one result.
    fn validate(&self, rows: &[(usize, RawRow)]) -> ValidationResult {
        let mut result = ValidationResult::new();
        for (row_number, raw) in rows {
            result.absorb(validate_row(raw, *row_number), *row_number);
        }
        result
    }

    /// REPORT: deterministic ingestion report for the finished run.
    pub fn generate_report(
        &self,
        store: &FinancialStore,
        result: &ValidationResult,
    ) -> Result<String> {
        let companies = store.companies()?;
        let years = store.years()?;

        let lines = vec![
            "=".repeat(60),
            "DATA INGESTION REPORT".to_string(),
            format!("Generated: {}", Local::now().format("%Y-%m-%dT%H:%M:%S")),
            "=".repeat(60),
            String::new(),
            "SOURCE".to_string(),
            "-".repeat(30),
            format!("CSV File: {}", self.csv_path.display()),
            format!("Database: {}", store.location()),
            String::new(),
            "VALIDATION RESULTS".to_string(),
            "-".repeat(30),
            result.summary(),
            String::new(),
            "DATABASE STATE".to_string(),
            "-".repeat(30),
            format!("Total Records: {}", store.record_count()?),
            format!("Companies: {}", companies.join(", ")),
            format!(
                "Years: {}",
                years
                    .iter()
                    .map(|y| y.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            String::new(),
            "SCHEMA".to_string(),
            "-".repeat(30),
            store.schema_description()?,
        ];

        Ok(lines.join("\n"))
    }
}

/// UTF-8 first; broken UTF-8 falls back to Latin-1, where every byte is a
/// character, so decoding cannot fail twice.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("UTF-8 decode failed, falling back to Latin-1");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
