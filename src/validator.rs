// Record validation
// Coerces one raw CSV row into a typed FinancialRecord or a structured error,
// and aggregates per-row outcomes for a whole ingestion run

use crate::record::{FinancialRecord, QualityFlag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A raw input row: normalized column name -> raw cell value.
///
/// Values are strings straight from the CSV, but numbers and nulls are
/// accepted too so callers can feed pre-parsed data.
pub type RawRow = HashMap<String, Value>;

// ============================================================================
// ROW ERROR
// ============================================================================

/// Structured validation failure for a single row.
///
/// `error` is a "; "-joined list of `<field>: <message>` entries covering
/// every field that failed, not just the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
    pub data: RawRow,
}

// ============================================================================
// ROW VALIDATION
// ============================================================================

/// Validate one raw row. Returns either a record or an error, never both.
///
/// Deterministic: no I/O, no shared state. Coercion happens before range
/// checks; every failing field is reported.
pub fn validate_row(raw: &RawRow, row_number: usize) -> Result<FinancialRecord, RowError> {
    let mut failures: Vec<String> = Vec::new();

    let company = coerce_company(raw.get("company"));
    if company.is_empty() {
        failures.push("company: must not be empty".to_string());
    }

    let fiscal_year = coerce_integer("fiscal_year", raw.get("fiscal_year"));
    let revenue = coerce_integer("revenue", raw.get("revenue"));
    let net_income = coerce_integer("net_income", raw.get("net_income"));
    let total_assets = coerce_integer("total_assets", raw.get("total_assets"));
    let total_equity = coerce_integer("total_equity", raw.get("total_equity"));

    let fiscal_year = check(fiscal_year, &mut failures, |year| {
        if !(1900..=2100).contains(&year) {
            Some("fiscal_year: must be between 1900 and 2100".to_string())
        } else {
            None
        }
    });
    let revenue = check(revenue, &mut failures, |v| {
        if v < 0 {
            Some("revenue: must be non-negative".to_string())
        } else {
            None
        }
    });
    let net_income = check(net_income, &mut failures, |_| None);
    let total_assets = check(total_assets, &mut failures, |v| {
        if v <= 0 {
            Some("total_assets: must be positive".to_string())
        } else {
            None
        }
    });
    let total_equity = check(total_equity, &mut failures, |_| None);

    if !failures.is_empty() {
        return Err(RowError {
            row: row_number,
            error: failures.join("; "),
            data: raw.clone(),
        });
    }

    // All Some at this point: a missing value would have produced a failure.
    Ok(FinancialRecord::new(
        company,
        fiscal_year.unwrap() as i32,
        revenue.unwrap(),
        net_income.unwrap(),
        total_assets.unwrap(),
        total_equity.unwrap(),
    ))
}

fn coerce_company(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Coerce a raw cell into a whole-dollar integer.
///
/// Accepts "125000000", "125,000,000", "125000000.0" and plain numbers.
/// Floats truncate toward zero, matching the source data's whole-dollar
/// convention.
fn coerce_integer(field: &str, value: Option<&Value>) -> Result<i64, String> {
    let value = match value {
        None | Some(Value::Null) => {
            return Err(format!("{}: Missing value - cannot be empty", field));
        }
        Some(v) => v,
    };

    match value {
        Value::String(s) => {
            if s.is_empty() {
                return Err(format!("{}: Missing value - cannot be empty", field));
            }
            let cleaned = s.trim().replace(',', "");
            cleaned
                .parse::<f64>()
                .map(|f| f.trunc() as i64)
                .map_err(|_| format!("{}: Cannot convert '{}' to integer", field, cleaned))
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.trunc() as i64)
            } else {
                Err(format!("{}: Cannot convert '{}' to integer", field, n))
            }
        }
        other => Err(format!("{}: Cannot convert '{}' to integer", field, other)),
    }
}

/// Fold a coercion result into the failure list, then apply a range check.
fn check<F>(
    coerced: Result<i64, String>,
    failures: &mut Vec<String>,
    range_check: F,
) -> Option<i64>
where
    F: FnOnce(i64) -> Option<String>,
{
    match coerced {
        Ok(v) => {
            if let Some(message) = range_check(v) {
                failures.push(message);
            }
            Some(v)
        }
        Err(message) => {
            failures.push(message);
            None
        }
    }
}

// ============================================================================
// BATCH RESULT
// ============================================================================

/// Outcome of one ingestion run: valid records, structured errors, and
/// quality warnings, all in source order. Read-only once the run completes.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid_records: Vec<FinancialRecord>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one row outcome, tracking a warning for non-clean flags.
    pub fn absorb(&mut self, outcome: Result<FinancialRecord, RowError>, row_number: usize) {
        match outcome {
            Ok(record) => {
                if record.quality_flag != QualityFlag::Clean {
                    self.warnings.push(format!(
                        "Row {} ({}, {}): {}",
                        row_number, record.company, record.fiscal_year, record.quality_flag
                    ));
                }
                self.valid_records.push(record);
            }
            Err(error) => self.errors.push(error),
        }
    }

    /// Total rows attempted (valid + errored).
    pub fn total_processed(&self) -> usize {
        self.valid_records.len() + self.errors.len()
    }

    /// Percentage of rows that passed validation, rounded to 2 decimals.
    pub fn success_rate(&self) -> f64 {
        if self.total_processed() == 0 {
            return 0.0;
        }
        let rate = self.valid_records.len() as f64 / self.total_processed() as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable validation summary: counts, then the first five
    /// warnings and errors with a count of the remainder.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Validation Summary".to_string(),
            "=".repeat(40),
            format!("Total Processed: {}", self.total_processed()),
            format!("Valid Records:   {}", self.valid_records.len()),
            format!("Errors:          {}", self.errors.len()),
            format!("Success Rate:    {:.2}%", self.success_rate()),
        ];

        if !self.warnings.is_empty() {
            lines.push(format!("\nWarnings ({}):", self.warnings.len()));
            for warning in self.warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if self.warnings.len() > 5 {
                lines.push(format!("  ... and {} more", self.warnings.len() - 5));
            }
        }

        if !self.errors.is_empty() {
            lines.push(format!("\nErrors ({}):", self.errors.len()));
            for error in self.errors.iter().take(5) {
                lines.push(format!("  - Row {}: {}", error.row, error.error));
            }
            if self.errors.len() > 5 {
                lines.push(format!("  ... and {} more", self.errors.len() - 5));
            }
        }

        lines.join("\n")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_row(
        company: &str,
        fiscal_year: &str,
        revenue: &str,
        net_income: &str,
        total_assets: &str,
        total_equity: &str,
    ) -> RawRow {
        let mut row = RawRow::new();
        row.insert("company".to_string(), json!(company));
        row.insert("fiscal_year".to_string(), json!(fiscal_year));
        row.insert("revenue".to_string(), json!(revenue));
        row.insert("net_income".to_string(), json!(net_income));
        row.insert("total_assets".to_string(), json!(total_assets));
        row.insert("total_equity".to_string(), json!(total_equity));
        row
    }

    #[test]
    fn test_valid_row() {
        let row = raw_row("Alpha Corp", "2023", "185000000", "26000000", "258000000", "148000000");
        let record = validate_row(&row, 2).unwrap();

        assert_eq!(record.company, "Alpha Corp");
        assert_eq!(record.fiscal_year, 2023);
        assert_eq!(record.revenue, 185_000_000);
        assert_eq!(record.quality_flag, QualityFlag::Clean);
    }

    #[test]
    fn test_comma_grouped_float_coercion() {
        let row = raw_row("Test Corp", "2023", "1,250,000.0", "26,000,000", "258000000", "148000000");
        let record = validate_row(&row, 2).unwrap();

        assert_eq!(record.revenue, 1_250_000);
        assert_eq!(record.net_income, 26_000_000);
    }

    #[test]
    fn test_plain_numbers_accepted() {
        let mut row = raw_row("Test Corp", "2023", "0", "0", "1", "0");
        row.insert("revenue".to_string(), json!(185000000));
        row.insert("net_income".to_string(), json!(26000000.5));

        let record = validate_row(&row, 2).unwrap();
        assert_eq!(record.revenue, 185_000_000);
        assert_eq!(record.net_income, 26_000_000); // truncated, not rounded
    }

    #[test]
    fn test_company_whitespace_stripped() {
        let row = raw_row("  Alpha Corp  ", "2023", "100", "10", "100", "50");
        let record = validate_row(&row, 2).unwrap();
        assert_eq!(record.company, "Alpha Corp");
    }

    #[test]
    fn test_empty_company_rejected() {
        let row = raw_row("   ", "2023", "100", "10", "100", "50");
        let err = validate_row(&row, 4).unwrap_err();

        assert_eq!(err.row, 4);
        assert!(err.error.contains("company: must not be empty"));
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut row = raw_row("Test Corp", "2023", "100", "10", "100", "50");
        row.insert("revenue".to_string(), Value::Null);
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("revenue: Missing value - cannot be empty"));
    }

    #[test]
    fn test_empty_string_rejected() {
        let row = raw_row("Test Corp", "2023", "", "10", "100", "50");
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("revenue: Missing value - cannot be empty"));
    }

    #[test]
    fn test_unparseable_value_names_offender() {
        let row = raw_row("Test Corp", "2023", "lots", "10", "100", "50");
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("revenue: Cannot convert 'lots' to integer"));
    }

    #[test]
    fn test_negative_revenue_rejected() {
        let row = raw_row("Bad Corp", "2023", "-100000", "10000", "100000", "50000");
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("revenue: must be non-negative"));
    }

    #[test]
    fn test_zero_assets_rejected() {
        let row = raw_row("No Assets Corp", "2023", "100000", "10000", "0", "50000");
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("total_assets: must be positive"));
    }

    #[test]
    fn test_year_out_of_range_rejected() {
        let row = raw_row("Test", "1800", "100", "10", "100", "50");
        let err = validate_row(&row, 3).unwrap_err();

        assert!(err.error.contains("fiscal_year: must be between 1900 and 2100"));
    }

    #[test]
    fn test_all_failures_surfaced() {
        // Three independent problems in one row; every one must be reported.
        let row = raw_row("", "1800", "-5", "10", "100", "50");
        let err = validate_row(&row, 7).unwrap_err();

        assert!(err.error.contains("company:"));
        assert!(err.error.contains("fiscal_year:"));
        assert!(err.error.contains("revenue:"));
        assert_eq!(err.error.matches("; ").count(), 2);
    }

    #[test]
    fn test_negative_net_income_allowed() {
        let row = raw_row("Loss Corp", "2023", "100000", "-50000", "100000", "50000");
        let record = validate_row(&row, 2).unwrap();
        assert_eq!(record.net_income, -50_000);
    }

    #[test]
    fn test_error_keeps_raw_data() {
        let row = raw_row("Test", "2023", "bad", "10", "100", "50");
        let err = validate_row(&row, 9).unwrap_err();
        assert_eq!(err.data.get("revenue"), Some(&json!("bad")));
    }

    #[test]
    fn test_empty_result() {
        let result = ValidationResult::new();
        assert_eq!(result.total_processed(), 0);
        assert_eq!(result.success_rate(), 0.0);
        assert!(result.is_successful());
    }

    #[test]
    fn test_result_counts_and_rate() {
        let mut result = ValidationResult::new();
        let good = raw_row("A", "2023", "100", "10", "100", "50");
        let bad = raw_row("B", "2023", "bad", "10", "100", "50");

        result.absorb(validate_row(&good, 2), 2);
        result.absorb(validate_row(&good, 3), 3);
        result.absorb(validate_row(&bad, 4), 4);

        assert_eq!(result.total_processed(), 3);
        assert_eq!(result.success_rate(), 66.67);
        assert!(!result.is_successful());
    }

    #[test]
    fn test_quality_warning_collected() {
        let mut result = ValidationResult::new();
        // negative equity -> flagged but still valid
        let row = raw_row("Shaky Corp", "2022", "100000", "10000", "100000", "-5000");
        result.absorb(validate_row(&row, 6), 6);

        assert_eq!(result.valid_records.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Row 6 (Shaky Corp, 2022)"));
        assert!(result.warnings[0].contains("negative_value_warning"));
    }

    #[test]
    fn test_summary_sections() {
        let mut result = ValidationResult::new();
        let bad = raw_row("B", "2023", "bad", "10", "100", "50");
        result.absorb(validate_row(&bad, 2), 2);
        result.warnings.push("Warning 1".to_string());

        let summary = result.summary();
        assert!(summary.contains("Validation Summary"));
        assert!(summary.contains("Errors"));
        assert!(summary.contains("Warnings"));
    }

    #[test]
    fn test_summary_truncates_after_five() {
        let mut result = ValidationResult::new();
        let bad = raw_row("B", "2023", "bad", "10", "100", "50");
        for row_number in 2..9 {
            result.absorb(validate_row(&bad, row_number), row_number);
        }

        let summary = result.summary();
        assert!(summary.contains("... and 2 more"));
    }
}
