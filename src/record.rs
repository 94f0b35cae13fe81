// Financial record model
// One company's financials for one fiscal year, plus derived ratios

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// QUALITY FLAGS
// ============================================================================

/// Annotation for data anomalies detected during ingestion.
///
/// A flagged record is still valid and still persisted; the flag only feeds
/// the ingestion warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Clean,
    MissingValueImputed,
    NegativeValueWarning,
    OutlierDetected,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Clean => "clean",
            QualityFlag::MissingValueImputed => "missing_value_imputed",
            QualityFlag::NegativeValueWarning => "negative_value_warning",
            QualityFlag::OutlierDetected => "outlier_detected",
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for QualityFlag {
    fn default() -> Self {
        QualityFlag::Clean
    }
}

// ============================================================================
// FINANCIAL RECORD
// ============================================================================

/// One row of company financial data for a specific fiscal year.
///
/// All monetary values are whole dollars. Invariants (enforced by the
/// validator before construction):
/// - company: non-empty after trimming
/// - fiscal_year: 1900..=2100
/// - revenue: >= 0 (0 is legal for pre-revenue companies)
/// - net_income: any sign (losses happen)
/// - total_assets: > 0
/// - total_equity: any sign (liabilities can exceed assets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub company: String,
    pub fiscal_year: i32,
    pub revenue: i64,
    pub net_income: i64,
    pub total_assets: i64,
    pub total_equity: i64,

    #[serde(default)]
    pub quality_flag: QualityFlag,
}

impl FinancialRecord {
    /// Build a record and assess its quality flag in one step.
    pub fn new(
        company: impl Into<String>,
        fiscal_year: i32,
        revenue: i64,
        net_income: i64,
        total_assets: i64,
        total_equity: i64,
    ) -> Self {
        let mut record = FinancialRecord {
            company: company.into(),
            fiscal_year,
            revenue,
            net_income,
            total_assets,
            total_equity,
            quality_flag: QualityFlag::Clean,
        };
        record.quality_flag = record.assess_quality();
        record
    }

    /// Cross-field sanity checks. These flag, they never reject.
    ///
    /// Exactly one flag is kept; a net income above revenue outranks
    /// negative equity when both hold.
    fn assess_quality(&self) -> QualityFlag {
        if self.revenue > 0 && self.net_income > self.revenue {
            QualityFlag::OutlierDetected
        } else if self.total_equity < 0 {
            QualityFlag::NegativeValueWarning
        } else {
            QualityFlag::Clean
        }
    }

    /// Net profit margin as a percentage (0.0 when revenue is 0).
    pub fn net_margin(&self) -> f64 {
        if self.revenue == 0 {
            return 0.0;
        }
        round2(self.net_income as f64 / self.revenue as f64 * 100.0)
    }

    /// Return on equity as a percentage (0.0 when equity is 0).
    pub fn return_on_equity(&self) -> f64 {
        if self.total_equity == 0 {
            return 0.0;
        }
        round2(self.net_income as f64 / self.total_equity as f64 * 100.0)
    }

    /// Equity ratio as a percentage of total assets.
    pub fn equity_ratio(&self) -> f64 {
        round2(self.total_equity as f64 / self.total_assets as f64 * 100.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(revenue: i64, net_income: i64, total_equity: i64) -> FinancialRecord {
        FinancialRecord::new("Test Corp", 2023, revenue, net_income, 100_000, total_equity)
    }

    #[test]
    fn test_clean_record() {
        let r = record(100_000, 10_000, 50_000);
        assert_eq!(r.quality_flag, QualityFlag::Clean);
    }

    #[test]
    fn test_outlier_when_income_exceeds_revenue() {
        let r = record(100_000, 150_000, 50_000);
        assert_eq!(r.quality_flag, QualityFlag::OutlierDetected);
    }

    #[test]
    fn test_negative_equity_flagged() {
        let r = record(100_000, 10_000, -5_000);
        assert_eq!(r.quality_flag, QualityFlag::NegativeValueWarning);
    }

    #[test]
    fn outlier_beats_negative_equity() {
        // Both conditions hold; the outlier flag wins. Pins the single-flag
        // priority so a future refactor cannot silently change it.
        let r = record(100_000, 150_000, -5_000);
        assert_eq!(r.quality_flag, QualityFlag::OutlierDetected);
    }

    #[test]
    fn test_zero_revenue_not_outlier() {
        let r = record(0, 10_000, 50_000);
        assert_eq!(r.quality_flag, QualityFlag::Clean);
    }

    #[test]
    fn test_net_margin() {
        let r = record(1_000_000, 150_000, 300_000);
        assert_eq!(r.net_margin(), 15.0);
    }

    #[test]
    fn test_net_margin_zero_revenue() {
        let r = record(0, -50_000, 50_000);
        assert_eq!(r.net_margin(), 0.0);
    }

    #[test]
    fn test_return_on_equity() {
        let r = record(1_000_000, 150_000, 300_000);
        assert_eq!(r.return_on_equity(), 50.0);
    }

    #[test]
    fn test_return_on_equity_zero_equity() {
        let r = record(1_000_000, 150_000, 0);
        assert_eq!(r.return_on_equity(), 0.0);
    }

    #[test]
    fn test_equity_ratio() {
        // total_assets fixed at 100_000 by the helper
        let r = record(1_000_000, 150_000, 25_000);
        assert_eq!(r.equity_ratio(), 25.0);
    }

    #[test]
    fn test_flag_serializes_snake_case() {
        let json = serde_json::to_string(&QualityFlag::OutlierDetected).unwrap();
        assert_eq!(json, "\"outlier_detected\"");
    }
}
