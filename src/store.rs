// SQLite-backed financial store
// Owns the connection, enforces the (company, fiscal_year) uniqueness
// constraint, and exposes parameterized lookups plus a restricted
// SELECT-only raw query surface for the agent

use crate::record::FinancialRecord;
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// METRICS
// ============================================================================

/// The closed set of queryable metric columns.
///
/// Keeping this an enum means a metric name can never be interpolated into
/// SQL unless it came from this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Revenue,
    NetIncome,
    TotalAssets,
    TotalEquity,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Revenue,
        Metric::NetIncome,
        Metric::TotalAssets,
        Metric::TotalEquity,
    ];

    /// Column name in the financials table.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::NetIncome => "net_income",
            Metric::TotalAssets => "total_assets",
            Metric::TotalEquity => "total_equity",
        }
    }

    /// Human-readable form ("net income" instead of "net_income").
    pub fn label(&self) -> String {
        self.column().replace('_', " ")
    }

    /// Case-insensitive lookup against the closed set.
    pub fn parse(name: &str) -> Option<Metric> {
        let normalized = name.trim().to_lowercase();
        Metric::ALL.iter().copied().find(|m| m.column() == normalized)
    }

    /// Comma-joined list of valid metric names, for error messages.
    pub fn names() -> String {
        Metric::ALL
            .iter()
            .map(|m| m.column())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record for ({company}, {fiscal_year})")]
    Duplicate { company: String, fiscal_year: i32 },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ============================================================================
// QUERY OUTCOME
// ============================================================================

/// Uniform result shape for the raw query surface.
///
/// Rows keep column order, so `data` is a list of (column, value) pairs per
/// row rather than a map.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub success: bool,
    pub data: Vec<Vec<(String, JsonValue)>>,
    pub error: Option<String>,
    pub row_count: usize,
    pub query: String,
}

impl QueryOutcome {
    fn failure(query: &str, error: impl Into<String>) -> Self {
        QueryOutcome {
            success: false,
            data: Vec::new(),
            error: Some(error.into()),
            row_count: 0,
            query: query.to_string(),
        }
    }
}

// ============================================================================
// FINANCIAL STORE
// ============================================================================

/// Store handle. Passed explicitly to the pipeline and every tool; there is
/// no process-wide instance. The connection is released when the handle
/// drops.
pub struct FinancialStore {
    conn: Connection,
    location: String,
}

impl FinancialStore {
    /// Open (creating if needed) a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(FinancialStore {
            conn,
            location: path.display().to_string(),
        })
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(FinancialStore {
            conn,
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Create the schema if absent. Safe to call repeatedly; existing rows
    /// survive.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS financials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                revenue INTEGER NOT NULL,
                net_income INTEGER NOT NULL,
                total_assets INTEGER NOT NULL,
                total_equity INTEGER NOT NULL,
                UNIQUE(company, fiscal_year)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_financials_company ON financials(company)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_financials_year ON financials(fiscal_year)",
            [],
        )?;

        Ok(())
    }

    /// Drop everything. Use with care.
    pub fn drop_all(&self) -> Result<()> {
        self.conn.execute("DROP TABLE IF EXISTS financials", [])?;
        Ok(())
    }

    /// Drop and recreate the schema.
    pub fn reset(&self) -> Result<()> {
        self.drop_all()?;
        self.initialize()
    }

    /// Insert records in order. A duplicate (company, fiscal_year) pair
    /// fails loudly; callers decide whether that aborts the run.
    pub fn insert_records(&self, records: &[FinancialRecord]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for record in records {
            let result = self.conn.execute(
                "INSERT INTO financials (
                    company, fiscal_year, revenue, net_income, total_assets, total_equity
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.company,
                    record.fiscal_year,
                    record.revenue,
                    record.net_income,
                    record.total_assets,
                    record.total_equity,
                ],
            );

            match result {
                Ok(_) => inserted += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(StoreError::Duplicate {
                        company: record.company.clone(),
                        fiscal_year: record.fiscal_year,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(inserted)
    }

    // ========================================================================
    // RAW QUERY SURFACE
    // ========================================================================

    /// Execute a raw query, restricted to read-only SELECT statements.
    ///
    /// Never panics and never propagates: statement errors come back inside
    /// the outcome so the agent always gets a uniform shape.
    pub fn execute_query(&self, sql: &str) -> QueryOutcome {
        let trimmed = sql.trim();
        if !trimmed
            .get(..6)
            .map_or(false, |head| head.eq_ignore_ascii_case("select"))
        {
            return QueryOutcome::failure(sql, "Only read-only SELECT queries are allowed.");
        }

        match self.run_select(trimmed) {
            Ok(data) => QueryOutcome {
                success: true,
                row_count: data.len(),
                data,
                error: None,
                query: sql.to_string(),
            },
            Err(e) => QueryOutcome::failure(sql, e.to_string()),
        }
    }

    fn run_select(&self, sql: &str) -> Result<Vec<Vec<(String, JsonValue)>>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = stmt.query([])?;
        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let value = match row.get_ref(index)? {
                    ValueRef::Null => JsonValue::Null,
                    ValueRef::Integer(v) => JsonValue::from(v),
                    ValueRef::Real(v) => JsonValue::from(v),
                    ValueRef::Text(bytes) => {
                        JsonValue::from(String::from_utf8_lossy(bytes).into_owned())
                    }
                    ValueRef::Blob(_) => JsonValue::Null,
                };
                fields.push((column.clone(), value));
            }
            data.push(fields);
        }
        Ok(data)
    }

    // ========================================================================
    // LOOKUPS (all parameterized)
    // ========================================================================

    /// All known companies, sorted.
    pub fn companies(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT company FROM financials ORDER BY company")?;
        let companies = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(companies)
    }

    /// All known fiscal years, ascending.
    pub fn years(&self) -> Result<Vec<i32>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT fiscal_year FROM financials ORDER BY fiscal_year")?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i32>, _>>()?;
        Ok(years)
    }

    /// Metric column names, for agent context.
    pub fn metrics(&self) -> Vec<&'static str> {
        Metric::ALL.iter().map(|m| m.column()).collect()
    }

    pub fn record_count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM financials", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All records for a company (optionally one year), ascending by year.
    pub fn company_records(
        &self,
        company: &str,
        year: Option<i32>,
    ) -> Result<Vec<FinancialRecord>, StoreError> {
        let sql = match year {
            Some(_) => {
                "SELECT company, fiscal_year, revenue, net_income, total_assets, total_equity
                 FROM financials WHERE company = ?1 AND fiscal_year = ?2"
            }
            None => {
                "SELECT company, fiscal_year, revenue, net_income, total_assets, total_equity
                 FROM financials WHERE company = ?1 ORDER BY fiscal_year"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let map_record = |row: &rusqlite::Row<'_>| {
            Ok(FinancialRecord::new(
                row.get::<_, String>(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        };

        let records = match year {
            Some(y) => stmt
                .query_map(params![company, y], map_record)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![company], map_record)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(records)
    }

    /// (fiscal_year, value) for a company's metric in the given years,
    /// ascending by year. Years with no row are simply absent.
    pub fn metric_for_years(
        &self,
        company: &str,
        metric: Metric,
        years: [i32; 2],
    ) -> Result<Vec<(i32, i64)>, StoreError> {
        let sql = format!(
            "SELECT fiscal_year, {} FROM financials
             WHERE company = ?1 AND fiscal_year IN (?2, ?3)
             ORDER BY fiscal_year",
            metric.column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map(params![company, years[0], years[1]], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    /// (company, value) for one metric in one year, descending by value.
    /// `companies` of None means every company.
    pub fn metric_by_company(
        &self,
        metric: Metric,
        year: i32,
        companies: Option<&[String]>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut bindings: Vec<rusqlite::types::Value> = vec![i64::from(year).into()];

        let sql = match companies {
            Some(names) => {
                let placeholders = (0..names.len())
                    .map(|i| format!("?{}", i + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                for name in names {
                    bindings.push(name.clone().into());
                }
                format!(
                    "SELECT company, {metric} FROM financials
                     WHERE fiscal_year = ?1 AND company IN ({placeholders})
                     ORDER BY {metric} DESC",
                    metric = metric.column(),
                    placeholders = placeholders,
                )
            }
            None => format!(
                "SELECT company, {metric} FROM financials
                 WHERE fiscal_year = ?1
                 ORDER BY {metric} DESC",
                metric = metric.column(),
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bindings), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (company, fiscal_year, revenue, net_income) rows for margin
    /// calculations, ordered by company then year.
    pub fn margin_inputs(
        &self,
        companies: &[String],
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<(String, i32, i64, i64)>, StoreError> {
        let placeholders = (0..companies.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT company, fiscal_year, revenue, net_income FROM financials
             WHERE fiscal_year BETWEEN ?1 AND ?2 AND company IN ({})
             ORDER BY company, fiscal_year",
            placeholders
        );

        let mut bindings: Vec<rusqlite::types::Value> =
            vec![i64::from(start_year).into(), i64::from(end_year).into()];
        for name in companies {
            bindings.push(name.clone().into());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bindings), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Natural-language description of the schema, injected into the agent's
    /// system prompt so it knows what data exists.
    pub fn schema_description(&self) -> Result<String, StoreError> {
        let companies = self.companies()?;
        let years = self.years()?;

        if companies.is_empty() || years.is_empty() {
            return Ok("Table: financials (empty - run ingestion first)".to_string());
        }

        let company_list = companies.join(", ");
        let year_list = years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "DATABASE SCHEMA:\n\
             ================\n\n\
             Table: financials\n\
             -----------------\n\
             Contains financial data for {count} companies across fiscal years {first}-{last}.\n\n\
             Columns:\n\
             - company (TEXT): Company name. Available: {company_list}\n\
             - fiscal_year (INTEGER): Fiscal year\n\
             - revenue (INTEGER): Total revenue in dollars\n\
             - net_income (INTEGER): Net income in dollars (can be negative for losses)\n\
             - total_assets (INTEGER): Total assets in dollars\n\
             - total_equity (INTEGER): Total equity in dollars\n\n\
             Example Queries:\n\
             - SELECT revenue FROM financials WHERE company = 'Alpha Corp' AND fiscal_year = 2022\n\
             - SELECT company, revenue FROM financials WHERE fiscal_year = 2023 ORDER BY revenue DESC\n\n\
             Available Companies: {company_list}\n\
             Available Years: {year_list}\n\
             Available Metrics: {metrics}\n\n\
             IMPORTANT: Always use exact company names as listed above.",
            count = companies.len(),
            first = years[0],
            last = years[years.len() - 1],
            company_list = company_list,
            year_list = year_list,
            metrics = Metric::names(),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<FinancialRecord> {
        vec![
            FinancialRecord::new("Alpha Corp", 2022, 168_000_000, 23_500_000, 235_000_000, 132_000_000),
            FinancialRecord::new("Alpha Corp", 2023, 185_000_000, 26_000_000, 258_000_000, 148_000_000),
            FinancialRecord::new("Beta Inc", 2022, 110_000_000, 11_800_000, 162_000_000, 83_000_000),
            FinancialRecord::new("Beta Inc", 2023, 118_000_000, 13_200_000, 178_000_000, 92_000_000),
        ]
    }

    fn populated_store() -> FinancialStore {
        let store = FinancialStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store.insert_records(&sample_records()).unwrap();
        store
    }

    #[test]
    fn test_initialize_creates_table() {
        let store = FinancialStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let outcome = store.execute_query("SELECT * FROM financials");
        assert!(outcome.success);
        assert_eq!(outcome.row_count, 0);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let store = populated_store();
        store.initialize().unwrap();
        assert_eq!(store.record_count().unwrap(), 4);
    }

    #[test]
    fn test_reset_clears_data() {
        let store = populated_store();
        assert_eq!(store.record_count().unwrap(), 4);

        store.reset().unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_returns_count() {
        let store = FinancialStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let inserted = store.insert_records(&sample_records()).unwrap();
        assert_eq!(inserted, 4);
    }

    #[test]
    fn test_duplicate_insert_fails_loudly() {
        let store = populated_store();
        let dup = vec![FinancialRecord::new(
            "Alpha Corp", 2022, 1, 1, 1, 1,
        )];

        let err = store.insert_records(&dup).unwrap_err();
        match err {
            StoreError::Duplicate { company, fiscal_year } => {
                assert_eq!(company, "Alpha Corp");
                assert_eq!(fiscal_year, 2022);
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_non_select_rejected() {
        let store = populated_store();

        let outcome = store.execute_query("DELETE FROM financials");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("read-only SELECT"));
        assert_eq!(outcome.row_count, 0);
        assert_eq!(outcome.query, "DELETE FROM financials");
    }

    #[test]
    fn test_select_case_insensitive() {
        let store = populated_store();
        let outcome = store.execute_query("  select company from financials  ");
        assert!(outcome.success);
        assert_eq!(outcome.row_count, 4);
    }

    #[test]
    fn test_bad_sql_captured_not_propagated() {
        let store = populated_store();
        let outcome = store.execute_query("SELECT * FROM wrong_table");
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_query_preserves_column_order() {
        let store = populated_store();
        let outcome =
            store.execute_query("SELECT fiscal_year, company FROM financials LIMIT 1");
        let row = &outcome.data[0];
        assert_eq!(row[0].0, "fiscal_year");
        assert_eq!(row[1].0, "company");
    }

    #[test]
    fn test_companies_sorted() {
        let store = populated_store();
        assert_eq!(store.companies().unwrap(), vec!["Alpha Corp", "Beta Inc"]);
    }

    #[test]
    fn test_years_sorted() {
        let store = populated_store();
        assert_eq!(store.years().unwrap(), vec![2022, 2023]);
    }

    #[test]
    fn test_company_records_all_years() {
        let store = populated_store();
        let records = store.company_records("Alpha Corp", None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fiscal_year, 2022);
        assert_eq!(records[1].fiscal_year, 2023);
    }

    #[test]
    fn test_company_records_single_year() {
        let store = populated_store();
        let records = store.company_records("Beta Inc", Some(2023)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].revenue, 118_000_000);
    }

    #[test]
    fn test_metric_for_years() {
        let store = populated_store();
        let values = store
            .metric_for_years("Alpha Corp", Metric::Revenue, [2022, 2023])
            .unwrap();
        assert_eq!(values, vec![(2022, 168_000_000), (2023, 185_000_000)]);
    }

    #[test]
    fn test_metric_by_company_descending() {
        let store = populated_store();
        let rows = store
            .metric_by_company(Metric::Revenue, 2023, None)
            .unwrap();
        assert_eq!(rows[0].0, "Alpha Corp");
        assert_eq!(rows[1].0, "Beta Inc");
    }

    #[test]
    fn test_metric_by_company_filtered() {
        let store = populated_store();
        let filter = vec!["Beta Inc".to_string()];
        let rows = store
            .metric_by_company(Metric::NetIncome, 2023, Some(&filter))
            .unwrap();
        assert_eq!(rows, vec![("Beta Inc".to_string(), 13_200_000)]);
    }

    #[test]
    fn test_margin_inputs_ordering() {
        let store = populated_store();
        let names = vec!["Alpha Corp".to_string(), "Beta Inc".to_string()];
        let rows = store.margin_inputs(&names, 2022, 2023).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].0, "Alpha Corp");
        assert_eq!(rows[0].1, 2022);
        assert_eq!(rows[3].0, "Beta Inc");
        assert_eq!(rows[3].1, 2023);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(Metric::parse("revenue"), Some(Metric::Revenue));
        assert_eq!(Metric::parse("  Net_Income "), Some(Metric::NetIncome));
        assert_eq!(Metric::parse("profit"), None);
    }

    #[test]
    fn test_schema_description_lists_contents() {
        let store = populated_store();
        let schema = store.schema_description().unwrap();
        assert!(schema.contains("Alpha Corp"));
        assert!(schema.contains("2022"));
        assert!(schema.contains("revenue"));
    }

    #[test]
    fn test_schema_description_empty_store() {
        let store = FinancialStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        let schema = store.schema_description().unwrap();
        assert!(schema.contains("empty"));
    }
}
