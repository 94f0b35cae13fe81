// Agent tools
// Deterministic, side-effect-free operations over the store. Each tool takes
// the store handle explicitly and returns a tagged outcome; `reply` collapses
// it to the single string the agent consumes.

use crate::store::{FinancialStore, Metric, StoreError};
use serde_json::Value;
use tracing::info;

/// Success and failure are both prose; the tag exists so tests (and callers
/// that care) can tell them apart before the boundary flattens them.
pub type ToolOutcome = Result<String, String>;

/// Flatten a tool outcome into the single string handed back to the agent.
pub fn reply(outcome: ToolOutcome) -> String {
    match outcome {
        Ok(text) | Err(text) => text,
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Resolve a company argument: exact match first, then case-insensitive.
/// Unknown names fail with the full known-company list so the agent can
/// self-correct.
fn resolve_company(store: &FinancialStore, company: &str) -> Result<String, String> {
    let known = store.companies().map_err(store_error)?;

    if known.iter().any(|c| c == company) {
        return Ok(company.to_string());
    }

    let lowered = company.to_lowercase();
    if let Some(matched) = known.iter().find(|c| c.to_lowercase() == lowered) {
        return Ok(matched.clone());
    }

    Err(format!(
        "Company '{}' not found. Available companies: {}",
        company,
        known.join(", ")
    ))
}

fn parse_metric(metric: &str) -> Result<Metric, String> {
    Metric::parse(metric).ok_or_else(|| {
        format!(
            "Invalid metric '{}'. Valid options: {}",
            metric,
            Metric::names()
        )
    })
}

fn store_error(e: StoreError) -> String {
    format!("Error retrieving data: {}", e)
}

/// Dollar amount with thousands separators, e.g. $1,250,000.
fn format_dollars(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("$-{}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// num/den as a percentage rounded to one decimal, half away from zero.
///
/// Integer arithmetic keeps boundary cases stable: 22,000,000 over
/// 160,000,000 is always 13.8, never 13.7.
fn pct_one_decimal(num: i64, den: i64) -> f64 {
    debug_assert!(den != 0);
    let scaled = num as i128 * 1000;
    let den = den as i128;
    let mut quotient = scaled / den;
    let remainder = scaled % den;
    if remainder.abs() * 2 >= den.abs() {
        quotient += if (scaled < 0) == (den < 0) { 1 } else { -1 };
    }
    quotient as f64 / 10.0
}

// ============================================================================
// TOOL: EXECUTE SQL QUERY
// ============================================================================

/// Run a read-only SELECT against the store and format the rows.
///
/// Integers above 1,000 are rendered as dollar amounts with separators.
pub fn execute_sql_query(store: &FinancialStore, sql: &str) -> ToolOutcome {
    info!("executing SQL: {}", sql);

    let outcome = store.execute_query(sql);
    if !outcome.success {
        return Err(format!(
            "Query failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    if outcome.row_count == 0 {
        return Ok("No results found for this query.".to_string());
    }

    let mut lines = vec![format!("Query returned {} result(s):\n", outcome.row_count)];
    for (index, row) in outcome.data.iter().enumerate() {
        let fields: Vec<String> = row
            .iter()
            .map(|(column, value)| format!("{}: {}", column, display_value(value)))
            .collect();
        lines.push(format!("  {}. {}", index + 1, fields.join(", ")));
    }
    Ok(lines.join("\n"))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) if v > 1000 => format_dollars(v),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// TOOL: GET COMPANY FINANCIALS
// ============================================================================

/// All metrics for one company, every year or a specific one.
pub fn get_company_financials(
    store: &FinancialStore,
    company: &str,
    year: Option<i32>,
) -> ToolOutcome {
    info!("getting financials for {}, year={:?}", company, year);

    let company = resolve_company(store, company)?;
    let records = store
        .company_records(&company, year)
        .map_err(store_error)?;

    if records.is_empty() {
        return Err(match year {
            Some(y) => format!("No data found for {} in {}.", company, y),
            None => format!("No data found for {}.", company),
        });
    }

    let mut lines = vec![format!("Financial data for {}:\n", company)];
    for record in &records {
        lines.push(format!("  Year {}:", record.fiscal_year));
        lines.push(format!("    Revenue:      {}", format_dollars(record.revenue)));
        lines.push(format!("    Net Income:   {}", format_dollars(record.net_income)));
        lines.push(format!("    Total Assets: {}", format_dollars(record.total_assets)));
        lines.push(format!("    Total Equity: {}", format_dollars(record.total_equity)));
    }
    Ok(lines.join("\n"))
}

// ============================================================================
// TOOL: CALCULATE GROWTH RATE
// ============================================================================

/// Growth of a metric between two years:
/// ((end - start) / |start|) * 100, one decimal.
pub fn calculate_growth_rate(
    store: &FinancialStore,
    company: &str,
    metric: &str,
    start_year: i32,
    end_year: i32,
) -> ToolOutcome {
    info!(
        "calculating {} growth for {} from {} to {}",
        metric, company, start_year, end_year
    );

    let company = resolve_company(store, company)?;
    let metric = parse_metric(metric)?;

    if start_year >= end_year {
        return Err(format!(
            "Start year ({}) must be before end year ({})",
            start_year, end_year
        ));
    }

    let values = store
        .metric_for_years(&company, metric, [start_year, end_year])
        .map_err(store_error)?;
    if values.len() != 2 {
        return Err(format!(
            "Could not find data for both {} and {}. Make sure both years are available.",
            start_year, end_year
        ));
    }

    let (_, start_value) = values[0];
    let (_, end_value) = values[1];

    if start_value == 0 {
        return Err(format!(
            "Cannot calculate growth rate: {} was $0 in {}",
            metric.label(),
            start_year
        ));
    }

    let rate = pct_one_decimal(end_value - start_value, start_value.abs());
    let direction = if rate > 0.0 {
        "grew"
    } else if rate < 0.0 {
        "declined"
    } else {
        "remained unchanged"
    };

    Ok(format!(
        "{}'s {} {} from {} ({}) to {} ({}), a {} of {:.1}%",
        company,
        metric.label(),
        direction,
        format_dollars(start_value),
        start_year,
        format_dollars(end_value),
        end_year,
        if rate >= 0.0 { "growth" } else { "decline" },
        rate.abs()
    ))
}

// ============================================================================
// TOOL: CALCULATE NET MARGIN
// ============================================================================

/// Net margin for one (company, year): net_income / revenue * 100, one
/// decimal, rounded half away from zero.
pub fn calculate_net_margin(store: &FinancialStore, company: &str, year: i32) -> ToolOutcome {
    info!("calculating net margin for {} in {}", company, year);

    let company = resolve_company(store, company)?;
    let records = store
        .company_records(&company, Some(year))
        .map_err(store_error)?;

    let record = match records.first() {
        Some(record) => record,
        None => {
            return Err(format!("No data found for {} in {}.", company, year));
        }
    };

    if record.revenue == 0 {
        return Err(format!(
            "{} had $0 revenue in {}, cannot calculate margin.",
            company, year
        ));
    }

    let margin = pct_one_decimal(record.net_income, record.revenue);
    Ok(format!(
        "{}'s net margin in {} was {:.1}% (Net Income: {}, Revenue: {})",
        company,
        year,
        margin,
        format_dollars(record.net_income),
        format_dollars(record.revenue)
    ))
}

// ============================================================================
// TOOL: COMPARE COMPANIES
// ============================================================================

/// Rank companies by one metric in one year, highest first. A list
/// containing "all" (any case) means every known company.
pub fn compare_companies(
    store: &FinancialStore,
    companies: &[String],
    metric: &str,
    year: i32,
) -> ToolOutcome {
    info!("comparing {:?} by {} in {}", companies, metric, year);

    let metric = parse_metric(metric)?;

    let filter = if companies.iter().any(|c| c.eq_ignore_ascii_case("all")) {
        None
    } else {
        let mut resolved = Vec::with_capacity(companies.len());
        for company in companies {
            resolved.push(resolve_company(store, company)?);
        }
        Some(resolved)
    };

    let rows = store
        .metric_by_company(metric, year, filter.as_deref())
        .map_err(store_error)?;
    if rows.is_empty() {
        return Err(format!("No data found for year {}.", year));
    }

    let mut lines = vec![format!(
        "Comparison of {} in {} (highest to lowest):\n",
        metric.label(),
        year
    )];
    for (rank, (company, value)) in rows.iter().enumerate() {
        lines.push(format!("  {}. {}: {}", rank + 1, company, format_dollars(*value)));
    }

    if rows.len() > 1 {
        let (highest, highest_value) = &rows[0];
        let (lowest, lowest_value) = &rows[rows.len() - 1];
        lines.push(format!(
            "\nHighest: {} ({})",
            highest,
            format_dollars(*highest_value)
        ));
        lines.push(format!("Lowest: {} ({})", lowest, format_dollars(*lowest_value)));
    }

    Ok(lines.join("\n"))
}

// ============================================================================
// TOOL: GET AVAILABLE DATA
// ============================================================================

/// What the store currently holds: companies, years, metrics, record count.
pub fn get_available_data(store: &FinancialStore) -> ToolOutcome {
    let companies = store.companies().map_err(store_error)?;
    let years = store.years().map_err(store_error)?;
    let count = store.record_count().map_err(store_error)?;

    Ok(format!(
        "Available Data Summary:\n\n\
         Companies ({}):\n  {}\n\n\
         Years ({}):\n  {}\n\n\
         Metrics:\n  {}\n\n\
         Total Records: {}",
        companies.len(),
        companies.join(", "),
        years.len(),
        years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        Metric::names(),
        count
    ))
}

// ============================================================================
// TOOL: COMPARE NET MARGINS OVER TIME
// ============================================================================

/// Net margins per company per year across a range, with the first-to-last
/// change in percentage points.
pub fn compare_net_margins_over_time(
    store: &FinancialStore,
    companies: &[String],
    start_year: i32,
    end_year: i32,
) -> ToolOutcome {
    info!(
        "comparing net margins for {:?} from {} to {}",
        companies, start_year, end_year
    );

    let mut resolved = Vec::with_capacity(companies.len());
    for company in companies {
        resolved.push(resolve_company(store, company)?);
    }

    let rows = store
        .margin_inputs(&resolved, start_year, end_year)
        .map_err(store_error)?;
    if rows.is_empty() {
        return Err("No data found for the specified companies and years.".to_string());
    }

    // group by company, preserving the query's first-seen order
    let mut by_company: Vec<(String, Vec<(i32, f64)>)> = Vec::new();
    for (company, year, revenue, net_income) in rows {
        let margin = if revenue > 0 {
            pct_one_decimal(net_income, revenue)
        } else {
            0.0
        };
        match by_company.last_mut() {
            Some((current, margins)) if *current == company => margins.push((year, margin)),
            _ => by_company.push((company, vec![(year, margin)])),
        }
    }

    let mut lines = vec![format!("Net Margin Comparison ({}-{}):\n", start_year, end_year)];
    for (company, margins) in &by_company {
        lines.push(format!("  {}:", company));
        for (year, margin) in margins {
            lines.push(format!("    {}: {:.1}%", year, margin));
        }

        if margins.len() >= 2 {
            let first = margins[0].1;
            let last = margins[margins.len() - 1].1;
            let change = last - first;
            let direction = if change > 0.0 {
                "improved"
            } else if change < 0.0 {
                "declined"
            } else {
                "unchanged"
            };
            lines.push(format!(
                "    Change: {}{:.1}pp ({})",
                if change >= 0.0 { "+" } else { "" },
                change,
                direction
            ));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

// ============================================================================
// TESTS
// ============================================================================
