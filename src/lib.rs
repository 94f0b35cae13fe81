// finquery - Financial Q&A Core Library
// CSV ingestion with validation, a SQLite-backed store, and the query tools
// an LLM agent calls to answer questions about the data

pub mod ingest;
pub mod record;
pub mod store;
pub mod tools;
pub mod validator;

// Re-export commonly used types
pub use ingest::IngestionPipeline;
pub use record::{FinancialRecord, QualityFlag};
pub use store::{FinancialStore, Metric, QueryOutcome, StoreError};
pub use tools::{
    calculate_growth_rate, calculate_net_margin, compare_companies,
    compare_net_margins_over_time, execute_sql_query, get_available_data,
    get_company_financials, reply, ToolOutcome,
};
pub use validator::{validate_row, RawRow, RowError, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
