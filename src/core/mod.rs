// core logic - the sql guard, warehouse dialects, and the data lake client

mod datastore;
mod keywords;
mod lake;
mod lexer;
mod normalize;
mod rewrite;
mod validate;

pub use datastore::{
    DATASTORE_ENV, DEFAULT_DATABASE, Datastore, PANTHER_DATABASES, SyntaxHelp,
    event_time_between, format_timestamp,
};
pub use keywords::{
    FORBIDDEN_COLUMN_NAME, FORBIDDEN_SCALAR, REDSHIFT_QUOTABLE, ReservedWordsInfo,
    SNOWFLAKE_QUOTABLE, is_forbidden_column_name, is_forbidden_scalar, is_quotable,
    quotable_words, reserved_words_info,
};
pub use lake::{
    DEFAULT_API_URL, DataLake, DatabaseInfo, LakeApi, PollConfig, QueryOutcome, QueryReport,
    QueryResults, QueryStats, QueryStatus, RunStatus, TableColumn, TableInfo, TablePage,
    TableSchema, cancel_error_message, get_table_schema, list_database_tables, list_databases,
    run_query,
};
pub use normalize::{is_normalized, normalize_name};
pub use rewrite::{check_forbidden_words, validate_and_wrap_reserved_words, wrap_reserved_words};
pub use validate::{
    MAX_QUERY_CHARS, TIME_MACROS, ValidationResult, WRITE_KEYWORDS, validate_database_name,
    validate_fully_qualified_tables, validate_read_only, validate_sql_basic,
    validate_sql_comprehensive, validate_sql_time_filter,
};
