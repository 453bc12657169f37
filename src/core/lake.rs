// panther data lake client - submit vetted sql, poll until it settles, cancel on timeout

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::datastore::Datastore;
use super::validate::{validate_fully_qualified_tables, validate_sql_comprehensive};
use crate::Error;

pub const DEFAULT_API_URL: &str = "https://api.runpanther.com/public/graphql";

const EXECUTE_QUERY: &str = r#"
mutation ExecuteDataLakeQuery($input: ExecuteDataLakeQueryInput!) {
    executeDataLakeQuery(input: $input) {
        id
    }
}"#;

const GET_QUERY: &str = r#"
query GetDataLakeQuery($id: ID!, $root: Boolean = false) {
    dataLakeQuery(id: $id, root: $root) {
        id
        status
        message
        results(input: { pageSize: 999 }) {
            edges {
                node
            }
            pageInfo {
                hasNextPage
                endCursor
            }
            columnInfo {
                order
                types
            }
            stats {
                bytesScanned
                executionTime
                rowCount
            }
        }
    }
}"#;

const CANCEL_QUERY: &str = r#"
mutation CancelDataLakeQuery($input: CancelDataLakeQueryInput!) {
    cancelDataLakeQuery(input: $input) {
        id
    }
}"#;

const LIST_DATABASES_QUERY: &str = r#"
query ListDatabases {
    dataLakeDatabases {
        name
        description
    }
}"#;

const LIST_TABLES_QUERY: &str = r#"
query ListTables($databaseName: String!, $pageSize: Int, $cursor: String) {
    dataLakeDatabaseTables(
        input: { databaseName: $databaseName, pageSize: $pageSize, cursor: $cursor }
    ) {
        edges {
            node {
                name
                description
                logType
            }
        }
        pageInfo {
            hasNextPage
            endCursor
        }
    }
}"#;

const GET_TABLE_QUERY: &str = r#"
query GetColumnDetails($databaseName: String!, $tableName: String!) {
    dataLakeDatabaseTable(input: { databaseName: $databaseName, tableName: $tableName }) {
        name
        displayName
        description
        logType
        columns {
            name
            type
            description
        }
    }
}"#;

const TABLE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    pub bytes_scanned: f64,
    pub execution_time: f64,
    pub row_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub column_types: Map<String, Value>,
    pub rows: Vec<Value>,
    pub stats: QueryStats,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

// what the lake says about a query right now
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Running,
    Succeeded(QueryResults),
    Failed(String),
    Cancelled,
}

impl QueryOutcome {
    pub fn status(&self) -> QueryStatus {
        match self {
            Self::Running => QueryStatus::Running,
            Self::Succeeded(_) => QueryStatus::Succeeded,
            Self::Failed(_) => QueryStatus::Failed,
            Self::Cancelled => QueryStatus::Cancelled,
        }
    }
}

// how a run ended. timing out is its own state, the query was cancelled by us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

// catalog entries. the api speaks camelCase, we print snake_case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "logType")]
    pub log_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TablePage {
    pub tables: Vec<TableInfo>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "logType")]
    pub log_type: Option<String>,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query_id: String,
    pub status: RunStatus,
    pub message: String,
    pub sql: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResults>,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    // added to the interval after every round
    pub step: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait LakeApi: Send + Sync {
    /// Submits sql and returns the query id.
    async fn execute(&self, sql: &str, database: &str) -> Result<String, Error>;

    async fn status(&self, query_id: &str) -> Result<QueryOutcome, Error>;

    /// Cancels a running query and returns the cancelled id.
    async fn cancel(&self, query_id: &str) -> Result<String, Error>;

    async fn databases(&self) -> Result<Vec<DatabaseInfo>, Error>;

    /// One page of a database's tables; `cursor` is the previous page's end.
    async fn tables_page(&self, database: &str, cursor: Option<&str>) -> Result<TablePage, Error>;

    async fn table_schema(&self, database: &str, table: &str) -> Result<Option<TableSchema>, Error>;
}

pub struct DataLake {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct GqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Deserialize)]
struct IdNode {
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteData {
    execute_data_lake_query: Option<IdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelData {
    cancel_data_lake_query: Option<IdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetData {
    data_lake_query: Option<QueryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabasesData {
    #[serde(default)]
    data_lake_databases: Vec<DatabaseInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TablesData {
    data_lake_database_tables: Option<TablesConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TablesConnection {
    #[serde(default)]
    edges: Vec<TableEdge>,
    page_info: Option<PageInfo>,
}

#[derive(Deserialize)]
struct TableEdge {
    node: TableInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableData {
    data_lake_database_table: Option<TableSchema>,
}

impl From<TablesConnection> for TablePage {
    fn from(conn: TablesConnection) -> Self {
        let (has_next_page, end_cursor) = conn
            .page_info
            .map(|p| (p.has_next_page, p.end_cursor))
            .unwrap_or_default();

        Self {
            tables: conn.edges.into_iter().map(|e| e.node).collect(),
            has_next_page,
            end_cursor,
        }
    }
}

#[derive(Deserialize)]
struct QueryNode {
    status: QueryStatus,
    message: Option<String>,
    results: Option<ResultsNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsNode {
    #[serde(default)]
    edges: Vec<Edge>,
    page_info: Option<PageInfo>,
    column_info: Option<ColumnInfo>,
    stats: Option<StatsNode>,
}

#[derive(Deserialize)]
struct Edge {
    node: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ColumnInfo {
    #[serde(default)]
    order: Vec<String>,
    #[serde(default)]
    types: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsNode {
    #[serde(default)]
    bytes_scanned: f64,
    #[serde(default)]
    execution_time: f64,
    #[serde(default)]
    row_count: u64,
}

impl From<QueryNode> for QueryOutcome {
    fn from(node: QueryNode) -> Self {
        match node.status {
            QueryStatus::Running => Self::Running,
            QueryStatus::Cancelled => Self::Cancelled,
            QueryStatus::Failed => Self::Failed(node.message.unwrap_or_else(|| "Query failed".into())),
            QueryStatus::Succeeded => {
                let Some(results) = node.results else {
                    return Self::Succeeded(QueryResults::default());
                };
                let (columns, column_types) = results
                    .column_info
                    .map(|c| (c.order, c.types))
                    .unwrap_or_default();
                let (has_next_page, end_cursor) = results
                    .page_info
                    .map(|p| (p.has_next_page, p.end_cursor))
                    .unwrap_or_default();

                Self::Succeeded(QueryResults {
                    columns,
                    column_types,
                    rows: results.edges.into_iter().map(|e| e.node).collect(),
                    stats: results
                        .stats
                        .map(|s| QueryStats {
                            bytes_scanned: s.bytes_scanned,
                            execution_time: s.execution_time,
                            row_count: s.row_count,
                        })
                        .unwrap_or_default(),
                    has_next_page,
                    end_cursor,
                })
            }
        }
    }
}

impl DataLake {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Result<Self, Error> {
        let api_key = api_key
            .or_else(|| std::env::var("PANTHER_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(Error::MissingApiKey)?;

        let api_url = api_url
            .or_else(|| std::env::var("PANTHER_GQL_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        })
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, Error> {
        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-Key", &self.api_key)
            .header("content-type", "application/json")
            .json(&GqlRequest { query, variables })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(Error::Lake(format!("{status}: {body}")));
        }

        let body: GqlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(Error::Lake(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| Error::Lake("response carried no data".to_string()))
    }
}

#[async_trait]
impl LakeApi for DataLake {
    async fn execute(&self, sql: &str, database: &str) -> Result<String, Error> {
        let data: ExecuteData = self
            .graphql(
                EXECUTE_QUERY,
                json!({ "input": { "sql": sql, "databaseName": database } }),
            )
            .await?;

        data.execute_data_lake_query
            .and_then(|n| n.id)
            .ok_or_else(|| Error::Lake("No query ID returned from execution".to_string()))
    }

    async fn status(&self, query_id: &str) -> Result<QueryOutcome, Error> {
        let data: GetData = self
            .graphql(GET_QUERY, json!({ "id": query_id, "root": false }))
            .await?;

        data.data_lake_query
            .map(QueryOutcome::from)
            .ok_or_else(|| Error::Lake(format!("No query found with ID: {query_id}")))
    }

    async fn cancel(&self, query_id: &str) -> Result<String, Error> {
        let data: CancelData = self
            .graphql(CANCEL_QUERY, json!({ "input": { "id": query_id } }))
            .await
            .map_err(|e| Error::Lake(cancel_error_message(query_id, &e.to_string())))?;

        data.cancel_data_lake_query
            .and_then(|n| n.id)
            .ok_or_else(|| Error::Lake("No query ID returned from cancellation".to_string()))
    }

    async fn databases(&self) -> Result<Vec<DatabaseInfo>, Error> {
        let data: DatabasesData = self.graphql(LIST_DATABASES_QUERY, json!({})).await?;
        Ok(data.data_lake_databases)
    }

    async fn tables_page(&self, database: &str, cursor: Option<&str>) -> Result<TablePage, Error> {
        let data: TablesData = self
            .graphql(
                LIST_TABLES_QUERY,
                json!({ "databaseName": database, "pageSize": TABLE_PAGE_SIZE, "cursor": cursor }),
            )
            .await?;

        Ok(data.data_lake_database_tables.map(TablePage::from).unwrap_or_default())
    }

    async fn table_schema(&self, database: &str, table: &str) -> Result<Option<TableSchema>, Error> {
        let data: TableData = self
            .graphql(
                GET_TABLE_QUERY,
                json!({ "databaseName": database, "tableName": table }),
            )
            .await?;

        Ok(data.data_lake_database_table)
    }
}

pub async fn list_databases<A: LakeApi + ?Sized>(api: &A) -> Result<Vec<DatabaseInfo>, Error> {
    let databases = api.databases().await?;
    if databases.is_empty() {
        return Err(Error::Lake("No databases found".to_string()));
    }
    info!(count = databases.len(), "listed data lake databases");
    Ok(databases)
}

/// Every table in `database`, following the api's pages to the end.
pub async fn list_database_tables<A: LakeApi + ?Sized>(
    api: &A,
    database: &str,
) -> Result<Vec<TableInfo>, Error> {
    let mut tables = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = api.tables_page(database, cursor.as_deref()).await?;
        tables.extend(page.tables);

        match page.end_cursor {
            Some(next) if page.has_next_page => cursor = Some(next),
            _ => break,
        }
    }

    info!(%database, count = tables.len(), "listed data lake tables");
    Ok(tables)
}

pub async fn get_table_schema<A: LakeApi + ?Sized>(
    api: &A,
    database: &str,
    table: &str,
) -> Result<TableSchema, Error> {
    match api.table_schema(database, table).await? {
        Some(schema) if !schema.columns.is_empty() => Ok(schema),
        _ => Err(Error::Lake(format!("No columns found for table: {database}.{table}"))),
    }
}

// the api's cancellation errors are terse; say what they mean
pub fn cancel_error_message(query_id: &str, raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("not found") {
        format!("Query {query_id} not found. It may have already completed or been cancelled.")
    } else if lower.contains("cannot be cancelled") {
        format!("Query {query_id} cannot be cancelled. Only running queries can be cancelled.")
    } else if lower.contains("permission") {
        format!("Permission denied. You may not have permission to cancel query {query_id}.")
    } else {
        format!("Failed to cancel query {query_id}: {raw}")
    }
}

/// Vets `sql` (time filter, read-only, database allow-list, qualified tables),
/// adapts it and the database name to `dialect`, submits it and polls with growing intervals
/// until the query settles. A query still running at `poll.timeout` is
/// cancelled and reported as timed out.
pub async fn run_query<A: LakeApi + ?Sized>(
    api: &A,
    sql: &str,
    database: &str,
    dialect: Datastore,
    poll: &PollConfig,
) -> Result<QueryReport, Error> {
    let verdict = validate_sql_comprehensive(sql, true, true, Some(database), dialect);
    if !verdict.valid {
        return Err(Error::Rejected(verdict.error.unwrap_or_default()));
    }
    let processed = verdict.processed_sql.unwrap_or_else(|| sql.to_string());

    let tables = validate_fully_qualified_tables(&processed);
    if !tables.valid {
        return Err(Error::Rejected(tables.error.unwrap_or_default()));
    }

    let processed = dialect.convert_database_references(&processed);
    let database = dialect.format_database_reference(database);

    let started = Instant::now();
    let query_id = api.execute(&processed, &database).await?;
    info!(%query_id, %database, %dialect, "submitted data lake query");

    let report = |status, message: String, results| QueryReport {
        query_id: query_id.clone(),
        status,
        message,
        sql: processed.clone(),
        database: database.clone(),
        results,
    };

    let mut interval = poll.initial_interval;
    loop {
        tokio::time::sleep(interval).await;

        let outcome = match api.status(&query_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%query_id, error = %e, "status check failed, cancelling");
                if let Err(cancel) = api.cancel(&query_id).await {
                    warn!(%query_id, error = %cancel, "cancel after failed status check failed");
                }
                return Err(e);
            }
        };

        match outcome {
            QueryOutcome::Running => {
                if started.elapsed() >= poll.timeout {
                    warn!(%query_id, timeout = ?poll.timeout, "query timed out, cancelling");
                    if let Err(e) = api.cancel(&query_id).await {
                        warn!(%query_id, error = %e, "cancel after timeout failed");
                    }
                    return Ok(report(
                        RunStatus::TimedOut,
                        "Query time exceeded timeout, and has been cancelled. A longer timeout may be \
                         required. Retrying may be faster due to caching, or you may need to reduce \
                         the duration of data being queried."
                            .to_string(),
                        None,
                    ));
                }
            }
            QueryOutcome::Succeeded(results) => {
                info!(%query_id, rows = results.rows.len(), "query succeeded");
                return Ok(report(
                    RunStatus::Succeeded,
                    "Query executed successfully".to_string(),
                    Some(results),
                ));
            }
            QueryOutcome::Failed(message) => {
                warn!(%query_id, %message, "query failed");
                return Ok(report(RunStatus::Failed, message, None));
            }
            QueryOutcome::Cancelled => {
                return Ok(report(RunStatus::Cancelled, "Query was cancelled".to_string(), None));
            }
        }

        interval = (interval + poll.step).min(poll.max_interval);
    }
}
