// tests for running queries against the data lake, with a scripted fake

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlguard::{
    DatabaseInfo, Datastore, Error, LakeApi, PollConfig, QueryOutcome, QueryResults, RunStatus,
    TableColumn, TableInfo, TablePage, TableSchema, get_table_schema, list_database_tables,
    list_databases, run_query,
};

#[derive(Default)]
struct FakeLake {
    outcomes: Mutex<VecDeque<QueryOutcome>>,
    submitted: Mutex<Vec<(String, String)>>,
    cancelled: Mutex<Vec<String>>,
    fail_execute: bool,
    fail_status: bool,
    databases: Vec<DatabaseInfo>,
    table_pages: Mutex<VecDeque<TablePage>>,
    cursors: Mutex<Vec<Option<String>>>,
    schema: Option<TableSchema>,
}

impl FakeLake {
    fn scripted(outcomes: Vec<QueryOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LakeApi for FakeLake {
    async fn execute(&self, sql: &str, database: &str) -> Result<String, Error> {
        if self.fail_execute {
            return Err(Error::Lake("warehouse unavailable".to_string()));
        }
        self.submitted
            .lock()
            .unwrap()
            .push((sql.to_string(), database.to_string()));
        Ok("q-1".to_string())
    }

    async fn status(&self, _query_id: &str) -> Result<QueryOutcome, Error> {
        if self.fail_status {
            return Err(Error::Lake("status unavailable".to_string()));
        }
        // once the script runs out the query just keeps running
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(QueryOutcome::Running))
    }

    async fn cancel(&self, query_id: &str) -> Result<String, Error> {
        self.cancelled.lock().unwrap().push(query_id.to_string());
        Ok(query_id.to_string())
    }

    async fn databases(&self) -> Result<Vec<DatabaseInfo>, Error> {
        Ok(self.databases.clone())
    }

    async fn tables_page(&self, _database: &str, cursor: Option<&str>) -> Result<TablePage, Error> {
        self.cursors.lock().unwrap().push(cursor.map(str::to_string));
        Ok(self.table_pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn table_schema(&self, _database: &str, _table: &str) -> Result<Option<TableSchema>, Error> {
        Ok(self.schema.clone())
    }
}

fn table(name: &str) -> TableInfo {
    TableInfo {
        name: name.to_string(),
        description: None,
        log_type: None,
    }
}

fn fast_poll() -> PollConfig {
    PollConfig {
        initial_interval: Duration::from_millis(1),
        step: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(50),
    }
}

const SQL: &str =
    "SELECT account FROM panther_logs.public.aws_cloudtrail WHERE p_occurs_since('1 d')";

fn one_row() -> QueryResults {
    QueryResults {
        columns: vec!["account".to_string()],
        rows: vec![json!({ "account": "123456789012" })],
        ..QueryResults::default()
    }
}

#[tokio::test]
async fn test_success_after_polling() {
    let lake = FakeLake::scripted(vec![
        QueryOutcome::Running,
        QueryOutcome::Running,
        QueryOutcome::Succeeded(one_row()),
    ]);

    let report = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.query_id, "q-1");
    assert_eq!(report.results.unwrap().rows.len(), 1);
    assert!(lake.cancelled.lock().unwrap().is_empty());

    let submitted = lake.submitted.lock().unwrap();
    assert_eq!(
        submitted[0],
        (
            "SELECT \"account\" FROM panther_logs.public.aws_cloudtrail WHERE p_occurs_since('1 d')"
                .to_string(),
            "panther_logs.public".to_string()
        )
    );
}

#[tokio::test]
async fn test_redshift_strips_public() {
    let lake = FakeLake::scripted(vec![QueryOutcome::Succeeded(QueryResults::default())]);

    let report = run_query(&lake, SQL, "panther_logs.public", Datastore::Redshift, &fast_poll())
        .await
        .unwrap();

    assert_eq!(report.database, "panther_logs");
    let submitted = lake.submitted.lock().unwrap();
    assert_eq!(
        submitted[0].0,
        "SELECT account FROM panther_logs.aws_cloudtrail WHERE p_occurs_since('1 d')"
    );
    assert_eq!(submitted[0].1, "panther_logs");
}

#[tokio::test]
async fn test_failed_query_reported() {
    let lake = FakeLake::scripted(vec![QueryOutcome::Failed("SQL compilation error".to_string())]);

    let report = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.message, "SQL compilation error");
    assert!(report.results.is_none());
}

#[tokio::test]
async fn test_cancelled_query_reported() {
    let lake = FakeLake::scripted(vec![QueryOutcome::Cancelled]);

    let report = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(lake.cancelled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_cancels() {
    let lake = FakeLake::default();

    let report = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::TimedOut);
    assert!(report.message.contains("timeout"));
    assert_eq!(*lake.cancelled.lock().unwrap(), vec!["q-1".to_string()]);
}

#[tokio::test]
async fn test_rejected_sql_never_submitted() {
    let lake = FakeLake::default();

    for sql in [
        "SELECT * FROM panther_logs.public.aws_cloudtrail",
        "DROP TABLE panther_logs.public.aws_cloudtrail",
        "SELECT * FROM aws_cloudtrail WHERE p_occurs_since('1 d')",
        "SELECT false FROM panther_logs.public.t WHERE p_occurs_since('1 d')",
    ] {
        let result = run_query(&lake, sql, "panther_logs.public", Datastore::Snowflake, &fast_poll()).await;
        assert!(matches!(result, Err(Error::Rejected(_))), "{sql}");
    }

    assert!(lake.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unqualified_table_message() {
    let lake = FakeLake::default();
    let err = run_query(
        &lake,
        "SELECT * FROM aws_cloudtrail WHERE p_occurs_since('1 d')",
        "panther_logs.public",
        Datastore::Snowflake,
        &fast_poll(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("not fully qualified"));
}

#[tokio::test]
async fn test_execute_error_propagates() {
    let lake = FakeLake {
        fail_execute: true,
        ..FakeLake::default()
    };

    let err = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lake(m) if m.contains("warehouse unavailable")));
}

#[tokio::test]
async fn test_non_panther_database_never_submitted() {
    let lake = FakeLake::default();

    let err = run_query(
        &lake,
        "SELECT a FROM panther_logs.public.t WHERE p_occurs_since('1 d')",
        "prod_secrets.public",
        Datastore::Snowflake,
        &fast_poll(),
    )
    .await
    .unwrap_err();

    assert!(matches!(&err, Error::Rejected(m) if m.contains("Invalid database name")), "{err}");
    assert!(lake.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_snowflake_needs_public_schema() {
    let lake = FakeLake::default();
    let result = run_query(&lake, SQL, "panther_logs", Datastore::Snowflake, &fast_poll()).await;
    assert!(matches!(result, Err(Error::Rejected(_))));
    assert!(lake.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_error_cancels() {
    let lake = FakeLake {
        fail_status: true,
        ..FakeLake::default()
    };

    let err = run_query(&lake, SQL, "panther_logs.public", Datastore::Snowflake, &fast_poll())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Lake(m) if m.contains("status unavailable")));
    assert_eq!(*lake.cancelled.lock().unwrap(), vec!["q-1".to_string()]);
}

#[tokio::test]
async fn test_list_databases() {
    let lake = FakeLake {
        databases: vec![DatabaseInfo {
            name: "panther_logs.public".to_string(),
            description: Some("log data".to_string()),
        }],
        ..FakeLake::default()
    };

    let databases = list_databases(&lake).await.unwrap();
    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].name, "panther_logs.public");
}

#[tokio::test]
async fn test_list_databases_empty() {
    let err = list_databases(&FakeLake::default()).await.unwrap_err();
    assert!(err.to_string().contains("No databases found"));
}

#[tokio::test]
async fn test_list_tables_follows_pages() {
    let lake = FakeLake {
        table_pages: Mutex::new(
            vec![
                TablePage {
                    tables: vec![table("aws_cloudtrail"), table("aws_vpcflow")],
                    has_next_page: true,
                    end_cursor: Some("page-2".to_string()),
                },
                TablePage {
                    tables: vec![table("okta_systemlog")],
                    has_next_page: false,
                    end_cursor: None,
                },
            ]
            .into(),
        ),
        ..FakeLake::default()
    };

    let tables = list_database_tables(&lake, "panther_logs.public").await.unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["aws_cloudtrail", "aws_vpcflow", "okta_systemlog"]);
    assert_eq!(
        *lake.cursors.lock().unwrap(),
        vec![None, Some("page-2".to_string())]
    );
}

#[tokio::test]
async fn test_list_tables_stops_without_cursor() {
    let lake = FakeLake {
        table_pages: Mutex::new(
            vec![TablePage {
                tables: vec![table("aws_cloudtrail")],
                has_next_page: true,
                end_cursor: None,
            }]
            .into(),
        ),
        ..FakeLake::default()
    };

    let tables = list_database_tables(&lake, "panther_logs.public").await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(lake.cursors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_table_schema() {
    let schema = TableSchema {
        name: "aws_cloudtrail".to_string(),
        display_name: Some("AWS.CloudTrail".to_string()),
        description: None,
        log_type: Some("AWS.CloudTrail".to_string()),
        columns: vec![TableColumn {
            name: "eventName".to_string(),
            data_type: "string".to_string(),
            description: None,
        }],
    };
    let lake = FakeLake {
        schema: Some(schema.clone()),
        ..FakeLake::default()
    };

    let found = get_table_schema(&lake, "panther_logs.public", "aws_cloudtrail")
        .await
        .unwrap();
    assert_eq!(found, schema);
}

#[tokio::test]
async fn test_table_schema_without_columns() {
    let lake = FakeLake {
        schema: Some(TableSchema {
            name: "empty".to_string(),
            display_name: None,
            description: None,
            log_type: None,
            columns: Vec::new(),
        }),
        ..FakeLake::default()
    };

    let err = get_table_schema(&lake, "panther_logs.public", "empty")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No columns found for table: panther_logs.public.empty"));

    let err = get_table_schema(&FakeLake::default(), "panther_logs.public", "missing")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No columns found"));
}

#[test]
fn test_poll_defaults() {
    let poll = PollConfig::with_timeout(Duration::from_secs(120));
    assert_eq!(poll.timeout, Duration::from_secs(120));
    assert_eq!(poll.initial_interval, Duration::from_secs(1));
    assert_eq!(poll.max_interval, Duration::from_secs(5));
}
