// output formatting - pretty tables or raw json

use serde::Serialize;
use serde_json::Value;

use crate::core::{DatabaseInfo, QueryReport, QueryResults, TableInfo, TableSchema, ValidationResult};

const MAX_WIDTH: usize = 40;

pub struct Output;

impl Output {
    pub fn verdict(result: &ValidationResult) {
        if result.valid {
            println!("ok");
            if let Some(sql) = &result.processed_sql {
                println!("\n{sql}");
            }
        } else {
            println!("rejected: {}", result.error.as_deref().unwrap_or("unknown error"));
        }
    }

    pub fn report(report: &QueryReport) {
        println!("query: {} ({:?})", report.query_id, report.status);
        println!("database: {}", report.database);
        println!("sql: {}\n", report.sql);

        match &report.results {
            Some(results) => Self::table(results),
            None => println!("{}", report.message),
        }
    }

    // nice table format for humans
    pub fn table(results: &QueryResults) {
        println!(
            "rows: {}  bytes scanned: {}  time: {}s\n",
            results.stats.row_count, results.stats.bytes_scanned, results.stats.execution_time
        );

        if results.rows.is_empty() {
            println!("no results");
            return;
        }

        let columns = column_order(results);
        let cells: Vec<Vec<String>> = results
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).map(format_value).unwrap_or_default())
                    .collect()
            })
            .collect();

        grid(columns.as_slice(), &cells);

        if results.has_next_page {
            println!("\n(more rows available)");
        }
    }

    pub fn databases(databases: &[DatabaseInfo]) {
        let cells: Vec<Vec<String>> = databases
            .iter()
            .map(|d| vec![d.name.clone(), d.description.clone().unwrap_or_default()])
            .collect();
        grid(&["name", "description"], &cells);
    }

    pub fn tables(tables: &[TableInfo]) {
        let cells: Vec<Vec<String>> = tables
            .iter()
            .map(|t| {
                vec![
                    t.name.clone(),
                    t.log_type.clone().unwrap_or_default(),
                    t.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        grid(&["name", "log type", "description"], &cells);
        println!("\n{} tables", tables.len());
    }

    pub fn schema(schema: &TableSchema) {
        println!("table: {}", schema.name);
        if let Some(log_type) = &schema.log_type {
            println!("log type: {log_type}");
        }
        println!();

        let cells: Vec<Vec<String>> = schema
            .columns
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    c.data_type.clone(),
                    c.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        grid(&["column", "type", "description"], &cells);
    }

    // raw json for scripts
    pub fn raw<T: Serialize>(value: &T) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

fn grid<S: AsRef<str>>(columns: &[S], cells: &[Vec<String>]) {
    // figure out column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.as_ref().len()).collect();
    for row in cells {
        for (i, val) in row.iter().enumerate() {
            widths[i] = widths[i].max(val.chars().count());
        }
    }

    // cap so things don't get crazy
    for w in &mut widths {
        *w = (*w).min(MAX_WIDTH);
    }

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c.as_ref(), width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", sep.join("-+-"));

    for row in cells {
        let formatted: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{:width$}", truncate(s), width = widths[i]))
            .collect();
        println!("{}", formatted.join(" | "));
    }
}

// the api's column order when it sent one, else the keys of the first row
fn column_order(results: &QueryResults) -> Vec<String> {
    if !results.columns.is_empty() {
        return results.columns.clone();
    }
    match results.rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_WIDTH {
        let head: String = s.chars().take(MAX_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn format_value(val: &Value) -> String {
    match val {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}
