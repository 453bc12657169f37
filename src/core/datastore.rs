// which warehouse panther runs on, and the sql bits that differ between them

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::normalize::normalize_name;

// env var the deployment uses to pick the warehouse
pub const DATASTORE_ENV: &str = "PANTHER_DATASTORE_TYPE";

// databases panther manages, without schema suffix
pub const PANTHER_DATABASES: &[&str] = &[
    "panther_logs",
    "panther_views",
    "panther_signals",
    "panther_rule_matches",
    "panther_rule_errors",
    "panther_monitor",
    "panther_cloudsecurity",
];

pub const DEFAULT_DATABASE: &str = "panther_logs.public";

static PUBLIC_SCHEMA_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(panther_(?:logs|views|signals|rule_matches|rule_errors|monitor|cloudsecurity))\.public\.",
    )
    .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Datastore {
    #[default]
    Snowflake,
    Redshift,
}

impl Datastore {
    /// Resolves a configuration value. Matching ignores case; anything
    /// unrecognized (or nothing at all) means Snowflake.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("redshift") => Self::Redshift,
            _ => Self::Snowflake,
        }
    }

    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(DATASTORE_ENV).ok().as_deref())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Redshift => "redshift",
        }
    }

    pub fn current_timestamp(self) -> &'static str {
        match self {
            Self::Snowflake => "CURRENT_TIMESTAMP()",
            Self::Redshift => "GETDATE()",
        }
    }

    /// `base` shifted by `amount` units, in this dialect's syntax.
    pub fn dateadd(self, unit: &str, amount: i64, base: &str) -> String {
        match self {
            Self::Snowflake => format!("DATEADD({unit}, {amount}, {base})"),
            Self::Redshift => {
                let sign = if amount < 0 { '-' } else { '+' };
                format!("{base} {sign} INTERVAL '{} {unit}'", amount.unsigned_abs())
            }
        }
    }

    /// Redshift has no `public` schema layer for panther databases, so the
    /// suffix is dropped there. Snowflake keeps the name as given.
    pub fn format_database_reference(self, name: &str) -> String {
        match self {
            Self::Snowflake => name.to_string(),
            Self::Redshift => strip_public_suffix(name).to_string(),
        }
    }

    /// Same rule as `format_database_reference`, applied to every panther
    /// `db.public.table` reference inside a full query.
    pub fn convert_database_references(self, sql: &str) -> String {
        match self {
            Self::Snowflake => sql.to_string(),
            Self::Redshift => PUBLIC_SCHEMA_REF.replace_all(sql, "$1.").into_owned(),
        }
    }

    // the last week of events for a log type, newest first
    pub fn sample_events_sql(self, log_type: &str) -> String {
        let database = self.format_database_reference(DEFAULT_DATABASE);
        let table = normalize_name(log_type);
        let since = self.dateadd("day", -7, self.current_timestamp());

        format!(
            "SELECT *\nFROM {database}.{table}\nWHERE p_event_time >= {since}\nORDER BY p_event_time DESC\nLIMIT 10"
        )
    }
}

// query-writing guidance for whoever (usually an llm) writes the sql
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxHelp {
    pub datastore_type: Datastore,
    pub database_references: String,
    pub date_functions: String,
    pub time_filters: String,
    pub reserved_words: String,
}

impl Datastore {
    pub fn syntax_help(self) -> SyntaxHelp {
        let qualified = "REQUIRED: Use fully qualified table references (database.table or \
                         database.schema.table), e.g. panther_logs.public.aws_cloudtrail.";
        let (database_references, date_functions) = match self {
            Self::Snowflake => (
                format!(
                    "{qualified} The .public schema is preserved for Snowflake: \
                     panther_logs.public.aws_cloudtrail."
                ),
                format!(
                    "Current time: {}. Date arithmetic: {}. Truncation: DATE_TRUNC('HOUR', p_event_time).",
                    self.current_timestamp(),
                    self.dateadd("day", -1, self.current_timestamp())
                ),
            ),
            Self::Redshift => (
                format!(
                    "{qualified} References are automatically converted to remove .public: \
                     panther_logs.public.aws_cloudtrail becomes panther_logs.aws_cloudtrail."
                ),
                format!(
                    "Current time: {}. Date arithmetic uses INTERVAL: {}. Truncation: DATE_TRUNC('hour', p_event_time).",
                    self.current_timestamp(),
                    self.dateadd("day", -1, self.current_timestamp())
                ),
            ),
        };

        SyntaxHelp {
            datastore_type: self,
            database_references,
            date_functions,
            time_filters: format!(
                "Every query must filter on time: a WHERE/AND condition on p_event_time \
                 (p_event_time >= {}) or a macro such as p_occurs_since('1 d').",
                self.dateadd("day", -1, self.current_timestamp())
            ),
            reserved_words: "Reserved words used as column names are double quoted automatically; \
                             CASE, TRUE, FALSE, CURRENT_USER and similar cannot be column references."
                .to_string(),
        }
    }
}

impl std::fmt::Display for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Datastore {
    fn from(value: &str) -> Self {
        Self::from_env_value(Some(value))
    }
}

fn strip_public_suffix(name: &str) -> &str {
    let cut = name.len().saturating_sub(".public".len());
    match name.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(".public") => &name[..cut],
        _ => name,
    }
}

// timestamps the way the panther api prints them
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

pub fn event_time_between(column: &str, start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    format!(
        "{column} BETWEEN '{}' AND '{}'",
        format_timestamp(start),
        format_timestamp(end)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_suffix_case_insensitively() {
        assert_eq!(strip_public_suffix("panther_logs.PUBLIC"), "panther_logs");
        assert_eq!(strip_public_suffix(".public"), ".public");
        assert_eq!(strip_public_suffix("public"), "public");
    }

    #[test]
    fn between_uses_millisecond_utc() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = DateTime::parse_from_rfc3339("2024-01-02T12:30:00.250Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            event_time_between("cs.p_event_time", &start, &end),
            "cs.p_event_time BETWEEN '2024-01-01 00:00:00.000Z' AND '2024-01-02 12:30:00.250Z'"
        );
    }
}
