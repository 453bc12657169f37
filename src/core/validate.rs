// gatekeeping for data lake sql
// every check is a plain function returning a ValidationResult; the
// comprehensive check runs them in a fixed order and stops at the first failure

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::tokenizer::{Token as SqlToken, Tokenizer};
use tracing::debug;

use super::datastore::{Datastore, PANTHER_DATABASES};
use super::lexer::{self, Token};
use super::rewrite;

pub const MAX_QUERY_CHARS: usize = 10_000;

pub const TIME_MACROS: &[&str] = &[
    "p_occurs_since",
    "p_occurs_between",
    "p_occurs_around",
    "p_occurs_after",
    "p_occurs_before",
];

pub const WRITE_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "UPSERT", "GRANT", "REVOKE", "COMMIT", "ROLLBACK", "SAVEPOINT",
];

// WHERE/AND, then (possibly table-qualified) p_event_time compared against something
static EVENT_TIME_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\b(?:where|and)\s+.*?(?:[\w.]+\.)?\bp_event_time\s*(?:>=|<=|=|>|<|between\b)")
        .expect("static regex")
});

// keywords after which `(` opens a subquery or a grouping, not a function call
const OPENS_SUBQUERY: &[&str] = &[
    "FROM", "JOIN", "AS", "IN", "EXISTS", "ANY", "ALL", "SOME", "ON", "AND", "OR", "NOT",
    "WHERE", "SELECT", "UNION", "INTERSECT", "EXCEPT", "MINUS", "LATERAL", "USING", "WITH",
    "OVER", "VALUES", "WHEN", "THEN", "ELSE", "CASE", "BY", "HAVING", "QUALIFY", "DISTINCT",
];

// keywords that end a comma separated FROM list. JOIN ... ON/USING keeps it open
const ENDS_FROM_LIST: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "QUALIFY", "UNION", "INTERSECT", "EXCEPT",
    "MINUS", "WINDOW", "SELECT",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    pub processed_sql: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            processed_sql: None,
        }
    }

    pub fn accepted(sql: String) -> Self {
        Self {
            valid: true,
            error: None,
            processed_sql: Some(sql),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            processed_sql: None,
        }
    }
}

pub fn validate_sql_basic(sql: &str) -> ValidationResult {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return ValidationResult::rejected("SQL query cannot be empty");
    }

    if sql.chars().count() > MAX_QUERY_CHARS {
        return ValidationResult::rejected(format!(
            "Query too long. Maximum {} characters allowed",
            group_thousands(MAX_QUERY_CHARS)
        ));
    }

    // both warehouses accept backslash escapes in string literals
    let tokens = match Tokenizer::new(&SnowflakeDialect {}, trimmed).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => return ValidationResult::rejected(format!("Failed to parse SQL query: {e}")),
    };

    if tokens
        .iter()
        .all(|t| matches!(t, SqlToken::Whitespace(_) | SqlToken::EOF))
    {
        return ValidationResult::rejected("Invalid SQL query: no statement found");
    }

    ValidationResult::ok()
}

/// A time macro anywhere in the text is enough. Otherwise a WHERE/AND must
/// compare `p_event_time` (optionally table-qualified) against something.
pub fn validate_sql_time_filter(sql: &str) -> ValidationResult {
    if sql.trim().is_empty() {
        return ValidationResult::rejected("SQL query cannot be empty");
    }

    let lower = sql.to_lowercase();
    if TIME_MACROS.iter().any(|m| lower.contains(m)) || EVENT_TIME_FILTER.is_match(&lower) {
        return ValidationResult::ok();
    }

    ValidationResult::rejected(format!(
        "Query must include a time filter: either a p_event_time filter condition after WHERE or AND \
         (e.g. p_event_time >= DATEADD(day, -1, CURRENT_TIMESTAMP())), or one of the Panther time macros: {}",
        TIME_MACROS.join(", ")
    ))
}

/// Rejects statements that write or change state. Keywords inside string
/// literals, quoted identifiers, comments or longer names (`updates_column`)
/// are ignored, as are same-named functions such as `REPLACE(s, a, b)`.
pub fn validate_read_only(sql: &str) -> ValidationResult {
    let toks = lexer::significant(sql);

    let found = toks.iter().enumerate().find(|&(i, t)| {
        t.is_any_word(WRITE_KEYWORDS) && !toks.get(i + 1).is_some_and(|n| n.is_punct('('))
    });

    match found {
        Some((_, tok)) => ValidationResult::rejected(format!(
            "Query contains forbidden keyword {}: only read-only queries are allowed (forbidden: {})",
            tok.text.to_ascii_uppercase(),
            WRITE_KEYWORDS.join(", ")
        )),
        None => ValidationResult::ok(),
    }
}

/// Panther manages a fixed set of databases. Snowflake addresses them through
/// the `public` schema; on Redshift the schema suffix is optional since it is
/// stripped before submission anyway.
pub fn validate_database_name(database_name: &str, dialect: Datastore) -> ValidationResult {
    let name = database_name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return ValidationResult::rejected("Database name cannot be empty");
    }

    let (base, has_public) = match name.strip_suffix(".public") {
        Some(base) => (base, true),
        None => (name.as_str(), false),
    };

    let allowed = PANTHER_DATABASES.contains(&base)
        && match dialect {
            Datastore::Snowflake => has_public,
            Datastore::Redshift => true,
        };

    if allowed {
        return ValidationResult::ok();
    }

    let examples: Vec<String> = PANTHER_DATABASES
        .iter()
        .map(|db| match dialect {
            Datastore::Snowflake => format!("{db}.public"),
            Datastore::Redshift => db.to_string(),
        })
        .collect();

    ValidationResult::rejected(format!(
        "Invalid database name '{database_name}'. Must be a valid Panther database for {dialect}: {}",
        examples.join(", ")
    ))
}

/// Every table named after FROM or JOIN must carry its database
/// (`panther_logs.public.aws_cloudtrail`, `panther_logs.aws_cloudtrail`).
/// Subqueries, table functions and names defined by WITH are exempt.
pub fn validate_fully_qualified_tables(sql: &str) -> ValidationResult {
    let toks = lexer::significant(sql);
    let ctes = cte_names(&toks);

    // per paren level: are we inside function arguments, are we in a FROM list
    let mut frames: Vec<(bool, bool)> = vec![(false, false)];

    for (i, tok) in toks.iter().enumerate() {
        if tok.is_punct('(') {
            let function_args = i
                .checked_sub(1)
                .map(|p| toks[p])
                .is_some_and(|p| p.is_ident() && !p.is_any_word(OPENS_SUBQUERY));
            frames.push((function_args, false));
            continue;
        }
        if tok.is_punct(')') {
            if frames.len() > 1 {
                frames.pop();
            }
            continue;
        }

        let Some(frame) = frames.last_mut() else {
            break;
        };
        let (function_args, in_from_list) = *frame;

        // EXTRACT(MINUTE FROM ts), TRIM(BOTH FROM s), a IS DISTINCT FROM b
        let opens_list = tok.is_word("FROM")
            && !function_args
            && !(i >= 1 && toks[i - 1].is_word("DISTINCT"));
        let joins = tok.is_word("JOIN");
        let continues_list = in_from_list && tok.is_punct(',');

        if opens_list || joins || continues_list {
            frame.1 = true;
            if let Some(name) = unqualified_table(&toks, i + 1, &ctes) {
                return ValidationResult::rejected(format!(
                    "Table reference '{name}' is not fully qualified. Use database.table \
                     (e.g. panther_logs.public.{name})"
                ));
            }
        } else if tok.is_any_word(ENDS_FROM_LIST) {
            frame.1 = false;
        }
    }

    ValidationResult::ok()
}

// names introduced by `WITH name AS (` / `, name AS (`
fn cte_names(toks: &[Token<'_>]) -> HashSet<String> {
    toks.windows(3)
        .filter(|w| w[0].is_ident() && w[1].is_word("AS") && w[2].is_punct('('))
        .map(|w| unquote(w[0].text).to_ascii_lowercase())
        .collect()
}

fn unqualified_table<'a>(toks: &[Token<'a>], at: usize, ctes: &HashSet<String>) -> Option<&'a str> {
    let first = toks.get(at)?;

    // subquery, or a table function: LATERAL FLATTEN(...), TABLE(...), fn(...)
    if !first.is_ident() || first.is_word("LATERAL") {
        return None;
    }
    if toks.get(at + 1).is_some_and(|t| t.is_punct('(')) {
        return None;
    }

    let qualified = toks.get(at + 1).is_some_and(|t| t.is_punct('.'));
    if qualified || ctes.contains(&unquote(first.text).to_ascii_lowercase()) {
        return None;
    }

    Some(first.text)
}

fn unquote(ident: &str) -> &str {
    ident.trim_matches(|c| c == '"' || c == '`')
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// The single entry point the query tools use. Order: shape, time filter,
/// read-only (with forbidden column words), database name, then reserved
/// word quoting. Nothing reaches `processed_sql` without passing the gates.
pub fn validate_sql_comprehensive(
    sql: &str,
    require_time_filter: bool,
    read_only: bool,
    database_name: Option<&str>,
    dialect: Datastore,
) -> ValidationResult {
    let basic = validate_sql_basic(sql);
    if !basic.valid {
        debug!(error = ?basic.error, "sql rejected: shape");
        return basic;
    }

    if require_time_filter {
        let time = validate_sql_time_filter(sql);
        if !time.valid {
            debug!(error = ?time.error, "sql rejected: time filter");
            return time;
        }
    }

    if read_only {
        let writes = validate_read_only(sql);
        if !writes.valid {
            debug!(error = ?writes.error, "sql rejected: not read-only");
            return writes;
        }
        if let Some(message) = rewrite::check_forbidden_words(sql, dialect) {
            debug!(error = %message, "sql rejected: forbidden column words");
            return ValidationResult::rejected(message);
        }
    }

    if let Some(name) = database_name {
        let db = validate_database_name(name, dialect);
        if !db.valid {
            debug!(error = ?db.error, "sql rejected: database name");
            return db;
        }
    }

    ValidationResult::accepted(rewrite::wrap_reserved_words(sql, dialect))
}
