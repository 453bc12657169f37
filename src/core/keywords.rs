// reserved word tables per warehouse
// three disjoint groups: quotable, forbidden in scalar context, forbidden as column name

use serde::Serialize;

use super::datastore::Datastore;

// ansi reserved words plus snowflake's own. legal as column names only when double quoted
pub const SNOWFLAKE_QUOTABLE: &[&str] = &[
    // ansi
    "ALL", "ALTER", "AND", "ANY", "AS", "BETWEEN", "BY", "CHECK", "COLUMN", "CONNECT",
    "CREATE", "CURRENT", "DELETE", "DISTINCT", "DROP", "ELSE", "EXISTS", "FOLLOWING", "FOR",
    "FROM", "GRANT", "GROUP", "HAVING", "ILIKE", "IN", "INCREMENT", "INSERT", "INTERSECT",
    "INTO", "IS", "LIKE", "MINUS", "NOT", "NULL", "OF", "ON", "OR", "ORDER", "REVOKE", "ROW",
    "ROWS", "SAMPLE", "SELECT", "SET", "SOME", "START", "TABLE", "TABLESAMPLE", "THEN", "TO",
    "TRIGGER", "UNION", "UNIQUE", "UPDATE", "VALUES", "WHENEVER", "WHERE", "WITH",
    // snowflake
    "ACCOUNT", "CONSTRAINT", "CROSS", "DATABASE", "FULL", "GSCLUSTER", "INNER", "ISSUE",
    "JOIN", "LATERAL", "LEFT", "NATURAL", "ORGANIZATION", "QUALIFY", "REGEXP", "RIGHT",
    "RLIKE", "SCHEMA", "USING", "VIEW",
];

// redshift reserved words, minus the forbidden groups and niladic value functions
// (CURRENT_DATE, SYSDATE, USER, ...) which are expressions, not column names
pub const REDSHIFT_QUOTABLE: &[&str] = &[
    "AES128", "AES256", "ALL", "ALLOWOVERWRITE", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY",
    "AS", "ASC", "AUTHORIZATION", "AZ64", "BACKUP", "BETWEEN", "BINARY", "BLANKSASNULL",
    "BOTH", "BYTEDICT", "BZIP2", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE",
    "CREDENTIALS", "CROSS", "DEFAULT", "DEFERRABLE", "DEFLATE", "DEFRAG", "DELTA", "DELTA32K",
    "DESC", "DISABLE", "DISTINCT", "DO", "ELSE", "EMPTYASNULL", "ENABLE", "ENCODE", "ENCRYPT",
    "ENCRYPTION", "END", "EXCEPT", "EXPLICIT", "FOR", "FOREIGN", "FREEZE", "FROM", "FULL",
    "GLOBALDICT256", "GLOBALDICT64K", "GRANT", "GROUP", "GZIP", "HAVING", "IDENTITY", "IGNORE",
    "ILIKE", "IN", "INITIALLY", "INNER", "INTERSECT", "INTERVAL", "INTO", "IS", "ISNULL", "JOIN",
    "LANGUAGE", "LEADING", "LEFT", "LIKE", "LIMIT", "LUN", "LUNS", "LZO", "LZOP", "MINUS",
    "MOSTLY16", "MOSTLY32", "MOSTLY8", "NATURAL", "NEW", "NOT", "NOTNULL", "NULL", "NULLS",
    "OFF", "OFFLINE", "OFFSET", "OID", "OLD", "ON", "ONLY", "OPEN", "OR", "ORDER", "OUTER",
    "OVERLAPS", "PARALLEL", "PARTITION", "PERCENT", "PERMISSIONS", "PIVOT", "PLACING",
    "PRIMARY", "RAW", "READRATIO", "RECOVER", "REFERENCES", "REJECTLOG", "RESORT", "RESPECT",
    "RESTORE", "RIGHT", "SELECT", "SIMILAR", "SNAPSHOT", "SOME", "SYSTEM", "TABLE", "TAG",
    "TDES", "TEXT255", "TEXT32K", "THEN", "TIMESTAMP", "TO", "TOP", "TRAILING",
    "TRUNCATECOLUMNS", "UNION", "UNIQUE", "UNNEST", "UNPIVOT", "USING", "VERBOSE", "WALLET",
    "WHERE", "WITH", "WITHOUT",
];

// never a bare column reference in a scalar expression, quoted or not
pub const FORBIDDEN_SCALAR: &[&str] = &["CASE", "CAST", "FALSE", "TRUE", "TRY_CAST", "WHEN"];

// reserved by ansi, never usable as a column name
pub const FORBIDDEN_COLUMN_NAME: &[&str] =
    &["CURRENT_TIME", "CURRENT_USER", "LOCALTIME", "LOCALTIMESTAMP"];

// query structure. quoting one of these would change what the query means,
// so the rewriter leaves them alone even when the warehouse reserves them
const SYNTAX_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BOTH", "BY", "COLLATE", "CROSS", "CURRENT",
    "DESC", "DISTINCT", "ELSE", "END", "EXCEPT", "EXISTS", "FOLLOWING", "FOR", "FROM", "FULL",
    "GROUP", "HAVING", "IGNORE", "ILIKE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO", "IS",
    "ISNULL", "JOIN", "LATERAL", "LEADING", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOT",
    "NOTNULL", "NULL", "NULLS", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PARTITION", "PIVOT",
    "RESPECT", "RIGHT", "ROW", "ROWS", "SELECT", "SIMILAR", "SOME", "THEN", "TO", "TOP",
    "TRAILING", "UNION", "UNPIVOT", "USING", "VALUES", "WHERE", "WITH",
];

pub fn quotable_words(dialect: Datastore) -> &'static [&'static str] {
    match dialect {
        Datastore::Snowflake => SNOWFLAKE_QUOTABLE,
        Datastore::Redshift => REDSHIFT_QUOTABLE,
    }
}

pub fn is_quotable(word: &str, dialect: Datastore) -> bool {
    contains(quotable_words(dialect), word)
}

pub fn is_forbidden_scalar(word: &str) -> bool {
    contains(FORBIDDEN_SCALAR, word)
}

pub fn is_forbidden_column_name(word: &str) -> bool {
    contains(FORBIDDEN_COLUMN_NAME, word)
}

// words the rewriter wraps in double quotes when they show up as bare columns
pub(crate) fn is_rewrite_target(word: &str, dialect: Datastore) -> bool {
    is_quotable(word, dialect) && !contains(SYNTAX_KEYWORDS, word)
}

fn contains(set: &[&str], word: &str) -> bool {
    set.iter().any(|w| w.eq_ignore_ascii_case(word))
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservedWordsInfo {
    pub datastore_type: Datastore,
    pub quotable_reserved_words: Vec<&'static str>,
    pub forbidden_scalar_expressions: Vec<&'static str>,
    pub forbidden_column_names: Vec<&'static str>,
    pub guidance: String,
}

pub fn reserved_words_info(dialect: Datastore) -> ReservedWordsInfo {
    let sorted = |words: &[&'static str]| {
        let mut words = words.to_vec();
        words.sort_unstable();
        words
    };

    ReservedWordsInfo {
        datastore_type: dialect,
        quotable_reserved_words: sorted(quotable_words(dialect)),
        forbidden_scalar_expressions: sorted(FORBIDDEN_SCALAR),
        forbidden_column_names: sorted(FORBIDDEN_COLUMN_NAME),
        guidance: format!(
            "Quotable reserved words are wrapped in double quotes automatically when used as \
             column references on {dialect}. Forbidden words are rejected: rename or alias the \
             column in the source instead."
        ),
    }
}
