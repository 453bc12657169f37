// select-list rewriting
// reserved words used as bare columns get double quoted; words that can never
// be columns are reported instead. only the text between SELECT and its FROM is touched

use thiserror::Error;
use tracing::warn;

use super::datastore::Datastore;
use super::keywords::{self, FORBIDDEN_COLUMN_NAME, FORBIDDEN_SCALAR};
use super::lexer::{self, Kind, Token};

#[derive(Debug, Error, PartialEq, Eq)]
enum ScanError {
    #[error("unbalanced parentheses")]
    Unbalanced,
    #[error("unterminated quote or comment")]
    Unterminated,
}

#[derive(Debug, Default)]
struct Scan {
    // byte ranges of words to wrap in double quotes
    quote: Vec<(usize, usize)>,
    forbidden_scalar: Vec<String>,
    forbidden_column: Vec<String>,
}

// one per parenthesis level
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    projection: bool,
    // SELECT itself sits at this level, so commas here separate select items
    select_root: bool,
    // CAST( / TRY_CAST( arguments, where AS introduces a data type
    cast: bool,
    open_cases: usize,
}

impl Scan {
    fn forbid(list: &mut Vec<String>, word: &str) {
        let word = word.to_ascii_uppercase();
        if !list.contains(&word) {
            list.push(word);
        }
    }

    fn forbidden_message(&self) -> Option<String> {
        let mut problems = Vec::new();

        if !self.forbidden_scalar.is_empty() {
            problems.push(format!(
                "{} cannot be used as column reference in scalar expressions (forbidden: {})",
                self.forbidden_scalar.join(", "),
                FORBIDDEN_SCALAR.join(", ")
            ));
        }
        if !self.forbidden_column.is_empty() {
            problems.push(format!(
                "{} cannot be used as column name (reserved by ANSI) (forbidden: {})",
                self.forbidden_column.join(", "),
                FORBIDDEN_COLUMN_NAME.join(", ")
            ));
        }

        if problems.is_empty() {
            None
        } else {
            Some(format!(
                "Query contains forbidden keyword usage: {}. Rename or alias these columns upstream; quoting does not help",
                problems.join("; ")
            ))
        }
    }
}

fn scan(sql: &str, dialect: Datastore) -> Result<Scan, ScanError> {
    let all = lexer::tokenize(sql);
    if all.iter().any(|t| !t.closed) {
        return Err(ScanError::Unterminated);
    }

    let toks: Vec<Token<'_>> = all
        .into_iter()
        .filter(|t| !matches!(t.kind, Kind::Space | Kind::Comment))
        .collect();

    let mut frames = vec![Frame::default()];
    let mut out = Scan::default();
    // inside a data type: CAST(x AS TIMESTAMP WITHOUT TIME ZONE), x::timestamp, CONVERT(INT, x)
    let mut in_type = false;

    for (i, &tok) in toks.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| toks[p]);
        let next = toks.get(i + 1).copied();

        let type_word = in_type && tok.kind == Kind::Word && !tok.is_word("AS");
        in_type = type_word || (tok.is_punct(':') && prev.is_some_and(|p| p.is_punct(':')));

        match tok.kind {
            Kind::Punct('(') => {
                let projection = frames.last().is_some_and(|f| f.projection);
                let cast = prev.is_some_and(|p| p.is_any_word(&["CAST", "TRY_CAST"]));
                in_type = prev.is_some_and(|p| p.is_word("CONVERT"));
                frames.push(Frame {
                    projection,
                    cast,
                    ..Frame::default()
                });
                continue;
            }
            Kind::Punct(')') => {
                if frames.len() == 1 {
                    return Err(ScanError::Unbalanced);
                }
                frames.pop();
                continue;
            }
            Kind::Punct(';') => {
                frames.truncate(1);
                frames[0] = Frame::default();
                continue;
            }
            Kind::Word => {}
            _ => continue,
        }

        let Some(frame) = frames.last_mut() else {
            return Err(ScanError::Unbalanced);
        };

        if tok.is_word("SELECT") {
            *frame = Frame {
                projection: true,
                select_root: true,
                ..Frame::default()
            };
            continue;
        }
        if !frame.projection {
            continue;
        }
        if tok.is_word("FROM") && !is_distinct_from(&toks, i) {
            frame.projection = false;
            frame.select_root = false;
            continue;
        }

        if type_word {
            continue;
        }
        if tok.is_word("AS") && frame.cast {
            in_type = true;
            continue;
        }
        // variant paths (col:field)
        if prev.is_some_and(|p| p.is_punct(':')) {
            continue;
        }
        // function calls
        if next.is_some_and(|n| n.is_punct('(')) {
            continue;
        }
        // typed literals and operators on strings: TIMESTAMP '...', x REGEXP '...'
        if next.is_some_and(|n| n.kind == Kind::Str) {
            continue;
        }

        if tok.is_word("CASE") {
            if closes_case(&toks[i + 1..]) {
                frame.open_cases += 1;
            } else {
                Scan::forbid(&mut out.forbidden_scalar, tok.text);
            }
            continue;
        }
        if tok.is_word("WHEN") {
            if frame.open_cases == 0 {
                Scan::forbid(&mut out.forbidden_scalar, tok.text);
            }
            continue;
        }
        if tok.is_word("END") {
            frame.open_cases = frame.open_cases.saturating_sub(1);
            continue;
        }

        if keywords::is_forbidden_scalar(tok.text) {
            if frame.select_root && is_select_item(prev, next) {
                Scan::forbid(&mut out.forbidden_scalar, tok.text);
            }
            continue;
        }
        if keywords::is_forbidden_column_name(tok.text) {
            if frame.select_root && is_select_item(prev, next) {
                Scan::forbid(&mut out.forbidden_column, tok.text);
            }
            continue;
        }

        if keywords::is_rewrite_target(tok.text, dialect) {
            out.quote.push((tok.start, tok.end()));
        }
    }

    Ok(out)
}

// `a IS [NOT] DISTINCT FROM b` is a comparison, not the end of a select list
fn is_distinct_from(toks: &[Token<'_>], i: usize) -> bool {
    i >= 2 && toks[i - 1].is_word("DISTINCT") && toks[i - 2].is_any_word(&["IS", "NOT"])
}

// a word standing alone as a whole select item: `SELECT x, ...`, `..., x FROM`
fn is_select_item(prev: Option<Token<'_>>, next: Option<Token<'_>>) -> bool {
    let starts = prev.is_none_or(|p| p.is_punct(',') || p.is_any_word(&["SELECT", "DISTINCT", "ALL"]));
    let ends = next.is_none_or(|n| {
        n.is_punct(',') || n.is_punct(')') || n.is_punct(';') || n.is_word("FROM")
    });
    starts && ends
}

// does a CASE opened just before `rest` reach its END at the same level?
fn closes_case(rest: &[Token<'_>]) -> bool {
    let mut depth = 0usize;
    let mut nested = 0usize;

    for t in rest {
        if t.is_punct('(') {
            depth += 1;
        } else if t.is_punct(')') {
            if depth == 0 {
                return false;
            }
            depth -= 1;
        } else if t.is_punct(';') {
            return false;
        } else if depth == 0 && t.is_word("CASE") {
            nested += 1;
        } else if depth == 0 && t.is_word("END") {
            if nested == 0 {
                return true;
            }
            nested -= 1;
        }
    }

    false
}

fn apply(sql: &str, ranges: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(sql.len() + ranges.len() * 2);
    let mut last = 0;

    for &(start, end) in ranges {
        out.push_str(&sql[last..start]);
        out.push('"');
        out.push_str(&sql[start..end]);
        out.push('"');
        last = end;
    }
    out.push_str(&sql[last..]);

    out
}

/// Quotes reserved-word columns in every select list and rejects words that
/// can never be columns. Scanning problems (an unterminated literal,
/// unbalanced parentheses) are logged and the query is returned untouched.
pub fn validate_and_wrap_reserved_words(sql: &str, dialect: Datastore) -> Result<String, String> {
    match scan(sql, dialect) {
        Ok(found) => match found.forbidden_message() {
            Some(message) => Err(message),
            None => Ok(apply(sql, &found.quote)),
        },
        Err(e) => {
            warn!(error = %e, "could not scan select list, leaving sql unchanged");
            Ok(sql.to_string())
        }
    }
}

// quoting only; forbidden words pass through untouched
pub fn wrap_reserved_words(sql: &str, dialect: Datastore) -> String {
    match scan(sql, dialect) {
        Ok(found) => apply(sql, &found.quote),
        Err(e) => {
            warn!(error = %e, "could not scan select list, leaving sql unchanged");
            sql.to_string()
        }
    }
}

pub fn check_forbidden_words(sql: &str, dialect: Datastore) -> Option<String> {
    scan(sql, dialect).ok()?.forbidden_message()
}
