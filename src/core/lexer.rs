// permissive sql scanner
// keeps byte offsets so callers can splice edits back into the original text

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Word,
    QuotedIdent,
    Str,
    Number,
    Comment,
    Space,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token<'a> {
    pub kind: Kind,
    pub text: &'a str,
    pub start: usize,
    // false for a string, quoted identifier or block comment that hit end of input
    pub closed: bool,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.kind == Kind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_any_word(&self, words: &[&str]) -> bool {
        self.kind == Kind::Word && words.iter().any(|w| self.text.eq_ignore_ascii_case(w))
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == Kind::Punct(c)
    }

    pub fn is_ident(&self) -> bool {
        matches!(self.kind, Kind::Word | Kind::QuotedIdent)
    }
}

pub(crate) fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < sql.len() {
        let start = i;
        let ch = sql[i..].chars().next().unwrap_or('\0');
        let next = bytes.get(i + 1).copied();
        let mut closed = true;

        let kind = match ch {
            c if c.is_whitespace() => {
                i = scan_while(sql, i, char::is_whitespace);
                Kind::Space
            }
            '-' if next == Some(b'-') => {
                i = sql[i..].find('\n').map_or(sql.len(), |n| i + n);
                Kind::Comment
            }
            '/' if next == Some(b'*') => {
                match sql[i + 2..].find("*/") {
                    Some(n) => i += 2 + n + 2,
                    None => {
                        i = sql.len();
                        closed = false;
                    }
                }
                Kind::Comment
            }
            '$' if next == Some(b'$') => {
                match sql[i + 2..].find("$$") {
                    Some(n) => i += 2 + n + 2,
                    None => {
                        i = sql.len();
                        closed = false;
                    }
                }
                Kind::Str
            }
            '\'' => {
                (i, closed) = scan_quoted(bytes, i, b'\'', true);
                Kind::Str
            }
            '"' => {
                (i, closed) = scan_quoted(bytes, i, b'"', false);
                Kind::QuotedIdent
            }
            '`' => {
                (i, closed) = scan_quoted(bytes, i, b'`', false);
                Kind::QuotedIdent
            }
            c if c.is_alphabetic() || c == '_' => {
                i = scan_while(sql, i, |c| c.is_alphanumeric() || c == '_' || c == '$');
                Kind::Word
            }
            c if c.is_ascii_digit() => {
                i = scan_while(sql, i, |c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
                Kind::Number
            }
            c => {
                i += c.len_utf8();
                Kind::Punct(c)
            }
        };

        tokens.push(Token {
            kind,
            text: &sql[start..i],
            start,
            closed,
        });
    }

    tokens
}

// tokens that carry meaning: no whitespace, no comments
pub(crate) fn significant(sql: &str) -> Vec<Token<'_>> {
    tokenize(sql)
        .into_iter()
        .filter(|t| !matches!(t.kind, Kind::Space | Kind::Comment))
        .collect()
}

fn scan_while(sql: &str, from: usize, keep: impl Fn(char) -> bool) -> usize {
    sql[from..]
        .char_indices()
        .find(|&(_, c)| !keep(c))
        .map_or(sql.len(), |(n, _)| from + n)
}

// doubled quote escapes itself; string literals also honour backslash escapes
fn scan_quoted(bytes: &[u8], from: usize, quote: u8, backslash: bool) -> (usize, bool) {
    let mut i = from + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if backslash => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return (i + 1, true);
                }
            }
            _ => i += 1,
        }
    }
    (bytes.len(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(Kind, &str)> {
        significant(sql).iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn literals_and_identifiers_are_single_tokens() {
        assert_eq!(
            kinds(r#"SELECT "order", 'it''s', `x y` FROM t"#),
            vec![
                (Kind::Word, "SELECT"),
                (Kind::QuotedIdent, "\"order\""),
                (Kind::Punct(','), ","),
                (Kind::Str, "'it''s'"),
                (Kind::Punct(','), ","),
                (Kind::QuotedIdent, "`x y`"),
                (Kind::Word, "FROM"),
                (Kind::Word, "t"),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let words: Vec<_> = significant("SELECT a -- drop table\n, b /* delete */ FROM t")
            .iter()
            .filter(|t| t.kind == Kind::Word)
            .map(|t| t.text)
            .collect();
        assert_eq!(words, vec!["SELECT", "a", "b", "FROM", "t"]);
    }

    #[test]
    fn offsets_cover_the_input() {
        let sql = "SELECT Μύκονος, x::string FROM db.t";
        let rebuilt: String = tokenize(sql).iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, sql);
        assert!(tokenize(sql).iter().all(|t| &sql[t.start..t.end()] == t.text));
    }

    #[test]
    fn unterminated_literal_is_flagged() {
        let tokens = tokenize("SELECT 'oops");
        assert!(!tokens.last().unwrap().closed);
    }
}
