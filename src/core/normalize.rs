// turns log type labels ("AWS.CloudTrail") into table names ("AWS_CloudTrail")

use std::sync::LazyLock;

use regex::Regex;

static NORMALIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*$").expect("static regex"));

const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

fn symbol_word(c: char) -> Option<&'static str> {
    let word = match c {
        '@' => "at_sign",
        ',' => "comma",
        '`' => "backtick",
        '\'' => "apostrophe",
        '$' => "dollar_sign",
        '*' => "asterisk",
        '&' => "ampersand",
        '!' => "exclamation",
        '%' => "percent",
        '+' => "plus",
        '/' => "slash",
        '\\' => "backslash",
        '#' => "hash",
        '~' => "tilde",
        '=' => "eq",
        _ => return None,
    };
    Some(word)
}

pub fn is_normalized(name: &str) -> bool {
    NORMALIZED.is_match(name)
}

pub fn normalize_name(name: &str) -> String {
    if is_normalized(name) {
        return name.to_string();
    }

    let count = name.chars().count();
    let mut out = String::with_capacity(name.len() + 8);

    for (i, c) in name.chars().enumerate() {
        let first = i == 0;
        let last = i + 1 == count;

        match c {
            'a'..='z' | 'A'..='Z' | '_' | '-' => out.push(c),
            '0'..='9' if first => {
                out.push_str(DIGIT_WORDS[(c as u8 - b'0') as usize]);
                out.push('_');
            }
            '0'..='9' => out.push(c),
            _ => {
                if let Some(word) = symbol_word(c) {
                    if !first {
                        out.push('_');
                    }
                    out.push_str(word);
                    if !last {
                        out.push('_');
                    }
                } else if !c.is_ascii() {
                    push_transliterated(&mut out, c);
                } else {
                    out.push('_');
                }
            }
        }
    }

    out
}

// accents fold to their base letter; anything that folds to punctuation
// or whitespace (an apostrophe-like mark, a space) becomes a separator
fn push_transliterated(out: &mut String, c: char) {
    match deunicode::deunicode_char(c) {
        Some(ascii) if !ascii.is_empty() && ascii.chars().all(|a| a.is_ascii_alphanumeric()) => {
            // "①" folds to "1", which may not lead
            if out.is_empty() && ascii.starts_with(|a: char| a.is_ascii_digit()) {
                out.push('_');
            }
            out.push_str(ascii)
        }
        _ => out.push('_'),
    }
}
