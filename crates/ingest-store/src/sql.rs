//! SQL text helpers: identifier quoting, comment stripping, the read-only
//! guard for caller-supplied SQL, and FROM-target extraction.
//!
//! The guard is lexical. Comments are removed first (respecting string
//! literals), single-quoted literal contents are blanked, and only then are
//! statement separators and blocked keywords looked for.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

static BLOCKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(DROP|DELETE|INSERT|UPDATE|ALTER|CREATE|TRUNCATE|COPY|ATTACH|DETACH|EXPORT|IMPORT|LOAD|INSTALL|CALL|PRAGMA|SET|EXECUTE|VACUUM|REINDEX|READ_CSV|READ_PARQUET|READ_JSON|GLOB|LOAD_EXTENSION|READFILE|WRITEFILE)\b",
    )
    .expect("valid blocked keyword regex")
});

static WHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid where regex"));

static FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("valid from regex"));

static JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").expect("valid join regex"));

static AS_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAS\s+").expect("valid alias regex"));

static CLAUSE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(WHERE|GROUP|ORDER|LIMIT|OFFSET|HAVING|UNION|EXCEPT|INTERSECT|WINDOW)\b")
        .expect("valid clause regex")
});

const NOT_A_TABLE: [&str; 8] = [
    "SELECT", "WHERE", "GROUP", "ORDER", "LIMIT", "VALUES", "LATERAL", "UNNEST",
];

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

/// Remove `--` line comments and `/* */` block comments outside quotes.
pub fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                if chars.peek() == Some(&q) {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Blank the contents of single-quoted literals, keeping byte offsets.
fn mask_literals(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_literal {
            if b == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                in_literal = false;
                out.push(b);
            } else {
                out.push(b' ');
            }
        } else {
            if b == b'\'' {
                in_literal = true;
            }
            out.push(b);
        }
        i += 1;
    }
    // Whole multi-byte sequences are either kept or blanked, so this cannot fail.
    String::from_utf8(out).unwrap_or_default()
}

/// Blank everything nested inside parentheses, keeping byte offsets.
fn mask_nested(masked: &str) -> String {
    let mut depth = 0usize;
    let out: Vec<u8> = masked
        .bytes()
        .map(|b| match b {
            b'(' => {
                depth += 1;
                if depth == 1 { b } else { b' ' }
            }
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 { b } else { b' ' }
            }
            _ if depth > 0 => b' ',
            _ => b,
        })
        .collect();
    String::from_utf8(out).unwrap_or_default()
}

fn check_blocked(masked: &str) -> Result<()> {
    if masked.contains(';') {
        return Err(Error::rejected("multiple statements are not allowed"));
    }
    if let Some(found) = BLOCKED.find(masked) {
        return Err(Error::rejected(format!(
            "keyword '{}' is not allowed",
            found.as_str().to_ascii_uppercase()
        )));
    }
    Ok(())
}

/// Validate a caller-supplied read query and return the comment-free text to run.
pub fn ensure_read_only(sql: &str) -> Result<String> {
    let stripped = strip_comments(sql);
    let mut body = stripped.trim();
    if let Some(without) = body.strip_suffix(';') {
        body = without.trim_end();
    }
    if body.is_empty() {
        return Err(Error::rejected("query is empty"));
    }

    let masked = mask_literals(body);
    let first = masked
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    if !first.eq_ignore_ascii_case("SELECT") && !first.eq_ignore_ascii_case("WITH") {
        return Err(Error::rejected("only SELECT or WITH queries are allowed"));
    }
    check_blocked(&masked)?;
    Ok(body.to_string())
}

/// Validate a filter predicate (the text after `WHERE`).
pub fn ensure_safe_predicate(predicate: &str) -> Result<String> {
    let stripped = strip_comments(predicate);
    let body = stripped.trim();
    check_blocked(&mask_literals(body))?;
    Ok(body.to_string())
}

/// Whether a `WHERE` keyword appears outside comments and literals.
pub fn has_where_clause(sql: &str) -> bool {
    WHERE.is_match(&mask_literals(&strip_comments(sql)))
}

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Quoted form for use in generated SQL.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }

    /// `PRAGMA` call scoped to this table's schema.
    pub fn pragma(&self, pragma: &str) -> String {
        match &self.schema {
            Some(schema) => format!(
                "PRAGMA {}.{pragma}({})",
                quote_identifier(schema),
                quote_identifier(&self.name)
            ),
            None => format!("PRAGMA {pragma}({})", quote_identifier(&self.name)),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a query's top-level FROM clause reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FromTarget {
    Table(TableRef),
    /// Derived table or common table expression
    Subquery,
    Join,
    Missing,
}

impl FromTarget {
    pub fn table(&self) -> Option<&TableRef> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// Find the single table a query reads from, if it has one.
pub fn primary_from_target(sql: &str) -> FromTarget {
    let stripped = strip_comments(sql);
    let masked = mask_literals(&stripped);
    let top = mask_nested(&masked);

    let leading = top.split_whitespace().next().unwrap_or_default();
    if leading.eq_ignore_ascii_case("WITH") {
        return FromTarget::Subquery;
    }

    let Some(from) = FROM.find(&top) else {
        return FromTarget::Missing;
    };
    let start = from.end();
    let end = CLAUSE_END
        .find(&top[start..])
        .map_or(top.len(), |m| start + m.start());
    let clause = &top[start..end];
    if JOIN.is_match(clause) || clause.contains(',') {
        return FromTarget::Join;
    }

    let text = stripped[start..end].trim_start();
    if text.starts_with('(') {
        return FromTarget::Subquery;
    }
    parse_table_ref(text).map_or(FromTarget::Missing, FromTarget::Table)
}

/// Output names introduced with `AS` in a query's top-level select list.
pub fn select_aliases(sql: &str) -> Vec<String> {
    let stripped = strip_comments(sql);
    let top = mask_nested(&mask_literals(&stripped));
    let end = FROM.find(&top).map_or(top.len(), |m| m.start());
    AS_ALIAS
        .find_iter(&top[..end])
        .filter_map(|m| read_identifier(&stripped[m.end()..end]).map(|(name, _, _)| name))
        .collect()
}

fn parse_table_ref(text: &str) -> Option<TableRef> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (part, quoted, after) = read_identifier(rest)?;
        if !quoted && parts.is_empty() && NOT_A_TABLE.iter().any(|k| k.eq_ignore_ascii_case(&part)) {
            return None;
        }
        parts.push(part);
        match after.strip_prefix('.') {
            Some(next) => rest = next,
            None => break,
        }
    }
    let name = parts.pop()?;
    Some(TableRef {
        schema: parts.pop(),
        name,
    })
}

/// Read one identifier; returns the name, whether it was quoted, and the remainder.
fn read_identifier(text: &str) -> Option<(String, bool, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    let close = match first {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        _ => None,
    };

    if let Some(close) = close {
        let mut name = String::new();
        let mut iter = text[1..].char_indices().peekable();
        while let Some((idx, c)) = iter.next() {
            if c == close {
                if close == '"' && iter.peek().map(|(_, n)| *n) == Some('"') {
                    iter.next();
                    name.push('"');
                    continue;
                }
                return Some((name, true, &text[1 + idx + c.len_utf8()..]));
            }
            name.push(c);
        }
        return None;
    }

    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map_or(text.len(), |(idx, _)| idx);
    Some((text[..end].to_string(), false, &text[end..]))
}
