//! Raw line inspection used before choosing import options.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::delimited::decode_text;
use crate::{Error, Result};

pub const DEFAULT_SNIFF_LINES: usize = 20;
pub const MAX_SNIFF_LINES: usize = 500;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// A window of raw lines from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SniffedLines {
    pub lines: Vec<String>,
    pub total_lines: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Return up to `num_lines` lines starting at `offset`, line terminators stripped.
///
/// `num_lines` is clamped to `1..=MAX_SNIFF_LINES`.
pub async fn sniff_file(path: &Path, num_lines: usize, offset: usize) -> Result<SniffedLines> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("File '{}'", path.display())));
        }
        Err(err) => return Err(Error::io(path)(err)),
    };
    let text = decode_text(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let count = num_lines.clamp(1, MAX_SNIFF_LINES);

    let lines: Vec<String> = all
        .iter()
        .skip(offset)
        .take(count)
        .map(|line| (*line).to_string())
        .collect();
    Ok(SniffedLines {
        has_more: offset + lines.len() < all.len(),
        total_lines: all.len(),
        offset,
        lines,
    })
}

/// A guessed fixed-width column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuessedColumn {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Guess spans from the word starts of the first line.
///
/// Returns `None` unless there are at least two lines, at least two columns,
/// and every header word looks like an identifier.
pub fn guess_fixed_width_columns<S: AsRef<str>>(lines: &[S]) -> Option<Vec<GuessedColumn>> {
    if lines.len() < 2 {
        return None;
    }
    let header: Vec<char> = lines[0].as_ref().trim_end().chars().collect();
    let starts: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(index, c)| !c.is_whitespace() && (*index == 0 || header[index - 1].is_whitespace()))
        .map(|(index, _)| index)
        .collect();
    if starts.len() < 2 {
        return None;
    }

    let longest = lines
        .iter()
        .map(|line| line.as_ref().trim_end_matches(['\r', '\n']).chars().count())
        .max()
        .unwrap_or(0);

    let mut columns = Vec::with_capacity(starts.len());
    for (position, &start) in starts.iter().enumerate() {
        let end = starts
            .get(position + 1)
            .copied()
            .unwrap_or_else(|| longest.max(header.len()));
        let name: String = header[start..end.min(header.len())].iter().collect();
        let name = name.trim().to_string();
        if !IDENTIFIER.is_match(&name) {
            return None;
        }
        columns.push(GuessedColumn { name, start, end });
    }
    Some(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_uses_header_word_starts() {
        let lines = [
            "NAME                CITY           ST",
            "John Doe            Dallas         TX",
            "Jane Smith          Austin         TX",
        ];
        let columns = guess_fixed_width_columns(&lines).unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["NAME", "CITY", "ST"]);
        assert_eq!((columns[0].start, columns[0].end), (0, 20));
        assert_eq!((columns[1].start, columns[1].end), (20, 35));
        assert_eq!(columns[2].end, 37);
    }

    #[test]
    fn test_last_column_reaches_longest_line() {
        let columns = guess_fixed_width_columns(&["A   B", "111 22222"]).unwrap();
        assert_eq!(columns[1], GuessedColumn { name: "B".into(), start: 4, end: 9 });
    }

    #[test]
    fn test_guess_rejects_banners_and_short_input() {
        assert!(guess_fixed_width_columns(&["REPORT V2.1", "data here"]).is_none());
        assert!(guess_fixed_width_columns(&["NOSPACES", "12345678"]).is_none());
        assert!(guess_fixed_width_columns(&["A B"]).is_none());
        assert!(guess_fixed_width_columns::<&str>(&[]).is_none());
    }

    #[tokio::test]
    async fn test_sniff_pages_through_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "one\r\ntwo\nthree\nfour\n").unwrap();

        let first = sniff_file(&path, 2, 0).await.unwrap();
        assert_eq!(first.lines, vec!["one", "two"]);
        assert_eq!(first.total_lines, 4);
        assert!(first.has_more);

        let rest = sniff_file(&path, 10, 2).await.unwrap();
        assert_eq!(rest.lines, vec!["three", "four"]);
        assert!(!rest.has_more);

        let missing = sniff_file(&dir.path().join("nope.txt"), 5, 0).await.unwrap_err();
        assert_eq!(missing.kind(), ingest_ir::ErrorKind::NotFound);
    }
}
