use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Non-fatal problem encountered while loading a blacklist. Loading never
/// aborts on these; they are returned alongside the parsed rules so callers
/// and tests can inspect them without scraping log output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("{file}:{line}: invalid pattern `{pattern}`: {error}")]
    BadPattern {
        file: String,
        line: u32,
        pattern: String,
        error: String,
    },
    #[error("{file}: unreadable rule file: {error}")]
    UnreadableFile { file: String, error: String },
}

/// A single compiled blacklist rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub regex: Regex,
    /// Pattern text as it appeared in the file, after comment stripping.
    pub source: String,
    /// 1-based line number in the source file.
    pub line: u32,
}

/// Ordered rules from one blacklist file. Order is the file's line order and
/// is part of the matching contract.
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl RuleList {
    /// Parses blacklist text: one pattern per line, `#` starts a comment
    /// running to end of line, surrounding whitespace is ignored. Lines that
    /// fail to compile are skipped and reported as diagnostics.
    pub fn parse(name: &str, text: &str) -> (Self, Vec<Diagnostic>) {
        let mut rules = Vec::new();
        let mut diagnostics = Vec::new();

        for (idx, raw) in split_lines(text).into_iter().enumerate() {
            let line_no = (idx + 1) as u32;
            let pattern = strip_line(raw);
            if pattern.is_empty() {
                continue;
            }

            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => rules.push(Rule {
                    regex,
                    source: pattern.to_string(),
                    line: line_no,
                }),
                Err(e) => diagnostics.push(Diagnostic::BadPattern {
                    file: name.to_string(),
                    line: line_no,
                    pattern: pattern.to_string(),
                    error: e.to_string(),
                }),
            }
        }

        (
            Self {
                name: name.to_string(),
                rules,
            },
            diagnostics,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Splits on `\n`, `\r\n` or lone `\r` so line numbers stay stable across
/// files written on any platform.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += 1;
                if i < bytes.len() && bytes[i] == b'\n' {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Removes a trailing `#` comment and surrounding whitespace. The remainder
/// is the pattern text; empty means the line produces no rule.
pub fn strip_line(line: &str) -> &str {
    let uncommented = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    uncommented.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_produce_no_rule() {
        let (list, diags) = RuleList::parse("kw", "  # just a comment  \n\n   \n# another\n");
        assert!(list.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn trailing_comment_is_stripped() {
        let (list, diags) = RuleList::parse("kw", "spam#trailing comment\n");
        assert!(diags.is_empty());
        assert_eq!(list.len(), 1);
        assert_eq!(list.rules[0].source, "spam");
    }

    #[test]
    fn whitespace_is_trimmed() {
        let (list, _) = RuleList::parse("kw", "   viagra   \n\tcasino\t\n");
        assert_eq!(list.rules[0].source, "viagra");
        assert_eq!(list.rules[1].source, "casino");
    }

    #[test]
    fn invalid_pattern_is_skipped_with_diagnostic() {
        let (list, diags) = RuleList::parse("kw", "good\n[broken\nstill\\.fine\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list.rules[0].source, "good");
        assert_eq!(list.rules[1].source, "still\\.fine");
        assert_eq!(list.rules[1].line, 3);
        assert_eq!(diags.len(), 1);
        match &diags[0] {
            Diagnostic::BadPattern { file, line, pattern, .. } => {
                assert_eq!(file, "kw");
                assert_eq!(*line, 2);
                assert_eq!(pattern, "[broken");
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[test]
    fn rules_compile_case_insensitive() {
        let (list, _) = RuleList::parse("kw", "ViAgRa\n");
        assert!(list.rules[0].regex.is_match("order VIAGRA now"));
    }

    #[test]
    fn splits_all_line_terminators() {
        assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\rb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\r\n\r\nb\n"), vec!["a", "", "b"]);
    }
}
