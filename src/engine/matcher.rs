use tracing::debug;

use super::rules::RuleList;
use super::traits::SpamMatcher;
use crate::store::BlacklistSet;

/// The outcome of a spam check. Distinct from load/IO failures, which never
/// surface through matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The substring of the checked text that hit a rule (not the pattern).
    Spam(String),
    Clean,
}

impl MatchResult {
    pub fn is_spam(&self) -> bool {
        matches!(self, Self::Spam(_))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// The matched substring, if any.
    pub fn matched(&self) -> Option<&str> {
        match self {
            Self::Spam(s) => Some(s.as_str()),
            Self::Clean => None,
        }
    }
}

/// Evaluates lists in the given order, rules within a list in file order.
/// The first rule that matches wins and stops all further evaluation, so
/// list and rule order are part of the observable contract.
pub fn check_lists(lists: &[RuleList], text: &str) -> MatchResult {
    for list in lists {
        for rule in &list.rules {
            if let Some(found) = rule.regex.find(text) {
                debug!(
                    list = %list.name,
                    pattern = %rule.source,
                    line = rule.line,
                    "blacklist hit"
                );
                return MatchResult::Spam(found.as_str().to_string());
            }
        }
    }
    MatchResult::Clean
}

impl SpamMatcher for BlacklistSet {
    fn check(&self, text: &str) -> MatchResult {
        check_lists(&self.lists, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(name: &str, text: &str) -> RuleList {
        let (list, diags) = RuleList::parse(name, text);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        list
    }

    #[test]
    fn empty_set_is_always_clean() {
        assert_eq!(check_lists(&[], "anything at all"), MatchResult::Clean);
        let empty = list("kw", "# nothing but comments\n");
        assert_eq!(
            check_lists(&[empty], "anything at all"),
            MatchResult::Clean
        );
    }

    #[test]
    fn returns_matched_substring_not_pattern() {
        let l = list("kw", "v[i1]agra\n");
        assert_eq!(
            check_lists(&[l], "buy V1AGRA today"),
            MatchResult::Spam("V1AGRA".to_string())
        );
    }

    #[test]
    fn rule_order_beats_text_position() {
        // "bar" occurs first in the text, but "foo" is the first rule.
        let l = list("kw", "foo\nbar\n");
        assert_eq!(
            check_lists(&[l], "xx bar foo xx"),
            MatchResult::Spam("foo".to_string())
        );
    }

    #[test]
    fn list_order_beats_later_lists() {
        let first = list("a", "alpha\n");
        let second = list("b", "beta\n");
        assert_eq!(
            check_lists(&[first, second], "beta alpha"),
            MatchResult::Spam("alpha".to_string())
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let l = list("kw", "casino\n");
        assert!(check_lists(&[l], "CaSiNo night").is_spam());
    }

    #[test]
    fn later_rules_still_match_after_bad_line() {
        let (l, diags) = RuleList::parse("kw", "[oops\nlottery\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            check_lists(&[l], "win the lottery"),
            MatchResult::Spam("lottery".to_string())
        );
    }
}
