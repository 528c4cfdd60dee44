mod matcher;
mod rules;
mod traits;

pub use matcher::{check_lists, MatchResult};
pub use rules::{split_lines, strip_line, Diagnostic, Rule, RuleList};
pub use traits::SpamMatcher;
