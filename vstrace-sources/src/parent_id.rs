//! Cross-source textual parent-id mining.
//!
//! Pull/merge request descriptions and branch refs carry a conventional
//! `vstrace-<source>-<kind>-<scope>-<id>` token (e.g.
//! `vstrace-github-issue-valuestream-12`) pointing at the activity they
//! should be parented under. One compiled pattern, shared by every adapter
//! that needs it, first match wins.

use once_cell::sync::Lazy;
use regex::Regex;

static PARENT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"vstrace-[0-9A-Za-z]+-[0-9A-Za-z_]+-[0-9A-Za-z_]+-[0-9]+")
        .expect("parent-id pattern is a valid regex")
});

/// Searches `text` (a branch ref, PR/MR description, ...) for the first
/// `vstrace-<source>-<kind>-<scope>-<id>` token.
pub fn find_parent_id(text: &str) -> Option<String> {
    PARENT_REF.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("feature/vstrace-github-issue-valuestream-12-add-widget", Some("vstrace-github-issue-valuestream-12"))]
    #[case("closes vstrace-jiracloud-issue-VS-99 for the release", Some("vstrace-jiracloud-issue-VS-99"))]
    #[case("no reference here", None)]
    #[case("no-digits vstrace-github-issue-valuestream-abc", None)]
    fn finds_first_match(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(find_parent_id(text), expected.map(|s| s.to_string()));
    }
}
