//! Allow/deny glob filter over tool names.
//!
//! Patterns support `*` (any run) and `?` (one char).  Deny wins over
//! allow; an empty allow set admits every name.  Merging two policies
//! requires a name to pass both: deny lists union, and every allow group
//! present must match.

use regex::Regex;

/// Tool-name filter.
#[derive(Debug, Default)]
pub struct ToolPolicy {
    /// Conjunction of allow groups; each group is a disjunction of
    /// patterns.  Empty = allow all.
    allow_groups: Vec<Vec<Regex>>,
    deny: Vec<Regex>,
}

impl ToolPolicy {
    /// Build from allow/deny glob lists.  Invalid patterns are dropped
    /// with a warning.
    pub fn new(allow: &[String], deny: &[String]) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match glob_to_regex(p) {
                    Some(re) => Some(re),
                    None => {
                        tracing::warn!(pattern = %p, "invalid tool policy pattern, skipping");
                        None
                    }
                })
                .collect()
        };

        let allow = compile(allow);
        Self {
            allow_groups: if allow.is_empty() { Vec::new() } else { vec![allow] },
            deny: compile(deny),
        }
    }

    /// Allow everything (no patterns).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether a tool name passes the policy.
    pub fn is_allowed(&self, name: &str) -> bool {
        if self.deny.iter().any(|re| re.is_match(name)) {
            return false;
        }
        self.allow_groups
            .iter()
            .all(|group| group.iter().any(|re| re.is_match(name)))
    }

    /// Combine two policies; a name must pass both.
    pub fn merge(mut self, other: ToolPolicy) -> ToolPolicy {
        self.allow_groups.extend(other.allow_groups);
        self.deny.extend(other.deny);
        self
    }
}

/// Convert a simple shell glob to a [`Regex`].  Only `*` and `?` are
/// special; everything else matches literally.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allow: &[&str], deny: &[&str]) -> ToolPolicy {
        ToolPolicy::new(
            &allow.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &deny.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn empty_policy_allows_all() {
        let p = ToolPolicy::allow_all();
        assert!(p.is_allowed("read_file"));
        assert!(p.is_allowed("anything"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let p = policy(&["*"], &["exec"]);
        assert!(p.is_allowed("read_file"));
        assert!(!p.is_allowed("exec"));
    }

    #[test]
    fn allow_list_restricts() {
        let p = policy(&["read_*", "grep"], &[]);
        assert!(p.is_allowed("read_file"));
        assert!(p.is_allowed("grep"));
        assert!(!p.is_allowed("write_file"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let p = policy(&["tool_?"], &[]);
        assert!(p.is_allowed("tool_a"));
        assert!(!p.is_allowed("tool_ab"));
    }

    #[test]
    fn glob_special_chars_are_literal() {
        let p = policy(&["a.b"], &[]);
        assert!(p.is_allowed("a.b"));
        assert!(!p.is_allowed("axb"));
    }

    #[test]
    fn merge_requires_both_allows() {
        let a = policy(&["read_*", "write_*"], &[]);
        let b = policy(&["read_*"], &[]);
        let merged = a.merge(b);
        assert!(merged.is_allowed("read_file"));
        assert!(!merged.is_allowed("write_file"));
    }

    #[test]
    fn merge_unions_denies() {
        let a = policy(&[], &["exec"]);
        let b = policy(&[], &["write_file"]);
        let merged = a.merge(b);
        assert!(!merged.is_allowed("exec"));
        assert!(!merged.is_allowed("write_file"));
        assert!(merged.is_allowed("read_file"));
    }

    #[test]
    fn merge_with_unrestricted_side() {
        let a = ToolPolicy::allow_all();
        let b = policy(&["grep"], &[]);
        let merged = a.merge(b);
        assert!(merged.is_allowed("grep"));
        assert!(!merged.is_allowed("exec"));
    }
}
