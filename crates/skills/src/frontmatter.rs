//! Skill file frontmatter.
//!
//! A skill file optionally begins with a YAML block delimited by `---`
//! lines holding simple `key: value` pairs.  Recognized keys: `name`,
//! `description`, `user-invocable` (default true),
//! `disable-model-invocation` (default false).  The markdown body after
//! the frontmatter is the skill's detailed instructions.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "user-invocable", default = "d_true")]
    pub user_invocable: bool,
    #[serde(rename = "disable-model-invocation", default)]
    pub disable_model_invocation: bool,
}

fn d_true() -> bool {
    true
}

/// Split a skill file into its frontmatter (if any) and body.
///
/// The frontmatter must start on the first line.  A file without a
/// leading `---` line, or with unparseable YAML, yields `None` and the
/// whole content as body.
pub fn parse_frontmatter(content: &str) -> (Option<SkillFrontmatter>, &str) {
    let rest = match content.strip_prefix("---") {
        Some(rest) if rest.starts_with('\n') || rest.starts_with("\r\n") => rest,
        _ => return (None, content),
    };

    // Scan for the closing `---` on its own line.
    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" && offset > 0 {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return match serde_yaml::from_str::<SkillFrontmatter>(yaml) {
                Ok(fm) => (Some(fm), body),
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable skill frontmatter");
                    (None, content)
                }
            };
        }
        offset += line.len();
    }

    (None, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frontmatter() {
        let content = "---\nname: review\ndescription: \"Review code\"\nuser-invocable: true\ndisable-model-invocation: false\n---\nBody text here.\n";
        let (fm, body) = parse_frontmatter(content);
        let fm = fm.unwrap();
        assert_eq!(fm.name.as_deref(), Some("review"));
        // Quotes stripped by YAML.
        assert_eq!(fm.description.as_deref(), Some("Review code"));
        assert!(fm.user_invocable);
        assert!(!fm.disable_model_invocation);
        assert_eq!(body, "Body text here.\n");
    }

    #[test]
    fn defaults_applied() {
        let content = "---\ndescription: d\n---\nbody";
        let (fm, _) = parse_frontmatter(content);
        let fm = fm.unwrap();
        assert!(fm.user_invocable);
        assert!(!fm.disable_model_invocation);
        assert!(fm.name.is_none());
    }

    #[test]
    fn no_frontmatter() {
        let content = "# Just markdown\n";
        let (fm, body) = parse_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn unterminated_frontmatter() {
        let content = "---\nname: x\nno closing delimiter";
        let (fm, body) = parse_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn flags_parse() {
        let content =
            "---\ndescription: d\nuser-invocable: false\ndisable-model-invocation: true\n---\n";
        let (fm, _) = parse_frontmatter(content);
        let fm = fm.unwrap();
        assert!(!fm.user_invocable);
        assert!(fm.disable_model_invocation);
    }
}
