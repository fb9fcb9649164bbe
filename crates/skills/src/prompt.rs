//! The model-visible skills fragment.
//!
//! Skills that allow model invocation are advertised as an XML block in
//! the system prompt; the model reads the detail file on demand via its
//! read tool.

use crate::types::SkillEntry;

/// Render the `<available_skills>` fragment, or `None` when no skill is
/// model-visible.
pub fn render_skills_prompt(entries: &[SkillEntry]) -> Option<String> {
    let visible: Vec<&SkillEntry> = entries
        .iter()
        .filter(|e| !e.disable_model_invocation)
        .collect();
    if visible.is_empty() {
        return None;
    }

    let mut out = String::from("<available_skills>\n");
    for entry in visible {
        out.push_str("  <skill><name>");
        out.push_str(&escape_xml(&entry.name));
        out.push_str("</name><description>");
        out.push_str(&escape_xml(&entry.description));
        out.push_str("</description><location>");
        out.push_str(&escape_xml(&entry.path.display().to_string()));
        out.push_str("</location></skill>\n");
    }
    out.push_str("</available_skills>");
    Some(out)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
