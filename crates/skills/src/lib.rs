//! Skill descriptors: layered discovery, frontmatter parsing, the
//! slash-command table, and the model-visible prompt fragment.
//!
//! A skill is a named external instruction packet.  Its description is
//! advertised to the model; the detail file is read on demand via the
//! read tool.

pub mod commands;
pub mod frontmatter;
pub mod loader;
pub mod prompt;
pub mod types;

pub use commands::{resolve_command, rewrite_input, SkillInvocation};
pub use loader::SkillSet;
pub use prompt::render_skills_prompt;
pub use types::{SkillCommand, SkillEntry, SkillSource};
