//! System-prompt composition observed through the recorded provider
//! requests.

use std::sync::Arc;

use ma_agent::{run, AgentState};
use ma_domain::config::AgentConfig;
use ma_memory::MemorySource;
use ma_providers::mock::{ScriptedProvider, ScriptedTurn};

#[tokio::test]
async fn system_prompt_carries_context_skills_and_memories() {
    let tmp = tempfile::tempdir().unwrap();

    std::fs::write(tmp.path().join("AGENT.md"), "Always answer in haiku.").unwrap();
    let skill_dir = tmp.path().join("skills/deploy");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(
        skill_dir.join("SKILL.md"),
        "---\ndescription: Deploy the service\n---\nSteps.\n",
    )
    .unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("ok")]));
    let state =
        AgentState::with_home(AgentConfig::default(), tmp.path(), provider.clone(), None).unwrap();

    state
        .memory
        .save("deploys happen on Fridays", MemorySource::User, vec![])
        .unwrap();

    run(&state, "s1", "when do we deploy?").await.unwrap();

    let requests = provider.requests.lock();
    let system = &requests[0].system;
    assert!(system.contains("## AGENT.md"));
    assert!(system.contains("Always answer in haiku."));
    assert!(system.contains("<available_skills>"));
    assert!(system.contains("<name>deploy</name>"));
    assert!(system.contains("# Relevant memories"));
    assert!(system.contains("deploys happen on Fridays"));
}

#[tokio::test]
async fn hidden_skills_stay_out_of_the_prompt() {
    let tmp = tempfile::tempdir().unwrap();
    let skill_dir = tmp.path().join("skills/secret");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(
        skill_dir.join("SKILL.md"),
        "---\ndescription: internal only\ndisable-model-invocation: true\n---\n",
    )
    .unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("ok")]));
    let state =
        AgentState::with_home(AgentConfig::default(), tmp.path(), provider.clone(), None).unwrap();

    run(&state, "s1", "hello").await.unwrap();

    let requests = provider.requests.lock();
    assert!(!requests[0].system.contains("secret"));

    // Still user-invocable as a command, though.
    assert!(ma_skills::resolve_command(state.skills.commands(), "/secret now").is_some());
}
