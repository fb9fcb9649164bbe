//! End-to-end orchestrator tests over the scripted mock provider.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use ma_agent::{abort, run, spawn_subagent, steer, AgentState, EventStream};
use ma_domain::config::AgentConfig;
use ma_domain::{Message, Role, ToolCall};
use ma_providers::mock::{ScriptStep, ScriptedProvider, ScriptedTurn};
use ma_providers::LlmProvider;

fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args,
    }
}

fn make_state(provider: Arc<dyn LlmProvider>, workspace: &Path, config: AgentConfig) -> AgentState {
    AgentState::with_home(config, workspace, provider, None).unwrap()
}

#[tokio::test]
async fn simple_turn() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("hello")]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s1", "hi").await.unwrap();
    assert_eq!(outcome.text, "hello");
    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.tool_calls, 0);
    assert_eq!(outcome.session_key, "agent:main:s1");

    let log = state.log.load_messages("agent:main:s1").unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[0].text(), "hi");
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].text(), "hello");
}

#[tokio::test]
async fn single_tool_call_turn() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("README.md"), "Foo docs").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![tool_call(
                "tu_1",
                "read_file",
                serde_json::json!({"path": "README.md"}),
            )],
        ),
        ScriptedTurn::text("It is called Foo."),
    ]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s2", "read README.md").await.unwrap();
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.text, "It is called Foo.");

    // user, assistant(tool_use), user(tool_result), assistant(text).
    let log = state.log.load_messages("agent:main:s2").unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[1].tool_use_ids(), vec!["tu_1"]);
    assert_eq!(log[2].tool_result_ids(), vec!["tu_1"]);
    match &log[2].content {
        ma_domain::MessageContent::Blocks(blocks) => match &blocks[0] {
            ma_domain::ContentBlock::ToolResult { content, .. } => {
                assert_eq!(content, "Foo docs")
            }
            other => panic!("expected tool_result, got {other:?}"),
        },
        other => panic!("expected blocks, got {other:?}"),
    }
    assert_eq!(log[3].text(), "It is called Foo.");
}

#[tokio::test]
async fn slash_command_rewrites_user_message() {
    let tmp = tempfile::tempdir().unwrap();
    let skill_dir = tmp.path().join("skills/review");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(
        skill_dir.join("SKILL.md"),
        "---\ndescription: Review code carefully\n---\nDo a review.\n",
    )
    .unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("ok")]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    run(&state, "s1", "/review src/a.ts").await.unwrap();

    let log = state.log.load_messages("agent:main:s1").unwrap();
    assert!(log[0]
        .text()
        .starts_with("Use the \"review\" skill for this request.\n\nUser input:\nsrc/a.ts"));
}

#[tokio::test]
async fn steering_truncates_the_turn() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "A").unwrap();
    std::fs::write(tmp.path().join("b.txt"), "B").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![
                tool_call("tu_1", "read_file", serde_json::json!({"path": "a.txt"})),
                tool_call("tu_2", "read_file", serde_json::json!({"path": "b.txt"})),
            ],
        ),
        ScriptedTurn::text("done"),
    ]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    // Queue the steering message before the run: the loop notices it
    // between the first and second tool call.
    steer(&state, "s3", "stop");

    let outcome = run(&state, "s3", "read both files").await.unwrap();
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_calls, 1, "second call never executed");

    let log = state.log.load_messages("agent:main:s3").unwrap();
    // user, assistant(2 tool_use), user(1 tool_result), user("stop"), assistant("done").
    assert_eq!(log.len(), 5);
    assert_eq!(log[1].tool_use_ids(), vec!["tu_1", "tu_2"]);
    assert_eq!(log[2].tool_result_ids(), vec!["tu_1"]);
    assert_eq!(log[3].role, Role::User);
    assert_eq!(log[3].text(), "stop");
    assert_eq!(log[4].text(), "done");
}

#[tokio::test]
async fn multiple_steering_messages_coalesce() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "A").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![
                tool_call("tu_1", "read_file", serde_json::json!({"path": "a.txt"})),
                tool_call("tu_2", "read_file", serde_json::json!({"path": "a.txt"})),
            ],
        ),
        ScriptedTurn::text("replanned"),
    ]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    steer(&state, "s4", "first note");
    steer(&state, "s4", "second note");

    run(&state, "s4", "go").await.unwrap();

    let log = state.log.load_messages("agent:main:s4").unwrap();
    let steering: Vec<_> = log.iter().filter(|m| m.text().contains("note")).collect();
    assert_eq!(steering.len(), 1, "steering drains into one message");
    assert_eq!(steering[0].text(), "first note\nsecond note");
}

#[tokio::test]
async fn unknown_tool_yields_error_result_body() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![tool_call("tu_1", "bogus", serde_json::json!({}))],
        ),
        ScriptedTurn::text("done"),
    ]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s5", "use a tool").await.unwrap();
    assert_eq!(outcome.tool_calls, 1);

    let log = state.log.load_messages("agent:main:s5").unwrap();
    match &log[2].content {
        ma_domain::MessageContent::Blocks(blocks) => match &blocks[0] {
            ma_domain::ContentBlock::ToolResult { content, .. } => {
                assert_eq!(content, "未知工具: bogus")
            }
            other => panic!("unexpected block {other:?}"),
        },
        other => panic!("unexpected content {other:?}"),
    }
}

#[tokio::test]
async fn tool_failure_is_coerced_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![tool_call(
                "tu_1",
                "read_file",
                serde_json::json!({"path": "missing.txt"}),
            )],
        ),
        ScriptedTurn::text("recovered"),
    ]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s6", "read it").await.unwrap();
    assert_eq!(outcome.text, "recovered");

    let log = state.log.load_messages("agent:main:s6").unwrap();
    match &log[2].content {
        ma_domain::MessageContent::Blocks(blocks) => match &blocks[0] {
            ma_domain::ContentBlock::ToolResult { content, .. } => {
                assert!(content.starts_with("执行错误: "), "got: {content}")
            }
            other => panic!("unexpected block {other:?}"),
        },
        other => panic!("unexpected content {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_retries_then_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::ConnectError("HTTP 429 too many requests".into()),
        ScriptedTurn::ConnectError("rate limit exceeded".into()),
        ScriptedTurn::text("after retry"),
    ]));
    let state = make_state(provider.clone(), tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s7", "hi").await.unwrap();
    assert_eq!(outcome.text, "after retry");
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn auth_error_is_fatal_without_retry() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::ConnectError(
        "HTTP 401 unauthorized".into(),
    )]));
    let state = make_state(provider.clone(), tmp.path(), AgentConfig::default());

    let err = run(&state, "s8", "hi").await.unwrap_err();
    assert!(err.to_string().contains("401"));
    assert_eq!(provider.call_count(), 1, "no retry for auth failures");
}

#[tokio::test]
async fn context_overflow_compacts_once_and_recovers() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::default();
    config.run.token_budget = 2_000;

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::ConnectError("prompt is too long: 210000 tokens".into()),
        // Summarizer call (non-streaming) pops this turn.
        ScriptedTurn::text("summary of earlier work"),
        ScriptedTurn::text("recovered"),
    ]));
    let state = make_state(provider.clone(), tmp.path(), config);

    // History under the proactive budget but over budget/2, so only the
    // reactive path compacts.
    for _ in 0..3 {
        state
            .log
            .append("agent:main:s9", &Message::user("x".repeat(1_600)))
            .unwrap();
    }

    let outcome = run(&state, "s9", "continue").await.unwrap();
    assert_eq!(outcome.text, "recovered");
    assert_eq!(outcome.turns, 1, "turn counter was rewound");
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn repeated_context_overflow_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::default();
    config.run.token_budget = 2_000;

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::ConnectError("context length exceeded".into()),
        ScriptedTurn::text("summary"),
        ScriptedTurn::ConnectError("context length exceeded".into()),
    ]));
    let state = make_state(provider, tmp.path(), config);

    for _ in 0..3 {
        state
            .log
            .append("agent:main:s10", &Message::user("x".repeat(1_600)))
            .unwrap();
    }

    let err = run(&state, "s10", "continue").await.unwrap_err();
    assert!(err.to_string().to_lowercase().contains("context"));
}

#[tokio::test]
async fn abort_cancels_a_streaming_run() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::Stream(vec![
        ScriptStep::Delay(500),
        ScriptStep::Event(ma_domain::StreamEvent::TextEnd {
            content: "too late".into(),
        }),
    ])]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let run_state = state.clone();
    let handle = tokio::spawn(async move { run(&run_state, "s11", "hi").await });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(abort(&state, None), 1);

    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn global_lane_bounds_parallel_runs() {
    let tmp = tempfile::tempdir().unwrap();

    let turns: Vec<ScriptedTurn> = (0..6)
        .map(|i| {
            ScriptedTurn::Stream(vec![
                ScriptStep::Delay(80),
                ScriptStep::Event(ma_domain::StreamEvent::TextEnd {
                    content: format!("reply {i}"),
                }),
            ])
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(turns));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    // Track concurrent runs via lifecycle events.
    let gauge = Arc::new(Mutex::new((0i64, 0i64))); // (active, peak)
    let g = gauge.clone();
    let _sub = state.events.subscribe(move |event| {
        if event.stream != EventStream::Lifecycle {
            return;
        }
        match event.data.get("phase").and_then(|v| v.as_str()) {
            Some("start") => {
                let mut lock = g.lock();
                lock.0 += 1;
                lock.1 = lock.1.max(lock.0);
            }
            Some("end") | Some("error") => g.lock().0 -= 1,
            _ => {}
        }
    });

    let mut handles = Vec::new();
    for i in 0..6 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            run(&state, &format!("lane-{i}"), "go").await
        }));
    }

    let mut run_ids = std::collections::HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        run_ids.insert(outcome.run_id);
    }

    assert_eq!(run_ids.len(), 6, "every run has its own id");
    let peak = gauge.lock().1;
    assert!(peak <= 2, "at most two runs in flight, saw {peak}");
    assert!(peak >= 2, "parallelism actually used");
}

#[tokio::test]
async fn same_session_runs_are_serialized_fifo() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::default()); // echo
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let mut handles = Vec::new();
    for i in 0..4 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            run(&state, "serial", &format!("msg {i}")).await
        }));
        // Give each spawn a moment to enqueue in order.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let log = state.log.load_messages("agent:main:serial").unwrap();
    let users: Vec<String> = log
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text())
        .collect();
    assert_eq!(users, vec!["msg 0", "msg 1", "msg 2", "msg 3"]);
}

#[tokio::test]
async fn events_carry_increasing_seq_per_run() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("hello")]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _sub = state.events.subscribe(move |e| sink.lock().push((e.run_id, e.seq)));

    let outcome = run(&state, "s12", "hi").await.unwrap();

    let events = events.lock();
    let seqs: Vec<u64> = events
        .iter()
        .filter(|(id, _)| *id == outcome.run_id)
        .map(|(_, seq)| *seq)
        .collect();
    assert_eq!(seqs[0], 1);
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1), "strictly increasing: {seqs:?}");
}

#[tokio::test]
async fn subagent_summary_lands_in_parent_log() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text(
        "child result",
    )]));
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let child_key = spawn_subagent(&state, "main", "do the thing", None).unwrap();
    assert!(child_key.starts_with("agent:main:subagent:"));

    // The child runs fire-and-forget; poll the parent log.
    let parent_key = "agent:main:main";
    let mut summary = None;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let log = state.log.load_messages(parent_key).unwrap();
        if let Some(m) = log.iter().find(|m| m.text().starts_with("[subagent summary]")) {
            summary = Some(m.text());
            break;
        }
    }
    assert_eq!(
        summary.as_deref(),
        Some("[subagent summary]\nchild result")
    );

    // The child session has its own log.
    let child_log = state.log.load_messages(&child_key).unwrap();
    assert_eq!(child_log[0].text(), "do the thing");
}

#[tokio::test]
async fn subagents_cannot_spawn_subagents() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::default());
    let state = make_state(provider, tmp.path(), AgentConfig::default());

    let child_key = ma_sessions::subagent_session_key("main");
    let err = spawn_subagent(&state, &child_key, "nested", None).unwrap_err();
    assert!(err.to_string().contains("subagents"));
}

#[tokio::test]
async fn agent_tools_tick_tasks_and_capture_memory() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] water plants\n").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedTurn::tool_calls(
            "",
            vec![
                tool_call("tu_1", "complete_task", serde_json::json!({"line": 1})),
                tool_call(
                    "tu_2",
                    "save_memory",
                    serde_json::json!({"content": "plants watered today", "tags": ["chores"]}),
                ),
            ],
        ),
        ScriptedTurn::text("all done"),
    ]));
    let state = make_state(provider.clone(), tmp.path(), AgentConfig::default());

    let outcome = run(&state, "s13", "handle the chores").await.unwrap();
    assert_eq!(outcome.tool_calls, 2);

    // The checkbox was ticked and the note persisted.
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("HEARTBEAT.md")).unwrap(),
        "- [x] water plants\n"
    );
    let hits = state.memory.search("plants", 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.tags, vec!["chores"]);

    // Both tools are advertised to the model.
    let requests = provider.requests.lock();
    let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"complete_task"));
    assert!(names.contains(&"save_memory"));
}

#[tokio::test]
async fn hard_floor_refuses_construction() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::default();
    config.run.token_budget = 500;
    let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::default());
    let err = AgentState::with_home(config, tmp.path(), provider, None).unwrap_err();
    assert!(err.to_string().contains("hard floor"));
}
