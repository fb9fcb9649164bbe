//! `mini-agent chat` — interactive REPL.
//!
//! A readline loop that sends each line to the agent and streams the
//! response back through an event-bus subscription.  Keeps stdout clean
//! for assistant output; everything else goes to stderr.

use std::io::Write;

use ma_domain::Role;
use ma_sessions::resolve_session_key;

use crate::events::EventStream;
use crate::runtime;
use crate::state::AgentState;

/// Run the interactive chat REPL for a session.
pub async fn chat(state: AgentState, session: String) -> anyhow::Result<()> {
    let session_key = resolve_session_key(&state.config.agent_id, &session);

    // Stream assistant deltas and tool activity as they happen.
    let _subscription = state.events.subscribe(|event| match event.stream {
        EventStream::Assistant => {
            if let Some(delta) = event.data.get("delta").and_then(|v| v.as_str()) {
                print!("{delta}");
                std::io::stdout().flush().ok();
            }
        }
        EventStream::Tool => {
            if event.data.get("phase").and_then(|v| v.as_str()) == Some("start") {
                let name = event.data.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                eprintln!("\x1B[2m[tool: {name}]\x1B[0m");
            }
        }
        EventStream::Lifecycle => {
            if event.data.get("phase").and_then(|v| v.as_str()) == Some("compact") {
                eprintln!("\x1B[2m(compacting context)\x1B[0m");
            }
        }
        _ => {}
    });

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".mini-agent")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("mini-agent interactive chat");
    eprintln!("Session: {session_key}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if let Some(done) = handle_repl_command(&state, &session_key, trimmed) {
                    if done {
                        break;
                    }
                    continue;
                }

                match runtime::run(&state, &session, trimmed).await {
                    Ok(_) => {
                        println!();
                        println!();
                    }
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

/// Built-in REPL commands.  `None` means the input is not a REPL
/// command (slash-commands for skills still reach the agent).
/// `Some(true)` exits the loop.
fn handle_repl_command(state: &AgentState, session_key: &str, input: &str) -> Option<bool> {
    match input {
        "/quit" | "/exit" => Some(true),

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /history         Show this session's messages");
            eprintln!("  /sessions        List known sessions");
            eprintln!("  /reset           Clear this session's history");
            eprintln!("  /quit, /exit     Exit the chat");
            eprintln!("  /help            Show this help");
            eprintln!("  /<skill> [args]  Invoke a skill command");
            Some(false)
        }

        "/reset" => {
            match state.log.clear(session_key) {
                Ok(()) => eprintln!("Session history cleared."),
                Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
            }
            Some(false)
        }

        "/history" => {
            match state.log.load_messages(session_key) {
                Ok(messages) if messages.is_empty() => eprintln!("(empty)"),
                Ok(messages) => {
                    for message in messages {
                        let role = match message.role {
                            Role::User => "user",
                            Role::Assistant => "assistant",
                        };
                        eprintln!("{role}: {}", message.text());
                    }
                }
                Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
            }
            Some(false)
        }

        "/sessions" => {
            match state.log.list() {
                Ok(keys) if keys.is_empty() => eprintln!("(no sessions)"),
                Ok(keys) => {
                    for key in keys {
                        eprintln!("{key}");
                    }
                }
                Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
            }
            Some(false)
        }

        _ => None,
    }
}
