//! Scripted mock provider for tests.
//!
//! Each `chat_stream` call pops the next scripted turn from the front of
//! the queue, so tests can specify exact event sequences -- including tool
//! calls, mid-stream errors, and artificial latency -- without network
//! access.  Requests are recorded for inspection.

use std::collections::VecDeque;

use parking_lot::Mutex;

use ma_domain::error::{Error, Result};
use ma_domain::stream::{BoxStream, StreamEvent};
use ma_domain::ToolCall;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One step of a scripted streaming turn.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(StreamEvent),
    /// Sleep before yielding the next step (for concurrency tests).
    Delay(u64),
    /// Yield an error mid-stream.
    Error(String),
}

/// One scripted provider call.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Stream(Vec<ScriptStep>),
    /// Fail before any event is produced (connect-level error).
    ConnectError(String),
}

impl ScriptedTurn {
    /// A plain-text assistant turn: deltas followed by `text_end`.
    pub fn text(content: &str) -> Self {
        ScriptedTurn::Stream(vec![
            ScriptStep::Event(StreamEvent::TextDelta {
                delta: content.to_string(),
            }),
            ScriptStep::Event(StreamEvent::TextEnd {
                content: content.to_string(),
            }),
        ])
    }

    /// An assistant turn requesting the given tool calls (optionally with
    /// leading text).
    pub fn tool_calls(text: &str, calls: Vec<ToolCall>) -> Self {
        let mut steps = Vec::new();
        if !text.is_empty() {
            steps.push(ScriptStep::Event(StreamEvent::TextDelta {
                delta: text.to_string(),
            }));
        }
        for call in &calls {
            steps.push(ScriptStep::Event(StreamEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
            }));
        }
        steps.push(ScriptStep::Event(StreamEvent::TextEnd {
            content: text.to_string(),
        }));
        for call in calls {
            steps.push(ScriptStep::Event(StreamEvent::ToolCallEnd { tool_call: call }));
        }
        ScriptedTurn::Stream(steps)
    }
}

/// A pre-scripted mock provider.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<ScriptedTurn>>,
    /// Every request seen, in call order.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            scripts: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append another scripted turn.
    pub fn push(&self, turn: ScriptedTurn) {
        self.scripts.lock().push_back(turn);
    }

    /// Number of calls observed so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_turn(&self, req: &ChatRequest) -> ScriptedTurn {
        self.requests.lock().push(req.clone());
        self.scripts.lock().pop_front().unwrap_or_else(|| {
            // Out of script: echo the last user message.
            let reply = req
                .messages
                .iter()
                .rev()
                .find(|m| m.role == ma_domain::Role::User)
                .map(|m| format!("MOCK: {}", m.text()))
                .unwrap_or_else(|| "MOCK".into());
            ScriptedTurn::text(&reply)
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        match self.next_turn(&req) {
            ScriptedTurn::ConnectError(msg) => Err(Error::Provider {
                provider: "mock".into(),
                message: msg,
            }),
            ScriptedTurn::Stream(steps) => {
                let mut content = String::new();
                let mut tool_calls = Vec::new();
                for step in steps {
                    match step {
                        ScriptStep::Event(StreamEvent::TextEnd { content: c }) => content = c,
                        ScriptStep::Event(StreamEvent::ToolCallEnd { tool_call }) => {
                            tool_calls.push(tool_call)
                        }
                        ScriptStep::Error(msg) => {
                            return Err(Error::Provider {
                                provider: "mock".into(),
                                message: msg,
                            })
                        }
                        _ => {}
                    }
                }
                Ok(ChatResponse {
                    content,
                    tool_calls,
                })
            }
        }
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let cancel = req.cancel.clone();
        match self.next_turn(&req) {
            ScriptedTurn::ConnectError(msg) => Err(Error::Provider {
                provider: "mock".into(),
                message: msg,
            }),
            ScriptedTurn::Stream(steps) => {
                let stream = async_stream::stream! {
                    for step in steps {
                        match step {
                            ScriptStep::Event(ev) => yield Ok(ev),
                            ScriptStep::Delay(ms) => {
                                // Scripted latency races cancellation like
                                // a real network read.
                                let cancelled = tokio::select! {
                                    _ = tokio::time::sleep(std::time::Duration::from_millis(ms)) => false,
                                    _ = cancel.cancelled() => true,
                                };
                                if cancelled {
                                    yield Err(Error::Cancelled);
                                    break;
                                }
                            }
                            ScriptStep::Error(msg) => {
                                yield Err(Error::Provider {
                                    provider: "mock".into(),
                                    message: msg,
                                });
                                break;
                            }
                        }
                    }
                };
                Ok(Box::pin(stream))
            }
        }
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use ma_domain::Message;

    fn req(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn scripted_turns_pop_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::text("first"),
            ScriptedTurn::text("second"),
        ]);

        for expected in ["first", "second"] {
            let mut stream = provider.chat_stream(req("hi")).await.unwrap();
            let mut content = None;
            while let Some(ev) = stream.next().await {
                if let StreamEvent::TextEnd { content: c } = ev.unwrap() {
                    content = Some(c);
                }
            }
            assert_eq!(content.as_deref(), Some(expected));
        }
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn echo_when_out_of_script() {
        let provider = ScriptedProvider::default();
        let resp = provider.chat(req("ping")).await.unwrap();
        assert_eq!(resp.content, "MOCK: ping");
    }

    #[tokio::test]
    async fn connect_error_fails_the_call() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::ConnectError("429".into())]);
        let err = provider.chat_stream(req("hi")).await.err().unwrap();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn tool_turn_shape() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::tool_calls(
            "reading",
            vec![ToolCall {
                id: "tu_1".into(),
                name: "read_file".into(),
                arguments: serde_json::json!({"path": "README.md"}),
            }],
        )]);
        let mut stream = provider.chat_stream(req("read it")).await.unwrap();
        let mut kinds = Vec::new();
        while let Some(ev) = stream.next().await {
            kinds.push(match ev.unwrap() {
                StreamEvent::TextDelta { .. } => "delta",
                StreamEvent::TextEnd { .. } => "end",
                StreamEvent::ToolCallStart { .. } => "start",
                StreamEvent::ToolCallEnd { .. } => "call",
            });
        }
        assert_eq!(kinds, vec!["delta", "start", "end", "call"]);
    }
}
