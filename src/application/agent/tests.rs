use super::*;
use crate::application::engine::{ChatClient, ClientConfig};
use crate::application::tooling::{ConnectionError, DiscoveredTool, ToolInvoker, ToolSet};
use crate::domain::types::{ChatMessage, MessageRole};
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
struct ScriptedProvider {
    responses: Arc<Mutex<Vec<String>>>,
    recordings: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(String::from).collect(),
            )),
            recordings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn requests(&self) -> Vec<ModelRequest> {
        self.recordings.lock().await.clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut responses = self.responses.lock().await;
        let response = responses.remove(0);
        let mut recordings = self.recordings.lock().await;
        recordings.push(request.clone());
        Ok(ModelResponse {
            message: ChatMessage::new(MessageRole::Assistant, response),
        })
    }
}

#[derive(Clone)]
struct FailingProvider;

#[async_trait]
impl ModelProvider for FailingProvider {
    async fn chat(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(ModelError::InvalidResponse("endpoint unreachable".into()))
    }
}

#[derive(Clone)]
struct StubInvoker {
    result: Value,
}

#[async_trait]
impl ToolInvoker for StubInvoker {
    async fn invoke(
        &self,
        _server: &str,
        _tool: &str,
        _arguments: Value,
    ) -> Result<Value, ConnectionError> {
        Ok(self.result.clone())
    }
}

fn math_toolset() -> ToolSet {
    ToolSet {
        tools: vec![DiscoveredTool {
            server: "math".into(),
            name: "add".into(),
            description: Some("Add two numbers.".into()),
            input_schema: Some(json!({"type": "object"})),
        }],
        guidance: Vec::new(),
    }
}

fn agent_with<P: ModelProvider>(provider: P, toolset: ToolSet, invoker: Arc<dyn ToolInvoker>) -> Agent<P> {
    let client = ChatClient::new(provider, ClientConfig::new("gemini-2.5-flash-lite"));
    Agent::new(Arc::new(client), toolset, invoker)
}

fn no_tools_invoker() -> Arc<dyn ToolInvoker> {
    Arc::new(StubInvoker { result: Value::Null })
}

#[tokio::test]
async fn agent_returns_final_response_without_tools() {
    let provider = ScriptedProvider::new(vec![r#"{"action":"final","response":"done"}"#]);
    let agent = agent_with(provider.clone(), ToolSet::default(), no_tools_invoker());

    let outcome = agent
        .run("hello world".into(), AgentOptions::default())
        .await
        .expect("agent succeeds");

    assert_eq!(outcome.response, "done");
    assert_eq!(
        outcome.messages,
        vec![
            TurnMessage::User {
                content: "hello world".into()
            },
            TurnMessage::Assistant {
                content: "done".into()
            },
        ]
    );

    let records = provider.requests().await;
    assert!(!records.is_empty());
    let first_request = &records[0];
    assert!(
        first_request
            .messages
            .iter()
            .any(|msg| msg.content.contains("hello world"))
    );
    assert!(
        first_request
            .messages
            .iter()
            .all(|msg| !msg.content.contains("tool_context"))
    );
}

#[tokio::test]
async fn agent_executes_tool_and_records_transcript() {
    let provider = ScriptedProvider::new(vec![
        r#"{"action":"call_tool","tool":"add","input":{"a":2,"b":2}}"#,
        r#"{"action":"final","response":"2+2 is 4"}"#,
    ]);
    let invoker = Arc::new(StubInvoker {
        result: json!({
            "content": [{"type": "text", "text": "4"}],
            "isError": false
        }),
    });
    let agent = agent_with(provider.clone(), math_toolset(), invoker);

    let outcome = agent
        .run("what is 2+2".into(), AgentOptions::default())
        .await
        .expect("agent succeeds");

    assert_eq!(outcome.response, "2+2 is 4");
    assert_eq!(outcome.messages.len(), 4);
    assert_eq!(
        outcome.messages[1],
        TurnMessage::ToolCall {
            tool: "add".into(),
            input: json!({"a": 2, "b": 2}),
        }
    );
    assert_eq!(
        outcome.messages[2],
        TurnMessage::ToolResult {
            tool: "add".into(),
            success: true,
            content: json!("4"),
        }
    );

    let records = provider.requests().await;
    assert_eq!(records.len(), 2);
    assert!(
        records[0]
            .messages
            .iter()
            .any(|msg| msg.content.contains("\"tool_context\""))
    );
    assert!(
        records[1]
            .messages
            .iter()
            .any(|msg| msg.content.contains("tool_result"))
    );
}

#[tokio::test]
async fn agent_handles_list_tools() {
    let provider = ScriptedProvider::new(vec![
        r#"{"action":"call_tool","tool":"list_tools"}"#,
        r#"{"action":"final","response":"all done"}"#,
    ]);
    let agent = agent_with(provider.clone(), math_toolset(), no_tools_invoker());

    let outcome = agent
        .run("need info".into(), AgentOptions::default())
        .await
        .expect("agent succeeds");

    assert_eq!(outcome.response, "all done");
    let TurnMessage::ToolResult { tool, success, content } = &outcome.messages[2] else {
        panic!("expected a tool result message");
    };
    assert_eq!(tool, "list_tools");
    assert!(*success);
    assert!(
        content
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| !tools.is_empty())
            .unwrap_or(false)
    );
}

#[tokio::test]
async fn plain_text_reply_is_accepted_as_final_answer() {
    let provider = ScriptedProvider::new(vec!["Just a plain sentence."]);
    let agent = agent_with(provider, ToolSet::default(), no_tools_invoker());

    let outcome = agent
        .run("hi".into(), AgentOptions::default())
        .await
        .expect("agent succeeds");

    assert_eq!(outcome.response, "Just a plain sentence.");
}

#[tokio::test]
async fn unknown_tool_surfaces_tool_error() {
    let provider =
        ScriptedProvider::new(vec![r#"{"action":"call_tool","tool":"does_not_exist"}"#]);
    let agent = agent_with(provider, math_toolset(), no_tools_invoker());

    let error = agent
        .run("try".into(), AgentOptions::default())
        .await
        .expect_err("unknown tool must fail");

    assert!(matches!(
        error,
        AgentError::Tool(ToolError::UnknownTool(name)) if name == "does_not_exist"
    ));
}

#[tokio::test]
async fn step_ceiling_bounds_the_loop() {
    let call = r#"{"action":"call_tool","tool":"add","input":{}}"#;
    let provider = ScriptedProvider::new(vec![call, call, call]);
    let invoker = Arc::new(StubInvoker {
        result: json!({"content": [{"type": "text", "text": "4"}]}),
    });
    let agent = agent_with(provider, math_toolset(), invoker);

    let options = AgentOptions {
        max_steps: 2,
        ..AgentOptions::default()
    };
    let error = agent
        .run("loop forever".into(), options)
        .await
        .expect_err("ceiling must trip");

    assert!(matches!(
        error,
        AgentError::StepLimitExceeded { limit: 2 }
    ));
}

#[tokio::test]
async fn model_failure_propagates_as_model_error() {
    let agent = agent_with(FailingProvider, ToolSet::default(), no_tools_invoker());

    let error = agent
        .run("hello".into(), AgentOptions::default())
        .await
        .expect_err("model failure must propagate");

    assert!(matches!(error, AgentError::Model(_)));
}

#[tokio::test]
async fn failed_tool_result_is_fed_back_not_fatal() {
    let provider = ScriptedProvider::new(vec![
        r#"{"action":"call_tool","tool":"add","input":{}}"#,
        r#"{"action":"final","response":"the tool failed"}"#,
    ]);
    let invoker = Arc::new(StubInvoker {
        result: json!({
            "content": [{"type": "text", "text": "division by zero"}],
            "isError": true
        }),
    });
    let agent = agent_with(provider.clone(), math_toolset(), invoker);

    let outcome = agent
        .run("divide".into(), AgentOptions::default())
        .await
        .expect("turn finishes despite the failed tool");

    let TurnMessage::ToolResult { success, .. } = &outcome.messages[2] else {
        panic!("expected a tool result message");
    };
    assert!(!*success);
    assert!(
        provider.requests().await[1]
            .messages
            .iter()
            .any(|msg| msg.content.contains("\"success\":false"))
    );
}
