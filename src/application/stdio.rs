use crate::application::bridge::{ERROR_MARKER, SyncBridge};
use crate::domain::types::Payload;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize stdio response: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StdioRequest {
    prompt: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StdioResponse {
    payload: Payload,
}

/// JSON-lines mode for an external presentation shell: one request object per
/// line in, one `{"payload": ...}` object per line out. Every outcome,
/// including malformed input, comes back as a payload; nothing escapes as an
/// error.
pub fn run(
    bridge: &SyncBridge,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<(), StdioError> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<StdioRequest>(&line) {
            Ok(request) => {
                info!("Processing stdio chat request");
                let payload = match request.timeout_secs {
                    Some(secs) => bridge
                        .ask_sync_with_timeout(&request.prompt, Duration::from_secs(secs)),
                    None => bridge.ask_sync(&request.prompt),
                };
                StdioResponse { payload }
            }
            Err(error) => {
                error!(%error, "Failed to parse stdio input line");
                StdioResponse {
                    payload: Payload::Text(format!("{ERROR_MARKER} Invalid JSON input: {error}")),
                }
            }
        };
        write_response(&mut output, &response)?;
    }

    output.flush()?;
    Ok(())
}

fn write_response(output: &mut impl Write, response: &StdioResponse) -> Result<(), StdioError> {
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    output.write_all(&encoded)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::TurnMessage;
    use crate::application::bridge::TurnHandler;
    use crate::application::agent::AgentError;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct EchoHandler;

    #[async_trait]
    impl TurnHandler for EchoHandler {
        async fn handle(&mut self, prompt: String) -> Result<Vec<TurnMessage>, AgentError> {
            Ok(vec![TurnMessage::Assistant {
                content: format!("echo: {prompt}"),
            }])
        }
    }

    #[test]
    fn answers_each_line_with_a_payload() {
        let bridge =
            SyncBridge::start(move || async move { Ok(EchoHandler) }).expect("bridge starts");

        let input = b"{\"prompt\":\"hello\"}\n\n{\"prompt\":\"again\"}\n" as &[u8];
        let mut output = Vec::new();
        run(&bridge, input, &mut output).expect("stdio loop succeeds");

        let lines: Vec<Value> = String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid response JSON"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0]["payload"],
            json!({"kind": "text", "data": "echo: hello"})
        );
        assert_eq!(
            lines[1]["payload"],
            json!({"kind": "text", "data": "echo: again"})
        );

        bridge.shutdown();
    }

    #[test]
    fn malformed_lines_yield_marker_payloads() {
        let bridge =
            SyncBridge::start(move || async move { Ok(EchoHandler) }).expect("bridge starts");

        let input = b"not json at all\n" as &[u8];
        let mut output = Vec::new();
        run(&bridge, input, &mut output).expect("stdio loop succeeds");

        let response: Value =
            serde_json::from_str(String::from_utf8(output).expect("utf8").trim())
                .expect("valid response JSON");
        let text = response["payload"]["data"].as_str().expect("text payload");
        assert!(text.starts_with(ERROR_MARKER));

        bridge.shutdown();
    }
}
