//! Agent CLI subprocess transport.
//!
//! `CliConnector` spawns the configured agent command once per session and
//! talks to it over piped stdio with newline-delimited JSON frames. The
//! session key is handed to the child via `PARLEY_SESSION_KEY`.
//!
//! Frame contract (the gateway's own CLI contract, not the SDK's wire
//! protocol):
//! - outbound: `{"type":"user_message","text":...}` per message, and a
//!   best-effort `{"type":"interrupt"}` when a caller interrupts.
//! - inbound: `{"type":"text","text":...}` blocks, any other object with a
//!   `type` field (passed through verbatim), and a terminal
//!   `{"type":"result",...}` frame closing the reply.
//!
//! The transport deliberately does nothing else: no restarts, no health
//! checks, no knowledge of what the agent says upstream. A dead child
//! surfaces as `Process`, an undecodable frame as `MalformedReply`; both are
//! fatal to the handle, so the registry drops the session rather than let
//! leftover frames bleed into the next exchange.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use parley_core::client::{AgentConnection, AgentConnector, InterruptHandle};
use parley_types::agent::ReplyBlock;
use parley_types::config::AgentCliConfig;
use parley_types::error::AgentError;

/// How long `close` waits for the child to exit after stdin is dropped
/// before killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Spawns one agent CLI process per session.
pub struct CliConnector {
    config: AgentCliConfig,
}

impl CliConnector {
    pub fn new(config: AgentCliConfig) -> Self {
        Self { config }
    }
}

impl AgentConnector for CliConnector {
    type Connection = CliConnection;

    async fn connect(&self, session_key: &str) -> Result<CliConnection, AgentError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .env("PARLEY_SESSION_KEY", session_key)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| {
            AgentError::HandleCreation(format!(
                "failed to launch '{}': {err}",
                self.config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::HandleCreation("agent stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::HandleCreation("agent stdout not captured".to_string()))?;

        tracing::debug!(
            session = %session_key,
            command = %self.config.command,
            "spawned agent process"
        );

        Ok(CliConnection {
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
            interrupt: InterruptHandle::new(),
            closed: false,
        })
    }
}

/// One live agent process, exchanged with over ndjson frames.
#[derive(Debug)]
pub struct CliConnection {
    child: Child,
    /// Taken on close; dropping it signals EOF to the child.
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    interrupt: InterruptHandle,
    closed: bool,
}

impl CliConnection {
    async fn write_frame(&mut self, frame: &Value) -> Result<(), AgentError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AgentError::Connection("connection already closed".to_string()))?;
        let mut line = frame.to_string();
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| AgentError::Connection(err.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|err| AgentError::Connection(err.to_string()))
    }

    /// Reap the child and build a `Process` error carrying its exit status.
    async fn process_failure(&mut self, context: &str) -> AgentError {
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(_) => None,
        };
        AgentError::Process {
            code,
            message: context.to_string(),
        }
    }

    fn decode_frame(line: &str) -> Result<Value, AgentError> {
        serde_json::from_str::<Value>(line)
            .map_err(|err| AgentError::MalformedReply(format!("undecodable frame: {err}")))
    }
}

impl AgentConnection for CliConnection {
    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    async fn send(&mut self, text: &str) -> Result<(), AgentError> {
        self.write_frame(&json!({ "type": "user_message", "text": text }))
            .await
    }

    async fn receive_reply(&mut self) -> Result<Vec<ReplyBlock>, AgentError> {
        let interrupt = self.interrupt.clone();
        let mut blocks = Vec::new();

        loop {
            // next_line is cancel-safe, so racing it against the interrupt
            // signal cannot lose a frame.
            let read = tokio::select! {
                line = self.lines.next_line() => Some(line),
                _ = interrupt.raised() => None,
            };

            let line = match read {
                None => {
                    // Forward the interrupt and keep reading: the agent
                    // answers with its terminal result frame. Best-effort,
                    // a write failure here is not the caller's problem.
                    if let Err(err) = self.write_frame(&json!({ "type": "interrupt" })).await {
                        tracing::debug!(error = %err, "forwarding interrupt failed");
                    }
                    continue;
                }
                Some(Ok(Some(line))) => line,
                Some(Ok(None)) => {
                    return Err(self.process_failure("agent exited before result frame").await);
                }
                Some(Err(err)) => return Err(AgentError::Connection(err.to_string())),
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let frame = Self::decode_frame(line)?;
            let frame_type = frame
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_owned);
            match frame_type.as_deref() {
                Some("text") => {
                    let text = frame.get("text").and_then(Value::as_str).ok_or_else(|| {
                        AgentError::MalformedReply("text frame without text field".to_string())
                    })?;
                    blocks.push(ReplyBlock::Text {
                        text: text.to_string(),
                    });
                }
                Some("result") => return Ok(blocks),
                Some(_) => blocks.push(ReplyBlock::Json { value: frame }),
                None => {
                    return Err(AgentError::MalformedReply(
                        "frame without type field".to_string(),
                    ));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), AgentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // EOF on stdin tells the agent to wind down.
        drop(self.stdin.take());

        match tokio::time::timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(exit = ?status.code(), "agent process exited");
            }
            Ok(Err(err)) => return Err(AgentError::Connection(err.to_string())),
            Err(_) => {
                tracing::debug!("agent process did not exit in time, killing");
                if let Err(err) = self.child.start_kill() {
                    tracing::debug!(error = %err, "kill failed");
                }
                let _ = self.child.wait().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parley_core::registry::SessionRegistry;

    /// Connector whose "agent" is a shell one-liner.
    fn sh_connector(script: &str) -> CliConnector {
        CliConnector::new(AgentCliConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Default::default(),
        })
    }

    #[tokio::test]
    async fn connect_missing_binary_is_handle_creation_error() {
        let connector = CliConnector::new(AgentCliConfig {
            command: "parley-test-no-such-binary".to_string(),
            args: Vec::new(),
            env: Default::default(),
        });
        let err = connector.connect("a").await.unwrap_err();
        assert!(matches!(err, AgentError::HandleCreation(_)));
    }

    #[tokio::test]
    async fn exchange_collects_blocks_until_result() {
        let connector = sh_connector(
            r#"read -r line
echo '{"type":"text","text":"hello "}'
echo '{"type":"text","text":"world"}'
echo '{"type":"result","status":"ok"}'"#,
        );
        let mut conn = connector.connect("a").await.unwrap();
        conn.send("hi").await.unwrap();
        let blocks = conn.receive_reply().await.unwrap();
        assert_eq!(
            blocks,
            vec![
                ReplyBlock::Text { text: "hello ".to_string() },
                ReplyBlock::Text { text: "world".to_string() },
            ]
        );
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_frame_types_pass_through_as_json() {
        let connector = sh_connector(
            r#"read -r line
echo '{"type":"tool_use","name":"ls"}'
echo '{"type":"result"}'"#,
        );
        let mut conn = connector.connect("a").await.unwrap();
        conn.send("hi").await.unwrap();
        let blocks = conn.receive_reply().await.unwrap();
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ReplyBlock::Json { value } => {
                assert_eq!(value["type"], "tool_use");
                assert_eq!(value["name"], "ls");
            }
            other => panic!("expected json block, got {other:?}"),
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_frame_is_malformed_reply() {
        let connector = sh_connector(
            r#"read -r line
echo 'this is not json'"#,
        );
        let mut conn = connector.connect("a").await.unwrap();
        conn.send("hi").await.unwrap();
        let err = conn.receive_reply().await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedReply(_)));
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn frame_without_type_is_malformed_reply() {
        let connector = sh_connector(
            r#"read -r line
echo '{"text":"no type here"}'"#,
        );
        let mut conn = connector.connect("a").await.unwrap();
        conn.send("hi").await.unwrap();
        let err = conn.receive_reply().await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedReply(_)));
        conn.close().await.unwrap();
    }

    /// A malformed frame desyncs the stream: the rest of that reply is still
    /// buffered in the child. The registry must drop the session so the next
    /// exchange on the same key gets a fresh process and its own reply, not
    /// the previous message's leftovers.
    #[tokio::test]
    async fn malformed_frame_drops_session_so_leftovers_never_bleed() {
        let registry = SessionRegistry::new(sh_connector(
            r#"read -r line
case "$line" in
*first*)
  echo 'not json'
  echo '{"type":"text","text":"answer to first"}'
  echo '{"type":"result"}'
  ;;
*)
  echo '{"type":"text","text":"answer to second"}'
  echo '{"type":"result"}'
  ;;
esac"#,
        ));

        let err = registry.run_exclusive("a", "first").await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedReply(_)));
        assert!(registry.is_empty());

        let reply = registry.run_exclusive("a", "second").await.unwrap();
        assert_eq!(
            reply.blocks,
            vec![ReplyBlock::Text { text: "answer to second".to_string() }]
        );
    }

    #[tokio::test]
    async fn early_exit_is_process_error_with_code() {
        let connector = sh_connector(
            r#"read -r line
exit 3"#,
        );
        let mut conn = connector.connect("a").await.unwrap();
        conn.send("hi").await.unwrap();
        let err = conn.receive_reply().await.unwrap_err();
        match err {
            AgentError::Process { code, .. } => assert_eq!(code, Some(3)),
            other => panic!("expected process error, got {other}"),
        }
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = sh_connector("cat >/dev/null");
        let mut conn = connector.connect("a").await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_key_reaches_child_environment() {
        let connector = sh_connector(
            r#"read -r line
printf '{"type":"text","text":"%s"}\n' "$PARLEY_SESSION_KEY"
echo '{"type":"result"}'"#,
        );
        let mut conn = connector.connect("session-9").await.unwrap();
        conn.send("hi").await.unwrap();
        let blocks = conn.receive_reply().await.unwrap();
        assert_eq!(
            blocks,
            vec![ReplyBlock::Text { text: "session-9".to_string() }]
        );
        conn.close().await.unwrap();
    }
}
