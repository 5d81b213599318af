use thiserror::Error;

/// Errors surfaced by the agent collaborator.
///
/// Every variant originates from the external agent handle -- the registry
/// invents no error conditions of its own and never retries. The hosting
/// service maps these to user-facing failures.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Opening a fresh handle failed: agent CLI missing, not executable,
    /// or misconfigured credentials. Raised at connect time only.
    #[error("handle creation failed: {0}")]
    HandleCreation(String),

    /// I/O failure talking to a live handle.
    #[error("connection error: {0}")]
    Connection(String),

    /// The underlying agent process exited while a reply was pending.
    #[error("agent process failed (exit code {code:?}): {message}")]
    Process {
        code: Option<i32>,
        message: String,
    },

    /// A reply frame could not be decoded.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

impl AgentError {
    /// Whether the handle that produced this error is still usable.
    ///
    /// `Process` and `Connection` failures mean the handle is dead.
    /// `MalformedReply` means the frame stream is desynced: leftover frames
    /// from the failed exchange would be read back as the next exchange's
    /// reply. In all three cases the registry drops the session so the next
    /// request opens a fresh handle.
    pub fn is_fatal_to_handle(&self) -> bool {
        matches!(
            self,
            AgentError::Process { .. } | AgentError::Connection(_) | AgentError::MalformedReply(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::HandleCreation("agent CLI not found".to_string());
        assert_eq!(err.to_string(), "handle creation failed: agent CLI not found");

        let err = AgentError::Process {
            code: Some(1),
            message: "exited before result".to_string(),
        };
        assert!(err.to_string().contains("exit code Some(1)"));
    }

    #[test]
    fn test_fatal_to_handle() {
        assert!(AgentError::Connection("broken pipe".to_string()).is_fatal_to_handle());
        assert!(AgentError::Process { code: None, message: "killed".to_string() }
            .is_fatal_to_handle());
        assert!(AgentError::MalformedReply("not json".to_string()).is_fatal_to_handle());
        assert!(!AgentError::HandleCreation("no CLI".to_string()).is_fatal_to_handle());
    }
}
