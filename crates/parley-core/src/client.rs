//! Agent collaborator trait definitions.
//!
//! These are the seams the registry works against. Uses native async fn in
//! traits (RPITIT, Rust 2024 edition); the registry is generic over the
//! connector, so no boxing is needed. The concrete implementation lives in
//! parley-infra (`CliConnector`).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Notify;

use parley_types::agent::ReplyBlock;
use parley_types::error::AgentError;

/// Clonable, out-of-band cancellation signal for an in-flight reply.
///
/// Backed by `tokio::sync::Notify` with `notify_waiters` semantics: raising
/// the signal wakes a reply currently being collected and does nothing at
/// all when the connection is idle. This is exactly the best-effort contract
/// the agent SDK offers -- interruption is advisory, never guaranteed.
///
/// The handle is taken from the connection once at session creation and kept
/// on the registry entry, so interrupting never has to wait on the session
/// guard (which the interrupted request itself is holding).
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    inner: Arc<Notify>,
}

impl InterruptHandle {
    /// Create a fresh, unraised handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake any reply collection currently waiting on this handle.
    ///
    /// No-op when nothing is waiting.
    pub fn raise(&self) {
        self.inner.notify_waiters();
    }

    /// Suspend until the handle is raised.
    ///
    /// Connections select on this while reading reply frames.
    pub async fn raised(&self) {
        self.inner.notified().await;
    }
}

/// A live connection to one agent handle (one long-running agent process).
///
/// Conversational state lives inside the handle; callers only push messages
/// in and collect full replies out. `&mut self` on the exchange methods
/// encodes that a connection handles one exchange at a time -- the registry's
/// per-session guard provides that exclusivity.
pub trait AgentConnection: Send + 'static {
    /// Out-of-band interrupt signal for this connection.
    fn interrupt_handle(&self) -> InterruptHandle;

    /// Send one message to the handle. Suspends until accepted.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), AgentError>> + Send;

    /// Collect the full reply to the last sent message.
    ///
    /// Suspends until the handle's terminal result marker; the returned
    /// sequence is finite and not restartable.
    fn receive_reply(&mut self)
    -> impl Future<Output = Result<Vec<ReplyBlock>, AgentError>> + Send;

    /// Release the underlying process resource. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<(), AgentError>> + Send;
}

/// Factory for agent connections, one per session key.
///
/// Fails with [`AgentError::HandleCreation`] when the agent cannot be
/// launched (missing CLI, bad credentials) -- fatal conditions surface here,
/// at connect time, not mid-session.
pub trait AgentConnector: Send + Sync + 'static {
    type Connection: AgentConnection;

    /// Open a fresh handle for `session_key`.
    fn connect(
        &self,
        session_key: &str,
    ) -> impl Future<Output = Result<Self::Connection, AgentError>> + Send;
}
