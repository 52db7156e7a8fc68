//! Collaborators driven by the connection manager

use crate::push::{Credentials, InboundEvent, PushResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Sender half of the inbound event callback handed to the transport
pub type EventSender = mpsc::UnboundedSender<InboundEvent>;

/// Source of short-lived connection credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch credentials for a single connect attempt
    async fn fetch_credentials(&self) -> PushResult<Credentials>;
}

/// Persistent push socket
///
/// `open` may be called while a previous connection is still up; the manager
/// always calls `close` first on reconnect, but a transport should treat a
/// second `open` as replacing the first.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the connection; inbound events go to `events` until `close`
    async fn open(&self, credentials: Credentials, events: EventSender) -> PushResult<()>;

    /// Close the connection. Closing a closed transport is a no-op.
    async fn close(&self);
}
