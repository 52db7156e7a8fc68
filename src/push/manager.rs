//! Push connection lifecycle manager
//!
//! Owns the retry budget and every timer of the push connection. Public entry
//! points serialize on one lock around [`RetryState`]. Timers never call back
//! into the manager directly: they post a [`TimerFired`] to a single worker
//! task, which takes the lock and redeems the timer's token, so a timer that
//! was cancelled or replaced in the meantime does nothing.
//!
//! Timers:
//! - idle reconnect: proactive reconnect of a healthy connection
//! - retry: single-shot `connect` after a failed attempt
//! - debounced reconnect: trailing edge of a burst of reconnect triggers
//! - settle: delay between an `authorized` signal and its reconnect

use crate::push::timer::TimerHandle;
use crate::push::transport::EventSender;
use crate::push::{
    translate_message, AuthorizationSignal, ConnectionConfig, ConnectionState,
    CredentialProvider, Credentials, InboundEvent, Intent, ManagerStats, PushError, PushResult,
    PushTransport,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receiving ends wired by the host application
pub struct ManagerChannels {
    /// Intents for the application state store
    pub intents: mpsc::UnboundedReceiver<Intent>,
    /// Errors that must reach the process-level reporter
    pub errors: mpsc::UnboundedReceiver<PushError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    IdleReconnect,
    Retry,
    DebouncedReconnect,
    Settle,
}

#[derive(Debug, Clone, Copy)]
struct TimerFired {
    kind: TimerKind,
    token: u64,
}

/// Mutable lifecycle state, only touched under the manager lock
struct RetryState {
    attempt_count: u32,
    connection: ConnectionState,
    idle_reconnect: TimerHandle,
    retry: TimerHandle,
    debounced_reconnect: TimerHandle,
    settle: TimerHandle,
    successful_connects: u64,
    failed_connects: u64,
    last_connected_at: Option<DateTime<Utc>>,
}

impl RetryState {
    fn new() -> Self {
        Self {
            attempt_count: 0,
            connection: ConnectionState::default(),
            idle_reconnect: TimerHandle::new("idle reconnect"),
            retry: TimerHandle::new("connect retry"),
            debounced_reconnect: TimerHandle::new("debounced reconnect"),
            settle: TimerHandle::new("authorization settle"),
            successful_connects: 0,
            failed_connects: 0,
            last_connected_at: None,
        }
    }

    fn timer(&mut self, kind: TimerKind) -> &mut TimerHandle {
        match kind {
            TimerKind::IdleReconnect => &mut self.idle_reconnect,
            TimerKind::Retry => &mut self.retry,
            TimerKind::DebouncedReconnect => &mut self.debounced_reconnect,
            TimerKind::Settle => &mut self.settle,
        }
    }

    fn cancel_timers(&mut self) {
        self.idle_reconnect.cancel();
        self.retry.cancel();
        self.debounced_reconnect.cancel();
        self.settle.cancel();
    }
}

struct Inner {
    config: ConnectionConfig,
    provider: Arc<dyn CredentialProvider>,
    transport: Arc<dyn PushTransport>,
    intent_sender: mpsc::UnboundedSender<Intent>,
    error_sender: mpsc::UnboundedSender<PushError>,
    event_sender: EventSender,
    event_receiver: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    timer_sender: mpsc::UnboundedSender<TimerFired>,
    timer_worker: JoinHandle<()>,
    state: Mutex<RetryState>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.timer_worker.abort();
        for handle in self.background.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Keeps the push connection open, retried and fresh
///
/// Cheap to clone; clones share the same connection. Background tasks hold
/// only a weak reference, so dropping the last clone tears everything down.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state
    ///
    /// Must be called from within a tokio runtime: the timer worker is
    /// spawned here.
    pub fn new(
        config: ConnectionConfig,
        provider: Arc<dyn CredentialProvider>,
        transport: Arc<dyn PushTransport>,
    ) -> PushResult<(Self, ManagerChannels)> {
        config.validate()?;

        let (intent_sender, intents) = mpsc::unbounded_channel();
        let (error_sender, errors) = mpsc::unbounded_channel();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let (timer_sender, timer_receiver) = mpsc::unbounded_channel();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            config,
            provider,
            transport,
            intent_sender,
            error_sender,
            event_sender,
            event_receiver: Mutex::new(Some(event_receiver)),
            timer_sender,
            timer_worker: tokio::spawn(Self::run_timer_worker(weak.clone(), timer_receiver)),
            state: Mutex::new(RetryState::new()),
            background: Mutex::new(Vec::new()),
        });

        Ok((Self { inner }, ManagerChannels { intents, errors }))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Subscribe to sign-in changes and start dispatching inbound events
    ///
    /// Only the first call succeeds. A source that is already `authorized`
    /// schedules a reconnect immediately.
    pub async fn start(&self, mut auth: watch::Receiver<AuthorizationSignal>) -> PushResult<()> {
        let receiver = self
            .inner
            .event_receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| PushError::invalid_state("Connection manager already started"))?;

        let pump = tokio::spawn(Self::run_event_pump(Arc::downgrade(&self.inner), receiver));

        let initial = *auth.borrow_and_update();
        if initial.authorized {
            self.handle_authorization(initial).await;
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            while auth.changed().await.is_ok() {
                let signal = *auth.borrow_and_update();
                let Some(manager) = Self::upgrade(&weak) else {
                    break;
                };
                manager.handle_authorization(signal).await;
            }
            debug!("Authorization listener ended");
        });

        let mut background = self.inner.background.lock().await;
        background.push(pump);
        background.push(listener);

        info!("Connection manager started");
        Ok(())
    }

    /// Stop listening, cancel every timer and close the transport
    pub async fn stop(&self) {
        for handle in self.inner.background.lock().await.drain(..) {
            handle.abort();
        }

        let mut state = self.inner.state.lock().await;
        state.cancel_timers();
        state.attempt_count = 0;
        if state.connection != ConnectionState::Disconnected {
            self.inner.transport.close().await;
            state.connection = ConnectionState::Disconnected;
        }

        info!("Connection manager stopped");
    }

    /// Fetch credentials and open the transport
    ///
    /// A failed attempt emits `Logout` and schedules a retry; once the retry
    /// budget is spent the counter resets and the exhaustion error is returned.
    pub async fn connect(&self) -> PushResult<()> {
        let mut state = self.inner.state.lock().await;
        self.connect_locked(&mut state).await
    }

    /// Close and reconnect after the debounce window
    ///
    /// Calls within the window restart it; only the last one takes effect.
    pub async fn reconnect(&self) {
        let mut state = self.inner.state.lock().await;
        self.reconnect_locked(&mut state);
    }

    /// Close the transport and cancel pending timers. No-op when disconnected.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_timers();
        state.attempt_count = 0;

        if state.connection == ConnectionState::Disconnected {
            debug!("Disconnect requested while already disconnected");
            return;
        }

        self.inner.transport.close().await;
        state.connection = ConnectionState::Disconnected;
        info!("Push connection closed");
    }

    /// React to an event from the transport
    ///
    /// Malformed message payloads are returned to the caller; nothing is
    /// emitted for them.
    pub async fn on_inbound_event(&self, event: InboundEvent) -> PushResult<()> {
        match event {
            InboundEvent::Reconnect => {
                info!("Server requested reconnect");
                self.reconnect().await;
            }
            InboundEvent::NewMessage(payload) => {
                for intent in translate_message(&payload)? {
                    self.emit(intent);
                }
            }
            InboundEvent::Other(tag) => {
                debug!("Ignoring inbound event with unknown tag {}", tag);
            }
        }
        Ok(())
    }

    /// React to a sign-in state change
    pub async fn handle_authorization(&self, signal: AuthorizationSignal) {
        if !signal.authorized {
            info!("Signed out, disconnecting");
            self.disconnect().await;
            return;
        }

        let delay = self.inner.config.authorization_settle_delay();
        info!("Signed in, reconnecting in {:?}", delay);

        let mut state = self.inner.state.lock().await;
        self.schedule(&mut state, TimerKind::Settle, delay);
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection
    }

    pub async fn stats(&self) -> ManagerStats {
        let state = self.inner.state.lock().await;
        ManagerStats {
            state: state.connection,
            attempt_count: state.attempt_count,
            idle_reconnect_pending: state.idle_reconnect.is_pending(),
            retry_pending: state.retry.is_pending(),
            reconnect_pending: state.debounced_reconnect.is_pending()
                || state.settle.is_pending(),
            successful_connects: state.successful_connects,
            failed_connects: state.failed_connects,
            last_connected_at: state.last_connected_at,
        }
    }

    async fn connect_locked(&self, state: &mut RetryState) -> PushResult<()> {
        state.idle_reconnect.cancel();
        state.retry.cancel();

        // A fresh connect replaces the live socket
        if state.connection == ConnectionState::Connected {
            debug!("Closing live push connection before reconnecting");
            self.inner.transport.close().await;
        }
        state.connection = ConnectionState::Connecting;

        debug!(
            "Fetching push credentials (attempt {})",
            state.attempt_count + 1
        );

        let result = match self.inner.provider.fetch_credentials().await {
            Ok(credentials) => self.open_locked(state, credentials).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => self.handle_connect_failure(state, e),
        }
    }

    async fn open_locked(&self, state: &mut RetryState, credentials: Credentials) -> PushResult<()> {
        let interval = self.inner.config.idle_reconnect_interval();
        self.schedule(state, TimerKind::IdleReconnect, interval);

        // Queued before the transport can deliver anything
        self.emit(Intent::LoadUnreadCount { count: None });
        self.emit(Intent::Login);

        if let Err(e) = self
            .inner
            .transport
            .open(credentials, self.inner.event_sender.clone())
            .await
        {
            state.idle_reconnect.cancel();
            return Err(e);
        }

        state.attempt_count = 0;
        state.connection = ConnectionState::Connected;
        state.successful_connects += 1;
        state.last_connected_at = Some(Utc::now());

        info!("Push connection established");
        Ok(())
    }

    fn handle_connect_failure(&self, state: &mut RetryState, error: PushError) -> PushResult<()> {
        state.connection = ConnectionState::Disconnected;
        state.failed_connects += 1;
        self.emit(Intent::Logout);

        state.attempt_count += 1;
        let max_attempts = self.inner.config.max_retry_attempts;

        if state.attempt_count < max_attempts {
            let delay = self.inner.config.retry_interval();
            warn!(
                "Push connect failed (attempt {}/{}), retrying in {:?}: {}",
                state.attempt_count, max_attempts, delay, error
            );
            self.schedule(state, TimerKind::Retry, delay);
            return Ok(());
        }

        let attempts = state.attempt_count;
        state.attempt_count = 0;
        error!(
            "Push connect failed after {} attempts, giving up: {}",
            attempts, error
        );
        Err(PushError::exhausted(attempts, error))
    }

    fn reconnect_locked(&self, state: &mut RetryState) {
        let debounce = self.inner.config.reconnect_debounce();
        self.schedule(state, TimerKind::DebouncedReconnect, debounce);
    }

    fn schedule(&self, state: &mut RetryState, kind: TimerKind, delay: std::time::Duration) {
        let sender = self.inner.timer_sender.clone();
        state.timer(kind).schedule(delay, move |token| {
            // Receiver only goes away with the manager
            let _ = sender.send(TimerFired { kind, token });
        });
    }

    async fn on_timer(&self, fired: TimerFired) {
        let mut state = self.inner.state.lock().await;
        if !state.timer(fired.kind).fire(fired.token) {
            return;
        }

        match fired.kind {
            TimerKind::IdleReconnect => {
                debug!("Idle reconnect interval elapsed");
                self.reconnect_locked(&mut state);
            }
            TimerKind::Settle => self.reconnect_locked(&mut state),
            TimerKind::Retry => {
                if let Err(e) = self.connect_locked(&mut state).await {
                    self.report(e);
                }
            }
            TimerKind::DebouncedReconnect => {
                info!("Reconnecting push connection");
                self.inner.transport.close().await;
                state.connection = ConnectionState::Disconnected;

                if let Err(e) = self.connect_locked(&mut state).await {
                    self.report(e);
                }
            }
        }
    }

    async fn run_timer_worker(weak: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<TimerFired>) {
        while let Some(fired) = receiver.recv().await {
            let Some(manager) = Self::upgrade(&weak) else {
                break;
            };
            manager.on_timer(fired).await;
        }
        debug!("Timer worker ended");
    }

    async fn run_event_pump(weak: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<InboundEvent>) {
        while let Some(event) = receiver.recv().await {
            let Some(manager) = Self::upgrade(&weak) else {
                break;
            };

            debug!("Inbound event: {}", event.tag());
            if let Err(e) = manager.on_inbound_event(event).await {
                manager.report(e);
            }
        }
        debug!("Inbound event pump ended");
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn emit(&self, intent: Intent) {
        debug!("Emitting intent {:?}", intent);
        if self.inner.intent_sender.send(intent).is_err() {
            warn!("Failed to emit intent - store receiver dropped");
        }
    }

    fn report(&self, error: PushError) {
        if error.is_fatal() {
            error!("Push connection error: {}", error);
        } else {
            warn!("Push connection error: {}", error);
        }
        if let Err(mpsc::error::SendError(error)) = self.inner.error_sender.send(error) {
            error!("Error reporter dropped, unreported error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticProvider;

    #[async_trait]
    impl CredentialProvider for StaticProvider {
        async fn fetch_credentials(&self) -> PushResult<Credentials> {
            Ok(Credentials::new("token"))
        }
    }

    struct NullTransport;

    #[async_trait]
    impl PushTransport for NullTransport {
        async fn open(&self, _credentials: Credentials, _events: EventSender) -> PushResult<()> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn manager(config: ConnectionConfig) -> PushResult<(ConnectionManager, ManagerChannels)> {
        ConnectionManager::new(config, Arc::new(StaticProvider), Arc::new(NullTransport))
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ConnectionConfig {
            max_retry_attempts: 0,
            ..ConnectionConfig::default()
        };
        assert!(matches!(manager(config), Err(PushError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let (manager, _channels) = manager(ConnectionConfig::default()).unwrap();
        let (_auth_tx, auth_rx) = watch::channel(AuthorizationSignal::default());

        assert!(manager.start(auth_rx.clone()).await.is_ok());
        assert!(matches!(
            manager.start(auth_rx).await,
            Err(PushError::InvalidState(_))
        ));
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_successful_connect_resets_state() {
        let (manager, mut channels) = manager(ConnectionConfig::default()).unwrap();
        assert_eq!(manager.state().await, ConnectionState::Disconnected);

        manager.connect().await.unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.state, ConnectionState::Connected);
        assert_eq!(stats.attempt_count, 0);
        assert!(stats.idle_reconnect_pending);
        assert!(stats.last_connected_at.is_some());

        assert_eq!(
            channels.intents.recv().await,
            Some(Intent::LoadUnreadCount { count: None })
        );
        assert_eq!(channels.intents.recv().await, Some(Intent::Login));

        manager.disconnect().await;
        assert!(!manager.stats().await.idle_reconnect_pending);
    }
}
