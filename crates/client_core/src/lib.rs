use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use shared::{
    domain::{SessionId, WireVariant},
    protocol::{build_endpoint_url, OutboundMessage, DEFAULT_ENDPOINT_PATH},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

pub mod error;

pub use error::ChannelError;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of the single realtime connection owned by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    StateChanged(ChannelState),
    /// One inbound text line, emitted in transport arrival order. The same
    /// line has already been appended to the display sink.
    LineReceived(String),
    /// A transport-level failure. Recovered internally; always followed by
    /// `StateChanged(Disconnected)`.
    TransportError(String),
}

/// Synchronous read of the current session identifier. Absence is a fatal
/// precondition for `connect`; no reconnect is attempted without one.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<SessionId>;
}

pub struct MissingSessionProvider;

impl SessionProvider for MissingSessionProvider {
    fn current_session(&self) -> Option<SessionId> {
        None
    }
}

pub struct StaticSessionProvider(SessionId);

impl StaticSessionProvider {
    pub fn new(session: SessionId) -> Self {
        Self(session)
    }
}

impl SessionProvider for StaticSessionProvider {
    fn current_session(&self) -> Option<SessionId> {
        Some(self.0.clone())
    }
}

/// Append-only ordered text log for inbound lines. Calls must return quickly;
/// they run on the transport driver.
pub trait DisplaySink: Send + Sync {
    fn append_line(&self, line: &str);
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base url of the remote host, `http(s)` or `ws(s)` scheme.
    pub server_url: String,
    pub endpoint_path: String,
    pub wire_variant: WireVariant,
    /// Flat delay between a drop and the next dial. Every transport error and
    /// every clean close schedules the same delay; there is no backoff, cap
    /// or jitter.
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            wire_variant: WireVariant::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_wire_variant(mut self, variant: WireVariant) -> Self {
        self.wire_variant = variant;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Owns one realtime connection identified by a session identifier, delivers
/// inbound text lines to the display sink, accepts outbound messages while
/// connected, and recovers from drops with a fixed-delay reconnect.
///
/// At most one transport handle is current at any time. Superseding it
/// (`connect` or `close`) bumps the generation counter and aborts the old
/// driver and any pending reconnect timer, so a stale handle can neither
/// deliver into the sink nor resurrect itself. `close` is the terminal
/// override: call it before dropping the manager, otherwise a scheduled
/// reconnect keeps the instance alive.
pub struct ChannelManager {
    config: ChannelConfig,
    session: Arc<dyn SessionProvider>,
    sink: Arc<dyn DisplaySink>,
    events: broadcast::Sender<ChannelEvent>,
    inner: Mutex<ChannelInner>,
}

struct ChannelInner {
    state: ChannelState,
    generation: u64,
    /// Connection target of the current handle. Embeds the identifier that
    /// was bound at `connect`; automatic re-dials reuse it unchanged.
    endpoint: Option<Url>,
    outbound: Option<mpsc::Sender<Message>>,
    driver: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl ChannelInner {
    /// Release the current transport handle and cancel any pending reconnect.
    fn supersede(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.outbound = None;
    }

    fn set_state(&mut self, state: ChannelState, events: &broadcast::Sender<ChannelEvent>) {
        if self.state != state {
            self.state = state;
            let _ = events.send(ChannelEvent::StateChanged(state));
        }
    }
}

impl ChannelManager {
    pub fn new(
        config: ChannelConfig,
        session: Arc<dyn SessionProvider>,
        sink: Arc<dyn DisplaySink>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config,
            session,
            sink,
            events,
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Idle,
                generation: 0,
                endpoint: None,
                outbound: None,
                driver: None,
                reconnect_timer: None,
            }),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ChannelState {
        self.inner.lock().await.state
    }

    /// Open a new transport handle for the provider's current identifier,
    /// superseding any prior handle and pending reconnect. The identifier is
    /// bound for the lifetime of this handle; automatic reconnects reuse it.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ChannelError> {
        let session = self
            .session
            .current_session()
            .ok_or(ChannelError::MissingIdentifier)?;
        let endpoint = build_endpoint_url(
            &self.config.server_url,
            &self.config.endpoint_path,
            &session,
            self.config.wire_variant,
        )?;

        let mut guard = self.inner.lock().await;
        guard.supersede();
        guard.generation += 1;
        let generation = guard.generation;
        guard.endpoint = Some(endpoint.clone());
        guard.set_state(ChannelState::Connecting, &self.events);
        guard.driver = Some(tokio::spawn(Arc::clone(self).drive(generation, endpoint)));
        Ok(())
    }

    /// Serialize and transmit one message. Fails with `NotConnected` unless
    /// the channel is currently connected; the message is dropped, not queued.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let outbound = {
            let guard = self.inner.lock().await;
            if guard.state != ChannelState::Connected {
                return Err(ChannelError::NotConnected);
            }
            guard.outbound.clone().ok_or(ChannelError::NotConnected)?
        };
        let frame = message.to_wire(self.config.wire_variant)?;
        outbound
            .send(Message::Text(frame))
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    /// Scoped teardown: release the transport handle unconditionally and
    /// cancel any pending reconnect timer. Idempotent; the manager returns to
    /// `Idle` and can be connected again.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.generation += 1;
        guard.supersede();
        guard.endpoint = None;
        guard.set_state(ChannelState::Idle, &self.events);
        info!("channel: closed");
    }

    fn drive(
        self: Arc<Self>,
        generation: u64,
        endpoint: Url,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
        info!(endpoint = %endpoint, "channel: dialing");
        let stream = match connect_async(endpoint.as_str()).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                warn!(error = %err, "channel: dial failed");
                self.transport_lost(generation, Some(err.to_string())).await;
                return;
            }
        };

        let (mut ws_writer, mut ws_reader) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_CAPACITY);

        {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                return;
            }
            guard.outbound = Some(outbound_tx);
            guard.set_state(ChannelState::Connected, &self.events);
        }
        info!("channel: connected");

        let failure = loop {
            tokio::select! {
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        if let Err(err) = ws_writer.send(frame).await {
                            break Some(err.to_string());
                        }
                    }
                    None => break None,
                },
                incoming = ws_reader.next() => match incoming {
                    Some(Ok(Message::Text(line))) => {
                        let guard = self.inner.lock().await;
                        if guard.generation != generation {
                            return;
                        }
                        self.sink.append_line(&line);
                        let _ = self.events.send(ChannelEvent::LineReceived(line));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = ws_writer.send(Message::Pong(payload)).await {
                            break Some(err.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(err.to_string()),
                },
            }
        };

        self.transport_lost(generation, failure).await;
        })
    }

    /// Transport gone, by error or clean close. Both paths schedule the same
    /// fixed-delay reconnect unless this handle has been superseded.
    async fn transport_lost(self: &Arc<Self>, generation: u64, failure: Option<String>) {
        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            return;
        }
        guard.outbound = None;
        if let Some(reason) = failure {
            let _ = self.events.send(ChannelEvent::TransportError(reason));
        }
        guard.set_state(ChannelState::Disconnected, &self.events);

        let delay = self.config.reconnect_delay;
        let manager = Arc::clone(self);
        guard.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.redial(generation).await;
        }));
        info!(delay_ms = delay.as_millis() as u64, "channel: reconnect scheduled");
    }

    /// Reconnect timer fired. Re-dial only if the scheduling handle is still
    /// current; a supersession while the timer slept makes this a no-op.
    async fn redial(self: Arc<Self>, scheduled_generation: u64) {
        let mut guard = self.inner.lock().await;
        if guard.generation != scheduled_generation {
            return;
        }
        let Some(endpoint) = guard.endpoint.clone() else {
            return;
        };
        guard.generation += 1;
        let generation = guard.generation;
        guard.set_state(ChannelState::Connecting, &self.events);
        guard.driver = Some(tokio::spawn(Arc::clone(&self).drive(generation, endpoint)));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
