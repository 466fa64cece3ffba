//! Push Channel
//!
//! Keeps at most one authenticated push connection alive, bound to the
//! credential currently issued by the session. A credential change drops the
//! old connection before another frame is read from it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::events::PushEvent;
use super::transport::{PushConnection, PushTransport};
use crate::backoff::{ExponentialBackoff, Retry};
use crate::session::CredentialProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// An event tagged with the session epoch it was received under. The epoch
/// increments every time a credential is adopted.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEnvelope {
    pub session: u64,
    pub event: PushEvent,
}

#[async_trait]
pub trait PushSink: Send + Sync {
    async fn deliver(&self, envelope: PushEnvelope);
}

pub struct PushChannel {
    transport: Arc<dyn PushTransport>,
    credentials: Arc<dyn CredentialProvider>,
    sink: Arc<dyn PushSink>,
    backoff: ExponentialBackoff,
}

enum Wake {
    Elapsed,
    TokenChanged,
    Stop,
}

impl PushChannel {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        credentials: Arc<dyn CredentialProvider>,
        sink: Arc<dyn PushSink>,
    ) -> Self {
        Self { transport, credentials, sink, backoff: ExponentialBackoff::default() }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn start(self) -> PushHandle {
        let (current, state) = watch::channel(ChannelState::Disconnected);
        let (transitions, _) = broadcast::channel(64);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let states = StatePublisher { current, transitions: transitions.clone() };
        let task = tokio::spawn(self.run(states, shutdown_rx));
        PushHandle { state, transitions, shutdown, task: Some(task) }
    }

    async fn run(self, states: StatePublisher, mut shutdown: watch::Receiver<bool>) {
        let mut tokens = self.credentials.token_updates();
        let mut retry = Retry::new(self.backoff);
        let mut session = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let token = tokens.borrow_and_update().clone();
            let Some(token) = token else {
                states.set(ChannelState::Disconnected);
                debug!("No credential; push channel idle");
                match wait(None, &mut tokens, &mut shutdown).await {
                    Wake::Stop => break,
                    _ => continue,
                }
            };

            session += 1;
            states.set(ChannelState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                changed = tokens.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!(session, "Credential changed while connecting");
                    states.set(ChannelState::Disconnected);
                    continue;
                }
                result = self.transport.connect(&token) => result,
            };

            let reason = match connected {
                Ok(connection) => {
                    states.set(ChannelState::Connected);
                    info!(session, "Push channel connected");
                    let wake = self.pump(connection, session, &mut retry, &mut tokens, &mut shutdown).await;
                    states.set(ChannelState::Disconnected);
                    match wake {
                        Ok(Wake::TokenChanged) => {
                            info!(session, "Credential changed; reconnecting");
                            continue;
                        }
                        Ok(_) => break,
                        Err(reason) => reason,
                    }
                }
                Err(err) => {
                    states.set(ChannelState::Disconnected);
                    err.to_string()
                }
            };

            let delay = retry.next_delay();
            warn!(
                session,
                attempt = retry.attempts(),
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Push channel down; retrying"
            );
            match wait(Some(delay), &mut tokens, &mut shutdown).await {
                Wake::Stop => break,
                Wake::TokenChanged => retry.reset(),
                Wake::Elapsed => {}
            }
        }

        states.set(ChannelState::Disconnected);
        info!("Push channel stopped");
    }

    /// Read frames until the connection ends or must be abandoned. Token and
    /// shutdown signals are checked before every read. The retry counter only
    /// resets once the connection has delivered a frame.
    async fn pump(
        &self,
        mut connection: Box<dyn PushConnection>,
        session: u64,
        retry: &mut Retry,
        tokens: &mut watch::Receiver<Option<String>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Wake, String> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(Wake::Stop),
                changed = tokens.changed() => {
                    return Ok(if changed.is_ok() { Wake::TokenChanged } else { Wake::Stop });
                }
                frame = connection.next_frame() => match frame {
                    None => return Err("stream closed by server".to_string()),
                    Some(Err(err)) => return Err(err.to_string()),
                    Some(Ok(frame)) => {
                        retry.reset();
                        match PushEvent::parse(&frame) {
                            Ok(event) => {
                                debug!(session, event = event.name(), "Push event received");
                                self.sink.deliver(PushEnvelope { session, event }).await;
                            }
                            Err(err) => warn!(session, error = %err, "Dropping malformed push frame"),
                        }
                    }
                },
            }
        }
    }
}

/// Sleep for `delay` (or forever), waking early on a credential change or
/// shutdown.
async fn wait(
    delay: Option<Duration>,
    tokens: &mut watch::Receiver<Option<String>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Wake {
    let timer = async {
        match delay {
            Some(delay) => sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = shutdown.changed() => Wake::Stop,
        changed = tokens.changed() => if changed.is_ok() { Wake::TokenChanged } else { Wake::Stop },
        _ = timer => Wake::Elapsed,
    }
}

struct StatePublisher {
    current: watch::Sender<ChannelState>,
    transitions: broadcast::Sender<ChannelState>,
}

impl StatePublisher {
    fn set(&self, next: ChannelState) {
        let changed = self.current.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            let _ = self.transitions.send(next);
        }
    }
}

/// Running push channel. `stop` ends it and releases every pending timer;
/// dropping the handle aborts the task.
pub struct PushHandle {
    state: watch::Receiver<ChannelState>,
    transitions: broadcast::Sender<ChannelState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn state_updates(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Every state transition from now on, in order.
    pub fn transitions(&self) -> broadcast::Receiver<ChannelState> {
        self.transitions.subscribe()
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
