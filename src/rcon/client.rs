//! Persistent RCON connection with coalesced handshakes and reconnects.
//!
//! One [`RconClient`] owns at most one TCP link. Callers never connect
//! explicitly: [`RconClient::send_command`] connects on demand, and a
//! dropped link is re-established in the background on an exponential
//! backoff schedule.
//!
//! # Handshake coalescing
//!
//! The handshake runs on its own task and is published as a
//! [`Shared`] future. Every caller that finds the client `Connecting`
//! awaits the same future, so N concurrent callers cause one TCP connect
//! and one login, and all observe the same outcome. Because the handshake
//! is spawned, a caller that gives up (timeout, dropped request) does not
//! leave the state stuck in `Connecting`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::codec::{Packet, RconCodec, AUTH_FAILED_ID, MAX_COMMAND_BYTES, TYPE_AUTH_RESPONSE};
use super::telemetry;
use crate::config::RconConfig;
use crate::{AppError, Result};

type Transport = Framed<TcpStream, RconCodec>;
type Writer = SplitSink<Transport, Packet>;
type Reader = SplitStream<Transport>;
type Attempt = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

/// Connection lifecycle of an [`RconClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and no handshake in flight.
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// Authenticated link available.
    Connected,
}

/// One authenticated TCP link.
struct Link {
    generation: u64,
    writer: tokio::sync::Mutex<Writer>,
    pending: Mutex<HashMap<i32, oneshot::Sender<Packet>>>,
    closed: CancellationToken,
}

impl Link {
    fn pending(&self) -> MutexGuard<'_, HashMap<i32, oneshot::Sender<Packet>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ClientState {
    status: ConnectionState,
    link: Option<Arc<Link>>,
    attempt: Option<Attempt>,
    backoff: Backoff,
    reconnect_pending: bool,
    generation: u64,
}

struct ClientInner {
    config: RconConfig,
    state: Mutex<ClientState>,
    command_lock: tokio::sync::Mutex<()>,
    next_id: AtomicI32,
    shutdown: CancellationToken,
}

/// Cheaply cloneable handle to the shared RCON connection.
#[derive(Clone)]
pub struct RconClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RconClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RconClient {
    /// Create a disconnected client.
    ///
    /// Background reconnect timers stop once `shutdown` is cancelled.
    #[must_use]
    pub fn new(config: RconConfig, shutdown: CancellationToken) -> Self {
        let backoff = Backoff::new(
            std::time::Duration::from_millis(config.reconnect_floor_ms),
            std::time::Duration::from_millis(config.reconnect_ceiling_ms),
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState {
                    status: ConnectionState::Disconnected,
                    link: None,
                    attempt: None,
                    backoff,
                    reconnect_pending: false,
                    generation: 0,
                }),
                command_lock: tokio::sync::Mutex::new(()),
                next_id: AtomicI32::new(1),
                shutdown,
            }),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock_state().status
    }

    /// Establish the link if needed.
    ///
    /// Reuses a live link, joins an in-flight handshake, or starts a new
    /// one bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rcon` if the TCP connect or login fails or times
    /// out. A reconnect is scheduled before the error is returned.
    pub async fn connect(&self) -> Result<()> {
        self.link().await.map(|_| ())
    }

    /// Send one command and return the raw reply text.
    ///
    /// Commands are serialized: a second caller waits until the first has
    /// its reply. Connecting happens before queueing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for commands longer than the RCON
    /// limit, and `AppError::Rcon` on connection failure, a dropped link,
    /// or a reply timeout.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        if command.len() > MAX_COMMAND_BYTES {
            return Err(AppError::InvalidInput(format!(
                "command is {} bytes; RCON accepts at most {MAX_COMMAND_BYTES}",
                command.len()
            )));
        }

        // Join the shared handshake before queueing, so concurrent callers
        // see one login and its single outcome.
        let mut link = self.link().await?;
        let _serial = self.inner.command_lock.lock().await;
        if link.closed.is_cancelled() {
            link = self.link().await?;
        }

        let id = self.inner.next_request_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        link.pending().insert(id, reply_tx);

        let sent = link
            .writer
            .lock()
            .await
            .send(Packet::command(id, command))
            .await;
        if let Err(err) = sent {
            link.pending().remove(&id);
            self.inner.on_link_lost(&link);
            return Err(AppError::Rcon(format!("failed to send command: {err}")));
        }

        match tokio::time::timeout(self.inner.config.command_timeout(), reply_rx).await {
            Ok(Ok(reply)) => {
                debug!(id, bytes = reply.body.len(), "rcon reply received");
                Ok(reply.body)
            }
            Ok(Err(_)) => Err(AppError::Rcon(
                "connection closed before the reply arrived".into(),
            )),
            Err(_) => {
                link.pending().remove(&id);
                Err(AppError::Rcon(format!(
                    "no reply within {:?}",
                    self.inner.config.command_timeout()
                )))
            }
        }
    }

    /// Current ticks per second, if the server reports it.
    pub async fn tick_rate(&self) -> Option<f64> {
        match self.send_command("tps").await {
            Ok(reply) => telemetry::parse_tick_rate(&reply),
            Err(err) => {
                debug!(%err, "tick rate unavailable");
                None
            }
        }
    }

    /// Names of online players; empty when unavailable.
    pub async fn player_list(&self) -> Vec<String> {
        match self.send_command("list").await {
            Ok(reply) => telemetry::parse_player_list(&reply),
            Err(err) => {
                debug!(%err, "player list unavailable");
                Vec::new()
            }
        }
    }

    async fn link(&self) -> Result<Arc<Link>> {
        let attempt = {
            let mut state = self.inner.lock_state();
            if state.status == ConnectionState::Connected {
                if let Some(link) = &state.link {
                    return Ok(Arc::clone(link));
                }
            }
            match &state.attempt {
                Some(attempt) => attempt.clone(),
                None => {
                    state.status = ConnectionState::Connecting;
                    state.generation += 1;
                    let generation = state.generation;
                    let task = tokio::spawn(ClientInner::establish(
                        Arc::clone(&self.inner),
                        generation,
                    ));
                    let attempt: Attempt = async move {
                        task.await
                            .map_err(|err| format!("handshake task failed: {err}"))?
                    }
                    .boxed()
                    .shared();
                    state.attempt = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await.map_err(AppError::Rcon)?;

        let state = self.inner.lock_state();
        match (&state.status, &state.link) {
            (ConnectionState::Connected, Some(link)) => Ok(Arc::clone(link)),
            _ => Err(AppError::Rcon("connection lost right after login".into())),
        }
    }
}

impl ClientInner {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_request_id(&self) -> i32 {
        // Keep ids positive: -1 is the login-failure marker.
        (self.next_id.fetch_add(1, Ordering::Relaxed) & i32::MAX).max(1)
    }

    /// Run one handshake and publish its outcome into the shared state.
    async fn establish(self: Arc<Self>, generation: u64) -> std::result::Result<(), String> {
        let timeout = self.config.connect_timeout();
        let outcome = match tokio::time::timeout(timeout, self.open()).await {
            Ok(result) => result,
            Err(_) => Err(format!("handshake timed out after {timeout:?}")),
        };

        match outcome {
            Ok(transport) => {
                let (writer, reader) = transport.split();
                let link = Arc::new(Link {
                    generation,
                    writer: tokio::sync::Mutex::new(writer),
                    pending: Mutex::new(HashMap::new()),
                    closed: CancellationToken::new(),
                });
                {
                    let mut state = self.lock_state();
                    state.status = ConnectionState::Connected;
                    state.link = Some(Arc::clone(&link));
                    state.attempt = None;
                    state.backoff.reset();
                }
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    generation,
                    "rcon connected"
                );
                tokio::spawn(Arc::clone(&self).read_replies(link, reader));
                Ok(())
            }
            Err(reason) => {
                {
                    let mut state = self.lock_state();
                    state.status = ConnectionState::Disconnected;
                    state.link = None;
                    state.attempt = None;
                }
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    %reason,
                    "rcon handshake failed"
                );
                self.schedule_reconnect();
                Err(reason)
            }
        }
    }

    /// TCP connect plus login.
    async fn open(&self) -> std::result::Result<Transport, String> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|err| format!("tcp connect failed: {err}"))?;
        stream.set_nodelay(true).ok();

        let mut transport = Framed::new(stream, RconCodec);
        let login_id = self.next_request_id();
        transport
            .send(Packet::auth(login_id, &self.config.password))
            .await
            .map_err(|err| format!("failed to send login: {err}"))?;

        loop {
            let reply = transport
                .next()
                .await
                .ok_or_else(|| "connection closed during login".to_owned())?
                .map_err(|err| format!("login reply unreadable: {err}"))?;

            if reply.id == AUTH_FAILED_ID {
                return Err("authentication rejected: wrong RCON password".into());
            }
            // Some servers send an empty value packet ahead of the auth reply.
            if reply.kind == TYPE_AUTH_RESPONSE && reply.id == login_id {
                return Ok(transport);
            }
        }
    }

    /// Route replies to waiting callers until the link closes.
    async fn read_replies(self: Arc<Self>, link: Arc<Link>, mut reader: Reader) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = link.closed.cancelled() => break,
                frame = reader.next() => match frame {
                    Some(Ok(packet)) => {
                        let waiter = link.pending().remove(&packet.id);
                        match waiter {
                            Some(reply_tx) => {
                                let _ = reply_tx.send(packet);
                            }
                            None => debug!(id = packet.id, "unsolicited rcon packet dropped"),
                        }
                    }
                    Some(Err(err)) => {
                        warn!(%err, "rcon read failed");
                        break;
                    }
                    None => {
                        info!("rcon connection closed by server");
                        break;
                    }
                },
            }
        }

        self.on_link_lost(&link);
    }

    /// Tear down `link` if it is still current, then schedule a reconnect.
    fn on_link_lost(self: &Arc<Self>, link: &Arc<Link>) {
        link.closed.cancel();
        // Dropping the senders wakes every waiter with a closed-channel error.
        link.pending().clear();

        let was_current = {
            let mut state = self.lock_state();
            let current = state
                .link
                .as_ref()
                .is_some_and(|live| live.generation == link.generation);
            if current {
                state.status = ConnectionState::Disconnected;
                state.link = None;
            }
            current
        };

        if was_current {
            info!(generation = link.generation, "rcon link lost");
            self.schedule_reconnect();
        }
    }

    /// Arm the single reconnect timer if none is pending.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let (delay, following) = {
            let mut state = self.lock_state();
            if state.reconnect_pending || state.status != ConnectionState::Disconnected {
                return;
            }
            state.reconnect_pending = true;
            let delay = state.backoff.next_delay();
            (delay, state.backoff.peek())
        };

        debug!(
            delay_ms = delay.as_millis(),
            next_delay_ms = following.as_millis(),
            "rcon reconnect scheduled"
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = inner.shutdown.cancelled() => {
                    inner.lock_state().reconnect_pending = false;
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            inner.lock_state().reconnect_pending = false;
            let client = RconClient { inner };
            if let Err(err) = client.connect().await {
                debug!(%err, "rcon reconnect attempt failed");
            }
        });
    }
}
