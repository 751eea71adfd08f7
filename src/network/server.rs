//! WebSocket Gateway
//!
//! Async WebSocket front end for the contract. Each connection
//! authenticates once and then pushes transactions signed by its account.
//! All connections and the operator keeper share one executor behind a
//! mutex, so transactions are applied strictly one at a time.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::account::Account;
use crate::core::time::Clock;
use crate::host::action::Transaction;
use crate::host::executor::Executor;
use crate::host::ledger::Ledger;
use crate::network::auth::{authenticate, AuthConfig, AuthError};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, PushRequest, RoundInfo, ServerError,
    ServerMessage, TimeWindow,
};
use crate::round::error::{Missing, RoundError};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Version string reported to clients.
    pub version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("RAMBLER_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("RAMBLER_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            version: defaults.version,
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Account after auth.
    account: Option<Account>,
    /// Connection time.
    connected_at: Instant,
}

/// State shared by every connection task.
pub struct GatewayState<L, C> {
    executor: Arc<Mutex<Executor<L, C>>>,
    auth: AuthConfig,
    version: String,
    clients: RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
}

impl<L, C> GatewayState<L, C>
where
    L: Ledger + Clone + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Create shared state.
    pub fn new(executor: Arc<Mutex<Executor<L, C>>>, auth: AuthConfig, version: impl Into<String>) -> Self {
        Self {
            executor,
            auth,
            version: version.into(),
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    async fn register(&self, addr: SocketAddr) {
        self.clients.write().await.insert(
            addr,
            ConnectedClient {
                account: None,
                connected_at: Instant::now(),
            },
        );
    }

    async fn unregister(&self, addr: SocketAddr) {
        if let Some(client) = self.clients.write().await.remove(&addr) {
            debug!(
                "Client {} ({:?}) left after {:?}",
                addr,
                client.account,
                client.connected_at.elapsed()
            );
        }
    }

    async fn account_of(&self, addr: SocketAddr) -> Option<Account> {
        self.clients.read().await.get(&addr).and_then(|c| c.account.clone())
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Answer one client message.
    pub async fn respond(&self, addr: SocketAddr, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::Auth(req) => self.handle_auth(addr, req).await,
            ClientMessage::Push(req) => self.handle_push(addr, req).await,
            ClientMessage::SeedTime { round } => {
                let exec = self.executor.lock().await;
                time_reply(round, TimeWindow::Seed, exec.seed_time_remaining(round))
            }
            ClientMessage::RedeemTime { round } => {
                let exec = self.executor.lock().await;
                time_reply(round, TimeWindow::Redeem, exec.redeem_time_remaining(round))
            }
            ClientMessage::GetRound { round } => self.handle_get_round(addr, round).await,
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0),
            },
        }
    }

    async fn handle_auth(&self, addr: SocketAddr, req: AuthRequest) -> ServerMessage {
        match authenticate(&req.token, &self.auth) {
            Ok(account) => {
                if let Some(client) = self.clients.write().await.get_mut(&addr) {
                    client.account = Some(account.clone());
                }
                info!("Client {} authenticated as {}", addr, account);
                ServerMessage::AuthResult(AuthResult {
                    success: true,
                    account: Some(account),
                    error: None,
                    server_version: self.version.clone(),
                })
            }
            Err(e) => {
                debug!("Auth failed for {}: {}", addr, e);
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    AuthError::NotConfigured => ErrorCode::AuthFailed,
                    _ => ErrorCode::InvalidToken,
                };
                ServerMessage::Error(ServerError::new(code, e.to_string()))
            }
        }
    }

    async fn handle_push(&self, addr: SocketAddr, req: PushRequest) -> ServerMessage {
        let account = match self.account_of(addr).await {
            Some(a) => a,
            None => {
                return ServerMessage::Error(ServerError::new(
                    ErrorCode::NotAuthenticated,
                    "authenticate before pushing transactions",
                ))
            }
        };
        if req.actions.is_empty() {
            return ServerMessage::Error(ServerError::new(ErrorCode::InvalidInput, "empty transaction"));
        }

        let tx = Transaction {
            actions: req.actions,
            authorization: vec![account],
        };
        let result = self.executor.lock().await.push_transaction(&tx);
        match result {
            Ok(receipt) => ServerMessage::Receipt {
                request_id: req.request_id,
                receipt,
            },
            Err(e) => rejected(e),
        }
    }

    async fn handle_get_round(&self, addr: SocketAddr, round: u16) -> ServerMessage {
        let account = self.account_of(addr).await;
        let exec = self.executor.lock().await;
        let contract = exec.contract();

        match contract.round(round) {
            Some(r) => ServerMessage::Round(RoundInfo {
                round: r.clone(),
                phase: r.phase(exec.now()),
                current: contract.current_round() == Some(round),
                participant: account.and_then(|a| contract.participant(round, &a).cloned()),
            }),
            None => rejected(RoundError::NotFound(Missing::Round(round))),
        }
    }
}

fn time_reply(round: u16, window: TimeWindow, result: Result<u32, RoundError>) -> ServerMessage {
    match result {
        Ok(seconds) => ServerMessage::TimeRemaining {
            round,
            window,
            seconds,
        },
        Err(e) => rejected(e),
    }
}

fn rejected(err: RoundError) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code: ErrorCode::Rejected,
        kind: Some(err.kind()),
        message: err.to_string(),
    })
}

/// The gateway server.
pub struct Gateway<L, C> {
    config: GatewayConfig,
    state: Arc<GatewayState<L, C>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<L, C> Gateway<L, C>
where
    L: Ledger + Clone + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Create a gateway over a shared executor.
    pub fn new(config: GatewayConfig, auth: AuthConfig, executor: Arc<Mutex<Executor<L, C>>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(GatewayState::new(executor, auth, config.version.clone()));
        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Accept connections until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Gateway listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.state.connection_count().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let state = self.state.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            state.register(addr).await;

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(m) => state.respond(addr, m).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                    ErrorCode::InvalidInput,
                                    "binary frames are not supported",
                                ))).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Gateway shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies flush before the socket drops
            drop(msg_tx);
            let _ = sender_task.await;
            state.unregister(addr).await;
            info!("Client {} cleaned up", addr);
        });
    }

    /// Signal the gateway and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Active connection count.
    pub async fn connection_count(&self) -> usize {
        self.state.connection_count().await
    }
}
