//! WebSocket Acceptor (spec.md §4.7)
//!
//! Grounded on the teacher's `interfaces/ws/ocpp_server.rs`: one TCP listener,
//! one task per accepted connection, a `Sec-WebSocket-Protocol` negotiation
//! closure, and a split send/receive loop. What differs from the teacher:
//! strict path validation (`/ws/{station_id}`, close 1002 on anything else)
//! instead of a `CP_{port}` fallback, and subprotocol selection always picks
//! `ocpp1.6` even when the client offers none or something else (spec.md
//! §4.7 "pragmatic compatibility") rather than only accepting an explicit
//! match.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request as HandshakeRequest, Response as HandshakeResponse};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

use crate::observer::{ConnectionEvent, DomainEvent, ObserverBus};
use crate::pipeline::{AutoRemoteStartConfig, OutboundDispatch, PipelineCatalog, PipelineContext};
use crate::session::connection::OutboundFrame;
use crate::session::registry::RegisterResult;
use crate::session::{Connection, OutboundQueue, Registry, Session, SessionHandle};
use crate::store::Store;
use crate::support::shutdown::ShutdownSignal;

const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    pub listen_addr: String,
    pub heartbeat_interval_secs: u64,
    pub outbound_delay: Duration,
    pub outbound_reply_timeout: Duration,
    pub auto_remote_start: Option<AutoRemoteStartConfig>,
}

/// Owns the listener and the shared infrastructure every accepted session
/// needs: the registry, the store, the observer bus, and the closed
/// pipeline catalog (spec.md §9 "Global mutable state").
pub struct Acceptor {
    config: AcceptorConfig,
    registry: Arc<Registry>,
    store: Arc<dyn Store>,
    observer: ObserverBus,
    catalog: Arc<PipelineCatalog>,
    shutdown: ShutdownSignal,
}

impl Acceptor {
    pub fn new(
        config: AcceptorConfig,
        registry: Arc<Registry>,
        store: Arc<dyn Store>,
        observer: ObserverBus,
        catalog: Arc<PipelineCatalog>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            observer,
            catalog,
            shutdown,
        }
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "OCPP acceptor listening");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified().wait() => {
                    info!("acceptor shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.clone().spawn_connection(stream, addr),
                        Err(err) => error!(error = %err, "failed to accept connection"),
                    }
                }
            }
        }
    }

    fn spawn_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            if let Err(err) = self.handle_connection(stream, addr).await {
                warn!(%addr, error = %err, "connection ended with error");
            }
        });
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let path = Arc::new(Mutex::new(String::new()));
        let path_capture = path.clone();

        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            move |req: &HandshakeRequest, mut response: HandshakeResponse| {
                *path_capture.lock().unwrap() = req.uri().path().to_string();

                let requested = req
                    .headers()
                    .get("Sec-WebSocket-Protocol")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if !requested.is_empty() && !requested.split(',').map(|s| s.trim()).any(|p| p == OCPP_SUBPROTOCOL) {
                    warn!(requested, "client did not offer ocpp1.6, selecting it anyway");
                }
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", OCPP_SUBPROTOCOL.parse().unwrap());
                Ok(response)
            },
        )
        .await?;

        let path = path.lock().unwrap().clone();
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let Some(charge_point_id) = extract_station_id(&path) else {
            warn!(%path, %addr, "rejecting connection with malformed path");
            let _ = ws_sender
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CloseCode::Protocol,
                    reason: "protocol error".into(),
                })))
                .await;
            return Ok(());
        };

        info!(%charge_point_id, %addr, "station connected");
        let remote_addr = Some(addr.to_string());
        let connected_at = Utc::now();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let connection = Connection::new(charge_point_id.clone(), remote_addr.clone(), outbound_tx, connected_at);

        let outbound = OutboundQueue::spawn(
            charge_point_id.clone(),
            connection.clone(),
            self.store.clone(),
            self.observer.clone(),
            self.config.outbound_delay,
            self.config.outbound_reply_timeout,
            self.shutdown.clone(),
        );
        let watchdog = crate::session::watchdog::spawn(
            charge_point_id.clone(),
            connection.clone(),
            Duration::from_secs(self.config.heartbeat_interval_secs),
            self.shutdown.clone(),
        );

        let handle = Arc::new(SessionHandle {
            charge_point_id: charge_point_id.clone(),
            connection,
            outbound: outbound.clone(),
            watchdog,
        });

        if let RegisterResult::Evicted(evicted) = self.registry.register(handle.clone()) {
            info!(charge_point_id = evicted.charge_point_id(), "closing superseded session");
            evicted.handle.connection.close(1000, "replaced");
        }

        self.store.update_connection(&charge_point_id, true, connected_at).await.ok();
        self.observer.publish(DomainEvent::Connection {
            charge_point_id: charge_point_id.clone(),
            event: ConnectionEvent::Connect,
            remote_addr: remote_addr.clone(),
            at: connected_at,
        });

        let dispatch: Arc<dyn OutboundDispatch> = self.registry.clone();
        let ctx = PipelineContext {
            store: self.store.clone(),
            observer: self.observer.clone(),
            heartbeat_interval_secs: self.config.heartbeat_interval_secs,
            dispatch,
            auto_remote_start: self.config.auto_remote_start.clone(),
        };
        let session = Session {
            charge_point_id: charge_point_id.clone(),
            store: self.store.clone(),
            observer: self.observer.clone(),
            catalog: self.catalog.clone(),
            ctx,
            outbound,
            remote_addr: remote_addr.clone(),
        };

        let writer_charge_point_id = charge_point_id.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let outcome = match frame {
                    OutboundFrame::Text(text) => ws_sender.send(WsMessage::Text(text)).await,
                    OutboundFrame::Close { code, reason } => {
                        let result = ws_sender
                            .send(WsMessage::Close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            })))
                            .await;
                        let _ = ws_sender.close().await;
                        result
                    }
                };
                if let Err(err) = outcome {
                    warn!(charge_point_id = %writer_charge_point_id, error = %err, "write failed");
                    break;
                }
            }
        });

        let reader_charge_point_id = charge_point_id.clone();
        let reader_handle = handle.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        reader_handle.connection.touch();
                        reader_handle.watchdog.reset();
                        match session.handle_inbound(&text).await {
                            crate::session::InboundOutcome::Reply(reply) => {
                                if reader_handle.connection.send(reply).is_err() {
                                    break;
                                }
                            }
                            crate::session::InboundOutcome::None => {}
                            crate::session::InboundOutcome::CloseConnection { code, reason } => {
                                reader_handle.connection.close(code, reason);
                                break;
                            }
                        }
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                        reader_handle.connection.touch();
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(WsMessage::Binary(data)) => {
                        warn!(charge_point_id = %reader_charge_point_id, bytes = data.len(), "ignoring binary frame");
                    }
                    Ok(WsMessage::Frame(_)) => {}
                    Err(err) => {
                        warn!(charge_point_id = %reader_charge_point_id, error = %err, "read error");
                        break;
                    }
                }
            }
        });

        tokio::select! {
            _ = writer_task => {}
            _ = reader_task => {}
            _ = self.shutdown.notified().wait() => {
                info!(%charge_point_id, "closing connection for server shutdown");
                handle.connection.close(1001, "server shutdown");
            }
        }

        // If this session already lost a reconnect race, `unregister` is a
        // no-op and returns false — the winning session has already set
        // `is_connected = true` and published its own `Connect` event, and
        // this cleanup must not clobber that state (spec.md §4.3).
        let still_current = self.registry.unregister(&charge_point_id, &handle);
        if still_current {
            let disconnected_at = Utc::now();
            self.store.update_connection(&charge_point_id, false, disconnected_at).await.ok();
            self.observer.publish(DomainEvent::Connection {
                charge_point_id: charge_point_id.clone(),
                event: ConnectionEvent::Disconnect,
                remote_addr,
                at: disconnected_at,
            });
            if let Ok(active) = self.store.active_for_charge_point(&charge_point_id).await {
                if !active.is_empty() {
                    self.observer.publish(DomainEvent::DisconnectDuringActiveTransaction {
                        charge_point_id: charge_point_id.clone(),
                    });
                }
            }
        }

        info!(%charge_point_id, "station disconnected");
        Ok(())
    }
}

/// Path must be exactly `/ws/{station_id}` with a non-empty, single-segment id.
fn extract_station_id(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/ws/")?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest.to_string())
}
