//! Inbound webhook listener.
//!
//! The bridge POSTs a JSON body to every registered webhook URL whenever the
//! lock changes state or reports telemetry. [`WebhookListener`] serves that
//! endpoint, classifies each payload as a [`BridgeEvent`] and broadcasts it
//! to every subscriber.
//!
//! # Architecture
//!
//! ```text
//! Bridge ──POST /──> axum router ──> BridgeEvent::from_slice ──> broadcast ──┬─> subscriber 1
//!                        │                                                   └─> subscriber N
//!                        └──(optional) TIMESTAMP/HASH check over raw body
//! ```
//!
//! # Lifecycle
//!
//! The listener is an owned handle. Nothing is bound until `start()`;
//! `stop()` signals graceful shutdown and waits for the server task, so the
//! port is free again when it returns. A listener can be restarted after
//! being stopped, and subscribers survive restarts.
//!
//! # Responses
//!
//! | Request | Response |
//! |---------|----------|
//! | `GET /` | `200` health text |
//! | `POST /` with JSON body | `200`, event broadcast |
//! | `POST /` with malformed JSON | `400`, nothing broadcast |
//! | `POST /` failing header verification | `401`, nothing broadcast |

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
};
use latchkey_core::{
    Clock, SigningKey, SystemClock,
    constants::{DEFAULT_LISTEN_PORT, DEFAULT_WEBHOOK_TOLERANCE_SECS, HEADER_HASH, HEADER_TIMESTAMP},
};
use latchkey_protocol::{BridgeEvent, WebhookAuthHeader, WebhookAuthenticator};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace, warn};

const HEALTH_TEXT: &str = "latchkey webhook listener";

/// Configuration for [`WebhookListener`]
///
/// # Example
///
/// ```
/// use latchkey_network::WebhookListenerConfig;
///
/// let config = WebhookListenerConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     ..Default::default()
/// };
/// assert_eq!(config.tolerance, 300);
/// ```
#[derive(Debug, Clone)]
pub struct WebhookListenerConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    /// Events buffered per subscriber before the slowest one lags
    pub channel_capacity: usize,

    /// Key for checking `TIMESTAMP` / `HASH` on inbound requests.
    /// `None` accepts every request.
    pub verify_key: Option<SigningKey>,

    /// Allowed clock skew for verified requests, in seconds
    pub tolerance: u32,
}

impl Default for WebhookListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            channel_capacity: 64,
            verify_key: None,
            tolerance: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }
}

/// Errors that can occur while running the listener
#[derive(Debug, Error)]
pub enum ListenerError {
    /// `start()` called while already serving
    #[error("Listener already running on {0}")]
    AlreadyRunning(SocketAddr),

    /// Port could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Server I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server task panicked or was cancelled
    #[error("Server task failed: {0}")]
    Task(String),
}

/// Header check applied to inbound requests.
struct Verifier<C> {
    key: SigningKey,
    auth: WebhookAuthenticator<C>,
    tolerance: u32,
}

impl<C: Clock> Verifier<C> {
    fn check(&self, headers: &HeaderMap, body: &[u8]) -> latchkey_core::Result<()> {
        let timestamp = header_value(headers, HEADER_TIMESTAMP)?;
        let hash = header_value(headers, HEADER_HASH)?;
        let header = WebhookAuthHeader::from_parts(timestamp, hash)?;
        self.auth.verify(&self.key, body, &header, self.tolerance)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> latchkey_core::Result<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| latchkey_core::Error::InvalidHeader {
            message: format!("Missing {name} header"),
        })
}

/// State shared by the request handlers.
struct ListenerState<C> {
    events: broadcast::Sender<BridgeEvent>,
    verifier: Option<Verifier<C>>,
}

/// A bound, serving listener.
struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// HTTP endpoint receiving bridge webhooks
///
/// # Example
///
/// ```no_run
/// use latchkey_network::{WebhookListener, WebhookListenerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut listener = WebhookListener::new(WebhookListenerConfig::default());
/// let mut events = listener.subscribe();
///
/// let addr = listener.start().await?;
/// println!("Listening on {}", addr);
///
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
///
/// listener.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct WebhookListener<C = SystemClock> {
    bind_addr: SocketAddr,
    state: Arc<ListenerState<C>>,
    running: Option<Running>,
}

impl WebhookListener<SystemClock> {
    /// Create a stopped listener that checks timestamps against the system
    /// clock.
    pub fn new(config: WebhookListenerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + 'static> WebhookListener<C> {
    /// Create a stopped listener with an injected clock.
    pub fn with_clock(config: WebhookListenerConfig, clock: C) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        let verifier = config.verify_key.map(|key| Verifier {
            key,
            auth: WebhookAuthenticator::with_clock(clock),
            tolerance: config.tolerance,
        });

        debug!(
            bind_addr = %config.bind_addr,
            verify = verifier.is_some(),
            "Creating webhook listener"
        );

        Self {
            bind_addr: config.bind_addr,
            state: Arc::new(ListenerState { events, verifier }),
            running: None,
        }
    }

    /// Receive every event broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.state.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }

    /// Bind the configured address and start serving.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// binding port 0.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The listener is already running
    /// - The address cannot be bound
    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            warn!("Listener already running on {}", running.addr);
            return Err(ListenerError::AlreadyRunning(running.addr));
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: self.bind_addr,
                source,
            })?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/", get(health).post(receive::<C>))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("Webhook listener started on {}", addr);

        self.running = Some(Running { addr, shutdown, task });
        Ok(addr)
    }

    /// Stop serving and release the port.
    ///
    /// Idempotent: calling it on a listener that was never started, or
    /// twice, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task failed while running.
    pub async fn stop(&mut self) -> Result<(), ListenerError> {
        let Some(running) = self.running.take() else {
            trace!("Stop requested on idle listener");
            return Ok(());
        };

        info!("Stopping webhook listener on {}", running.addr);
        let _ = running.shutdown.send(());

        match running.task.await {
            Ok(Ok(())) => {
                debug!("Webhook listener stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Webhook listener exited with error: {}", e);
                Err(ListenerError::Io(e))
            }
            Err(e) => Err(ListenerError::Task(e.to_string())),
        }
    }
}

impl<C> Drop for WebhookListener<C> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            debug!("WebhookListener dropped while running - shutting down {}", running.addr);
            let _ = running.shutdown.send(());
        }
    }
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn receive<C: Clock + 'static>(
    State(state): State<Arc<ListenerState<C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(verifier) = &state.verifier
        && let Err(e) = verifier.check(&headers, &body)
    {
        warn!(error = %e, "Rejected unauthenticated webhook");
        return StatusCode::UNAUTHORIZED;
    }

    let event = match BridgeEvent::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Malformed webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(kind = event.kind(), event_type = ?event.event_type(), "Received bridge event");

    if state.events.send(event).is_err() {
        trace!("No subscribers for bridge event");
    }

    StatusCode::OK
}
