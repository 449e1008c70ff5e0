//! The TCP front end.
//!
//! [`Server::start`] binds the configured address and serves until SIGTERM or
//! Ctrl-C. On shutdown it stops accepting, answers requests already in flight,
//! closes idle keep-alive connections, then runs handler cleanup.

use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use brisk_http::codec::{DEFAULT_MAX_BODY_BYTES, RequestDecoder};
use brisk_http::connection::HttpConnection;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::{ConfigError, ServerConfig};
use crate::handler::{BoxError, RequestHandler};
use crate::middleware::{CorsMiddleware, Middleware, MiddlewareChain, MiddlewareChainBuilder};
use crate::pipeline::Pipeline;
use crate::router::Router;
use crate::session::{MemorySessionStorage, SessionManager};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(crate::session::DEFAULT_SWEEP_INTERVAL_SECS);

pub struct ServerBuilder {
    router: Option<Router>,
    default_handler: Option<Box<dyn RequestHandler>>,
    address: Option<String>,
    middlewares: MiddlewareChainBuilder,
    sessions: Option<Arc<SessionManager>>,
    sweep_interval: Option<Duration>,
    max_body_bytes: u64,
    log_level: Option<Level>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            router: None,
            default_handler: None,
            address: None,
            middlewares: MiddlewareChain::builder(),
            sessions: None,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log_level: None,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn default_handler(mut self, request_handler: impl RequestHandler + 'static) -> Self {
        self.default_handler = Some(Box::new(request_handler));
        self
    }

    /// Appends a middleware; the first one added sees requests first.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares = self.middlewares.add_last(middleware);
        self
    }

    pub fn session_manager(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// How often expired sessions are swept while serving; one minute by
    /// default. A zero interval turns the sweeper off.
    pub fn session_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval).filter(|interval| !interval.is_zero());
        self
    }

    pub fn max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Installs a global `tracing` subscriber at `level` when the server starts.
    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Applies a [`ServerConfig`].
    ///
    /// CORS, when configured, is placed in front of every other middleware.
    /// A session section installs an in-memory [`SessionManager`].
    pub fn config(mut self, config: ServerConfig) -> Result<Self, ConfigError> {
        if let Some(level) = config.log_level()? {
            self.log_level = Some(level);
        }
        self.address = Some(config.address);
        self.max_body_bytes = config.max_body_bytes;

        if let Some(cors) = config.cors {
            self.middlewares = self.middlewares.add_first(CorsMiddleware::new(cors));
        }
        if let Some(session) = config.session {
            self.sweep_interval = session.sweep_interval();
            self.sessions = Some(SessionManager::new(MemorySessionStorage::new(), session));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?;
        let address = address
            .to_socket_addrs()
            .map_err(|source| ServerBuildError::InvalidAddress { address: address.clone(), source })?
            .collect::<Vec<_>>();

        let mut pipeline = Pipeline::new(router).with_middlewares(self.middlewares.build());
        if let Some(sessions) = self.sessions {
            pipeline = pipeline.with_sessions(sessions);
        }
        if let Some(default_handler) = self.default_handler {
            pipeline = pipeline.with_boxed_default_handler(default_handler);
        }

        Ok(Server {
            pipeline: Arc::new(pipeline),
            address,
            sweep_interval: self.sweep_interval,
            max_body_bytes: self.max_body_bytes,
            log_level: self.log_level,
        })
    }
}

#[derive(Debug)]
pub struct Server {
    pipeline: Arc<Pipeline>,
    address: Vec<SocketAddr>,
    sweep_interval: Option<Duration>,
    max_body_bytes: u64,
    log_level: Option<Level>,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("address must be set")]
    MissingAddress,
    #[error("can't resolve address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("can't bind {address:?}: {source}")]
    Bind {
        address: Vec<SocketAddr>,
        #[source]
        source: std::io::Error,
    },
    #[error("handler init failed: {source}")]
    HandlerInit {
        #[source]
        source: BoxError,
    },
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn address(&self) -> &[SocketAddr] {
        &self.address
    }

    /// Binds the configured address and serves until SIGTERM or Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        self.init_logging();

        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(ServerError::Bind { address: self.address, source: e });
            }
        };

        self.serve(tcp_listener, shutdown_signal()).await
    }

    /// Serves connections from `tcp_listener` until `shutdown` resolves.
    pub async fn serve<S>(self, tcp_listener: TcpListener, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        self.pipeline.init().await.map_err(|source| ServerError::HandlerInit { source })?;

        let sweeper = match (self.pipeline.sessions(), self.sweep_interval) {
            (Some(sessions), Some(interval)) => Some(sessions.spawn_sweeper(interval)),
            _ => None,
        };

        match tcp_listener.local_addr() {
            Ok(local_addr) => info!(%local_addr, "start listening"),
            Err(_) => info!(address = ?self.address, "start listening"),
        }

        let mut connections = JoinSet::new();
        let (stop_connections, stopping) = watch::channel(false);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = tcp_listener.accept() => {
                    let (tcp_stream, remote_addr) = match accepted {
                        Ok(stream_and_addr) => stream_and_addr,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&self.pipeline);
                    let max_body_bytes = self.max_body_bytes;
                    let mut stopping = stopping.clone();

                    connections.spawn(async move {
                        let (reader, writer) = tcp_stream.into_split();
                        let decoder = RequestDecoder::with_max_body_bytes(max_body_bytes);
                        let connection = HttpConnection::with_decoder(reader, writer, decoder);
                        let stopped = async move {
                            let _ = stopping.wait_for(|stop| *stop).await;
                        };
                        match connection.process_until(pipeline, stopped).await {
                            Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                            Err(e) => warn!(%remote_addr, cause = %e, "connection shutdown with error"),
                        }
                    });
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // idle connections stop waiting for their next request
        let _ = stop_connections.send(true);
        while connections.join_next().await.is_some() {}

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        self.pipeline.cleanup().await;

        info!("server stopped");
        Ok(())
    }

    fn init_logging(&self) {
        let Some(level) = self.log_level else {
            return;
        };

        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            warn!(cause = %e, "global tracing subscriber already set");
        }
    }
}

/// Resolves on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(cause = %e, "can't listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(cause = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
