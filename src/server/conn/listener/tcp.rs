use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, warn};
use tokio::{
    sync::Semaphore,
    task::JoinHandle,
    time::{sleep, timeout_at, Instant},
};
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::{Concurrency, ListenerConfig},
    errors::GemwikiError,
    server::conn::{
        handler::ConnectionHandler,
        listener::{Listener, ListenerResult},
    },
};

type GemwikiTcpListener = tokio::net::TcpListener;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct TcpListener {
    config: ListenerConfig,
    handler: Option<(Arc<ConnectionHandler>, TlsAcceptor)>,
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<Result<(), GemwikiError>>>,
    accepting: CancellationToken,
    closing: CancellationToken,
    failed: CancellationToken,
    connections: TaskTracker,
}

impl Listener for TcpListener {
    fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            handler: None,
            local_addr: None,
            task: None,
            accepting: CancellationToken::new(),
            closing: CancellationToken::new(),
            failed: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    fn set_handler(&mut self, handler: Arc<ConnectionHandler>, acceptor: TlsAcceptor) {
        self.handler = Some((handler, acceptor));
    }

    fn set_failure_signal(&mut self, signal: CancellationToken) {
        self.failed = signal;
    }

    fn listen(&mut self) -> ListenerResult<'_, ()> {
        let future = async move {
            let (handler, acceptor) = self
                .handler
                .clone()
                .ok_or_else(|| GemwikiError::Bind("listener has no handler".to_string()))?;

            let ip = self
                .config
                .interface()
                .parse::<IpAddr>()
                .map_err(|e| GemwikiError::Bind(e.to_string()))?;
            let addr = SocketAddr::from((ip, self.config.port()));

            let listener = GemwikiTcpListener::bind(addr)
                .await
                .map_err(|e| GemwikiError::Bind(format!("{}: {}", addr, e)))?;
            let local_addr = listener
                .local_addr()
                .map_err(|e| GemwikiError::Bind(e.to_string()))?;
            self.local_addr = Some(local_addr);

            let task = self.handle_connections(listener, handler, acceptor);
            self.task = Some(task);

            Ok(())
        };

        Box::pin(future)
    }

    fn stop(&mut self) -> ListenerResult<'_, ()> {
        let future = async move {
            self.accepting
                .cancel();
            let grace = match &self.handler {
                Some((handler, _)) => handler
                    .config()
                    .shutdown_grace(),
                None => Duration::ZERO,
            };
            // One grace period covers inline and spawned connections alike.
            let deadline = Instant::now() + grace;

            let mut failure = None;
            if let Some(task) = self
                .task
                .take()
            {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => failure = Some(e),
                    Err(e) => {
                        error!("Accept loop ended abnormally: {}", e);
                        failure = Some(GemwikiError::Stop(e.to_string()));
                    }
                }
            }

            self.connections
                .close();
            if timeout_at(
                deadline,
                self.connections
                    .wait(),
            )
            .await
            .is_err()
            {
                warn!(
                    "Closing {} connections still open after {}s",
                    self.connections
                        .len(),
                    grace.as_secs()
                );
                self.closing
                    .cancel();
                self.connections
                    .wait()
                    .await;
            }

            failure.map_or(Ok(()), Err)
        };

        Box::pin(future)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Errors that concern only the connection being accepted. Anything else
/// means the socket itself is unusable.
pub(crate) fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

impl TcpListener {
    fn handle_connections(
        &self,
        listener: GemwikiTcpListener,
        handler: Arc<ConnectionHandler>,
        acceptor: TlsAcceptor,
    ) -> JoinHandle<Result<(), GemwikiError>> {
        let concurrency = handler
            .config()
            .concurrency();
        let grace = handler
            .config()
            .shutdown_grace();
        let slots = Arc::new(Semaphore::new(
            handler
                .config()
                .max_connections(),
        ));
        let accepting = self
            .accepting
            .clone();
        let closing = self
            .closing
            .clone();
        let failed = self
            .failed
            .clone();
        let connections = self
            .connections
            .clone();

        let future = async move {
            loop {
                let result = tokio::select! {
                    _ = accepting.cancelled() => break,
                    result = listener.accept() => result,
                };

                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) if is_transient_accept_error(&e) => {
                        debug!("Connection dropped before accept: {}", e);
                        sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                    Err(e) => {
                        error!("Cannot accept connection: {}", e);
                        failed.cancel();
                        return Err(GemwikiError::Accept(e.to_string()));
                    }
                };

                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Cannot set TCP_NODELAY for {}: {}", peer, e);
                }

                let permit = match concurrency {
                    Concurrency::PerConnection => slots
                        .clone()
                        .try_acquire_owned()
                        .ok(),
                    Concurrency::Serial => None,
                };

                match permit {
                    Some(permit) => {
                        let handler = handler.clone();
                        let acceptor = acceptor.clone();
                        let closing = closing.clone();
                        connections.spawn(async move {
                            tokio::select! {
                                _ = handler.handle(&acceptor, stream, peer) => {}
                                _ = closing.cancelled() => {
                                    debug!("Connection with {} closed by shutdown", peer);
                                }
                            }
                            drop(permit);
                        });
                    }
                    None => {
                        if concurrency == Concurrency::PerConnection {
                            debug!("No free connection slot, serving {} inline", peer);
                        }
                        tokio::select! {
                            _ = handler.handle(&acceptor, stream, peer) => {}
                            _ = closing.cancelled() => {
                                debug!("Connection with {} closed by shutdown", peer);
                            }
                            _ = async {
                                accepting.cancelled().await;
                                sleep(grace).await;
                            } => {
                                warn!("Closing connection with {} still open after {}s", peer, grace.as_secs());
                            }
                        }
                    }
                }
            }

            info!(
                "Stopped accepting on {}",
                listener
                    .local_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_default()
            );
            Ok(())
        };

        tokio::spawn(future)
    }
}
