use std::{net::SocketAddr, sync::Arc};

use log::{error, info};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Concurrency, ServerConfig},
    errors::{CertificateError, GemwikiError, StartError},
    server::{
        certificate::CertificateManager,
        conn::{
            handler::ConnectionHandler,
            listener::{Listener, TcpListener},
        },
        tls::TlsFactory,
        Server,
    },
    store::ContentStore,
};

pub struct GeminiServer {
    config: ServerConfig,
    store: Option<Arc<dyn ContentStore>>,
    listeners: Vec<TcpListener>,
    failed: CancellationToken,
}

impl Server for GeminiServer {
    fn new(config: ServerConfig) -> Self {
        Self { config, store: None, listeners: Vec::new(), failed: CancellationToken::new() }
    }

    fn set_store(&mut self, store: Arc<dyn ContentStore>) {
        self.store = Some(store);
    }

    async fn start(&mut self) -> Result<(), GemwikiError> {
        let store = self
            .store
            .clone()
            .ok_or(GemwikiError::Start(StartError::NoStore))?;

        let manager = CertificateManager::new(
            self.config
                .security()
                .clone(),
        );
        let pem_path = tokio::task::spawn_blocking(move || manager.obtain())
            .await
            .map_err(|e| CertificateError::KeyGeneration(e.to_string()))??;

        let tls_config = TlsFactory::create_tls_config(&pem_path)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let handler = Arc::new(ConnectionHandler::new(self.config.clone(), store));

        match self
            .config
            .concurrency()
        {
            Concurrency::PerConnection => info!(
                "Serving up to {} connections concurrently",
                self.config
                    .max_connections()
            ),
            Concurrency::Serial => info!("Serving one connection at a time"),
        }

        for listener_config in self
            .config
            .listeners()
        {
            let mut listener = TcpListener::new(listener_config.clone());
            listener.set_handler(handler.clone(), acceptor.clone());
            listener.set_failure_signal(
                self.failed
                    .clone(),
            );
            if let Err(e) = listener
                .listen()
                .await
            {
                error!("Cannot listen on {}:{}", listener_config.interface(), listener_config.port());
                self.stop()
                    .await?;
                return Err(e);
            }
            self.listeners
                .push(listener);
        }

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), GemwikiError> {
        let mut result = Ok(());
        for listener in self
            .listeners
            .iter_mut()
        {
            if let Err(e) = listener
                .stop()
                .await
            {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.listeners
            .clear();
        result
    }
}

impl GeminiServer {
    /// Addresses the listeners are bound to.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr())
            .collect()
    }

    /// Cancelled once any listener can no longer accept connections.
    pub fn failure_signal(&self) -> CancellationToken {
        self.failed
            .clone()
    }
}
