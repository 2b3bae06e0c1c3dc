use std::{future::Future, net::SocketAddr, pin::Pin, sync::Arc};

use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::{config::ListenerConfig, errors::GemwikiError, server::conn::handler::ConnectionHandler};

pub(crate) mod tcp;

pub use tcp::TcpListener;

pub type ListenerResult<'a, T> = Pin<Box<dyn Future<Output = Result<T, GemwikiError>> + Send + 'a>>;

pub trait Listener {
    fn new(config: ListenerConfig) -> Self
    where
        Self: Sized;

    /// Sets what accepted connections are handed to.
    ///
    /// This must be called before `listen`.
    fn set_handler(&mut self, handler: Arc<ConnectionHandler>, acceptor: TlsAcceptor);

    /// Token cancelled when the accept loop dies on its own.
    fn set_failure_signal(&mut self, signal: CancellationToken);

    /// Binds the socket and starts accepting in the background.
    fn listen(&mut self) -> ListenerResult<'_, ()>;

    /// Stops accepting and drains in-flight connections.
    ///
    /// Reports the error that ended the accept loop, if any.
    fn stop(&mut self) -> ListenerResult<'_, ()>;

    /// Bound address, once listening.
    fn local_addr(&self) -> Option<SocketAddr>;
}
