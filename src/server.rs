//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! A SIGTERM or Ctrl-C stops the accept loop at once. Connections that are
//! already open keep running until they finish, and only then does
//! [`Server::serve`] return.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::request::RequestFactory;
use crate::response::IntoResponse;
use crate::router::Router;

/// Listens on one socket address and feeds a [`Router`].
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Parses the listen address. Nothing is bound until
    /// [`serve`](Server::serve).
    ///
    /// ```rust,no_run
    /// use bulwark::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), bulwark::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self> {
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("bind address `{addr}`: {e}")))?;
        Ok(Self { addr })
    }

    /// Accepts connections and dispatches their requests through `router`
    /// until a shutdown signal arrives, then waits for open connections.
    pub async fn serve(self, router: Router) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);
        for problem in router.misconfigurations() {
            warn!("{problem}");
        }
        info!(addr = %self.addr, routes = router.repository().len(), "bulwark listening");

        let mut connections = JoinSet::new();
        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // a pending signal wins over a full accept backlog
                biased;

                () = &mut signal => {
                    info!(open = connections.len(), "shutting down, draining connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(Arc::clone(&router), stream, peer));
                    }
                    Err(e) => error!("accept failed: {e}"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
        info!("bulwark stopped");
        Ok(())
    }
}

/// Drives one connection with whichever HTTP version the client negotiates.
async fn serve_connection(router: Arc<Router>, stream: TcpStream, peer: SocketAddr) {
    let service = service_fn(move |req| dispatch(Arc::clone(&router), req, peer));
    let conn = ConnBuilder::new(TokioExecutor::new());
    if let Err(e) = conn.serve_connection(TokioIo::new(stream), service).await {
        debug!(%peer, "connection closed with error: {e}");
    }
}

/// Builds the request, runs it through the router and sends the response.
///
/// Every failure has already become a response by now, so hyper never sees
/// an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let response = match RequestFactory::from_hyper(req, remote_addr).await {
        Ok(req) => router.handle(req).await,
        Err(e) => {
            warn!(peer = %remote_addr, "unreadable request: {e}");
            e.into_response()
        }
    };
    Ok(response.send())
}

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere. A handler that cannot be installed
/// disables its arm instead of resolving.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => debug!("received Ctrl-C"),
        () = sigterm => debug!("received SIGTERM"),
    }
}
