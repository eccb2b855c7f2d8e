//! Loopback HTTP server for a configured plugin
//!
//! [`PluginServer`] binds the port from the handshake on `127.0.0.1`, routes
//! each request to the handler with the longest matching mount path and
//! stops when the shutdown channel fires or its sender is dropped.

use crate::error::{json_error_response, UiErrorCode};
use crate::handshake::RuntimeParameters;
use crate::router::PluginUiRouter;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Request handler mounted on a [`PluginServer`]
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Incoming>) -> BoxFuture<'static, Response<Full<Bytes>>>;
}

impl Handler for PluginUiRouter {
    fn call(&self, req: Request<Incoming>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        let response = self.handle(&req);
        Box::pin(async move { response })
    }
}

/// Handler built from an async closure, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async function as a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    fn call(&self, req: Request<Incoming>) -> BoxFuture<'static, Response<Full<Bytes>>> {
        Box::pin((self.f)(req))
    }
}

struct Route {
    prefix: String,
    handler: Arc<dyn Handler>,
}

/// Prefix table; the longest prefix matching on a segment boundary wins
#[derive(Default)]
struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    fn insert(&mut self, prefix: String, handler: Arc<dyn Handler>) {
        self.routes.retain(|r| r.prefix != prefix);
        self.routes.push(Route { prefix, handler });
        self.routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| prefix_matches(&r.prefix, path))
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// HTTP server a plugin runs on its loopback port
pub struct PluginServer {
    bind_addr: SocketAddr,
    routes: Routes,
    shutdown_rx: watch::Receiver<bool>,
}

impl PluginServer {
    /// Server bound to `127.0.0.1:<port>` from the host's parameters
    pub fn new(params: &RuntimeParameters, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self::with_addr(params.listen_addr(), shutdown_rx)
    }

    pub fn with_addr(bind_addr: SocketAddr, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            bind_addr,
            routes: Routes::default(),
            shutdown_rx,
        }
    }

    /// Mount a handler under a path prefix (normalized, `""` is the root)
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        let prefix = crate::paths::normalize_prefix(prefix);
        self.routes.insert(prefix, Arc::new(handler));
        self
    }

    /// Mount a UI router at its own handler prefix
    pub fn mount_ui(self, router: PluginUiRouter) -> Self {
        let prefix = router.handler_prefix().to_string();
        self.mount(&prefix, router)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown is signalled
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!(addr = %addr, routes = self.routes.routes.len(), "Plugin server listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();
        let routes = Arc::new(self.routes);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let routes = Arc::clone(&routes);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, routes).await {
                                    debug!(addr = %addr, error = %e, "Plugin connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept plugin connection");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    // A dropped sender can never signal again
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Plugin server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection<S>(stream: S, routes: Arc<Routes>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let routes = Arc::clone(&routes);
        async move { Ok::<_, hyper::Error>(dispatch(req, &routes).await) }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Plugin connection error: {}", e))?;

    Ok(())
}

async fn dispatch(req: Request<Incoming>, routes: &Routes) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match routes.find(&path) {
        Some(route) => route.handler.call(req).await,
        None => json_error_response(UiErrorCode::NoRoute, "not found"),
    };

    debug!(%method, %path, status = response.status().as_u16(), "Plugin request");
    response
}
