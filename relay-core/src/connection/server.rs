//! `Server`: the embeddable entry point. Route registration during setup,
//! then `serve()` drives the accept loop and per-connection state machine.

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;

use crate::config::{ServerOptions, WorkerModel};
use crate::connection::handle::handle_connection;
use crate::dispatcher::{Dispatcher, ErrorHook, EventHook, MiddlewareMode};
use crate::error::{RelayError, Result};
use crate::memory::MemoryManager;
use crate::middleware::{FastMiddleware, Middleware, DEFAULT_FAST_CAPACITY};
use crate::route::{HandlerVariant, Method, RegularHandler, Router, StreamHandler, StreamSchedulerHandler};

/// Shared, read-only state every worker's accept loop and every accepted
/// connection reads from.
pub(crate) struct ServerRuntime {
    pub options: ServerOptions,
    pub dispatcher: Dispatcher,
    pub memory: Arc<MemoryManager>,
}

/// Builder + server. Register routes and middleware, then call
/// [`Server::serve`] to bind and accept connections.
pub struct Server {
    options: ServerOptions,
    router: Router,
    memory: Arc<MemoryManager>,
    middleware_chain: Vec<Arc<dyn Middleware>>,
    fast_middleware: Vec<Arc<dyn FastMiddleware>>,
    use_fast: bool,
    on_request: Option<EventHook>,
    on_response: Option<EventHook>,
    on_error: Option<ErrorHook>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        let router = Router::new(
            options.route_cache_size,
            options.route_cache_shards,
            options.max_path_depth,
            options.max_params,
        );
        let memory = Arc::new(MemoryManager::new(&options));
        Server {
            options,
            router,
            memory,
            middleware_chain: Vec::new(),
            fast_middleware: Vec::new(),
            use_fast: false,
            on_request: None,
            on_response: None,
            on_error: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn route(&mut self, method: Method, pattern: &str, handler: Arc<dyn RegularHandler>) -> Result<&mut Self> {
        self.router.register_regular(method, pattern, handler)?;
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Get, pattern, Arc::new(handler))
    }
    pub fn post(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Post, pattern, Arc::new(handler))
    }
    pub fn put(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Put, pattern, Arc::new(handler))
    }
    pub fn delete(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Delete, pattern, Arc::new(handler))
    }
    pub fn patch(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Patch, pattern, Arc::new(handler))
    }
    pub fn head(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Head, pattern, Arc::new(handler))
    }
    pub fn options_method(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.route(Method::Options, pattern, Arc::new(handler))
    }

    /// Register the same handler under every method in the closed set.
    pub fn all(&mut self, pattern: &str, handler: impl RegularHandler + 'static) -> Result<&mut Self> {
        self.router
            .register_all(pattern, HandlerVariant::Regular(Arc::new(handler)))?;
        Ok(self)
    }

    pub fn stream(&mut self, pattern: &str, handler: impl StreamHandler + 'static) -> Result<&mut Self> {
        self.router.register_stream(Method::Get, pattern, Arc::new(handler))?;
        Ok(self)
    }

    pub fn stream_with_scheduler(
        &mut self,
        pattern: &str,
        handler: impl StreamSchedulerHandler + 'static,
    ) -> Result<&mut Self> {
        self.router
            .register_stream_with_scheduler(Method::Get, pattern, Arc::new(handler))?;
        Ok(self)
    }

    /// Append a re-entrant middleware. Mutually
    /// exclusive with [`Server::use_fast_middleware`] within one server:
    /// whichever is called, the last-written mode wins at `serve()` time.
    pub fn use_middleware(&mut self, mw: impl Middleware + 'static) -> &mut Self {
        self.middleware_chain.push(Arc::new(mw));
        self
    }

    /// Append a pre-only "Fast" middleware step.
    pub fn use_fast_middleware(&mut self, mw: impl FastMiddleware + 'static) -> &mut Self {
        self.use_fast = true;
        self.fast_middleware.push(Arc::new(mw));
        self
    }

    pub fn on_request(&mut self, hook: EventHook) -> &mut Self {
        self.on_request = Some(hook);
        self
    }
    pub fn on_response(&mut self, hook: EventHook) -> &mut Self {
        self.on_response = Some(hook);
        self
    }
    pub fn on_error(&mut self, hook: ErrorHook) -> &mut Self {
        self.on_error = Some(hook);
        self
    }

    /// A flag the embedder can flip (e.g. from a `ctrlc` handler) to stop
    /// every worker's accept loop, rather than this crate owning a
    /// process-global shutdown switch.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn memory(&self) -> Arc<MemoryManager> {
        self.memory.clone()
    }

    /// Bind and run until `shutdown_handle()` is set, accepting
    /// connections across `options.resolved_worker_count()` workers. The
    /// worker model (per-worker OS thread with worker-local state, vs a
    /// single shared runtime) is chosen by `options.worker_model`.
    pub async fn serve(self) -> Result<()> {
        match self.options.worker_model {
            WorkerModel::PerWorker => self.serve_per_worker().await,
            WorkerModel::SharedGlobal => self.serve_shared_global().await,
        }
    }

    /// One OS thread per worker, each driving its own single-threaded
    /// runtime with its own listening socket (`SO_REUSEPORT`), its own
    /// `Router` (forked from the registered routes), and its own
    /// `MemoryManager`. A connection never leaves the thread that accepted
    /// it, so the route cache, params pool, and event pool are never
    /// touched from more than one thread. This is the default and the
    /// model this crate recommends.
    async fn serve_per_worker(self) -> Result<()> {
        let Server {
            options,
            router,
            middleware_chain,
            fast_middleware,
            use_fast,
            on_request,
            on_response,
            on_error,
            shutdown,
            ..
        } = self;

        let worker_count = options.resolved_worker_count();
        let middleware_chain = Arc::new(middleware_chain);
        let fast_middleware = Arc::new(fast_middleware);
        log::info!(
            "relay server listening on {}:{} ({worker_count} per-worker threads)",
            options.host,
            options.port
        );

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let options = options.clone();
            let worker_router = router.fork_worker_local(options.route_cache_size, options.route_cache_shards);
            let middleware_chain = middleware_chain.clone();
            let fast_middleware = fast_middleware.clone();
            let on_request = on_request.clone();
            let on_response = on_response.clone();
            let on_error = on_error.clone();
            let shutdown = shutdown.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let worker_runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build per-worker tokio runtime");
                worker_runtime.block_on(run_worker(
                    worker_id,
                    options,
                    worker_router,
                    middleware_chain,
                    fast_middleware,
                    use_fast,
                    on_request,
                    on_response,
                    on_error,
                    shutdown,
                ))
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Non-default: every worker shares one `Router`/`RouteCache` and one
    /// `MemoryManager`/`EventPool`, accepting on a single listener via
    /// tokio's work-stealing scheduler. Kept for embedders who specifically
    /// want one pool sized across the whole process rather than per-worker
    /// pools; cross-thread contention on the shared cache and pool is the
    /// cost of that choice.
    async fn serve_shared_global(self) -> Result<()> {
        let Server {
            options,
            router,
            memory,
            middleware_chain,
            fast_middleware,
            use_fast,
            on_request,
            on_response,
            on_error,
            shutdown,
        } = self;

        let router = Arc::new(router);
        let mode = if use_fast {
            MiddlewareMode::Fast(Arc::new(fast_middleware), DEFAULT_FAST_CAPACITY)
        } else {
            MiddlewareMode::Chain(Arc::new(middleware_chain))
        };
        let mut dispatcher = Dispatcher::new(router.clone(), mode);
        if let Some(hook) = on_request {
            dispatcher.set_on_request(hook);
        }
        if let Some(hook) = on_response {
            dispatcher.set_on_response(hook);
        }
        if let Some(hook) = on_error {
            dispatcher.set_on_error(hook);
        }

        let listener = bind_listener(&options.host, options.port, options.backlog, false)?;
        log::info!("relay server listening on {}:{} (shared global pools)", options.host, options.port);

        let runtime = Arc::new(ServerRuntime { options: options.clone(), dispatcher, memory });
        let listener = Arc::new(listener);
        let worker_count = runtime.options.resolved_worker_count();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let listener = listener.clone();
            let runtime = runtime.clone();
            let shutdown = shutdown.clone();
            workers.push(tokio::spawn(accept_loop(worker_id, listener, runtime, shutdown)));
        }

        for worker in workers {
            let _ = worker.await;
        }
        Ok(())
    }
}

/// Build one worker's `Dispatcher`/`MemoryManager`, bind its own
/// `SO_REUSEPORT` listener, and run its accept loop until shutdown. Runs
/// entirely inside the `current_thread` runtime set up by
/// `Server::serve_per_worker`, so everything reachable from here (the
/// route cache, the params pool, the event pool) lives on exactly one OS
/// thread for the life of the worker.
#[allow(clippy::too_many_arguments)]
async fn run_worker(
    worker_id: usize,
    options: ServerOptions,
    router: Router,
    middleware_chain: Arc<Vec<Arc<dyn Middleware>>>,
    fast_middleware: Arc<Vec<Arc<dyn FastMiddleware>>>,
    use_fast: bool,
    on_request: Option<EventHook>,
    on_response: Option<EventHook>,
    on_error: Option<ErrorHook>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let router = Arc::new(router);
    let mode = if use_fast {
        MiddlewareMode::Fast(fast_middleware, DEFAULT_FAST_CAPACITY)
    } else {
        MiddlewareMode::Chain(middleware_chain)
    };
    let mut dispatcher = Dispatcher::new(router, mode);
    if let Some(hook) = on_request {
        dispatcher.set_on_request(hook);
    }
    if let Some(hook) = on_response {
        dispatcher.set_on_response(hook);
    }
    if let Some(hook) = on_error {
        dispatcher.set_on_error(hook);
    }

    let memory = Arc::new(MemoryManager::new(&options));
    let listener = bind_listener(&options.host, options.port, options.backlog, true)?;
    let runtime = Arc::new(ServerRuntime { options, dispatcher, memory });
    let listener = Arc::new(listener);

    accept_loop(worker_id, listener, runtime, shutdown).await;
    Ok(())
}

/// Bind and listen with an explicit backlog, which plain
/// `tokio::net::TcpListener::bind` has no way to express. Resolves
/// `host` the same way `TcpListener::bind` would (so hostnames still work),
/// builds a `socket2::Socket` to set `SO_REUSEADDR`/`SO_REUSEPORT` and the
/// listen backlog, then hands the fd to tokio.
///
/// `reuse_port` is set per-worker under `WorkerModel::PerWorker`: every
/// worker binds its own socket on the same `host:port` and the kernel
/// load-balances accepted connections across them, so no two workers ever
/// contend on a single shared listener.
fn bind_listener(host: &str, port: u16, backlog: u32, reuse_port: bool) -> Result<TcpListener> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(RelayError::Transport)?
        .next()
        .ok_or_else(|| {
            RelayError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("could not resolve {host}:{port}"),
            ))
        })?;

    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None).map_err(RelayError::Transport)?;
    socket.set_reuse_address(true).map_err(RelayError::Transport)?;
    #[cfg(unix)]
    if reuse_port {
        socket.set_reuse_port(true).map_err(RelayError::Transport)?;
    }
    socket.set_nonblocking(true).map_err(RelayError::Transport)?;
    socket.bind(&addr.into()).map_err(RelayError::Transport)?;
    socket.listen(backlog as i32).map_err(RelayError::Transport)?;

    TcpListener::from_std(socket.into()).map_err(RelayError::Transport)
}

async fn accept_loop(
    worker_id: usize,
    listener: Arc<TcpListener>,
    runtime: Arc<ServerRuntime>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::debug!("worker {worker_id} accepted connection from {addr}");
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, runtime).await {
                        log::debug!("connection on worker {worker_id} closed: {err}");
                    }
                });
            }
            Err(err) => {
                log::warn!("worker {worker_id} accept error: {err}");
            }
        }
    }
    log::info!("worker {worker_id} shutting down");
}
