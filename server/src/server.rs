use crate::{
    Listener, Service,
    worker::{self, QueueLengths},
};
use crow_http::HttpConfig;
use std::{
    io,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};
use swansong::Swansong;

/// the periodic callback installed with `tick`
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// Everything the server needs to know before binding: endpoint, worker
/// count, timeout, header values, signal set, and the optional periodic
/// tick. Built by `crow`'s app builder.
pub struct ServerConfig {
    /// listen address (default `0.0.0.0`)
    pub bindaddr: String,
    /// listen port
    pub port: u16,
    /// serve over a unix domain socket at this path instead of TCP
    #[cfg(unix)]
    pub local_socket_path: Option<std::path::PathBuf>,
    /// total thread count; clamped to at least 2 (one acceptor plus one
    /// worker)
    pub concurrency: u16,
    /// per-connection idle timeout in seconds
    pub timeout: u8,
    /// value of the auto-added `Server` header
    pub server_name: String,
    /// connection tunables
    pub http: HttpConfig,
    /// signals bound to the shutdown handler
    pub signals: Vec<i32>,
    /// a periodic callback run on the accept loop
    pub tick: Option<(Duration, TickFn)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bindaddr: "0.0.0.0".into(),
            port: 80,
            #[cfg(unix)]
            local_socket_path: None,
            concurrency: 1,
            timeout: 5,
            server_name: crow_http::SERVER.into(),
            http: HttpConfig::default(),
            signals: default_signals(),
            tick: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bindaddr", &self.bindaddr)
            .field("port", &self.port)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("server_name", &self.server_name)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn default_signals() -> Vec<i32> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    vec![SIGINT, SIGTERM]
}

#[cfg(not(unix))]
fn default_signals() -> Vec<i32> {
    Vec::new()
}

#[derive(Default)]
struct StartState {
    // outer Option: has the server started; inner: the bound TCP port
    started: Mutex<Option<Option<u16>>>,
    condvar: Condvar,
}

/// A cloneable handle for controlling a running (or starting) server from
/// other threads.
#[derive(Clone)]
pub struct ServerHandle {
    swansong: Swansong,
    start: Arc<StartState>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Stop the server and wait for it to drain: the accept loop and every
    /// worker stop taking new work immediately, and this call blocks until
    /// each in-flight connection has released its shutdown guard. Must not
    /// be called from a worker thread, which would wait on itself.
    pub fn stop(&self) {
        futures_lite::future::block_on(self.swansong.shut_down());
    }

    /// Block until the server has bound its listener and is accepting.
    /// Returns the bound TCP port, when there is one.
    pub fn wait_for_server_start(&self) -> Option<u16> {
        let mut guard = self.start.started.lock().unwrap();
        while guard.is_none() {
            guard = self.start.condvar.wait(guard).unwrap();
        }
        guard.flatten()
    }

    /// Like [`wait_for_server_start`][Self::wait_for_server_start] but
    /// gives up after `timeout`. Returns false on timeout.
    pub fn wait_for_server_start_timeout(&self, timeout: Duration) -> bool {
        let guard = self.start.started.lock().unwrap();
        let (guard, result) = self
            .start
            .condvar
            .wait_timeout_while(guard, timeout, |started| started.is_none())
            .unwrap();
        drop(guard);
        !result.timed_out()
    }

    /// the bound TCP port, once started
    pub fn port(&self) -> Option<u16> {
        self.start.started.lock().unwrap().flatten()
    }
}

/// The server: binds the configured endpoint, spawns the worker pool, and
/// runs the accept loop with least-loaded dispatch.
pub struct Server<S> {
    service: Arc<S>,
    config: ServerConfig,
    swansong: Swansong,
    start: Arc<StartState>,
}

impl<S> std::fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Service> Server<S> {
    /// construct a server for a service
    pub fn new(service: Arc<S>, config: ServerConfig) -> Self {
        Self {
            service,
            config,
            swansong: Swansong::new(),
            start: Arc::new(StartState::default()),
        }
    }

    /// a handle for stopping the server and observing startup
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            swansong: self.swansong.clone(),
            start: self.start.clone(),
        }
    }

    /// Bind, spawn workers, and accept until stopped. Blocks the calling
    /// thread; the startup condition is signalled through the handle once
    /// the listener is live.
    pub fn run(self) -> io::Result<()> {
        let Self {
            service,
            config,
            swansong,
            start,
        } = self;

        let listener = Self::bind(&config)?;
        let port = listener.port();

        let worker_count = usize::from(config.concurrency.max(2)) - 1;
        let server_name: Arc<str> = config.server_name.as_str().into();
        let queues = QueueLengths::new(worker_count);

        let mut senders = Vec::with_capacity(worker_count);
        let mut threads = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = async_channel::unbounded();
            senders.push(tx);
            threads.push(worker::spawn(
                index,
                service.clone(),
                rx,
                config.http,
                server_name.clone(),
                config.timeout,
                swansong.clone(),
            ));
        }

        let executor = async_executor::LocalExecutor::new();

        #[cfg(unix)]
        if !config.signals.is_empty() {
            let signals = config.signals.clone();
            let swansong = swansong.clone();
            executor
                .spawn(async move {
                    use futures_lite::StreamExt;
                    match signal_hook_async_std::Signals::new(signals) {
                        Ok(mut signals) => {
                            while let Some(signal) = signals.next().await {
                                log::info!("received signal {signal:?}, shutting down");
                                let _ = swansong.shut_down();
                            }
                        }
                        Err(error) => log::error!("could not install signal handler: {error}"),
                    }
                })
                .detach();
        }

        if let Some((interval, tick)) = config.tick.clone() {
            executor
                .spawn(async move {
                    loop {
                        async_io::Timer::after(interval).await;
                        tick();
                    }
                })
                .detach();
        }

        log::info!(
            "{} server is running at {}:{} using {} threads",
            server_name,
            config.bindaddr,
            port.unwrap_or(config.port),
            worker_count + 1
        );

        *start.started.lock().unwrap() = Some(port);
        start.condvar.notify_all();

        async_io::block_on(executor.run(async {
            loop {
                match swansong.interrupt(listener.accept()).await {
                    None => break,
                    Some(Ok(stream)) => {
                        let index = queues.pick();
                        let guard = queues.guard(index);
                        log::debug!("assigning connection to worker {index}");
                        if senders[index].send((stream, guard)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(error)) => log::error!("accept failed: {error}"),
                }
            }
        }));

        drop(senders);
        for thread in threads {
            let _ = thread.join();
        }

        listener.clean_up();
        log::info!("exiting");
        Ok(())
    }

    fn bind(config: &ServerConfig) -> io::Result<Listener> {
        #[cfg(unix)]
        if let Some(path) = &config.local_socket_path {
            return async_io::block_on(Listener::bind_unix(path));
        }
        async_io::block_on(Listener::bind_tcp(&config.bindaddr, config.port))
    }
}
