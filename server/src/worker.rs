use crate::{Service, Stream, TaskTimer, connection};
use std::{
    cell::RefCell,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};
use swansong::Swansong;

/// A per-worker cache of the RFC 1123 `Date` header value, refreshed at
/// most once per second. Worker-local, like the timer.
#[derive(Clone)]
pub struct DateCache {
    inner: Rc<RefCell<(Instant, String)>>,
}

impl std::fmt::Debug for DateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateCache").finish()
    }
}

impl Default for DateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DateCache {
    /// construct a cache holding the current time
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new((
                Instant::now(),
                httpdate::fmt_http_date(SystemTime::now()),
            ))),
        }
    }

    /// the cached date string, refreshed when older than a second
    pub fn get(&self) -> String {
        let mut inner = self.inner.borrow_mut();
        if inner.0.elapsed() >= Duration::from_secs(1) {
            inner.0 = Instant::now();
            inner.1 = httpdate::fmt_http_date(SystemTime::now());
        }
        inner.1.clone()
    }
}

/// Everything a connection borrows from the worker that owns it.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    /// the worker's task timer, for idle timeouts
    pub timer: TaskTimer,
    /// the worker's cached date string
    pub date: DateCache,
    /// connection tunables
    pub http_config: crow_http::HttpConfig,
    /// value of the auto-added `Server` header
    pub server_name: Arc<str>,
    /// idle timeout in seconds
    pub timeout: u8,
    /// the server's shutdown signal; connections stop reading at the next
    /// message boundary once it fires
    pub swansong: Swansong,
}

/// The per-worker connection counters the accept loop balances over.
/// Incremented when a connection is assigned, decremented by the guard when
/// it is destroyed.
#[derive(Debug, Default)]
pub struct QueueLengths {
    counts: Vec<AtomicUsize>,
}

impl QueueLengths {
    pub(crate) fn new(workers: usize) -> Arc<Self> {
        Arc::new(Self {
            counts: (0..workers).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    /// The least-loaded worker, scanning left to right and stopping early
    /// at the first worker with nothing queued.
    pub(crate) fn pick(&self) -> usize {
        let mut min_index = 0;
        for index in 1..self.counts.len() {
            if self.counts[min_index].load(Ordering::Relaxed) == 0 {
                break;
            }
            if self.counts[index].load(Ordering::Relaxed)
                < self.counts[min_index].load(Ordering::Relaxed)
            {
                min_index = index;
            }
        }
        min_index
    }

    pub(crate) fn guard(self: &Arc<Self>, index: usize) -> QueueGuard {
        self.counts[index].fetch_add(1, Ordering::SeqCst);
        QueueGuard {
            counters: Arc::clone(self),
            index,
        }
    }

    #[cfg(test)]
    fn len(&self, index: usize) -> usize {
        self.counts[index].load(Ordering::SeqCst)
    }
}

/// Decrements its worker's queue counter when the connection it travels
/// with is destroyed.
#[derive(Debug)]
pub struct QueueGuard {
    counters: Arc<QueueLengths>,
    index: usize,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        self.counters.counts[self.index].fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) type Assignment = (Stream, QueueGuard);

/// Spawn one worker thread: a single-threaded executor that owns a task
/// timer and date cache and serves every connection posted to its queue.
/// The thread exits when the swansong shuts down or the queue closes.
pub(crate) fn spawn<S: Service>(
    index: usize,
    service: Arc<S>,
    rx: async_channel::Receiver<Assignment>,
    http_config: crow_http::HttpConfig,
    server_name: Arc<str>,
    timeout: u8,
    swansong: Swansong,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("crow-worker-{index}"))
        .spawn(move || {
            let executor = Rc::new(async_executor::LocalExecutor::new());
            let timer = TaskTimer::new();
            let context = WorkerContext {
                timer: timer.clone(),
                date: DateCache::new(),
                http_config,
                server_name,
                timeout,
                swansong: swansong.clone(),
            };

            let inner = executor.clone();
            async_io::block_on(executor.run(async move {
                inner.spawn(timer.run()).detach();

                while let Some(Ok((stream, guard))) = swansong.interrupt(rx.recv()).await {
                    let service = service.clone();
                    let context = context.clone();
                    // the shutdown guard keeps `shut_down()` from
                    // completing while this connection is live
                    let shutdown_guard = swansong.guard();
                    inner
                        .spawn(async move {
                            connection::serve(service, stream, context).await;
                            drop(guard);
                            drop(shutdown_guard);
                        })
                        .detach();
                }

                // the dispatch loop only exits once shutdown is under way;
                // keep the executor polling in-flight connections until
                // their guards drain (`shut_down` is idempotent and its
                // completion future resolves when the guard count is zero)
                swansong.shut_down().await;
                log::debug!("worker {index} stopping");
            }));
        })
        .expect("could not spawn worker thread")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pick_short_circuits_at_zero() {
        let queues = QueueLengths::new(3);
        // all zero: first wins
        assert_eq!(queues.pick(), 0);

        let _g0 = queues.guard(0);
        // worker 0 busy, worker 1 free
        assert_eq!(queues.pick(), 1);

        let _g1a = queues.guard(1);
        let _g1b = queues.guard(1);
        let _g2 = queues.guard(2);
        // loads are [1, 2, 1]: leftmost minimum wins
        assert_eq!(queues.pick(), 0);
    }

    #[test]
    fn guard_decrements_on_drop() {
        let queues = QueueLengths::new(1);
        let guard = queues.guard(0);
        assert_eq!(queues.len(0), 1);
        drop(guard);
        assert_eq!(queues.len(0), 0);
    }
}
