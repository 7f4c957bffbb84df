//! Server lifecycle: acceptor, workers, shutdown.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use courier_runtime::{AtomicWord, Event, Thread};
use courier_storage::GuardedStorage;

use crate::error::{ServerError, ServerResult};
use crate::groups::GroupResolver;
use crate::handler::RequestHandler;
use crate::worker::{ConnectionInbox, Worker};

const ACCEPTOR_WAKER_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const INBOX_CAPACITY: usize = 1024;
const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Triggers an orderly shutdown from any thread (e.g. a signal handler
/// thread). Cloneable; all clones control the same server.
#[derive(Clone)]
pub struct ShutdownHandle {
    stopping: Arc<AtomicWord>,
    wakers: Vec<Arc<Waker>>,
    stop_requested: Event,
}

impl ShutdownHandle {
    /// Flags the stop and wakes every worker and the acceptor.
    pub fn request_stop(&self) {
        self.stopping.store(1);
        for waker in &self.wakers {
            let _ = waker.wake();
        }
        self.stop_requested.signal();
    }
}

/// The courier RPC server: one acceptor plus N poll workers over shared
/// storage.
pub struct Server {
    workers: Vec<Thread>,
    acceptor: Option<Thread>,
    handle: ShutdownHandle,
    stop_event: Event,
    local_addr: SocketAddr,
    stopped: bool,
}

impl Server {
    /// Binds `127.0.0.1:port` (0 picks an ephemeral port) and starts
    /// `threads` workers. Each worker owns its own poll; connections are
    /// distributed round-robin through bounded inboxes.
    pub fn start(
        threads: usize,
        port: u16,
        storage: Arc<GuardedStorage>,
        groups: Arc<dyn GroupResolver>,
    ) -> ServerResult<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;

        let worker_count = threads.max(1);
        let stopping = Arc::new(AtomicWord::new(0));
        let handler = Arc::new(RequestHandler::new(storage, groups));

        let mut workers = Vec::with_capacity(worker_count);
        let mut wakers = Vec::with_capacity(worker_count + 1);
        let mut inboxes: Vec<ConnectionInbox> = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let poll = Poll::new()?;
            let waker = Arc::new(Worker::waker(&poll)?);
            let inbox: ConnectionInbox = Arc::new(ArrayQueue::new(INBOX_CAPACITY));

            let worker = Worker::new(
                index,
                poll,
                Arc::clone(&inbox),
                Arc::clone(&handler),
                Arc::clone(&stopping),
            );
            let mut thread = Thread::named(format!("rpc-worker-{index}"), move || worker.run());
            thread
                .start()
                .map_err(|e| std::io::Error::other(e.to_string()))?;

            workers.push(thread);
            wakers.push(Arc::clone(&waker));
            inboxes.push(inbox);
        }

        let acceptor_poll = Poll::new()?;
        let acceptor_waker = Arc::new(Waker::new(acceptor_poll.registry(), ACCEPTOR_WAKER_TOKEN)?);
        acceptor_poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        wakers.push(Arc::clone(&acceptor_waker));

        let worker_wakers: Vec<Arc<Waker>> = wakers[..worker_count].to_vec();
        let acceptor_stopping = Arc::clone(&stopping);
        let mut acceptor = Thread::named("rpc-acceptor", move || {
            accept_loop(
                acceptor_poll,
                listener,
                &inboxes,
                &worker_wakers,
                &acceptor_stopping,
            );
        });
        acceptor
            .start()
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        info!(%local_addr, workers = worker_count, "rpc server listening");

        Ok(Self {
            workers,
            acceptor: Some(acceptor),
            handle: ShutdownHandle {
                stopping,
                wakers,
                stop_requested: Event::manual(),
            },
            stop_event: Event::manual(),
            local_addr,
            stopped: false,
        })
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle other threads use to trigger shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Stops accepting, drains the workers, joins every thread, and fires
    /// the stop event. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("stopping rpc server");
        self.handle.request_stop();

        if let Some(mut acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        for worker in &mut self.workers {
            let _ = worker.join();
        }
        self.workers.clear();
        self.stopped = true;
        self.stop_event.signal();
        info!("rpc server stopped");
    }

    /// Blocks until a [`ShutdownHandle::request_stop`] arrives, then
    /// completes the shutdown.
    pub fn wait_for_stop(&mut self) {
        self.handle.stop_requested.wait();
        self.stop();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    mut poll: Poll,
    listener: TcpListener,
    inboxes: &[ConnectionInbox],
    worker_wakers: &[Arc<Waker>],
    stopping: &AtomicWord,
) {
    let mut events = Events::with_capacity(64);
    let mut next_worker = 0usize;

    while stopping.load() == 0 {
        if let Err(e) = poll.poll(&mut events, Some(ACCEPT_POLL_TIMEOUT)) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            warn!(error = %e, "acceptor poll failed");
            break;
        }

        for event in &events {
            if event.token() != LISTENER_TOKEN {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        let index = next_worker % inboxes.len();
                        next_worker = next_worker.wrapping_add(1);
                        debug!(%peer, worker = index, "connection accepted");
                        if inboxes[index].push(stream).is_err() {
                            warn!(%peer, worker = index, "worker inbox full; dropping connection");
                            continue;
                        }
                        let _ = worker_wakers[index].wake();
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        break;
                    }
                }
            }
        }
    }
    debug!("acceptor stopping");
}
