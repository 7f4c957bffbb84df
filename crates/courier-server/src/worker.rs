//! Per-worker event loop.
//!
//! Each worker owns one poll instance — its completion queue — plus a
//! token-keyed connection map. New connections arrive through a bounded
//! inbox; the acceptor parks the stream and rings the worker's waker. A
//! worker only ever progresses calls delivered by its own poll, while
//! storage stays shared behind its lock wrapper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, trace, warn};

use courier_runtime::AtomicWord;

use crate::call::Call;
use crate::connection::Connection;
use crate::handler::RequestHandler;

/// Token reserved for the worker's waker.
pub(crate) const WAKER_TOKEN: Token = Token(0);

const FIRST_CONNECTION_TOKEN: usize = 1;
const EVENT_CAPACITY: usize = 256;
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Hand-off queue from the acceptor into one worker.
pub(crate) type ConnectionInbox = Arc<ArrayQueue<TcpStream>>;

pub(crate) struct Worker {
    index: usize,
    poll: Poll,
    inbox: ConnectionInbox,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    handler: Arc<RequestHandler>,
    stopping: Arc<AtomicWord>,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        poll: Poll,
        inbox: ConnectionInbox,
        handler: Arc<RequestHandler>,
        stopping: Arc<AtomicWord>,
    ) -> Self {
        Self {
            index,
            poll,
            inbox,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            handler,
            stopping,
        }
    }

    /// Builds a waker bound to `poll` for this worker.
    pub(crate) fn waker(poll: &Poll) -> std::io::Result<Waker> {
        Waker::new(poll.registry(), WAKER_TOKEN)
    }

    pub(crate) fn run(mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        debug!(worker = self.index, "rpc worker running");

        while self.stopping.load() == 0 {
            if let Err(e) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                warn!(worker = self.index, error = %e, "poll failed; worker exiting");
                break;
            }

            for event in &events {
                match event.token() {
                    WAKER_TOKEN => {}
                    token => self.drive_connection(token),
                }
            }
            // the waker also fires for newly parked connections
            self.adopt_new_connections();
        }

        debug!(
            worker = self.index,
            connections = self.connections.len(),
            "rpc worker stopping"
        );
    }

    fn adopt_new_connections(&mut self) {
        while let Some(mut stream) = self.inbox.pop() {
            let token = Token(self.next_token);
            self.next_token += 1;
            if let Err(e) =
                self.poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
            {
                warn!(worker = self.index, error = %e, "failed to register connection");
                continue;
            }
            trace!(worker = self.index, ?token, "connection adopted");
            self.connections.insert(token, Connection::new(token, stream));
        }
    }

    fn drive_connection(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };

        let alive = self.progress(&mut conn);
        if alive && !conn.closing {
            let interest = conn.interest();
            if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, interest)
            {
                warn!(worker = self.index, error = %e, "reregister failed");
                self.close(conn);
                return;
            }
            self.connections.insert(token, conn);
        } else {
            self.close(conn);
        }
    }

    /// Runs the read → decode → process → write cycle. Returns whether the
    /// connection stays open.
    fn progress(&self, conn: &mut Connection) -> bool {
        match conn.read() {
            Ok(true) => {}
            Ok(false) => return self.flush_before_close(conn),
            Err(e) => {
                trace!(worker = self.index, error = %e, "read failed");
                return false;
            }
        }

        while conn.has_buffered_input() {
            match conn.try_decode_request() {
                Ok(Some(request)) => {
                    // a fresh call object keeps the method armed while this
                    // one is worked
                    let mut call = Call::new(&request);
                    trace!(worker = self.index, id = %request.id, kind = ?call.kind(), "request received");
                    let response = call.process(request, &self.handler);
                    if let Err(e) = conn.queue_response(&response) {
                        warn!(worker = self.index, error = %e, "failed to encode response");
                        return false;
                    }
                    conn.pending_calls.push(call);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(worker = self.index, error = %e, "protocol error; dropping connection");
                    return false;
                }
            }
        }

        match conn.write() {
            Ok(true) => self.retire_finished(conn),
            Ok(false) => {}
            Err(e) => {
                trace!(worker = self.index, error = %e, "write failed");
                return false;
            }
        }
        true
    }

    /// Peer hung up: push out whatever is already queued, then close.
    fn flush_before_close(&self, conn: &mut Connection) -> bool {
        if let Ok(true) = conn.write() {
            self.retire_finished(conn);
        }
        false
    }

    fn retire_finished(&self, conn: &mut Connection) {
        for call in conn.pending_calls.drain(..) {
            debug_assert!(call.is_finished());
            trace!(worker = self.index, id = %call.id(), "call retired");
        }
    }

    fn close(&mut self, mut conn: Connection) {
        let _ = self.poll.registry().deregister(&mut conn.stream);
        trace!(worker = self.index, token = ?conn.token, "connection closed");
    }
}
