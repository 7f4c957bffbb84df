//! Request handler that routes calls to storage.
//!
//! Storage failures never cross the transport: they are logged with a
//! captured backtrace and encoded as an `Error` status in the response
//! payload, and the connection stays healthy.

use std::sync::Arc;

use tracing::debug;

use courier_runtime::Fault;
use courier_storage::GuardedStorage;
use courier_wire::{Request, RequestPayload, Response, ResponsePayload, Status};

use crate::groups::{expand_addressees, GroupResolver};

/// Routes requests to the shared storage, applying group expansion on the
/// receive path.
pub struct RequestHandler {
    storage: Arc<GuardedStorage>,
    groups: Arc<dyn GroupResolver>,
}

impl RequestHandler {
    /// Creates a handler over the shared storage wrapper.
    pub fn new(storage: Arc<GuardedStorage>, groups: Arc<dyn GroupResolver>) -> Self {
        Self { storage, groups }
    }

    /// Handles one request, always producing a response.
    pub fn handle(&self, request: Request) -> Response {
        let id = request.id;
        let payload = match request.payload {
            RequestPayload::Send { message } => {
                debug!(%id, from = %message.from, "storing message");
                match self.storage.store(&message) {
                    Ok(uid) => {
                        debug!(%id, uid, "message stored");
                        ResponsePayload::Send { status: Status::Ok }
                    }
                    Err(e) => {
                        log_storage_failure("storing message failed", &e);
                        ResponsePayload::Send {
                            status: Status::Error,
                        }
                    }
                }
            }
            RequestPayload::Receive { user } => {
                debug!(%id, %user, "loading messages for user");
                let addressees = expand_addressees(&user, &*self.groups);
                match self.storage.load(&addressees) {
                    Ok(messages) => {
                        debug!(%id, count = messages.len(), "messages loaded");
                        ResponsePayload::Receive {
                            status: Status::Ok,
                            messages,
                        }
                    }
                    Err(e) => {
                        log_storage_failure("loading messages failed", &e);
                        ResponsePayload::Receive {
                            status: Status::Error,
                            messages: Vec::new(),
                        }
                    }
                }
            }
            RequestPayload::Sent { user } => {
                debug!(%id, %user, "loading sent messages for user");
                match self.storage.load_sent(&user) {
                    Ok(messages) => {
                        debug!(%id, count = messages.len(), "sent messages loaded");
                        ResponsePayload::Sent {
                            status: Status::Ok,
                            messages,
                        }
                    }
                    Err(e) => {
                        log_storage_failure("loading sent messages failed", &e);
                        ResponsePayload::Sent {
                            status: Status::Error,
                            messages: Vec::new(),
                        }
                    }
                }
            }
        };
        Response { id, payload }
    }
}

fn log_storage_failure(context: &str, error: &courier_storage::StorageError) {
    let fault = Fault::here().with(error).traced();
    let trace = fault
        .backtrace()
        .map(ToString::to_string)
        .unwrap_or_default();
    tracing::error!(error = %fault, %trace, "{context}");
}
