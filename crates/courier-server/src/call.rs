//! Per-request call state machines.
//!
//! Each in-flight request is a [`Call`] in one of three states. A call is
//! created when a full request frame is decoded — at which point the
//! connection keeps reading, so the request slot is immediately re-armed —
//! processed against the handler, and finished once the encoded response
//! has been flushed to the socket, at which point the worker retires it.

use courier_wire::{Request, RequestId, RequestPayload, Response};

use crate::handler::RequestHandler;

/// Which of the three service calls this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `SendMessage`.
    Send,
    /// `ReceiveMessage`.
    Receive,
    /// `SentMessages`.
    Sent,
}

impl CallKind {
    fn of(payload: &RequestPayload) -> Self {
        match payload {
            RequestPayload::Send { .. } => Self::Send,
            RequestPayload::Receive { .. } => Self::Receive,
            RequestPayload::Sent { .. } => Self::Sent,
        }
    }
}

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Constructed; the request slot is armed.
    Create,
    /// The request arrived and is being worked.
    Process,
    /// The response is queued; waiting for the flush completion.
    Finish,
}

/// One in-flight request.
#[derive(Debug)]
pub struct Call {
    id: RequestId,
    kind: CallKind,
    status: CallStatus,
}

impl Call {
    /// Creates the call for a decoded request.
    pub fn new(request: &Request) -> Self {
        Self {
            id: request.id,
            kind: CallKind::of(&request.payload),
            status: CallStatus::Create,
        }
    }

    /// The request id this call answers.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The call's method.
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Drives Create → Process → Finish: runs the handler and returns the
    /// response to queue. The caller owns flushing it.
    pub fn process(&mut self, request: Request, handler: &RequestHandler) -> Response {
        debug_assert_eq!(self.status, CallStatus::Create, "call processed twice");
        self.status = CallStatus::Process;
        let response = handler.handle(request);
        self.status = CallStatus::Finish;
        response
    }

    /// Whether the call only awaits its flush completion.
    pub fn is_finished(&self) -> bool {
        self.status == CallStatus::Finish
    }
}
