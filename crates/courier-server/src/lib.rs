//! # courier-server: the courier RPC server
//!
//! A poll-driven TCP server over the courier wire protocol, built on plain
//! synchronous threads — explicit control flow, no async runtime.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       courier-server                         │
//! │  ┌──────────┐    ┌─────────────────┐    ┌────────────────┐   │
//! │  │ Acceptor │ →  │ Workers (poll,  │ →  │ RequestHandler │   │
//! │  │  (TCP)   │    │ call machines)  │    │ (→ storage)    │   │
//! │  └──────────┘    └─────────────────┘    └────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each worker owns one poll instance and only ever progresses calls that
//! instance delivers; the storage wrapper enforces cross-worker safety.
//! Shutdown is cooperative: a [`ShutdownHandle`] flips the stopping flag
//! and wakes every poll, and [`Server::wait_for_stop`] returns once every
//! thread has been joined.

mod call;
mod connection;
mod error;
pub mod groups;
mod handler;
mod server;
mod worker;

pub use call::{Call, CallKind, CallStatus};
pub use connection::Connection;
pub use error::{ServerError, ServerResult};
pub use groups::{expand_addressees, GroupResolver, OsGroups};
pub use handler::RequestHandler;
pub use server::{Server, ShutdownHandle};
