//! HTTP/1.x protocol core for completion-based reactors.
//!
//! This crate parses and drives http/1.0 and http/1.1 connections on top
//! of an io_uring style submission interface: the reactor owns the sockets
//! and the event loop, the core owns the message parsing and the
//! per-connection state machines. The pieces:
//!
//! * [`scan`] has the incremental scanners for the request line, status
//!   line and header block, accepting arbitrarily fragmented input.
//! * [`fields`] is zero-copy iteration over received header fields.
//! * [`http11`] has the typed views (`Method`, `Version`, `StatusCode`)
//!   and the request/response head views.
//! * [`submit`] is the submission/completion interface the reactor
//!   implements.
//! * [`server`] is the accept loop, connection slot table, and the
//!   server-side connection state machine with its [`server::Handler`]
//!   callbacks.
//! * [`client`] is the client-side connection state machine.
//!
//! Bodies are framed by `content-length` only; chunked transfer encoding
//! is not handled at this layer.

#[macro_use]
extern crate log;

mod body;
mod buffer;
mod error;

pub mod chars;
pub mod fields;
pub mod http11;
pub mod scan;
pub mod submit;

pub mod client;
pub mod server;

pub use error::Error;
