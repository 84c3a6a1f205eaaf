//! The submission interface between the protocol core and the reactor.
//!
//! The core never touches a socket. Every I/O need is expressed as a
//! [`Submission`] handed to the reactor through [`Submit`], and the reactor
//! answers exactly once with a [`Completion`] carrying the same token.
//! Buffers move into the op for the lifetime of the submission and come
//! home inside the completion, so nothing can alias storage the kernel may
//! still be writing.
//!
//! `Recv`, `Send` and `Connect` are timeout-linked: the reactor pairs the
//! data op with a timer so that either completing cancels the other, and a
//! fired timer surfaces as `Err(Error::Canceled)` in the outcome.

use crate::Error;
use std::net::SocketAddr;
use std::time::Duration;

/// Opaque socket handle owned by the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Socket(pub i32);

/// Routing key the reactor echoes back in the completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

impl Token {
    /// Completions for the listening socket.
    pub const ACCEPT: Token = Token(u64::MAX);

    pub fn slot(slot: usize) -> Token {
        Token(slot as u64)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One I/O request.
#[derive(Debug)]
pub enum Op {
    /// Accept one connection on the listening socket.
    Accept { listener: Socket },
    /// Connect `socket` to `addr`.
    Connect {
        socket: Socket,
        addr: SocketAddr,
        timeout: Duration,
    },
    /// Receive into `buf[offset..]`.
    Recv {
        socket: Socket,
        buf: Vec<u8>,
        offset: usize,
        timeout: Duration,
    },
    /// Transmit `buf[offset..offset + len]`.
    Send {
        socket: Socket,
        buf: Vec<u8>,
        offset: usize,
        len: usize,
        timeout: Duration,
    },
}

#[derive(Debug)]
pub struct Submission {
    pub token: Token,
    pub op: Op,
}

/// Result of one submission. Lent buffers come back here.
#[derive(Debug)]
pub enum Outcome {
    Accepted(Result<Socket, Error>),
    Connected(Result<(), Error>),
    Recv {
        buf: Vec<u8>,
        result: Result<usize, Error>,
    },
    Send {
        buf: Vec<u8>,
        result: Result<usize, Error>,
    },
}

#[derive(Debug)]
pub struct Completion {
    pub token: Token,
    pub outcome: Outcome,
}

/// Reactor-side surface the core drives.
pub trait Submit {
    fn submit(&mut self, submission: Submission);

    /// Close a socket. Outstanding submissions on it complete as canceled.
    fn close(&mut self, socket: Socket);
}
