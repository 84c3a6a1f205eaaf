//! Server side of the http/1.x protocol core.
//!
//! The server owns no sockets and runs no loop of its own. The reactor
//! calls [`Server::handle`] for every completion; the server reacts by
//! mutating per-connection state, invoking the user [`Handler`], and
//! submitting the next operation. One completion is in flight per
//! connection at any time, so no further synchronization exists.
//!
//! # Example
//!
//! ```rust,ignore
//! use ring_h1::server::{Handler, Responder, Server, ServerConfig};
//! use ring_h1::http11::RecvRequest;
//! use ring_h1::Error;
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     fn on_request_headers(&mut self, _req: &RecvRequest, _res: &mut Responder) -> Result<(), Error> {
//!         Ok(())
//!     }
//!
//!     fn on_body_fragment(&mut self, _chunk: &[u8], is_last: bool, res: &mut Responder) -> Result<(), Error> {
//!         if is_last {
//!             res.send_full(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello", true)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut server = Server::new(ServerConfig::default(), listener, |_slot| Hello)?;
//! server.start(&mut ring);
//! loop {
//!     let completion = ring.wait();
//!     server.handle(&mut ring, completion);
//! }
//! ```

use crate::body::BodyProgress;
use crate::buffer::RecvBuf;
use crate::http11::{write_error_response, RecvRequest, StatusCode};
use crate::scan::RequestHeadScanner;
use crate::submit::{Completion, Op, Outcome, Socket, Submission, Submit, Token};
use crate::Error;
use std::time::Duration;

/// Server tuning. Validated by [`Server::new`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Initial header buffer per connection.
    pub client_header_buffer_size: usize,
    /// Step the header buffer grows by when a head outgrows it.
    pub large_client_header_buffer_size: usize,
    /// Cap on growth: `large_client_header_buffer_size` times this.
    pub large_client_header_buffer_max_count: usize,
    /// Buffer for body fragments past the head.
    pub client_body_buffer_size: usize,
    /// Send buffer; must fit any error response, so at least 1024.
    pub response_buffer_size: usize,
    pub recv_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            client_header_buffer_size: 1024,
            large_client_header_buffer_size: 8192,
            large_client_header_buffer_max_count: 4,
            client_body_buffer_size: 16_384,
            response_buffer_size: 8192,
            recv_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.client_header_buffer_size == 0 {
            return Err(Error::User("client_header_buffer_size must be > 0".into()));
        }
        if self.large_client_header_buffer_size < self.client_header_buffer_size {
            return Err(Error::User(
                "large_client_header_buffer_size must be >= client_header_buffer_size".into(),
            ));
        }
        if self.large_client_header_buffer_max_count == 0 {
            return Err(Error::User(
                "large_client_header_buffer_max_count must be > 0".into(),
            ));
        }
        if self.client_body_buffer_size == 0 {
            return Err(Error::User("client_body_buffer_size must be > 0".into()));
        }
        if self.response_buffer_size < 1024 {
            return Err(Error::User("response_buffer_size must be >= 1024".into()));
        }
        Ok(())
    }

    fn header_buffer_cap(&self) -> usize {
        self.large_client_header_buffer_size * self.large_client_header_buffer_max_count
    }
}

/// Per-connection request callbacks.
///
/// One handler instance exists per connection, created by the server's
/// factory when the connection is accepted. All callbacks run on the
/// reactor thread, between completions.
pub trait Handler {
    /// Called once when the connection is accepted, before the first recv.
    fn on_start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called when a request head has been parsed.
    fn on_request_headers(
        &mut self,
        req: &RecvRequest<'_>,
        res: &mut Responder<'_>,
    ) -> Result<(), Error>;

    /// Called for every body fragment. Exactly one call per request has
    /// `is_last == true`; for a bodyless request that call carries an
    /// empty chunk. A response must be scheduled by the time the last
    /// call returns, or the server answers 500 on the handler's behalf.
    fn on_body_fragment(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        res: &mut Responder<'_>,
    ) -> Result<(), Error>;

    /// Called when a response fragment sent with `last == false` has
    /// drained; the next fragment must be scheduled here.
    fn on_sent(&mut self, res: &mut Responder<'_>) -> Result<(), Error> {
        let _ = res;
        Ok(())
    }

    /// Called when the connection is torn down mid-request: timeout
    /// (`Canceled`), peer disappearing (`UnexpectedEof`) or an I/O error.
    fn on_error(&mut self, err: &Error) {
        let _ = err;
    }
}

/// Queues response bytes into the connection's send buffer.
///
/// A response is one or more fragments; only the first may carry the
/// status line and headers, and the head must be complete within it.
pub struct Responder<'a> {
    buf: &'a mut Vec<u8>,
    queued: &'a mut usize,
    scheduled: &'a mut bool,
    last: &'a mut bool,
}

impl Responder<'_> {
    /// Copy one response fragment into the send buffer and schedule it
    /// for transmission once the current callback returns. `last` marks
    /// the final fragment of the response.
    pub fn send_full(&mut self, bytes: &[u8], last: bool) -> Result<(), Error> {
        if *self.scheduled {
            return Err(Error::User("a response fragment is already scheduled".into()));
        }
        if bytes.len() > self.buf.len() {
            return Err(Error::User(format!(
                "response fragment of {} bytes exceeds the send buffer ({})",
                bytes.len(),
                self.buf.len()
            )));
        }

        self.buf[..bytes.len()].copy_from_slice(bytes);
        *self.queued = bytes.len();
        *self.scheduled = true;
        *self.last = last;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ReceivingHeaders,
    ReceivingContent,
    Sending,
    Idle,
    Closing,
}

enum After {
    Continue,
    Close,
}

struct ServerConn<H> {
    slot: usize,
    socket: Socket,
    phase: Phase,
    handler: H,
    scanner: RequestHeadScanner,
    header_buf: RecvBuf,
    body_buf: Option<Vec<u8>>,
    body: BodyProgress,
    keep_alive: bool,
    processing: bool,
    send_buf: Option<Vec<u8>>,
    queued: usize,
    sent: usize,
    scheduled: bool,
    last_fragment: bool,
    close_after_send: bool,
}

impl<H: Handler> ServerConn<H> {
    fn new(slot: usize, socket: Socket, handler: H, config: &ServerConfig) -> Self {
        ServerConn {
            slot,
            socket,
            phase: Phase::Idle,
            handler,
            scanner: RequestHeadScanner::new(),
            header_buf: RecvBuf::with_size(config.client_header_buffer_size),
            body_buf: None,
            body: BodyProgress::new(None),
            keep_alive: true,
            processing: false,
            send_buf: Some(vec![0; config.response_buffer_size]),
            queued: 0,
            sent: 0,
            scheduled: false,
            last_fragment: false,
            close_after_send: false,
        }
    }

    fn on_completion<S: Submit>(
        &mut self,
        sub: &mut S,
        config: &ServerConfig,
        outcome: Outcome,
        shutdown: bool,
    ) -> After {
        match outcome {
            Outcome::Recv { buf, result } => match self.phase {
                Phase::ReceivingHeaders => self.on_recv_headers(sub, config, buf, result),
                Phase::ReceivingContent => self.on_recv_content(sub, config, buf, result),
                _ => {
                    warn!("slot {}: recv completion in phase {:?}", self.slot, self.phase);
                    After::Close
                }
            },
            Outcome::Send { buf, result } => match self.phase {
                Phase::Sending => self.on_send(sub, config, buf, result, shutdown),
                _ => {
                    warn!("slot {}: send completion in phase {:?}", self.slot, self.phase);
                    After::Close
                }
            },
            other => {
                warn!(
                    "slot {}: unexpected completion {:?} in phase {:?}",
                    self.slot, other, self.phase
                );
                After::Close
            }
        }
    }

    fn on_recv_headers<S: Submit>(
        &mut self,
        sub: &mut S,
        config: &ServerConfig,
        buf: Vec<u8>,
        result: Result<usize, Error>,
    ) -> After {
        let received = match result {
            Ok(n) => n,
            Err(e) => {
                debug!("slot {}: recv failed: {}", self.slot, e);
                self.handler.on_error(&e);
                return After::Close;
            }
        };

        let old = self.header_buf.len();
        self.header_buf.restore(buf, received);

        if received == 0 {
            if old > 0 {
                debug!("slot {}: eof inside a request head after {} bytes", self.slot, old);
                self.handler.on_error(&Error::UnexpectedEof);
            } else {
                trace!("slot {}: connection closed", self.slot);
            }
            return After::Close;
        }

        let scanned = self.scanner.scan(&self.header_buf.filled()[old..]);

        match scanned {
            Ok(true) => self.on_head_complete(sub, config),

            Ok(false) => {
                if self.header_buf.is_full() {
                    if let Err(e) = self
                        .header_buf
                        .grow(config.large_client_header_buffer_size, config.header_buffer_cap())
                    {
                        debug!("slot {}: {}", self.slot, e);
                        return self.send_error(sub, config, &e);
                    }
                    trace!(
                        "slot {}: header buffer grown to {}",
                        self.slot,
                        self.header_buf.size()
                    );
                }
                self.submit_recv_headers(sub, config);
                After::Continue
            }

            Err(e) => {
                debug!("slot {}: bad request head: {}", self.slot, e);
                self.send_error(sub, config, &e)
            }
        }
    }

    fn on_head_complete<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) -> After {
        let head_len = self.scanner.total();
        trace!("slot {}: request head complete, {} bytes", self.slot, head_len);

        let parsed = {
            RecvRequest::new(self.header_buf.filled(), &self.scanner).map(|req| {
                let chunked = req.fields().has_token("transfer-encoding", "chunked");
                (req.content_length(), req.is_keep_alive(), chunked)
            })
        };
        let (content_length, keep_alive, chunked) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("slot {}: {}", self.slot, e);
                return self.send_error(sub, config, &e);
            }
        };

        if chunked {
            // only content-length framing is handled at this layer
            debug!("slot {}: chunked transfer-encoding rejected", self.slot);
            return self.send_error(sub, config, &Error::BadRequest);
        }

        self.keep_alive = keep_alive;
        self.body = BodyProgress::new(content_length);
        self.processing = true;

        let headers_result = {
            // invariant: the head was validated just above
            let req = RecvRequest::new(self.header_buf.filled(), &self.scanner)
                .expect("request head no longer parses");
            let buf = self.send_buf.as_mut().expect("send buffer lent during callback");
            let mut res = Responder {
                buf,
                queued: &mut self.queued,
                scheduled: &mut self.scheduled,
                last: &mut self.last_fragment,
            };
            self.handler.on_request_headers(&req, &mut res)
        };

        if let Err(e) = headers_result {
            debug!("slot {}: handler failed on request headers: {}", self.slot, e);
            return self.send_error(sub, config, &Error::InternalServerError);
        }

        // body bytes that arrived together with the head
        let avail = self.header_buf.len() - head_len;
        let usable = (avail as u64).min(self.body.remaining()) as usize;
        self.body.add(usable);
        let is_last = self.body.is_complete();

        if usable > 0 || is_last {
            let fragment_result = {
                let chunk = &self.header_buf.filled()[head_len..head_len + usable];
                let buf = self.send_buf.as_mut().expect("send buffer lent during callback");
                let mut res = Responder {
                    buf,
                    queued: &mut self.queued,
                    scheduled: &mut self.scheduled,
                    last: &mut self.last_fragment,
                };
                self.handler.on_body_fragment(chunk, is_last, &mut res)
            };

            if let Err(e) = fragment_result {
                debug!("slot {}: handler failed on body fragment: {}", self.slot, e);
                return self.send_error(sub, config, &Error::InternalServerError);
            }
        }

        if is_last {
            self.finish_request(sub, config)
        } else {
            self.submit_recv_body(sub, config);
            After::Continue
        }
    }

    fn on_recv_content<S: Submit>(
        &mut self,
        sub: &mut S,
        config: &ServerConfig,
        buf: Vec<u8>,
        result: Result<usize, Error>,
    ) -> After {
        let received = match result {
            Ok(n) => n,
            Err(e) => {
                debug!("slot {}: body recv failed: {}", self.slot, e);
                self.handler.on_error(&e);
                return After::Close;
            }
        };

        if received == 0 {
            debug!(
                "slot {}: eof with {} body bytes outstanding",
                self.slot,
                self.body.remaining()
            );
            self.handler.on_error(&Error::UnexpectedEof);
            return After::Close;
        }

        let usable = (received as u64).min(self.body.remaining()) as usize;
        self.body.add(usable);
        let is_last = self.body.is_complete();

        let fragment_result = {
            let send_buf = self.send_buf.as_mut().expect("send buffer lent during callback");
            let mut res = Responder {
                buf: send_buf,
                queued: &mut self.queued,
                scheduled: &mut self.scheduled,
                last: &mut self.last_fragment,
            };
            self.handler.on_body_fragment(&buf[..usable], is_last, &mut res)
        };

        if let Err(e) = fragment_result {
            debug!("slot {}: handler failed on body fragment: {}", self.slot, e);
            return self.send_error(sub, config, &Error::InternalServerError);
        }

        if is_last {
            // body buffer is done for this request
            self.body_buf = None;
            self.finish_request(sub, config)
        } else {
            self.body_buf = Some(buf);
            self.submit_recv_body(sub, config);
            After::Continue
        }
    }

    fn on_send<S: Submit>(
        &mut self,
        sub: &mut S,
        config: &ServerConfig,
        buf: Vec<u8>,
        result: Result<usize, Error>,
        shutdown: bool,
    ) -> After {
        self.send_buf = Some(buf);

        let sent_now = match result {
            Ok(n) => n,
            Err(e) => {
                debug!("slot {}: send failed: {}", self.slot, e);
                self.handler.on_error(&e);
                return After::Close;
            }
        };

        self.sent += sent_now;
        if self.sent < self.queued {
            trace!(
                "slot {}: partial send, {} of {} bytes",
                self.slot,
                self.sent,
                self.queued
            );
            self.submit_send(sub, config);
            return After::Continue;
        }

        // fragment fully drained
        self.scheduled = false;
        self.queued = 0;
        self.sent = 0;

        if !self.last_fragment {
            let next = {
                let buf = self.send_buf.as_mut().expect("send buffer lent during callback");
                let mut res = Responder {
                    buf,
                    queued: &mut self.queued,
                    scheduled: &mut self.scheduled,
                    last: &mut self.last_fragment,
                };
                self.handler.on_sent(&mut res)
            };

            if let Err(e) = next {
                debug!("slot {}: handler failed after fragment: {}", self.slot, e);
                return After::Close;
            }
            if !self.scheduled {
                warn!("slot {}: response fragment chain broken, closing", self.slot);
                return After::Close;
            }
            self.submit_send(sub, config);
            return After::Continue;
        }

        if self.close_after_send || !self.keep_alive || shutdown {
            trace!("slot {}: closing after response", self.slot);
            self.phase = Phase::Closing;
            return After::Close;
        }

        self.reset_for_next_request(sub, config);
        After::Continue
    }

    /// The response must be scheduled by now; transition into sending.
    fn finish_request<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) -> After {
        if !self.scheduled {
            warn!("slot {}: request finished without a response, answering 500", self.slot);
            return self.send_error(sub, config, &Error::InternalServerError);
        }
        self.submit_send(sub, config);
        After::Continue
    }

    /// Queue a minimal close-delimited error response and send it.
    fn send_error<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig, err: &Error) -> After {
        let status = StatusCode(err.status_code());

        // invariant: send completions restore the buffer before callbacks run
        let buf = self.send_buf.as_mut().expect("send buffer lent during error");

        let n = match write_error_response(buf, status) {
            Ok(n) => n,
            Err(e) => {
                debug!("slot {}: could not build error response: {}", self.slot, e);
                return After::Close;
            }
        };

        trace!("slot {}: responding {} and closing", self.slot, status);

        self.queued = n;
        self.sent = 0;
        self.scheduled = true;
        self.last_fragment = true;
        self.close_after_send = true;
        self.submit_send(sub, config);
        After::Continue
    }

    fn submit_recv_headers<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) {
        let offset = self.header_buf.write_offset();
        let buf = self.header_buf.lend();
        self.phase = Phase::ReceivingHeaders;
        sub.submit(Submission {
            token: Token::slot(self.slot),
            op: Op::Recv {
                socket: self.socket,
                buf,
                offset,
                timeout: config.recv_timeout,
            },
        });
    }

    fn submit_recv_body<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) {
        let buf = match self.body_buf.take() {
            Some(buf) => buf,
            None => vec![0; config.client_body_buffer_size],
        };
        self.phase = Phase::ReceivingContent;
        sub.submit(Submission {
            token: Token::slot(self.slot),
            op: Op::Recv {
                socket: self.socket,
                buf,
                offset: 0,
                timeout: config.recv_timeout,
            },
        });
    }

    fn submit_send<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) {
        let buf = self.send_buf.take().expect("send buffer already lent");
        self.phase = Phase::Sending;
        sub.submit(Submission {
            token: Token::slot(self.slot),
            op: Op::Send {
                socket: self.socket,
                buf,
                offset: self.sent,
                len: self.queued - self.sent,
                timeout: config.send_timeout,
            },
        });
    }

    fn reset_for_next_request<S: Submit>(&mut self, sub: &mut S, config: &ServerConfig) {
        trace!("slot {}: keep-alive, awaiting the next request", self.slot);
        self.scanner.reset();
        self.header_buf.reset();
        self.body_buf = None;
        self.body = BodyProgress::new(None);
        self.keep_alive = true;
        self.processing = false;
        self.last_fragment = false;
        self.phase = Phase::Idle;
        self.submit_recv_headers(sub, config);
    }
}

/// The server: listening socket, connection slot table, shutdown state.
///
/// Generic over the handler factory, so the handler type is fixed at
/// compile time exactly like the transport was in the poll-based ancestry
/// of this design.
pub struct Server<F, H> {
    config: ServerConfig,
    listener: Socket,
    factory: F,
    slots: Vec<Option<ServerConn<H>>>,
    shutdown_requested: bool,
    done: bool,
}

impl<F, H> Server<F, H>
where
    F: FnMut(usize) -> H,
    H: Handler,
{
    pub fn new(config: ServerConfig, listener: Socket, factory: F) -> Result<Self, Error> {
        config.validate()?;
        Ok(Server {
            config,
            listener,
            factory,
            slots: Vec::new(),
            shutdown_requested: false,
            done: false,
        })
    }

    /// Submit the first accept. Call once before driving completions.
    pub fn start<S: Submit>(&mut self, sub: &mut S) {
        self.submit_accept(sub);
    }

    /// Dispatch one completion.
    pub fn handle<S: Submit>(&mut self, sub: &mut S, completion: Completion) {
        let Completion { token, outcome } = completion;

        if token == Token::ACCEPT {
            self.on_accept(sub, outcome);
            return;
        }

        let slot = token.index();
        let after = match self.slots.get_mut(slot) {
            Some(Some(conn)) => {
                conn.on_completion(sub, &self.config, outcome, self.shutdown_requested)
            }
            _ => {
                // completion for a slot already freed by shutdown or close
                debug!("dropping stale completion for slot {}", slot);
                return;
            }
        };

        if let After::Close = after {
            self.close_slot(sub, slot);
        }
    }

    /// Stop accepting and close connections as they go quiet.
    ///
    /// Connections between handler invocations close immediately; those
    /// processing a request finish it first, since the flag suppresses
    /// keep-alive.
    pub fn request_shutdown<S: Submit>(&mut self, sub: &mut S) {
        if self.shutdown_requested {
            return;
        }
        debug!("shutdown requested, {} connections open", self.connection_count());
        self.shutdown_requested = true;

        for slot in 0..self.slots.len() {
            let close_now = match &self.slots[slot] {
                Some(conn) => !conn.processing,
                None => false,
            };
            if close_now {
                trace!("slot {}: closing idle connection for shutdown", slot);
                self.close_slot(sub, slot);
            }
        }
        self.update_done();
    }

    /// True once shutdown was requested and every slot has emptied.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn connection_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn on_accept<S: Submit>(&mut self, sub: &mut S, outcome: Outcome) {
        match outcome {
            Outcome::Accepted(Ok(socket)) => {
                if self.shutdown_requested {
                    debug!("accepted during shutdown, closing");
                    sub.close(socket);
                    return;
                }
                self.add_connection(sub, socket);
                self.submit_accept(sub);
            }
            Outcome::Accepted(Err(e)) => {
                debug!("accept failed: {}", e);
                if !self.shutdown_requested {
                    self.submit_accept(sub);
                }
            }
            other => {
                warn!("unexpected completion for the accept token: {:?}", other);
            }
        }
    }

    fn add_connection<S: Submit>(&mut self, sub: &mut S, socket: Socket) {
        let slot = match self.slots.iter().position(|s| s.is_none()) {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let handler = (self.factory)(slot);
        let mut conn = ServerConn::new(slot, socket, handler, &self.config);
        trace!("slot {}: connection accepted", slot);

        if let Err(e) = conn.handler.on_start() {
            debug!("slot {}: handler refused the connection: {}", slot, e);
            sub.close(socket);
            return;
        }

        conn.submit_recv_headers(sub, &self.config);
        self.slots[slot] = Some(conn);
    }

    fn submit_accept<S: Submit>(&mut self, sub: &mut S) {
        sub.submit(Submission {
            token: Token::ACCEPT,
            op: Op::Accept {
                listener: self.listener,
            },
        });
    }

    fn close_slot<S: Submit>(&mut self, sub: &mut S, slot: usize) {
        if let Some(conn) = self.slots[slot].take() {
            trace!("slot {}: closed", slot);
            sub.close(conn.socket);
        }
        self.update_done();
    }

    fn update_done(&mut self) {
        if self.shutdown_requested && self.slots.iter().all(Option::is_none) {
            self.done = true;
        }
    }
}
