//! Client side of the http/1.x protocol core.
//!
//! One request is outstanding at a time: connect, send the request bytes,
//! read the response head, then pull body fragments until the last one.
//! The reactor delivers completions to [`Client::handle`], which answers
//! with an [`Event`] whenever a phase finishes.
//!
//! # Example
//!
//! ```rust,ignore
//! use ring_h1::client::{Client, ClientConfig, Event};
//!
//! let mut client = Client::new(ClientConfig::default(), Token(7))?;
//! client.connect(&mut ring, socket, addr)?;
//! loop {
//!     let completion = ring.wait();
//!     match client.handle(&mut ring, completion)? {
//!         Some(Event::Connected) => client.send_full(&mut ring, request_bytes)?,
//!         Some(Event::Sent) => client.recv_response_header(&mut ring)?,
//!         Some(Event::ResponseHeaders(res)) => println!("{}", res.status()),
//!         Some(Event::ContentFragment { chunk, is_last }) => { /* consume */ }
//!         None => {}
//!     }
//! }
//! ```

use crate::body::BodyProgress;
use crate::buffer::RecvBuf;
use crate::http11::RecvResponse;
use crate::scan::ResponseHeadScanner;
use crate::submit::{Completion, Op, Outcome, Socket, Submission, Submit, Token};
use crate::Error;
use std::net::SocketAddr;
use std::time::Duration;

/// Client tuning. Validated by [`Client::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    /// Initial response header buffer, also the growth step.
    pub response_header_buf_ini_len: usize,
    /// Cap on response header buffer growth.
    pub response_header_buf_max_len: usize,
    pub send_buf_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(60),
            recv_timeout: Duration::from_secs(60),
            response_header_buf_ini_len: 1024,
            response_header_buf_max_len: 65_536,
            send_buf_len: 8192,
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.response_header_buf_ini_len == 0 {
            return Err(Error::User("response_header_buf_ini_len must be > 0".into()));
        }
        if self.response_header_buf_max_len < self.response_header_buf_ini_len {
            return Err(Error::User(
                "response_header_buf_max_len must be >= response_header_buf_ini_len".into(),
            ));
        }
        if self.send_buf_len == 0 {
            return Err(Error::User("send_buf_len must be > 0".into()));
        }
        Ok(())
    }
}

/// Phase completions reported by [`Client::handle`] and the synchronous
/// fragment path of [`Client::recv_response_content_fragment`].
#[derive(Debug)]
pub enum Event<'a> {
    Connected,
    /// The full request passed to `send_full` is on the wire.
    Sent,
    ResponseHeaders(RecvResponse<'a>),
    ContentFragment { chunk: &'a [u8], is_last: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Connecting,
    Idle,
    Sending,
    ReceivingHeaders,
    ReceivingContent,
    Closed,
}

/// An http/1.x client connection.
pub struct Client {
    config: ClientConfig,
    token: Token,
    socket: Option<Socket>,
    phase: Phase,
    scanner: ResponseHeadScanner,
    recv_buf: RecvBuf,
    head_len: usize,
    body: BodyProgress,
    /// Body bytes past the head already handed out as fragments.
    delivered: usize,
    send_buf: Option<Vec<u8>>,
    queued: usize,
    sent: usize,
}

impl Client {
    pub fn new(config: ClientConfig, token: Token) -> Result<Client, Error> {
        config.validate()?;
        let recv_buf = RecvBuf::with_size(config.response_header_buf_ini_len);
        let send_buf = Some(vec![0; config.send_buf_len]);
        Ok(Client {
            config,
            token,
            socket: None,
            phase: Phase::Disconnected,
            scanner: ResponseHeadScanner::new(),
            recv_buf,
            head_len: 0,
            body: BodyProgress::new(None),
            delivered: 0,
            send_buf,
            queued: 0,
            sent: 0,
        })
    }

    /// Connect `socket` to `addr`.
    pub fn connect<S: Submit>(
        &mut self,
        sub: &mut S,
        socket: Socket,
        addr: SocketAddr,
    ) -> Result<(), Error> {
        if self.phase != Phase::Disconnected {
            return Err(Error::User("connect on a used connection".into()));
        }

        trace!("connecting to {}", addr);
        self.socket = Some(socket);
        self.phase = Phase::Connecting;
        sub.submit(Submission {
            token: self.token,
            op: Op::Connect {
                socket,
                addr,
                timeout: self.config.connect_timeout,
            },
        });
        Ok(())
    }

    /// Copy the request bytes into the send buffer and transmit them all,
    /// resubmitting the unsent tail as partial sends complete.
    pub fn send_full<S: Submit>(&mut self, sub: &mut S, bytes: &[u8]) -> Result<(), Error> {
        if self.phase != Phase::Idle {
            return Err(Error::User("send_full while a phase is outstanding".into()));
        }
        if !self.body.is_complete() {
            return Err(Error::User("send_full before the response was fully read".into()));
        }

        {
            let buf = self.send_buf.as_mut().expect("send buffer lent while idle");
            if bytes.len() > buf.len() {
                return Err(Error::User(format!(
                    "request of {} bytes exceeds the send buffer ({})",
                    bytes.len(),
                    buf.len()
                )));
            }
            buf[..bytes.len()].copy_from_slice(bytes);
        }

        self.queued = bytes.len();
        self.sent = 0;
        self.head_len = 0;
        self.phase = Phase::Sending;
        self.submit_send(sub);
        Ok(())
    }

    /// Begin reading the next response head.
    pub fn recv_response_header<S: Submit>(&mut self, sub: &mut S) -> Result<(), Error> {
        if self.phase != Phase::Idle {
            return Err(Error::User("recv_response_header while a phase is outstanding".into()));
        }

        self.scanner.reset();
        self.recv_buf.reset();
        self.head_len = 0;
        self.delivered = 0;
        self.body = BodyProgress::new(None);
        self.phase = Phase::ReceivingHeaders;
        self.submit_recv(sub);
        Ok(())
    }

    /// Pull the next body fragment. Bytes already buffered behind the head
    /// are handed out without touching the reactor; otherwise a recv is
    /// submitted and the fragment arrives through [`Client::handle`].
    pub fn recv_response_content_fragment<S: Submit>(
        &mut self,
        sub: &mut S,
    ) -> Result<Option<Event<'_>>, Error> {
        match self.phase {
            Phase::ReceivingContent => {}
            // the response had no body, or it was already drained
            Phase::Idle if self.head_len > 0 => {
                return Ok(Some(Event::ContentFragment {
                    chunk: &[],
                    is_last: true,
                }));
            }
            _ => return Err(Error::User("no response content to read".into())),
        }

        if self.recv_buf.is_lent() {
            // a recv is already outstanding; the fragment will arrive
            // through handle()
            return Ok(None);
        }

        let pending = self.recv_buf.len() - self.head_len - self.delivered;
        if pending > 0 {
            return Ok(Some(self.deliver_fragment()));
        }

        // reclaim the space of fragments already handed out
        if self.delivered > 0 {
            self.recv_buf.truncate(self.head_len);
            self.delivered = 0;
        }
        if self.recv_buf.is_full() {
            self.grow_recv_buf()?;
        }
        self.submit_recv(sub);
        Ok(None)
    }

    /// True when the announced content-length has been read, or none was
    /// announced and the response ended with its head.
    pub fn fully_read_response_content(&self) -> bool {
        self.body.is_complete()
    }

    /// Close the connection.
    pub fn close<S: Submit>(&mut self, sub: &mut S) {
        if let Some(socket) = self.socket.take() {
            trace!("closing connection");
            sub.close(socket);
        }
        self.phase = Phase::Closed;
    }

    /// Dispatch one completion.
    pub fn handle<S: Submit>(
        &mut self,
        sub: &mut S,
        completion: Completion,
    ) -> Result<Option<Event<'_>>, Error> {
        let Completion { token, outcome } = completion;
        if token != self.token {
            debug!("dropping completion for foreign token {:?}", token);
            return Ok(None);
        }

        match outcome {
            Outcome::Connected(result) => {
                if self.phase != Phase::Connecting {
                    warn!("connect completion in phase {:?}", self.phase);
                    return Ok(None);
                }
                match result {
                    Ok(()) => {
                        trace!("connected");
                        self.phase = Phase::Idle;
                        Ok(Some(Event::Connected))
                    }
                    Err(e) => self.fail(sub, e),
                }
            }

            Outcome::Send { buf, result } => {
                if self.phase != Phase::Sending {
                    warn!("send completion in phase {:?}", self.phase);
                    return Ok(None);
                }
                self.send_buf = Some(buf);
                let sent_now = match result {
                    Ok(n) => n,
                    Err(e) => return self.fail(sub, e),
                };
                self.sent += sent_now;
                if self.sent < self.queued {
                    trace!("partial send, {} of {} bytes", self.sent, self.queued);
                    self.submit_send(sub);
                    return Ok(None);
                }
                self.phase = Phase::Idle;
                Ok(Some(Event::Sent))
            }

            Outcome::Recv { buf, result } => match self.phase {
                Phase::ReceivingHeaders => self.on_recv_headers(sub, buf, result),
                Phase::ReceivingContent => self.on_recv_content(sub, buf, result),
                _ => {
                    warn!("recv completion in phase {:?}", self.phase);
                    Ok(None)
                }
            },

            other => {
                warn!("unexpected completion {:?} in phase {:?}", other, self.phase);
                Ok(None)
            }
        }
    }

    fn on_recv_headers<S: Submit>(
        &mut self,
        sub: &mut S,
        buf: Vec<u8>,
        result: Result<usize, Error>,
    ) -> Result<Option<Event<'_>>, Error> {
        let received = match result {
            Ok(n) => n,
            Err(e) => {
                self.recv_buf.restore(buf, 0);
                return self.fail(sub, e);
            }
        };

        let old = self.recv_buf.len();
        self.recv_buf.restore(buf, received);

        if received == 0 {
            debug!("eof inside a response head after {} bytes", old);
            return self.fail(sub, Error::UnexpectedEof);
        }

        let scanned = self.scanner.scan(&self.recv_buf.filled()[old..]);

        match scanned {
            Ok(true) => self.on_head_complete(sub),

            Ok(false) => {
                if self.recv_buf.is_full() {
                    if let Err(e) = self.grow_recv_buf() {
                        return self.fail(sub, e);
                    }
                    trace!("response header buffer grown to {}", self.recv_buf.size());
                }
                self.submit_recv(sub);
                Ok(None)
            }

            Err(e) => {
                debug!("bad response head: {}", e);
                self.fail(sub, map_head_error(e))
            }
        }
    }

    fn on_head_complete<S: Submit>(&mut self, sub: &mut S) -> Result<Option<Event<'_>>, Error> {
        self.head_len = self.scanner.total();
        trace!("response head complete, {} bytes", self.head_len);

        let parsed = {
            RecvResponse::new(self.recv_buf.filled(), &self.scanner).map(|res| res.content_length())
        };
        let content_length = match parsed {
            Ok(content_length) => content_length,
            Err(e) => return self.fail(sub, map_head_error(e)),
        };

        self.body = BodyProgress::new(content_length);
        self.delivered = 0;
        self.phase = if self.body.is_complete() && self.recv_buf.len() == self.head_len {
            Phase::Idle
        } else {
            Phase::ReceivingContent
        };

        // invariant: the head was validated just above
        let response = RecvResponse::new(self.recv_buf.filled(), &self.scanner)
            .expect("response head no longer parses");
        Ok(Some(Event::ResponseHeaders(response)))
    }

    fn on_recv_content<S: Submit>(
        &mut self,
        sub: &mut S,
        buf: Vec<u8>,
        result: Result<usize, Error>,
    ) -> Result<Option<Event<'_>>, Error> {
        let received = match result {
            Ok(n) => n,
            Err(e) => {
                self.recv_buf.restore(buf, 0);
                return self.fail(sub, e);
            }
        };

        self.recv_buf.restore(buf, received);

        if received == 0 {
            debug!(
                "eof with {} body bytes outstanding",
                self.body.remaining()
            );
            return self.fail(sub, Error::UnexpectedEof);
        }

        Ok(Some(self.deliver_fragment()))
    }

    /// Hand out buffered body bytes past the head as one fragment.
    fn deliver_fragment(&mut self) -> Event<'_> {
        let pending = self.recv_buf.len() - self.head_len - self.delivered;
        let usable = (pending as u64).min(self.body.remaining()) as usize;

        self.body.add(usable);
        let is_last = self.body.is_complete();

        let start = self.head_len + self.delivered;
        self.delivered += usable;

        if is_last {
            self.phase = Phase::Idle;
        }

        let chunk = &self.recv_buf.filled()[start..start + usable];
        Event::ContentFragment { chunk, is_last }
    }

    fn grow_recv_buf(&mut self) -> Result<(), Error> {
        self.recv_buf.grow(
            self.config.response_header_buf_ini_len,
            self.config.response_header_buf_max_len,
        )
    }

    fn submit_recv<S: Submit>(&mut self, sub: &mut S) {
        let socket = self.socket.expect("recv without a socket");
        let offset = self.recv_buf.write_offset();
        let buf = self.recv_buf.lend();
        sub.submit(Submission {
            token: self.token,
            op: Op::Recv {
                socket,
                buf,
                offset,
                timeout: self.config.recv_timeout,
            },
        });
    }

    fn submit_send<S: Submit>(&mut self, sub: &mut S) {
        let socket = self.socket.expect("send without a socket");
        let buf = self.send_buf.take().expect("send buffer already lent");
        sub.submit(Submission {
            token: self.token,
            op: Op::Send {
                socket,
                buf,
                offset: self.sent,
                len: self.queued - self.sent,
                timeout: self.config.send_timeout,
            },
        });
    }

    fn fail<S: Submit, T>(&mut self, sub: &mut S, err: Error) -> Result<T, Error> {
        debug!("connection failed: {}", err);
        if let Some(socket) = self.socket.take() {
            sub.close(socket);
        }
        self.phase = Phase::Closed;
        Err(err)
    }
}

/// A response head that does not parse is the server's fault, not a bad
/// request; length and version problems keep their own kinds.
fn map_head_error(e: Error) -> Error {
    match e {
        Error::BadRequest | Error::InvalidField | Error::InvalidInput => Error::InvalidResponse,
        other => other,
    }
}
