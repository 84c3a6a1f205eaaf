#![allow(dead_code)]

use ring_h1::client::{Client, Event};
use ring_h1::http11::RecvRequest;
use ring_h1::server::{Handler, Responder, Server};
use ring_h1::submit::{Completion, Op, Outcome, Socket, Submission, Submit, Token};
use ring_h1::Error;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

/// Scripted reactor. Submissions queue up; tests complete them by hand or
/// through the drive helpers below.
pub struct MockRing {
    pub submissions: VecDeque<Submission>,
    pub closed: Vec<Socket>,
}

impl MockRing {
    pub fn new() -> Self {
        setup_logger();
        MockRing {
            submissions: VecDeque::new(),
            closed: Vec::new(),
        }
    }

    /// Pop the next queued submission.
    pub fn next(&mut self) -> Submission {
        self.submissions.pop_front().expect("no submission queued")
    }

    /// Remove the first queued submission for a connection slot.
    pub fn take_for_slot(&mut self, slot: usize) -> Submission {
        let at = self
            .submissions
            .iter()
            .position(|s| s.token == Token::slot(slot))
            .expect("no submission for slot");
        self.submissions.remove(at).unwrap()
    }

    pub fn has_for_slot(&self, slot: usize) -> bool {
        self.submissions.iter().any(|s| s.token == Token::slot(slot))
    }
}

impl Submit for MockRing {
    fn submit(&mut self, submission: Submission) {
        self.submissions.push_back(submission);
    }

    fn close(&mut self, socket: Socket) {
        self.closed.push(socket);
    }
}

pub fn setup_logger() {
    static START: Once = Once::new();
    START.call_once(|| {
        let test_log = std::env::var("TEST_LOG")
            .map(|x| x != "0" && x.to_lowercase() != "false")
            .unwrap_or(false);
        let level = if test_log {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        };
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Warn)
            .filter_module("ring_h1", level)
            .target(env_logger::Target::Stdout)
            .init();
    });
}

/// Everything the recording handlers observed, shared with the test body.
#[derive(Default)]
pub struct Stats {
    pub factory_calls: Vec<usize>,
    pub starts: usize,
    /// (method, uri, keep_alive) per parsed request.
    pub requests: Vec<(String, String, bool)>,
    pub content_lengths: Vec<Option<u64>>,
    /// (len, is_last) per body fragment callback.
    pub fragments: Vec<(usize, bool)>,
    /// Accumulated body bytes per request.
    pub bodies: Vec<Vec<u8>>,
    pub errors: Vec<String>,
}

/// Handler that records callbacks and answers every request with a fixed
/// response on the last body fragment.
pub struct RecordingHandler {
    pub stats: Rc<RefCell<Stats>>,
    pub response: Vec<u8>,
    pub fail_headers: bool,
    pub fail_body: bool,
    pub respond: bool,
}

impl Handler for RecordingHandler {
    fn on_start(&mut self) -> Result<(), Error> {
        self.stats.borrow_mut().starts += 1;
        Ok(())
    }

    fn on_request_headers(
        &mut self,
        req: &RecvRequest<'_>,
        _res: &mut Responder<'_>,
    ) -> Result<(), Error> {
        let mut stats = self.stats.borrow_mut();
        stats.requests.push((
            req.method().to_string(),
            String::from_utf8_lossy(req.uri()).into_owned(),
            req.is_keep_alive(),
        ));
        stats.content_lengths.push(req.content_length());
        stats.bodies.push(Vec::new());
        drop(stats);

        if self.fail_headers {
            return Err(Error::User("refused".into()));
        }
        Ok(())
    }

    fn on_body_fragment(
        &mut self,
        chunk: &[u8],
        is_last: bool,
        res: &mut Responder<'_>,
    ) -> Result<(), Error> {
        {
            let mut stats = self.stats.borrow_mut();
            stats.fragments.push((chunk.len(), is_last));
            stats.bodies.last_mut().unwrap().extend_from_slice(chunk);
        }

        if self.fail_body {
            return Err(Error::User("refused".into()));
        }
        if is_last && self.respond {
            res.send_full(&self.response, true)?;
        }
        Ok(())
    }

    fn on_error(&mut self, err: &Error) {
        self.stats.borrow_mut().errors.push(err.to_string());
    }
}

/// Factory for [`RecordingHandler`] connections sharing one [`Stats`].
pub fn recording_factory(
    stats: Rc<RefCell<Stats>>,
    response: &[u8],
) -> impl FnMut(usize) -> RecordingHandler {
    let response = response.to_vec();
    move |slot| {
        stats.borrow_mut().factory_calls.push(slot);
        RecordingHandler {
            stats: stats.clone(),
            response: response.clone(),
            fail_headers: false,
            fail_body: false,
            respond: true,
        }
    }
}

/// Deliver an accept completion for `socket`.
pub fn accept<F, H>(server: &mut Server<F, H>, ring: &mut MockRing, socket: Socket)
where
    F: FnMut(usize) -> H,
    H: Handler,
{
    let at = ring
        .submissions
        .iter()
        .position(|s| matches!(s.op, Op::Accept { .. }))
        .expect("no accept submission queued");
    let sub = ring.submissions.remove(at).unwrap();
    server.handle(
        ring,
        Completion {
            token: sub.token,
            outcome: Outcome::Accepted(Ok(socket)),
        },
    );
}

/// Feed `wire` to one connection in `chunk`-sized recv completions,
/// completing its sends in full, and collect everything it transmits.
/// Stops when the connection waits for bytes that are not there, or has
/// closed. With `eof`, a final zero-byte recv is delivered instead.
pub fn drive<F, H>(
    server: &mut Server<F, H>,
    ring: &mut MockRing,
    slot: usize,
    wire: &[u8],
    chunk: usize,
    eof: bool,
) -> Vec<u8>
where
    F: FnMut(usize) -> H,
    H: Handler,
{
    let token = Token::slot(slot);
    let mut out = Vec::new();
    let mut at = 0;

    loop {
        let next = ring.submissions.iter().position(|s| s.token == token);
        let sub = match next {
            Some(i) => ring.submissions.remove(i).unwrap(),
            None => break,
        };

        match sub.op {
            Op::Recv {
                socket,
                mut buf,
                offset,
                timeout,
            } => {
                let space = buf.len() - offset;
                let n = (wire.len() - at).min(chunk).min(space);

                if n == 0 && !eof {
                    // nothing left to feed; leave the recv outstanding
                    ring.submissions.push_front(Submission {
                        token: sub.token,
                        op: Op::Recv {
                            socket,
                            buf,
                            offset,
                            timeout,
                        },
                    });
                    break;
                }

                buf[offset..offset + n].copy_from_slice(&wire[at..at + n]);
                at += n;
                server.handle(
                    ring,
                    Completion {
                        token: sub.token,
                        outcome: Outcome::Recv { buf, result: Ok(n) },
                    },
                );
            }

            Op::Send {
                buf, offset, len, ..
            } => {
                out.extend_from_slice(&buf[offset..offset + len]);
                server.handle(
                    ring,
                    Completion {
                        token: sub.token,
                        outcome: Outcome::Send {
                            buf,
                            result: Ok(len),
                        },
                    },
                );
            }

            other => panic!("unexpected submission for slot {}: {:?}", slot, other),
        }
    }

    out
}

/// Complete the connection's outstanding recv or send with `Canceled`.
pub fn cancel<F, H>(server: &mut Server<F, H>, ring: &mut MockRing, slot: usize)
where
    F: FnMut(usize) -> H,
    H: Handler,
{
    let sub = ring.take_for_slot(slot);
    let outcome = match sub.op {
        Op::Recv { buf, .. } => Outcome::Recv {
            buf,
            result: Err(Error::Canceled),
        },
        Op::Send { buf, .. } => Outcome::Send {
            buf,
            result: Err(Error::Canceled),
        },
        other => panic!("cannot cancel {:?}", other),
    };
    server.handle(
        ring,
        Completion {
            token: sub.token,
            outcome,
        },
    );
}

/// Complete the client's outstanding recv with `data` (empty for EOF).
pub fn client_recv<'a>(
    client: &'a mut Client,
    ring: &mut MockRing,
    data: &[u8],
) -> Result<Option<Event<'a>>, Error> {
    let sub = ring.next();
    match sub.op {
        Op::Recv {
            mut buf, offset, ..
        } => {
            buf[offset..offset + data.len()].copy_from_slice(data);
            client.handle(
                ring,
                Completion {
                    token: sub.token,
                    outcome: Outcome::Recv {
                        buf,
                        result: Ok(data.len()),
                    },
                },
            )
        }
        other => panic!("expected a recv submission, got {:?}", other),
    }
}

/// Complete the client's outstanding sends, at most `n` bytes at a time,
/// until the full request is on the wire. Returns the transmitted bytes.
pub fn client_send_all(client: &mut Client, ring: &mut MockRing, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let sub = match ring.submissions.pop_front() {
            Some(sub) => sub,
            None => break,
        };
        match sub.op {
            Op::Send {
                buf, offset, len, ..
            } => {
                let step = len.min(n);
                out.extend_from_slice(&buf[offset..offset + step]);
                let event = client
                    .handle(
                        ring,
                        Completion {
                            token: sub.token,
                            outcome: Outcome::Send {
                                buf,
                                result: Ok(step),
                            },
                        },
                    )
                    .expect("send failed");
                if matches!(event, Some(Event::Sent)) {
                    break;
                }
            }
            other => panic!("expected a send submission, got {:?}", other),
        }
    }
    out
}
