//! Incremental scanners for the http/1.x message head.
//!
//! Each scanner is a small state machine fed the bytes of one logical
//! stream in arbitrary chunks. A call to `scan` consumes from the front of
//! the chunk and stops as soon as the terminal sentinel is recognized,
//! returning `Ok(true)` exactly once; the final state is the same for every
//! partition of the same input. Offsets recorded by a scanner are relative
//! to the start of the stream, which for this crate is always the start of
//! the receive buffer.
//!
//! Scanning again after completion is a caller bug and fails with
//! [`Error::BadRequest`].

use crate::chars;
use crate::Error;

/// Default bound on the request method token.
pub const DEFAULT_METHOD_MAX_LEN: usize = 32;

/// Default bound on the request URI.
pub const DEFAULT_URI_MAX_LEN: usize = 8192;

// Longest version text this layer can accept.
const VERSION_MAX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqLine {
    OnMethod,
    PostMethod,
    OnUri,
    PostUri,
    OnVersion,
    SeenCr,
    Done,
}

/// Scanner for `method SP uri SP version CRLF`.
#[derive(Debug)]
pub struct RequestLineScanner {
    state: ReqLine,
    total: usize,
    method_max_len: usize,
    uri_max_len: usize,
    method_len: usize,
    uri_start: usize,
    uri_len: usize,
    version_start: usize,
    version_len: usize,
}

impl RequestLineScanner {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_METHOD_MAX_LEN, DEFAULT_URI_MAX_LEN)
    }

    pub fn with_limits(method_max_len: usize, uri_max_len: usize) -> Self {
        RequestLineScanner {
            state: ReqLine::OnMethod,
            total: 0,
            method_max_len,
            uri_max_len,
            method_len: 0,
            uri_start: 0,
            uri_len: 0,
            version_start: 0,
            version_len: 0,
        }
    }

    /// Feed the next chunk. Returns true when the line is complete,
    /// leaving any bytes beyond the terminating LF unconsumed.
    pub fn scan(&mut self, chunk: &[u8]) -> Result<bool, Error> {
        if self.state == ReqLine::Done {
            return Err(Error::BadRequest);
        }

        for &b in chunk {
            self.total += 1;

            match self.state {
                ReqLine::OnMethod => {
                    if b == b' ' {
                        if self.method_len == 0 {
                            return Err(Error::BadRequest);
                        }
                        self.state = ReqLine::PostMethod;
                    } else if chars::is_tchar(b) {
                        if self.method_len == self.method_max_len {
                            return Err(Error::BadRequest);
                        }
                        self.method_len += 1;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                ReqLine::PostMethod => {
                    if b == b' ' || !chars::is_vchar(b) {
                        return Err(Error::BadRequest);
                    }
                    self.uri_start = self.total - 1;
                    self.uri_len = 1;
                    self.state = ReqLine::OnUri;
                }

                ReqLine::OnUri => {
                    if b == b' ' {
                        self.state = ReqLine::PostUri;
                    } else if b == b'\r' {
                        // request line without a version (http/0.9)
                        return Err(Error::HttpVersionNotSupported);
                    } else if chars::is_vchar(b) {
                        if self.uri_len == self.uri_max_len {
                            return Err(Error::UriTooLong);
                        }
                        self.uri_len += 1;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                ReqLine::PostUri => {
                    if b == b'\r' {
                        return Err(Error::HttpVersionNotSupported);
                    }
                    if b == b' ' || !chars::is_vchar(b) {
                        return Err(Error::BadRequest);
                    }
                    self.version_start = self.total - 1;
                    self.version_len = 1;
                    self.state = ReqLine::OnVersion;
                }

                ReqLine::OnVersion => {
                    if b == b'\r' {
                        self.state = ReqLine::SeenCr;
                    } else if chars::is_vchar(b) {
                        if self.version_len == VERSION_MAX_LEN {
                            return Err(Error::BadRequest);
                        }
                        self.version_len += 1;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                ReqLine::SeenCr => {
                    if b != b'\n' {
                        return Err(Error::BadRequest);
                    }
                    self.state = ReqLine::Done;
                    return Ok(true);
                }

                // unreachable: scan returns at the transition into Done
                ReqLine::Done => return Err(Error::BadRequest),
            }
        }

        Ok(false)
    }

    /// Bytes consumed across all chunks, including a byte that errored.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.state == ReqLine::Done
    }

    /// The method starts at offset 0.
    pub fn method_len(&self) -> usize {
        self.method_len
    }

    pub fn uri_start(&self) -> usize {
        self.uri_start
    }

    pub fn uri_len(&self) -> usize {
        self.uri_len
    }

    pub fn version_start(&self) -> usize {
        self.version_start
    }

    pub fn version_len(&self) -> usize {
        self.version_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLine {
    OnVersion,
    PostVersion,
    OnCode,
    AfterCode,
    OnReason,
    SeenCr,
    Done,
}

/// Scanner for `version SP status-code SP reason-phrase CRLF`.
///
/// The status code is exactly three digits. The reason phrase may be
/// empty, with or without the separating space.
#[derive(Debug)]
pub struct StatusLineScanner {
    state: StatusLine,
    total: usize,
    version_len: usize,
    code_start: usize,
    digits: usize,
    reason_start: usize,
    reason_len: usize,
}

impl StatusLineScanner {
    pub fn new() -> Self {
        StatusLineScanner {
            state: StatusLine::OnVersion,
            total: 0,
            version_len: 0,
            code_start: 0,
            digits: 0,
            reason_start: 0,
            reason_len: 0,
        }
    }

    pub fn scan(&mut self, chunk: &[u8]) -> Result<bool, Error> {
        if self.state == StatusLine::Done {
            return Err(Error::BadRequest);
        }

        for &b in chunk {
            self.total += 1;

            match self.state {
                StatusLine::OnVersion => {
                    if b == b' ' {
                        if self.version_len == 0 {
                            return Err(Error::BadRequest);
                        }
                        self.state = StatusLine::PostVersion;
                    } else if chars::is_vchar(b) {
                        if self.version_len == VERSION_MAX_LEN {
                            return Err(Error::BadRequest);
                        }
                        self.version_len += 1;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                StatusLine::PostVersion => {
                    if !b.is_ascii_digit() {
                        return Err(Error::BadRequest);
                    }
                    self.code_start = self.total - 1;
                    self.digits = 1;
                    self.state = StatusLine::OnCode;
                }

                StatusLine::OnCode => {
                    if !b.is_ascii_digit() {
                        return Err(Error::BadRequest);
                    }
                    self.digits += 1;
                    if self.digits == 3 {
                        self.state = StatusLine::AfterCode;
                    }
                }

                StatusLine::AfterCode => {
                    if b == b' ' {
                        self.reason_start = self.total;
                        self.state = StatusLine::OnReason;
                    } else if b == b'\r' {
                        self.reason_start = self.total - 1;
                        self.state = StatusLine::SeenCr;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                StatusLine::OnReason => {
                    if b == b'\r' {
                        self.state = StatusLine::SeenCr;
                    } else if chars::is_vchar(b) || chars::is_ows(b) {
                        self.reason_len += 1;
                    } else {
                        return Err(Error::BadRequest);
                    }
                }

                StatusLine::SeenCr => {
                    if b != b'\n' {
                        return Err(Error::BadRequest);
                    }
                    self.state = StatusLine::Done;
                    return Ok(true);
                }

                StatusLine::Done => return Err(Error::BadRequest),
            }
        }

        Ok(false)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.state == StatusLine::Done
    }

    /// The version starts at offset 0.
    pub fn version_len(&self) -> usize {
        self.version_len
    }

    /// Offset of the three status digits.
    pub fn code_start(&self) -> usize {
        self.code_start
    }

    pub fn reason_start(&self) -> usize {
        self.reason_start
    }

    pub fn reason_len(&self) -> usize {
        self.reason_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    LineStart,
    OnName,
    OnValue,
    SeenCr,
    AlmostDone,
    Done,
}

/// Scanner for a block of `field-name ":" OWS field-value OWS CRLF` lines
/// terminated by a blank line.
///
/// Obsolete line folding is not supported, and a space between the field
/// name and the colon is rejected outright.
#[derive(Debug)]
pub struct HeaderScanner {
    state: Block,
    total: usize,
}

impl HeaderScanner {
    pub fn new() -> Self {
        HeaderScanner {
            state: Block::LineStart,
            total: 0,
        }
    }

    pub fn scan(&mut self, chunk: &[u8]) -> Result<bool, Error> {
        if self.state == Block::Done {
            return Err(Error::BadRequest);
        }

        for &b in chunk {
            self.total += 1;

            match self.state {
                Block::LineStart => {
                    if b == b'\r' {
                        self.state = Block::AlmostDone;
                    } else if chars::is_tchar(b) {
                        self.state = Block::OnName;
                    } else {
                        // empty field name, obs-fold, or stray control byte
                        return Err(Error::BadRequest);
                    }
                }

                Block::OnName => {
                    if b == b':' {
                        self.state = Block::OnValue;
                    } else if !chars::is_tchar(b) {
                        return Err(Error::BadRequest);
                    }
                }

                Block::OnValue => {
                    if b == b'\r' {
                        self.state = Block::SeenCr;
                    } else if !chars::is_field_vchar(b) && !chars::is_ows(b) {
                        return Err(Error::BadRequest);
                    }
                }

                Block::SeenCr => {
                    if b != b'\n' {
                        return Err(Error::BadRequest);
                    }
                    self.state = Block::LineStart;
                }

                Block::AlmostDone => {
                    if b != b'\n' {
                        return Err(Error::BadRequest);
                    }
                    self.state = Block::Done;
                    return Ok(true);
                }

                Block::Done => return Err(Error::BadRequest),
            }
        }

        Ok(false)
    }

    /// Bytes consumed, up to and including the terminating blank line.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.state == Block::Done
    }
}

/// Request line followed by its header block.
///
/// Bytes left over from the chunk that completes the request line are fed
/// straight to the header-block scanner, so the caller never sees the seam.
#[derive(Debug)]
pub struct RequestHeadScanner {
    line: RequestLineScanner,
    block: HeaderScanner,
    in_block: bool,
}

impl RequestHeadScanner {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_METHOD_MAX_LEN, DEFAULT_URI_MAX_LEN)
    }

    pub fn with_limits(method_max_len: usize, uri_max_len: usize) -> Self {
        RequestHeadScanner {
            line: RequestLineScanner::with_limits(method_max_len, uri_max_len),
            block: HeaderScanner::new(),
            in_block: false,
        }
    }

    pub fn scan(&mut self, chunk: &[u8]) -> Result<bool, Error> {
        let mut rest = chunk;

        if !self.in_block {
            let before = self.line.total();
            if !self.line.scan(rest)? {
                return Ok(false);
            }
            rest = &rest[self.line.total() - before..];
            self.in_block = true;
        }

        self.block.scan(rest)
    }

    /// Bytes consumed, up to and including the terminal blank line.
    pub fn total(&self) -> usize {
        self.line.total() + self.block.total()
    }

    pub fn is_done(&self) -> bool {
        self.block.is_done()
    }

    pub fn line(&self) -> &RequestLineScanner {
        &self.line
    }

    /// Prepare for the next request of a reused connection.
    pub fn reset(&mut self) {
        self.line = RequestLineScanner::with_limits(self.line.method_max_len, self.line.uri_max_len);
        self.block = HeaderScanner::new();
        self.in_block = false;
    }
}

/// Status line followed by its header block.
#[derive(Debug)]
pub struct ResponseHeadScanner {
    line: StatusLineScanner,
    block: HeaderScanner,
    in_block: bool,
}

impl ResponseHeadScanner {
    pub fn new() -> Self {
        ResponseHeadScanner {
            line: StatusLineScanner::new(),
            block: HeaderScanner::new(),
            in_block: false,
        }
    }

    pub fn scan(&mut self, chunk: &[u8]) -> Result<bool, Error> {
        let mut rest = chunk;

        if !self.in_block {
            let before = self.line.total();
            if !self.line.scan(rest)? {
                return Ok(false);
            }
            rest = &rest[self.line.total() - before..];
            self.in_block = true;
        }

        self.block.scan(rest)
    }

    pub fn total(&self) -> usize {
        self.line.total() + self.block.total()
    }

    pub fn is_done(&self) -> bool {
        self.block.is_done()
    }

    pub fn line(&self) -> &StatusLineScanner {
        &self.line
    }

    /// Prepare for the next response of a reused connection.
    pub fn reset(&mut self) {
        self.line = StatusLineScanner::new();
        self.block = HeaderScanner::new();
        self.in_block = false;
    }
}
