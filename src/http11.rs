//! Typed views over scanned message heads, and head serialization.

use crate::fields::Fields;
use crate::scan::{RequestHeadScanner, ResponseHeadScanner};
use crate::Error;
use std::fmt;
use std::io;
use std::io::Write;

/// Request method.
///
/// Any token that is not one of the canonical methods is carried verbatim
/// as [`Method::Custom`]. Round-trips through its text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method<'a> {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Custom(&'a [u8]),
}

impl<'a> Method<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Method<'a> {
        match bytes {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            b"POST" => Method::Post,
            b"PUT" => Method::Put,
            b"DELETE" => Method::Delete,
            b"CONNECT" => Method::Connect,
            b"OPTIONS" => Method::Options,
            b"TRACE" => Method::Trace,
            b"PATCH" => Method::Patch,
            _ => Method::Custom(bytes),
        }
    }

    pub fn as_bytes(self) -> &'a [u8] {
        match self {
            Method::Get => b"GET",
            Method::Head => b"HEAD",
            Method::Post => b"POST",
            Method::Put => b"PUT",
            Method::Delete => b"DELETE",
            Method::Connect => b"CONNECT",
            Method::Options => b"OPTIONS",
            Method::Trace => b"TRACE",
            Method::Patch => b"PATCH",
            Method::Custom(bytes) => bytes,
        }
    }
}

impl fmt::Display for Method<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Protocol version of a message.
///
/// Only 1.0 and 1.1 are handled by this layer; everything else parses to
/// [`Version::Other`] and is rejected by the connection logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
    Other(u8, u8),
}

impl Version {
    pub fn from_bytes(bytes: &[u8]) -> Result<Version, Error> {
        match bytes {
            b"HTTP/1.1" => return Ok(Version::Http11),
            b"HTTP/1.0" => return Ok(Version::Http10),
            _ => {}
        }

        let rest = match bytes.strip_prefix(b"HTTP/") {
            Some(rest) => rest,
            None => return Err(Error::BadRequest),
        };

        match rest {
            &[major] if major.is_ascii_digit() => Ok(Version::Other(major - b'0', 0)),
            &[major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
                Ok(Version::Other(major - b'0', minor - b'0'))
            }
            _ => Err(Error::BadRequest),
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Version::Http10 | Version::Http11)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Version::Http10 => write!(f, "HTTP/1.0"),
            Version::Http11 => write!(f, "HTTP/1.1"),
            Version::Other(major, minor) => write!(f, "HTTP/{}.{}", major, minor),
        }
    }
}

/// Response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const URI_TOO_LONG: StatusCode = StatusCode(414);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const HTTP_VERSION_NOT_SUPPORTED: StatusCode = StatusCode(505);

    /// Parse from exactly three ASCII digits.
    pub fn from_digits(digits: &[u8]) -> Result<StatusCode, Error> {
        if digits.len() != 3 || !digits.iter().all(u8::is_ascii_digit) {
            return Err(Error::BadRequest);
        }
        let code = digits.iter().fold(0_u16, |n, d| n * 10 + (d - b'0') as u16);
        Ok(StatusCode(code))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Canonical reason phrase of the well-known codes.
    pub fn reason(self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keep-alive decision from the version and the `Connection` tokens.
///
/// HTTP/1.1 defaults to keep-alive unless a `close` token is present;
/// HTTP/1.0 defaults to close unless a `keep-alive` token is present.
pub fn is_keep_alive(version: Version, fields: &Fields<'_>) -> Result<bool, Error> {
    match version {
        Version::Http11 => Ok(!fields.has_connection_token("close")),
        Version::Http10 => Ok(fields.has_connection_token("keep-alive")),
        Version::Other(..) => Err(Error::HttpVersionNotSupported),
    }
}

/// Borrowed view of a fully received request head.
#[derive(Debug, Clone, Copy)]
pub struct RecvRequest<'a> {
    head: &'a [u8],
    method: Method<'a>,
    uri: &'a [u8],
    version: Version,
    fields: Fields<'a>,
    content_length: Option<u64>,
    keep_alive: bool,
}

impl<'a> RecvRequest<'a> {
    /// Assemble the view. `buf` must hold at least the bytes the scanner
    /// consumed, starting where the scanner started.
    pub fn new(buf: &'a [u8], scanner: &RequestHeadScanner) -> Result<RecvRequest<'a>, Error> {
        let line = scanner.line();
        let head = &buf[..scanner.total()];

        let method = Method::from_bytes(&head[..line.method_len()]);
        let uri = &head[line.uri_start()..line.uri_start() + line.uri_len()];
        let version =
            Version::from_bytes(&head[line.version_start()..line.version_start() + line.version_len()])?;

        let fields = Fields::new(&head[line.total()..])?;
        let keep_alive = is_keep_alive(version, &fields)?;
        let content_length = fields.content_length()?;

        Ok(RecvRequest {
            head,
            method,
            uri,
            version,
            fields,
            content_length,
            keep_alive,
        })
    }

    pub fn method(&self) -> Method<'a> {
        self.method
    }

    pub fn uri(&self) -> &'a [u8] {
        self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn fields(&self) -> &Fields<'a> {
        &self.fields
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn head_len(&self) -> usize {
        self.head.len()
    }
}

/// Borrowed view of a fully received response head.
#[derive(Debug, Clone, Copy)]
pub struct RecvResponse<'a> {
    head: &'a [u8],
    version: Version,
    status: StatusCode,
    reason: &'a [u8],
    fields: Fields<'a>,
    content_length: Option<u64>,
}

impl<'a> RecvResponse<'a> {
    pub fn new(buf: &'a [u8], scanner: &ResponseHeadScanner) -> Result<RecvResponse<'a>, Error> {
        let line = scanner.line();
        let head = &buf[..scanner.total()];

        let version = Version::from_bytes(&head[..line.version_len()])?;
        let status = StatusCode::from_digits(&head[line.code_start()..line.code_start() + 3])?;
        let reason = &head[line.reason_start()..line.reason_start() + line.reason_len()];

        let fields = Fields::new(&head[line.total()..])?;
        let content_length = fields.content_length()?;

        Ok(RecvResponse {
            head,
            version,
            status,
            reason,
            fields,
            content_length,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &'a [u8] {
        self.reason
    }

    pub fn fields(&self) -> &Fields<'a> {
        &self.fields
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn head_len(&self) -> usize {
        self.head.len()
    }
}

/// Write a request head into a buffer. Returns the bytes written.
#[allow(clippy::write_with_newline)]
pub fn write_request_head(
    buf: &mut [u8],
    method: Method,
    uri: &[u8],
    version: Version,
    headers: &[(&str, &str)],
) -> Result<usize, Error> {
    let mut w = io::Cursor::new(buf);

    w.write_all(method.as_bytes())?;
    w.write_all(b" ")?;
    w.write_all(uri)?;
    write!(w, " {}\r\n", version)?;

    for (name, value) in headers {
        write!(w, "{}: {}\r\n", name, value)?;
    }
    write!(w, "\r\n")?;

    let len = w.position() as usize;

    debug!(
        "write_request_head: {:?}",
        String::from_utf8_lossy(&w.into_inner()[..len])
    );

    Ok(len)
}

/// Write a minimal error response head, close-delimited and bodyless.
/// Returns the bytes written.
#[allow(clippy::write_with_newline)]
pub fn write_error_response(buf: &mut [u8], status: StatusCode) -> Result<usize, Error> {
    let mut w = io::Cursor::new(buf);

    write!(w, "HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason())?;
    write!(w, "content-length: 0\r\n")?;
    write!(w, "connection: close\r\n\r\n")?;

    Ok(w.position() as usize)
}
