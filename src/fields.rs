//! Zero-copy access to the header fields of a received message.
//!
//! The view borrows the receive buffer; nothing is copied out. Values are
//! exposed with their optional whitespace trimmed.

use crate::Error;

/// One `name: value` pair borrowed out of the header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'a [u8],
    pub value: &'a [u8],
}

/// Non-owning view over the header block of a received message.
///
/// The input slice must contain the blank line that terminates the block;
/// anything after it (typically the first body bytes) is reachable through
/// [`Fields::rest`].
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    lines: &'a [u8],
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    pub fn new(block: &'a [u8]) -> Result<Fields<'a>, Error> {
        let mut at = 0;
        loop {
            let line_end = at + find_crlf(&block[at..]).ok_or(Error::InvalidInput)?;
            if line_end == at {
                // blank line, headers end here
                return Ok(Fields {
                    lines: &block[..at],
                    rest: &block[at + 2..],
                });
            }
            at = line_end + 2;
        }
    }

    /// Iterate the fields in wire order.
    pub fn iter(&self) -> Iter<'a> {
        Iter {
            remaining: self.lines,
        }
    }

    /// Bytes following the terminating blank line.
    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }

    /// Value of the first field with the given name, trimmed.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.iter()
            .filter_map(|f| f.ok())
            .find(|f| f.name.eq_ignore_ascii_case(name.as_bytes()))
            .map(|f| f.value)
    }

    /// The body length announced by `content-length`.
    ///
    /// Absent headers are `Ok(None)`; a zero length is valid. The value
    /// must be plain decimal digits, and repeated headers must agree.
    pub fn content_length(&self) -> Result<Option<u64>, Error> {
        let mut found: Option<u64> = None;

        for field in self.iter() {
            let field = field?;
            if !field.name.eq_ignore_ascii_case(b"content-length") {
                continue;
            }

            let n = parse_decimal(field.value).ok_or(Error::InvalidContentLength)?;

            match found {
                Some(prev) if prev != n => return Err(Error::InvalidContentLength),
                _ => found = Some(n),
            }
        }

        Ok(found)
    }

    /// Case-insensitive comma-list membership test over every field with
    /// the given name.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        for field in self.iter() {
            let field = match field {
                Ok(f) => f,
                Err(_) => return false,
            };
            if !field.name.eq_ignore_ascii_case(name.as_bytes()) {
                continue;
            }
            for part in field.value.split(|&b| b == b',') {
                if trim_ows(part).eq_ignore_ascii_case(token.as_bytes()) {
                    return true;
                }
            }
        }
        false
    }

    /// Token scan over the `Connection` fields, for keep-alive decisions.
    pub fn has_connection_token(&self, token: &str) -> bool {
        self.has_token("connection", token)
    }
}

/// Iterator over the fields of a block.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Field<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        // invariant: the lines region consists of complete CRLF lines.
        let line_end = find_crlf(self.remaining).expect("header line without CRLF");

        let line = &self.remaining[..line_end];
        self.remaining = &self.remaining[line_end + 2..];

        let colon = match line.iter().position(|&b| b == b':') {
            Some(i) => i,
            None => {
                self.remaining = &[];
                return Some(Err(Error::InvalidField));
            }
        };

        Some(Ok(Field {
            name: &line[..colon],
            value: trim_ows(&line[colon + 1..]),
        }))
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 2 {
        return None;
    }
    bytes.windows(2).position(|w| w == b"\r\n")
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(n)
}
