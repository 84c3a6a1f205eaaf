//! Byte classification for the http/1.x grammar.
//!
//! Each predicate tests membership in one of the character classes of
//! RFC 7230 / RFC 9110, using 256-bit sets computed at compile time.

type ByteSet = [u64; 4];

// https://tools.ietf.org/html/rfc7230#section-3.2.6
// tchar = "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" / "-" / "." /
//         "^" / "_" / "`" / "|" / "~" / DIGIT / ALPHA
// i.e. any VCHAR, except delimiters.
const DELIMS: &[u8] = b"\"(),/:;<=>?@[\\]{}";

const TCHAR: ByteSet = tchar_set();
const DELIM: ByteSet = delim_set();
const VCHAR: ByteSet = range_set(0x21, 0x7e);
const OBS_TEXT: ByteSet = range_set(0x80, 0xff);
const FIELD_VCHAR: ByteSet = union(VCHAR, OBS_TEXT);
const QDTEXT: ByteSet = qdtext_set();
const QUOTED_PAIR: ByteSet = quoted_pair_set();

const fn add(mut set: ByteSet, b: u8) -> ByteSet {
    set[(b >> 6) as usize] |= 1 << (b & 63);
    set
}

const fn union(a: ByteSet, b: ByteSet) -> ByteSet {
    [a[0] | b[0], a[1] | b[1], a[2] | b[2], a[3] | b[3]]
}

const fn range_set(lo: u8, hi: u8) -> ByteSet {
    let mut set = [0; 4];
    let mut b = lo;
    loop {
        set = add(set, b);
        if b == hi {
            break;
        }
        b += 1;
    }
    set
}

const fn delim_set() -> ByteSet {
    let mut set = [0; 4];
    let mut i = 0;
    while i < DELIMS.len() {
        set = add(set, DELIMS[i]);
        i += 1;
    }
    set
}

const fn tchar_set() -> ByteSet {
    let delim = delim_set();
    let vchar = range_set(0x21, 0x7e);
    [
        vchar[0] & !delim[0],
        vchar[1] & !delim[1],
        vchar[2] & !delim[2],
        vchar[3] & !delim[3],
    ]
}

// qdtext = HTAB / SP / %x21 / %x23-5B / %x5D-7E / obs-text
const fn qdtext_set() -> ByteSet {
    let mut set = union(range_set(0x23, 0x5b), range_set(0x5d, 0x7e));
    set = union(set, range_set(0x80, 0xff));
    set = add(set, b'\t');
    set = add(set, b' ');
    add(set, 0x21)
}

// quoted-pair = "\" ( HTAB / SP / VCHAR / obs-text ); this set is the
// characters allowed after the backslash.
const fn quoted_pair_set() -> ByteSet {
    let mut set = union(range_set(0x21, 0x7e), range_set(0x80, 0xff));
    set = add(set, b'\t');
    add(set, b' ')
}

#[inline(always)]
fn contains(set: &ByteSet, b: u8) -> bool {
    set[(b >> 6) as usize] & (1 << (b & 63)) != 0
}

/// Token character, legal in methods and field names.
#[inline(always)]
pub fn is_tchar(b: u8) -> bool {
    contains(&TCHAR, b)
}

/// One of the delimiters separating tokens in field values.
#[inline(always)]
pub fn is_delim(b: u8) -> bool {
    contains(&DELIM, b)
}

/// Visible USASCII character.
#[inline(always)]
pub fn is_vchar(b: u8) -> bool {
    contains(&VCHAR, b)
}

/// Opaque high-bit data tolerated in field values.
#[inline(always)]
pub fn is_obs_text(b: u8) -> bool {
    contains(&OBS_TEXT, b)
}

/// Character legal inside a field value.
#[inline(always)]
pub fn is_field_vchar(b: u8) -> bool {
    contains(&FIELD_VCHAR, b)
}

/// Optional whitespace, space or horizontal tab.
#[inline(always)]
pub fn is_ows(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Character legal inside a quoted string without escaping.
#[inline(always)]
pub fn is_qdtext(b: u8) -> bool {
    contains(&QDTEXT, b)
}

/// Character legal after the backslash of a quoted pair.
#[inline(always)]
pub fn is_quoted_pair(b: u8) -> bool {
    contains(&QUOTED_PAIR, b)
}
