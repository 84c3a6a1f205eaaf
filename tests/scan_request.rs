use ring_h1::scan::{RequestHeadScanner, RequestLineScanner};
use ring_h1::Error;

mod common;

const SIMPLE_GET: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

#[test]
fn request_line_offsets() {
    let mut scan = RequestLineScanner::new();

    let done = scan.scan(b"GET / HTTP/1.1\r\n").unwrap();

    assert!(done);
    assert_eq!(scan.total(), 16);
    assert_eq!(scan.method_len(), 3);
    assert_eq!(scan.uri_start(), 4);
    assert_eq!(scan.uri_len(), 1);
    assert_eq!(scan.version_start(), 6);
    assert_eq!(scan.version_len(), 8);
}

#[test]
fn request_line_leaves_excess_bytes() {
    let mut scan = RequestLineScanner::new();

    let done = scan.scan(b"GET / HTTP/1.1\r\nHost: example").unwrap();

    assert!(done);
    assert_eq!(scan.total(), 16);
}

#[test]
fn simple_get_head() {
    let mut scan = RequestHeadScanner::new();

    let done = scan.scan(SIMPLE_GET).unwrap();

    assert!(done);
    assert_eq!(scan.total(), SIMPLE_GET.len());
    assert_eq!(scan.line().method_len(), 3);
    assert_eq!(scan.line().uri_start(), 4);
    assert_eq!(scan.line().uri_len(), 1);
}

#[test]
fn byte_at_a_time_matches_one_chunk() {
    let mut whole = RequestHeadScanner::new();
    assert!(whole.scan(SIMPLE_GET).unwrap());

    let mut single = RequestHeadScanner::new();
    let mut done = false;
    for b in SIMPLE_GET {
        assert!(!done, "completed before the last byte");
        done = single.scan(std::slice::from_ref(b)).unwrap();
    }

    assert!(done);
    assert_eq!(single.total(), whole.total());
    assert_eq!(single.line().method_len(), whole.line().method_len());
    assert_eq!(single.line().uri_start(), whole.line().uri_start());
    assert_eq!(single.line().uri_len(), whole.line().uri_len());
    assert_eq!(single.line().version_start(), whole.line().version_start());
    assert_eq!(single.line().version_len(), whole.line().version_len());
}

#[test]
fn every_two_way_split_agrees() {
    let input = b"POST /upload HTTP/1.0\r\nhost: a\r\ncontent-length: 3\r\n\r\n";

    for cut in 0..=input.len() {
        let mut scan = RequestHeadScanner::new();
        let mut done = scan.scan(&input[..cut]).unwrap();
        if !done {
            done = scan.scan(&input[cut..]).unwrap();
        }
        assert!(done, "split at {} did not complete", cut);
        assert_eq!(scan.total(), input.len(), "split at {}", cut);
        assert_eq!(scan.line().method_len(), 4);
        assert_eq!(scan.line().uri_start(), 5);
        assert_eq!(scan.line().uri_len(), 7);
    }
}

#[test]
fn empty_chunks_are_harmless() {
    let mut scan = RequestHeadScanner::new();
    assert!(!scan.scan(b"").unwrap());
    assert!(!scan.scan(b"GET / ").unwrap());
    assert!(!scan.scan(b"").unwrap());
    assert!(scan.scan(b"HTTP/1.1\r\n\r\n").unwrap());
}

#[test]
fn scan_after_done_is_an_error() {
    let mut scan = RequestHeadScanner::new();
    assert!(scan.scan(SIMPLE_GET).unwrap());

    assert!(matches!(scan.scan(b"x"), Err(Error::BadRequest)));
    assert!(matches!(scan.scan(b""), Err(Error::BadRequest)));
}

#[test]
fn method_over_limit_fails_at_the_offending_byte() {
    let mut scan = RequestLineScanner::with_limits(7, 8192);

    let err = scan.scan(b"PURGE_ALL / HTTP/1.1\r\n\r\n").unwrap_err();

    assert!(matches!(err, Error::BadRequest));
    assert_eq!(scan.total(), 8);
}

#[test]
fn uri_over_limit_is_uri_too_long() {
    let mut scan = RequestLineScanner::with_limits(32, 10);

    let err = scan.scan(b"GET /aaaaaaaaaaaaaaa HTTP/1.1\r\n").unwrap_err();

    assert!(matches!(err, Error::UriTooLong));
    // method, space, then ten uri bytes accepted; the eleventh errors
    assert_eq!(scan.total(), 15);
}

#[test]
fn http09_style_line_is_version_not_supported() {
    let mut scan = RequestLineScanner::new();
    let err = scan.scan(b"GET /\r\n").unwrap_err();
    assert!(matches!(err, Error::HttpVersionNotSupported));

    // same with a trailing space before the CR
    let mut scan = RequestLineScanner::new();
    let err = scan.scan(b"GET / \r\n").unwrap_err();
    assert!(matches!(err, Error::HttpVersionNotSupported));
}

#[test]
fn double_space_is_rejected() {
    let mut scan = RequestLineScanner::new();
    assert!(matches!(
        scan.scan(b"GET  / HTTP/1.1\r\n"),
        Err(Error::BadRequest)
    ));

    let mut scan = RequestLineScanner::new();
    assert!(matches!(
        scan.scan(b"GET /  HTTP/1.1\r\n"),
        Err(Error::BadRequest)
    ));
}

#[test]
fn version_longer_than_http11_is_rejected() {
    let mut scan = RequestLineScanner::new();
    assert!(matches!(
        scan.scan(b"GET / HTTP/1.12\r\n"),
        Err(Error::BadRequest)
    ));
}

#[test]
fn cr_without_lf_is_rejected() {
    let mut scan = RequestLineScanner::new();
    assert!(matches!(
        scan.scan(b"GET / HTTP/1.1\rX"),
        Err(Error::BadRequest)
    ));
}

#[test]
fn empty_method_is_rejected() {
    let mut scan = RequestLineScanner::new();
    assert!(matches!(scan.scan(b" / HTTP/1.1\r\n"), Err(Error::BadRequest)));
}

#[test]
fn delimiters_in_method_are_rejected() {
    let mut scan = RequestLineScanner::new();
    assert!(matches!(scan.scan(b"GE(T / HTTP/1.1\r\n"), Err(Error::BadRequest)));
}

#[test]
fn error_state_is_stable_across_fragmentation() {
    // the same bad input must fail identically however it is split
    let input = b"GET  / HTTP/1.1\r\n";

    for cut in 0..=input.len() {
        let mut scan = RequestLineScanner::new();
        let first = scan.scan(&input[..cut]);
        let result = match first {
            Ok(false) => scan.scan(&input[cut..]),
            other => other,
        };
        assert!(matches!(result, Err(Error::BadRequest)), "split at {}", cut);
        assert_eq!(scan.total(), 5, "split at {}", cut);
    }
}
