#![no_main]
use libfuzzer_sys::fuzz_target;

use ring_h1::scan::RequestHeadScanner;
use std::mem;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // first byte picks the split point, the rest is the wire input
    let input = &data[1..];
    let split = (data[0] as usize).min(input.len());

    let mut whole = RequestHeadScanner::new();
    let whole_result = whole.scan(input);

    let mut parts = RequestHeadScanner::new();
    let parts_result = match parts.scan(&input[..split]) {
        Ok(true) => Ok(true),
        Ok(false) => parts.scan(&input[split..]),
        Err(e) => Err(e),
    };

    match (whole_result, parts_result) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a, b);
            assert_eq!(whole.total(), parts.total());
            if a {
                assert_eq!(whole.line().method_len(), parts.line().method_len());
                assert_eq!(whole.line().uri_start(), parts.line().uri_start());
                assert_eq!(whole.line().uri_len(), parts.line().uri_len());
                assert_eq!(whole.line().version_start(), parts.line().version_start());
                assert_eq!(whole.line().version_len(), parts.line().version_len());
            }
        }
        (Err(a), Err(b)) => {
            assert_eq!(mem::discriminant(&a), mem::discriminant(&b));
            assert_eq!(whole.total(), parts.total());
        }
        (a, b) => panic!("split changed the outcome: {:?} vs {:?}", a, b),
    }
});
