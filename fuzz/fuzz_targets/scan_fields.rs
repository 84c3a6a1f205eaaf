#![no_main]
use libfuzzer_sys::fuzz_target;

use ring_h1::fields::Fields;

fuzz_target!(|data: &[u8]| {
    let mut block = data.to_vec();
    block.extend_from_slice(b"\r\n\r\n");

    if let Ok(fields) = Fields::new(&block) {
        for field in fields.iter() {
            if field.is_err() {
                break;
            }
        }
        let _ = fields.content_length();
        let _ = fields.has_connection_token("keep-alive");
        let _ = fields.rest();
    }
});
