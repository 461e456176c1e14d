#![no_main]

use libfuzzer_sys::fuzz_target;

use controlgate::server::http::request::parse_request;

fuzz_target!(|data: &str| {
    // The request parser sees one raw read straight off the socket and
    // must never panic. Header keys it does produce are lower-cased and
    // the routing path carries no query string.
    if let Some(request) = parse_request(data) {
        assert!(!request.path.contains('?'));
        for key in request.headers.keys() {
            assert_eq!(key, &key.to_ascii_lowercase());
        }
    }
});
