//! Minimal HTTP/1.1 request parsing
//!
//! Parses the single-read request buffer the server hands us: header block
//! split from the body at the blank line, request line into method and
//! path (query string stripped for routing), header lines into a
//! lower-cased map. The HTTP version is accepted but not enforced, and the
//! body length is whatever was read -- not `Content-Length`.

use std::collections::HashMap;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Parse a raw request. Returns `None` when even the request line is
/// unusable; missing headers or body are not errors.
pub fn parse_request(raw: &str) -> Option<HttpRequest> {
    let (header_section, body) = match raw.find("\r\n\r\n") {
        Some(idx) => (&raw[..idx], &raw[idx + 4..]),
        None => (raw, ""),
    };

    let mut lines = header_section.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_ascii_uppercase();
    let raw_path = parts.next()?;

    // Query string is stripped for routing purposes only.
    let path = match raw_path.find('?') {
        Some(idx) => &raw_path[..idx],
        None => raw_path,
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some(idx) = line.find(':') {
            let key = line[..idx].trim().to_ascii_lowercase();
            let value = line[idx + 1..].trim().to_string();
            // Last occurrence wins on duplicates.
            headers.insert(key, value);
        }
    }

    Some(HttpRequest {
        method,
        path: path.to_string(),
        headers,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_post_with_body() {
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\
                   Host: localhost:9090\r\n\
                   Content-Type: application/json\r\n\
                   Authorization: Bearer secret\r\n\
                   \r\n\
                   {\"idempotencyKey\":\"k1\",\"type\":\"RESET_FUSE\"}";
        let request = parse_request(raw).expect("request parses");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/control/v1/commands");
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
        assert_eq!(
            request.body,
            "{\"idempotencyKey\":\"k1\",\"type\":\"RESET_FUSE\"}"
        );
    }

    #[test]
    fn test_strips_query_string_from_path() {
        let raw = "GET /control/v1/capabilities?probe=1 HTTP/1.1\r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.path, "/control/v1/capabilities");
    }

    #[test]
    fn test_method_is_upper_cased() {
        let raw = "get / HTTP/1.1\r\n\r\n";
        assert_eq!(parse_request(raw).unwrap().method, "GET");
    }

    #[test]
    fn test_header_keys_lower_cased_and_trimmed() {
        let raw = "GET / HTTP/1.1\r\n  X-Custom-Header :  some value \r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.header("x-custom-header"), Some("some value"));
    }

    #[test]
    fn test_duplicate_header_last_wins() {
        let raw = "GET / HTTP/1.1\r\nX-Dup: first\r\nX-Dup: second\r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.header("x-dup"), Some("second"));
    }

    #[test]
    fn test_request_without_blank_line_has_empty_body() {
        let raw = "GET /health HTTP/1.1\r\nHost: x";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.path, "/health");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_request_line_without_path_is_rejected() {
        assert!(parse_request("GET").is_none());
        assert!(parse_request("").is_none());
    }

    #[test]
    fn test_header_value_containing_colon_survives() {
        let raw = "GET / HTTP/1.1\r\nHost: localhost:9090\r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.header("host"), Some("localhost:9090"));
    }
}
