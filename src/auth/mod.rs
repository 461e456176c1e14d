//! Bearer token authentication
//!
//! One shared gate for both transports: the HTTP server validates the
//! `Authorization` header, the WebSocket server validates the bare token
//! from the handshake query parameter (browser WebSocket clients cannot
//! set custom headers). With no token configured every request passes --
//! a deliberate fail-open posture; locking the gateway down is a
//! deployment responsibility.

/// Bearer token validator.
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    token: Option<String>,
}

impl TokenAuth {
    /// An empty token counts as unconfigured.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Validate an `Authorization` header value.
    ///
    /// Expected format: `Bearer <token>`. Returns true when auth is
    /// disabled or the token matches.
    pub fn validate_auth_header(&self, header: &str) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        match header.strip_prefix("Bearer ") {
            Some(provided) => timing_safe_eq(provided, expected),
            None => false,
        }
    }

    /// Validate a bare token string (WebSocket query parameter path).
    pub fn validate_token(&self, provided: &str) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        timing_safe_eq(provided, expected)
    }
}

/// Timing-safe string equality.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut out = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        out |= x ^ y;
    }
    out == 0
}
