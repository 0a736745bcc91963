//! Authorization capability for the admin batch endpoints
//!
//! The engines know nothing about admin identity; the HTTP boundary is
//! handed an authorizer and asks it before triggering batch work.

/// Decides whether a presented token may trigger batch jobs
pub trait BatchAuthorizer: Send + Sync {
    fn authorize(&self, token: Option<&str>) -> bool;
}

/// Shared-secret authorizer backed by a configured token
pub struct TokenAuthorizer {
    token: String,
}

impl TokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl BatchAuthorizer for TokenAuthorizer {
    fn authorize(&self, token: Option<&str>) -> bool {
        // An empty configured secret authorizes nobody
        !self.token.is_empty() && token == Some(self.token.as_str())
    }
}
