// Resolves connection credentials to participant ids.

use std::collections::HashMap;

/// Maps a bearer token to the participant it authenticates.
pub trait Identity: Send + Sync {
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Static token table loaded from config.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentity {
    tokens: HashMap<String, String>,
}

impl TokenIdentity {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        TokenIdentity { tokens }
    }
}

impl Identity for TokenIdentity {
    fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}
