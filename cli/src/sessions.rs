use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// In-process session table: opaque token to username.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, String>>,
}

/// 3 to 20 characters from `[A-Za-z0-9_]`, and not the reserved name "dog".
pub(crate) fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (3..=20).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !username.eq_ignore_ascii_case("dog")
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its token, or `None` if the username is
    /// not acceptable.
    pub fn login(&self, username: &str) -> Option<String> {
        if !is_valid_username(username) {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), username.to_string());
        Some(token)
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }

    pub fn lookup(&self, token: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }
}
