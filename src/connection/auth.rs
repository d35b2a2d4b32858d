//! Credential handling.
//!
//! The password is held in a buffer that is zeroed on drop and never shows
//! up in `Debug` or `Display` output.

use std::fmt;
use std::sync::Arc;

/// Secure credentials container.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Arc<SecureString>,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password: Arc::new(SecureString::new(password)),
        }
    }

    /// Get the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password (for the login exchange only).
    pub(crate) fn password(&self) -> &str {
        self.password.as_str()
    }

    /// Whether a password was supplied at all.
    pub fn has_password(&self) -> bool {
        !self.password.as_str().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials(username: {})", self.username)
    }
}

/// String that zeros its buffer on drop and never displays its contents.
struct SecureString {
    data: String,
}

impl SecureString {
    fn new(s: String) -> Self {
        Self { data: s }
    }

    fn as_str(&self) -> &str {
        &self.data
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        // into_bytes keeps the allocation, so this clears the original buffer
        let mut bytes = std::mem::take(&mut self.data).into_bytes();
        bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString(<redacted>)")
    }
}
