//! Bind credentials used to authenticate a directory session.

use secrecy::{ExposeSecret, SecretString};

/// Directory bind credentials.
///
/// The password is held in a [`SecretString`], which is wiped from memory when dropped. This is
/// best-effort hygiene only: copies made by the TLS stack or the operating system are out of
/// reach.
#[derive(Debug)]
pub struct BindCredentials {
    bind_dn: String,
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    ///
    /// # Arguments
    ///
    /// * `bind_dn` - The DN (or user principal name) to bind as
    /// * `bind_password` - The bind password
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: SecretString) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password,
        }
    }

    /// Get the bind identity.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &SecretString {
        &self.bind_password
    }
}

impl Clone for BindCredentials {
    fn clone(&self) -> Self {
        Self {
            bind_dn: self.bind_dn.clone(),
            bind_password: clone_secret(&self.bind_password),
        }
    }
}

/// Copies a secret string into a new secret allocation.
#[must_use]
pub fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}
