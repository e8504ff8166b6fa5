//! Active Directory password encoding.
//!
//! AD only accepts `unicodePwd` writes whose value is the password wrapped in double quotes and
//! encoded as UTF-16LE.

use secrecy::{ExposeSecret, SecretString};

/// Attribute holding a user's password.
pub const PASSWORD_ATTRIBUTE: &str = "unicodePwd";

/// Encodes `password` for a `unicodePwd` replace.
///
/// The caller owns the returned buffer and should wipe it once the write completes.
#[must_use]
pub fn encode_password(password: &SecretString) -> Vec<u8> {
    let quoted = format!("\"{}\"", password.expose_secret());
    let encoded = quoted
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    secrecy::zeroize::Zeroize::zeroize(&mut quoted.into_bytes());
    encoded
}
