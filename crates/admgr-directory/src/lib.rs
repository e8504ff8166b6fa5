//! # admgr-directory
//!
//! Active Directory identity lifecycle over LDAP.
//!
//! [`DirectoryClient`] owns one lazily established session. The first operation resolves the
//! layered configuration, connects and binds; later operations reuse that connection. Each
//! operation returns its own [`Result`], so there is no shared "last error" to inspect.
//!
//! ## Example
//!
//! ```no_run
//! use admgr_core::{ConfigSources, SettingsLayer};
//! use admgr_directory::{DirectoryClient, DistinguishedName};
//!
//! let sources = ConfigSources::new(SettingsLayer::new().with_uri("ldaps://dc1.example.com"));
//! let mut client = DirectoryClient::new(sources);
//!
//! let user = DistinguishedName::parse("cn=jdoe,ou=Users,dc=example,dc=com")?;
//! client.create_user("jdoe", &user)?;
//! client.unlock_user(&user)?;
//! # Ok::<(), admgr_core::Error>(())
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod dn;
pub mod group;
pub mod password;
pub mod transport;
pub mod user;

pub use client::{DirectoryClient, SearchOutcome, Session};
pub use config::DirectoryConfig;
pub use dn::{
    domain_from_dn, AttributeValue, DistinguishedName, DistinguishedNameError,
    RelativeDistinguishedName,
};
pub use password::encode_password;
pub use transport::{
    escape_filter_value, DirectoryConnector, DirectoryModification, DirectoryTransport,
    LdapConnector, LdapEntry, NewEntryAttributes, RenameRequest, SearchScope,
};
pub use user::{principal_name, AccountControl};

/// Result type used throughout the directory crate.
pub type Result<T> = admgr_core::Result<T>;
