//! Directory transport seam and its `ldap3` implementation.

use crate::config::DirectoryConfig;
use admgr_core::{Error, Result};
use ldap3::{LdapConn, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet};
use std::fs;
use tracing::{debug, warn};

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP entry representation used by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Text attribute map (values preserved order from server).
    pub attributes: HashMap<String, Vec<String>>,
    /// Attributes whose values are not valid UTF-8.
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }

    /// Adds text values for an attribute.
    #[must_use]
    pub fn with_values(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(attribute.into(), values);
        self
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all text values for the attribute (case-insensitive name match).
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns all binary values for the attribute (case-insensitive name match).
    #[must_use]
    pub fn binary_values(&self, attribute: &str) -> Option<&[Vec<u8>]> {
        self.binary_attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }
}

/// LDAP modification request.
///
/// Values are raw bytes so the same type carries text and binary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<Vec<u8>>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<Vec<u8>>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<Vec<u8>>,
    },
}

impl DirectoryModification {
    /// Adds one text value.
    #[must_use]
    pub fn add_text(attribute: impl Into<String>, value: &str) -> Self {
        Self::Add {
            attribute: attribute.into(),
            values: vec![value.as_bytes().to_vec()],
        }
    }

    /// Replaces all values with one text value.
    #[must_use]
    pub fn replace_text(attribute: impl Into<String>, value: &str) -> Self {
        Self::Replace {
            attribute: attribute.into(),
            values: vec![value.as_bytes().to_vec()],
        }
    }

    /// Deletes one text value, or every value when `value` is `None`.
    #[must_use]
    pub fn delete_text(attribute: impl Into<String>, value: Option<&str>) -> Self {
        Self::Delete {
            attribute: attribute.into(),
            values: value.map(|v| vec![v.as_bytes().to_vec()]).unwrap_or_default(),
        }
    }

    /// Name of the attribute being modified.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }

    /// Values carried by the modification.
    #[must_use]
    pub fn values(&self) -> &[Vec<u8>] {
        match self {
            Self::Add { values, .. } | Self::Delete { values, .. } | Self::Replace { values, .. } => {
                values
            }
        }
    }

    pub(crate) fn values_mut(&mut self) -> &mut Vec<Vec<u8>> {
        match self {
            Self::Add { values, .. } | Self::Delete { values, .. } | Self::Replace { values, .. } => {
                values
            }
        }
    }
}

/// Attribute list of a new entry: name and text values.
pub type NewEntryAttributes = Vec<(String, Vec<String>)>;

/// Parameters of a rename (modify DN) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    /// New leading RDN, e.g. `cn=jdoe2`.
    pub new_rdn: String,
    /// New parent container, or `None` to stay in place.
    pub new_parent: Option<String>,
    /// Whether the old RDN value is removed from the entry.
    pub delete_old_rdn: bool,
}

/// Operations the client needs from a bound directory connection.
///
/// Calls block until the server answers. A base-scope search for an entry that does not exist
/// returns an empty list; a one-level or subtree search below a missing base, and every other
/// server-side failure, is an error.
#[cfg_attr(test, mockall::automock)]
pub trait DirectoryTransport: Send {
    /// Authenticates the connection.
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    /// Creates an entry.
    fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> Result<()>;
    /// Applies attribute modifications to an entry.
    fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    /// Deletes an entry.
    fn delete(&mut self, dn: &str) -> Result<()>;
    /// Renames or moves an entry.
    fn rename(&mut self, dn: &str, request: &RenameRequest) -> Result<()>;
    /// Searches below `base_dn`.
    fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>>;
}

/// Opens transports to the configured server.
#[cfg_attr(test, mockall::automock)]
pub trait DirectoryConnector: Send + Sync {
    /// Opens an unauthenticated connection.
    fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryTransport>>;
}

/// Real LDAP connector backed by `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DirectoryConnector for LdapConnector {
    fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectoryTransport>> {
        let settings = build_ldap_settings(config)?;
        debug!(url = config.url(), "connecting to directory");
        // ldap3 speaks protocol version 3 only and never chases referrals.
        let conn = LdapConn::with_settings(settings, config.url())
            .map_err(|err| Error::ServerConnectFailure(format!("{}: {err}", config.url())))?;
        Ok(Box::new(LdapTransport { inner: conn }))
    }
}

struct LdapTransport {
    inner: LdapConn,
}

impl DirectoryTransport for LdapTransport {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.inner
            .simple_bind(dn, password)
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| Error::ServerConnectFailure(format!("bind as {dn} failed: {err}")))?;
        Ok(())
    }

    fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_bytes().to_vec(),
                    values
                        .iter()
                        .map(|v| v.as_bytes().to_vec())
                        .collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();
        let result = self.inner.add(dn, attrs).map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| {
                let values = m.values().iter().cloned().collect::<HashSet<_>>();
                let attribute = m.attribute().as_bytes().to_vec();
                match m {
                    DirectoryModification::Add { .. } => Mod::Add(attribute, values),
                    DirectoryModification::Delete { .. } => Mod::Delete(attribute, values),
                    DirectoryModification::Replace { .. } => Mod::Replace(attribute, values),
                }
            })
            .collect::<Vec<_>>();

        let result = self.inner.modify(dn, mods).map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> Result<()> {
        let result = self.inner.delete(dn).map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn rename(&mut self, dn: &str, request: &RenameRequest) -> Result<()> {
        let result = self
            .inner
            .modifydn(
                dn,
                &request.new_rdn,
                request.delete_old_rdn,
                request.new_parent.as_deref(),
            )
            .map_err(map_ldap_error)?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let ldap3::SearchResult(entries, result) = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .map_err(map_ldap_error)?;

        if result.rc == RC_NO_SUCH_OBJECT && scope == SearchScope::Base {
            debug!(base_dn, "base entry does not exist");
            return Ok(Vec::new());
        }
        result.success().map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
                binary_attributes: entry.bin_attrs,
            })
            .collect())
    }
}

impl Drop for LdapTransport {
    fn drop(&mut self) {
        if let Err(err) = self.inner.unbind() {
            debug!("unbind on drop failed: {err}");
        }
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.starttls());

    if !config.tls_verify() {
        warn!("TLS certificate verification disabled for {}", config.url());
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::InvalidConfigParameter(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        debug!("loading directory CA certificate from {}", cert_path.display());
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigFileUnreadable(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::InvalidConfigParameter(format!("invalid CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::InvalidConfigParameter(format!("failed to load CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::DirectoryOperationFailure(err.to_string())
}

/// Binds `transport` with the configured credentials.
pub(crate) fn bind(transport: &mut dyn DirectoryTransport, config: &DirectoryConfig) -> Result<()> {
    let credentials = config.credentials();
    transport.simple_bind(
        credentials.bind_dn(),
        credentials.bind_password().expose_secret(),
    )
}

/// Escapes a value for use inside an LDAP search filter.
///
/// With `keep_wildcards` the `*` character passes through unchanged so callers can issue
/// substring searches.
#[must_use]
pub fn escape_filter_value(value: &str, keep_wildcards: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' if keep_wildcards => escaped.push('*'),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
