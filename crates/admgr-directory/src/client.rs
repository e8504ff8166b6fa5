//! Directory client: session management, attribute primitives and search.

use crate::config::DirectoryConfig;
use crate::dn::DistinguishedName;
use crate::transport::{
    self, escape_filter_value, DirectoryConnector, DirectoryModification, DirectoryTransport,
    LdapConnector, LdapEntry, NewEntryAttributes, RenameRequest, SearchScope,
};
use admgr_core::{ConfigSources, Error, Result};
use serde::Serialize;
use tracing::{debug, warn};

/// Requests no attributes, only entry names.
const NO_ATTRIBUTES: &str = "1.1";

/// Filter matching every entry.
const ANY_OBJECT: &str = "(objectclass=*)";

/// Result of a search that completed at the protocol level.
///
/// Transport failures are reported separately as `Err`, so "nothing matched" is never confused
/// with "the search could not be performed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entries", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// DNs of the matching entries, in server order.
    Found(Vec<String>),
    /// No entry matched.
    NotFound,
}

impl SearchOutcome {
    fn from_entries(entries: Vec<LdapEntry>) -> Self {
        if entries.is_empty() {
            Self::NotFound
        } else {
            Self::Found(entries.into_iter().map(|entry| entry.dn).collect())
        }
    }

    /// Returns the matching DNs (empty when nothing matched).
    #[must_use]
    pub fn into_dns(self) -> Vec<String> {
        match self {
            Self::Found(dns) => dns,
            Self::NotFound => Vec::new(),
        }
    }

    /// Returns the first matching DN.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Found(dns) => dns.first().map(String::as_str),
            Self::NotFound => None,
        }
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// An authenticated connection plus the settings operations need after bind.
pub struct Session {
    transport: Box<dyn DirectoryTransport>,
    search_base: Option<DistinguishedName>,
    secure: bool,
}

impl Session {
    /// Default search base, if one was configured.
    #[must_use]
    pub const fn search_base(&self) -> Option<&DistinguishedName> {
        self.search_base.as_ref()
    }

    /// Returns true if the connection is TLS-protected.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    pub(crate) fn transport(&mut self) -> &mut dyn DirectoryTransport {
        &mut *self.transport
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("search_base", &self.search_base)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Directory client with a lazily established, reused session.
///
/// The client is the caller-owned session object: the first operation resolves configuration,
/// connects and binds; every later operation reuses that connection. There is no reconnect
/// path. If the connection drops, operations fail and the caller decides what to do.
///
/// Operations are synchronous and not retried. Multi-step operations are not atomic: when a
/// step fails, earlier steps stay applied and the error describes the failing step.
pub struct DirectoryClient {
    sources: ConfigSources,
    connector: Box<dyn DirectoryConnector>,
    session: Option<Session>,
}

impl DirectoryClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(sources: ConfigSources) -> Self {
        Self::with_connector(sources, Box::new(LdapConnector::new()))
    }

    /// Creates a client with a caller-supplied transport connector.
    #[must_use]
    pub fn with_connector(sources: ConfigSources, connector: Box<dyn DirectoryConnector>) -> Self {
        Self {
            sources,
            connector,
            session: None,
        }
    }

    /// Returns true once a session has been established.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the live session, establishing it on first use.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from [`ConfigSources::resolve`],
    /// [`Error::ServerConnectFailure`] when the server cannot be reached or rejects the bind.
    /// No session is kept after a failure.
    pub fn session(&mut self) -> Result<&mut Session> {
        if self.session.is_none() {
            let session = self.establish()?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| Error::ServerConnectFailure("no directory session".to_string()))
    }

    fn establish(&mut self) -> Result<Session> {
        let config = DirectoryConfig::from_settings(self.sources.resolve()?)?;
        let mut transport = self.connector.connect(&config)?;
        transport::bind(&mut *transport, &config)?;
        debug!(
            url = config.url(),
            bind_dn = config.credentials().bind_dn(),
            "directory session established"
        );

        let session = Session {
            transport,
            search_base: config.search_base().cloned(),
            secure: config.is_secure(),
        };
        // Dropping the config wipes the resolved password; the caller-supplied copy goes too.
        drop(config);
        self.sources.forget_password();
        Ok(session)
    }

    pub(crate) fn transport(&mut self) -> Result<&mut dyn DirectoryTransport> {
        Ok(self.session()?.transport())
    }

    /// Appends one value to an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] if the directory rejects the change, e.g.
    /// for a single-valued attribute that already has a value.
    pub fn add_attribute(&mut self, entry: &DistinguishedName, name: &str, value: &str) -> Result<()> {
        self.modify(entry, DirectoryModification::add_text(name, value))
    }

    /// Appends one binary value to an attribute.
    ///
    /// # Errors
    ///
    /// See [`DirectoryClient::add_attribute`].
    pub fn add_attribute_binary(
        &mut self,
        entry: &DistinguishedName,
        name: &str,
        value: &[u8],
    ) -> Result<()> {
        self.modify(
            entry,
            DirectoryModification::Add {
                attribute: name.to_string(),
                values: vec![value.to_vec()],
            },
        )
    }

    /// Replaces every value of an attribute with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] if the directory rejects the change.
    pub fn replace_attribute(
        &mut self,
        entry: &DistinguishedName,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.modify(entry, DirectoryModification::replace_text(name, value))
    }

    /// Replaces every value of an attribute with one binary value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] if the directory rejects the change.
    pub fn replace_attribute_binary(
        &mut self,
        entry: &DistinguishedName,
        name: &str,
        value: &[u8],
    ) -> Result<()> {
        self.modify(
            entry,
            DirectoryModification::Replace {
                attribute: name.to_string(),
                values: vec![value.to_vec()],
            },
        )
    }

    /// Removes `value` from an attribute, or the whole attribute when `value` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] if the directory rejects the change.
    pub fn delete_attribute(
        &mut self,
        entry: &DistinguishedName,
        name: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.modify(entry, DirectoryModification::delete_text(name, value))
    }

    /// Reads the values of one attribute of one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectNotFound`] when no entry, or more than one entry, matches,
    /// [`Error::AttributeNotFound`] when the entry has no value for `name`, and
    /// [`Error::DirectoryOperationFailure`] when the lookup itself fails.
    pub fn get_attribute(&mut self, entry: &DistinguishedName, name: &str) -> Result<Vec<String>> {
        let attributes = [name.to_string()];
        let mut entries = self.transport()?.search(
            entry.as_str(),
            SearchScope::Base,
            ANY_OBJECT,
            &attributes,
        )?;

        let found = match entries.len() {
            0 => return Err(Error::ObjectNotFound(format!("no entry found for {entry}"))),
            1 => entries.remove(0),
            count => {
                warn!(%entry, count, "base lookup matched more than one entry");
                return Err(Error::ObjectNotFound(format!(
                    "more than one entry found for {entry}"
                )));
            }
        };

        let values = match (found.values(name), found.binary_values(name)) {
            (Some(values), _) if !values.is_empty() => values.to_vec(),
            (_, Some(values)) if !values.is_empty() => values
                .iter()
                .map(|value| String::from_utf8_lossy(value).into_owned())
                .collect(),
            _ => {
                return Err(Error::AttributeNotFound(format!(
                    "no values found for attribute {name} in object {entry}"
                )))
            }
        };
        Ok(values)
    }

    /// Finds every entry below the configured search base where `attribute` equals `value`.
    ///
    /// `value` may contain `*` wildcards; other filter metacharacters are escaped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfigParameter`] when no search base is configured and
    /// [`Error::DirectoryOperationFailure`] when the search fails, including when the search base
    /// does not exist. An empty result is
    /// [`SearchOutcome::NotFound`], not an error.
    pub fn search(&mut self, attribute: &str, value: &str) -> Result<SearchOutcome> {
        let session = self.session()?;
        let base = session
            .search_base()
            .cloned()
            .ok_or_else(|| {
                Error::MissingConfigParameter(
                    "couldn't read searchbase parameter from config files or command line"
                        .to_string(),
                )
            })?;

        let filter = format!("({attribute}={})", escape_filter_value(value, true));
        debug!(%base, filter, "searching directory");
        let entries = session.transport().search(
            base.as_str(),
            SearchScope::Subtree,
            &filter,
            &[NO_ATTRIBUTES.to_string()],
        )?;
        Ok(SearchOutcome::from_entries(entries))
    }

    /// Lists the entries directly below `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] when the search fails or `entry` does not
    /// exist.
    pub fn list(&mut self, entry: &DistinguishedName) -> Result<SearchOutcome> {
        let entries = self.transport()?.search(
            entry.as_str(),
            SearchScope::OneLevel,
            ANY_OBJECT,
            &[NO_ATTRIBUTES.to_string()],
        )?;
        Ok(SearchOutcome::from_entries(entries))
    }

    /// Deletes an entry (user, group, organizational unit, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationFailure`] if the directory rejects the delete.
    pub fn delete_object(&mut self, entry: &DistinguishedName) -> Result<()> {
        self.transport()?.delete(entry.as_str())?;
        debug!(%entry, "deleted entry");
        Ok(())
    }

    pub(crate) fn add_entry(
        &mut self,
        entry: &DistinguishedName,
        attributes: &NewEntryAttributes,
    ) -> Result<()> {
        debug!(%entry, "adding entry");
        self.transport()?.add(entry.as_str(), attributes)
    }

    pub(crate) fn rename_entry(
        &mut self,
        entry: &DistinguishedName,
        request: &RenameRequest,
    ) -> Result<()> {
        debug!(%entry, new_rdn = request.new_rdn, new_parent = ?request.new_parent, "renaming entry");
        self.transport()?.rename(entry.as_str(), request)
    }

    pub(crate) fn modify(
        &mut self,
        entry: &DistinguishedName,
        modification: DirectoryModification,
    ) -> Result<()> {
        debug!(%entry, attribute = modification.attribute(), "modifying entry");
        self.transport()?
            .modify(entry.as_str(), std::slice::from_ref(&modification))
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("sources", &self.sources)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::{MockDirectoryConnector, MockDirectoryTransport};
    use admgr_core::config::SettingsLayer;
    use secrecy::SecretString;

    pub(crate) fn sources() -> ConfigSources {
        ConfigSources::overrides_only(
            SettingsLayer::new()
                .with_uri("ldaps://dc1.example.com")
                .with_bind_dn("cn=administrator,cn=Users,dc=example,dc=com")
                .with_bind_password(SecretString::from("secret".to_string()))
                .with_search_base("dc=example,dc=com"),
        )
    }

    /// Client whose single connection is `transport`, with bind expectations already set.
    pub(crate) fn client_with(mut transport: MockDirectoryTransport) -> DirectoryClient {
        transport
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Ok(()));
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_| Ok(Box::new(transport)));
        DirectoryClient::with_connector(sources(), Box::new(connector))
    }

    pub(crate) fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    #[test]
    fn session_is_established_once_and_reused() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_modify().times(3).returning(|_, _| Ok(()));
        let mut client = client_with(transport);

        assert!(!client.is_connected());
        let entry = dn("cn=jdoe,ou=users,dc=example,dc=com");
        client.add_attribute(&entry, "mail", "a@x.com").unwrap();
        client.replace_attribute(&entry, "description", "x").unwrap();
        client.delete_attribute(&entry, "mail", None).unwrap();
        assert!(client.is_connected());
    }

    #[test]
    fn bind_uses_resolved_credentials_and_forgets_password() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_simple_bind()
            .withf(|dn, pw| dn == "cn=administrator,cn=Users,dc=example,dc=com" && pw == "secret")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .withf(|config| config.url() == "ldaps://dc1.example.com")
            .return_once(move |_| Ok(Box::new(transport)));

        let mut client = DirectoryClient::with_connector(sources(), Box::new(connector));
        let session = client.session().unwrap();
        assert!(session.is_secure());
        assert!(client.sources.overrides().bind_password.is_none());
    }

    #[test]
    fn bind_failure_leaves_no_session() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_simple_bind().returning(|_, _| {
            Err(Error::ServerConnectFailure("Invalid credentials".to_string()))
        });
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_| Ok(Box::new(transport)));

        let mut client = DirectoryClient::with_connector(sources(), Box::new(connector));
        let err = client.session().unwrap_err();
        assert!(matches!(err, Error::ServerConnectFailure(_)));
        assert!(!client.is_connected());
    }

    #[test]
    fn missing_config_fails_before_connecting() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().never();
        let sources = ConfigSources::overrides_only(SettingsLayer::new().with_uri("ldap://x"));
        let mut client = DirectoryClient::with_connector(sources, Box::new(connector));

        let err = client
            .get_attribute(&dn("cn=jdoe,dc=example,dc=com"), "mail")
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfigParameter(_)));
    }

    #[test]
    fn get_attribute_returns_values() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .withf(|base, scope, filter, attrs| {
                base == "cn=jdoe,dc=example,dc=com"
                    && *scope == SearchScope::Base
                    && filter == ANY_OBJECT
                    && attrs == ["otherTelephone".to_string()]
            })
            .returning(|base, _, _, _| {
                Ok(vec![LdapEntry::new(base).with_values(
                    "otherTelephone",
                    vec!["123".to_string(), "456".to_string()],
                )])
            });
        let mut client = client_with(transport);

        let values = client
            .get_attribute(&dn("cn=jdoe,dc=example,dc=com"), "otherTelephone")
            .unwrap();
        assert_eq!(values, vec!["123", "456"]);
    }

    #[test]
    fn get_attribute_distinguishes_missing_object_and_attribute() {
        let mut transport = MockDirectoryTransport::new();
        let mut sequence = mockall::Sequence::new();
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| Ok(Vec::new()));
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|base, _, _, _| Ok(vec![LdapEntry::new(base)]));
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|base, _, _, _| Ok(vec![LdapEntry::new(base), LdapEntry::new(base)]));
        let mut client = client_with(transport);
        let entry = dn("cn=jdoe,dc=example,dc=com");

        assert!(matches!(
            client.get_attribute(&entry, "mail"),
            Err(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            client.get_attribute(&entry, "mail"),
            Err(Error::AttributeNotFound(_))
        ));
        assert!(matches!(
            client.get_attribute(&entry, "mail"),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn search_distinguishes_empty_from_failure() {
        let mut transport = MockDirectoryTransport::new();
        let mut sequence = mockall::Sequence::new();
        transport
            .expect_search()
            .withf(|base, scope, filter, attrs| {
                base == "dc=example,dc=com"
                    && *scope == SearchScope::Subtree
                    && filter == "(name=jo*)"
                    && attrs == [NO_ATTRIBUTES.to_string()]
            })
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| {
                Ok(vec![LdapEntry::new("cn=john,dc=example,dc=com")])
            });
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| Ok(Vec::new()));
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| {
                Err(Error::DirectoryOperationFailure("Bad search filter".to_string()))
            });
        let mut client = client_with(transport);

        assert_eq!(
            client.search("name", "jo*").unwrap(),
            SearchOutcome::Found(vec!["cn=john,dc=example,dc=com".to_string()])
        );
        assert_eq!(client.search("name", "nobody").unwrap(), SearchOutcome::NotFound);
        assert!(matches!(
            client.search("name", "x"),
            Err(Error::DirectoryOperationFailure(_))
        ));
    }

    #[test]
    fn search_requires_search_base() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_simple_bind().returning(|_, _| Ok(()));
        transport.expect_search().never();
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .return_once(move |_| Ok(Box::new(transport)));
        let sources = ConfigSources::overrides_only(
            SettingsLayer::new()
                .with_uri("ldaps://dc1.example.com")
                .with_bind_dn("cn=admin")
                .with_bind_password(SecretString::from("pw".to_string())),
        );
        let mut client = DirectoryClient::with_connector(sources, Box::new(connector));

        let err = client.search("name", "jdoe").unwrap_err();
        assert!(matches!(err, Error::MissingConfigParameter(_)));
    }

    #[test]
    fn list_searches_one_level() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .withf(|base, scope, _, _| base == "ou=users,dc=example,dc=com" && *scope == SearchScope::OneLevel)
            .returning(|_, _, _, _| {
                Ok(vec![
                    LdapEntry::new("cn=a,ou=users,dc=example,dc=com"),
                    LdapEntry::new("cn=b,ou=users,dc=example,dc=com"),
                ])
            });
        let mut client = client_with(transport);

        let outcome = client.list(&dn("ou=users,dc=example,dc=com")).unwrap();
        assert_eq!(outcome.first(), Some("cn=a,ou=users,dc=example,dc=com"));
        assert_eq!(outcome.into_dns().len(), 2);
    }

    #[test]
    fn binary_modifications_carry_raw_bytes() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_modify()
            .withf(|dn, mods| {
                dn == "cn=jdoe,dc=example,dc=com"
                    && mods
                        == [DirectoryModification::Replace {
                            attribute: "jpegPhoto".to_string(),
                            values: vec![vec![0xff, 0xd8, 0x00]],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut client = client_with(transport);

        client
            .replace_attribute_binary(&dn("cn=jdoe,dc=example,dc=com"), "jpegPhoto", &[0xff, 0xd8, 0x00])
            .unwrap();
    }

    #[test]
    fn search_outcome_serialization() {
        let json = serde_json::to_string(&SearchOutcome::NotFound).unwrap();
        assert_eq!(json, "{\"outcome\":\"not_found\"}");
    }
}
