//! In-memory directory used by the integration tests.
//!
//! Only the behavior the client relies on is modeled: entries keyed by DN, multi-valued
//! attributes, simple equality filters with `*` globs and `&` conjunctions, and the three search
//! scopes. Failures can be injected per DN.

#![allow(dead_code)]

use admgr_core::{ConfigSources, Error, Result, SettingsLayer};
use admgr_directory::{
    DirectoryClient, DirectoryConfig, DirectoryConnector, DirectoryModification,
    DirectoryTransport, DistinguishedName, LdapEntry, NewEntryAttributes, RenameRequest,
    SearchScope,
};
use secrecy::SecretString;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const BIND_DN: &str = "cn=administrator,cn=Users,dc=example,dc=com";
pub const BIND_PASSWORD: &str = "s3cret";

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: DistinguishedName,
    attributes: Vec<(String, Vec<Vec<u8>>)>,
}

impl StoredEntry {
    fn values(&self, name: &str) -> Option<&Vec<Vec<u8>>> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    fn values_mut(&mut self, name: &str) -> Option<&mut Vec<Vec<u8>>> {
        self.attributes
            .iter_mut()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    fn set(&mut self, name: &str, values: Vec<Vec<u8>>) {
        self.attributes
            .retain(|(attr, _)| !attr.eq_ignore_ascii_case(name));
        if !values.is_empty() {
            self.attributes.push((name.to_string(), values));
        }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, StoredEntry>,
    binds: usize,
    connects: usize,
    failing_modifies: HashSet<String>,
    fail_searches: bool,
}

fn key(dn: &DistinguishedName) -> String {
    dn.as_str().to_lowercase()
}

fn parse_dn(dn: &str) -> Result<DistinguishedName> {
    Ok(DistinguishedName::parse(dn)?)
}

fn failure(message: &str) -> Error {
    Error::DirectoryOperationFailure(message.to_string())
}

/// Shared handle to the in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    /// Directory seeded with the `example.com` naming contexts and a few containers.
    pub fn seeded() -> Self {
        let directory = Self::default();
        for (dn, class) in [
            ("dc=example,dc=com", "domain"),
            ("ou=users,dc=example,dc=com", "organizationalUnit"),
            ("ou=groups,dc=example,dc=com", "organizationalUnit"),
            ("dc=eng,dc=example,dc=com", "domain"),
            ("ou=staff,dc=eng,dc=example,dc=com", "organizationalUnit"),
            ("dc=sales,dc=example,dc=com", "domain"),
            ("ou=staff,dc=sales,dc=example,dc=com", "organizationalUnit"),
        ] {
            directory.insert(dn, &[("objectClass", class)]);
        }
        directory
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Inserts an entry directly, bypassing the client.
    pub fn insert(&self, dn: &str, attributes: &[(&str, &str)]) {
        let dn = DistinguishedName::parse(dn).unwrap();
        let mut entry = StoredEntry {
            dn: dn.clone(),
            attributes: Vec::new(),
        };
        for (name, value) in attributes {
            let mut values = entry.values(name).cloned().unwrap_or_default();
            values.push(value.as_bytes().to_vec());
            entry.set(name, values);
        }
        self.state().entries.insert(key(&dn), entry);
    }

    /// Text values of an attribute, or `None` when the entry or attribute is absent.
    pub fn values(&self, dn: &str, name: &str) -> Option<Vec<String>> {
        self.raw_values(dn, name).map(|values| {
            values
                .iter()
                .map(|value| String::from_utf8_lossy(value).into_owned())
                .collect()
        })
    }

    /// Raw values of an attribute.
    pub fn raw_values(&self, dn: &str, name: &str) -> Option<Vec<Vec<u8>>> {
        let dn = DistinguishedName::parse(dn).unwrap();
        self.state()
            .entries
            .get(&key(&dn))
            .and_then(|entry| entry.values(name).cloned())
    }

    pub fn exists(&self, dn: &str) -> bool {
        let dn = DistinguishedName::parse(dn).unwrap();
        self.state().entries.contains_key(&key(&dn))
    }

    pub fn binds(&self) -> usize {
        self.state().binds
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Makes every modify of `dn` fail.
    pub fn fail_modifies_of(&self, dn: &str) {
        let dn = DistinguishedName::parse(dn).unwrap();
        self.state().failing_modifies.insert(key(&dn));
    }

    /// Makes every search fail at the protocol level.
    pub fn fail_searches(&self) {
        self.state().fail_searches = true;
    }

    /// Client bound to this directory, searching below `dc=example,dc=com`.
    pub fn client(&self, uri: &str) -> DirectoryClient {
        self.client_with_base(uri, "dc=example,dc=com")
    }

    /// Client bound to this directory with the given search base.
    pub fn client_with_base(&self, uri: &str, search_base: &str) -> DirectoryClient {
        let overrides = SettingsLayer::new()
            .with_uri(uri)
            .with_bind_dn(BIND_DN)
            .with_bind_password(SecretString::from(BIND_PASSWORD.to_string()))
            .with_search_base(search_base);
        DirectoryClient::with_connector(
            ConfigSources::overrides_only(overrides),
            Box::new(self.clone()),
        )
    }
}

impl DirectoryConnector for InMemoryDirectory {
    fn connect(&self, _config: &DirectoryConfig) -> Result<Box<dyn DirectoryTransport>> {
        self.state().connects += 1;
        Ok(Box::new(InMemoryTransport {
            directory: self.clone(),
            bound: false,
        }))
    }
}

struct InMemoryTransport {
    directory: InMemoryDirectory,
    bound: bool,
}

impl InMemoryTransport {
    fn state(&self) -> Result<MutexGuard<'_, State>> {
        if !self.bound {
            return Err(failure("Operations error: bind required"));
        }
        Ok(self.directory.state())
    }
}

impl DirectoryTransport for InMemoryTransport {
    fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let mut state = self.directory.state();
        if dn != BIND_DN || password != BIND_PASSWORD {
            return Err(Error::ServerConnectFailure(
                "Invalid credentials".to_string(),
            ));
        }
        state.binds += 1;
        self.bound = true;
        Ok(())
    }

    fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> Result<()> {
        let dn = parse_dn(dn)?;
        let mut state = self.state()?;
        if state.entries.contains_key(&key(&dn)) {
            return Err(failure("Already exists"));
        }
        if let Some(parent) = dn.parent() {
            if !state.entries.contains_key(&key(&parent)) {
                return Err(failure("No such object"));
            }
        }
        let mut entry = StoredEntry {
            dn: dn.clone(),
            attributes: Vec::new(),
        };
        for (name, values) in attributes {
            entry.set(
                name,
                values.iter().map(|value| value.as_bytes().to_vec()).collect(),
            );
        }
        state.entries.insert(key(&dn), entry);
        Ok(())
    }

    fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let dn = parse_dn(dn)?;
        let mut state = self.state()?;
        if state.failing_modifies.contains(&key(&dn)) {
            return Err(failure("Insufficient access"));
        }
        let entry = state
            .entries
            .get_mut(&key(&dn))
            .ok_or_else(|| failure("No such object"))?;

        for modification in modifications {
            match modification {
                DirectoryModification::Add { attribute, values } => {
                    let mut current = entry.values(attribute).cloned().unwrap_or_default();
                    for value in values {
                        if current.contains(value) {
                            return Err(failure("Type or value exists"));
                        }
                        current.push(value.clone());
                    }
                    entry.set(attribute, current);
                }
                DirectoryModification::Replace { attribute, values } => {
                    entry.set(attribute, values.clone());
                }
                DirectoryModification::Delete { attribute, values } => {
                    let current = entry
                        .values_mut(attribute)
                        .ok_or_else(|| failure("No such attribute"))?;
                    if values.is_empty() {
                        current.clear();
                    } else {
                        for value in values {
                            let position = current
                                .iter()
                                .position(|existing| existing == value)
                                .ok_or_else(|| failure("No such attribute"))?;
                            current.remove(position);
                        }
                    }
                    let remaining = current.clone();
                    entry.set(attribute, remaining);
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> Result<()> {
        let dn = parse_dn(dn)?;
        let mut state = self.state()?;
        let has_children = state
            .entries
            .values()
            .any(|entry| entry.dn.parent().as_ref().map(key) == Some(key(&dn)));
        if has_children {
            return Err(failure("Operation not allowed on non-leaf"));
        }
        state
            .entries
            .remove(&key(&dn))
            .map(|_| ())
            .ok_or_else(|| failure("No such object"))
    }

    fn rename(&mut self, dn: &str, request: &RenameRequest) -> Result<()> {
        let dn = parse_dn(dn)?;
        let rdn = parse_dn(&request.new_rdn)?;
        let parent = match &request.new_parent {
            Some(parent) => Some(parse_dn(parent)?),
            None => dn.parent(),
        };
        let new_dn = match &parent {
            Some(parent) => rdn.moved_to(parent),
            None => rdn.clone(),
        };

        let mut state = self.state()?;
        if let Some(parent) = &parent {
            if !state.entries.contains_key(&key(parent)) {
                return Err(failure("No such object"));
            }
        }
        if state.entries.contains_key(&key(&new_dn)) {
            return Err(failure("Already exists"));
        }
        let mut entry = state
            .entries
            .remove(&key(&dn))
            .ok_or_else(|| failure("No such object"))?;

        let naming = rdn
            .assertions()
            .next()
            .ok_or_else(|| failure("Invalid DN syntax"))?;
        if request.delete_old_rdn {
            entry.set(naming.attribute(), vec![naming.value().as_bytes().to_vec()]);
        }
        entry.dn = new_dn.clone();
        state.entries.insert(key(&new_dn), entry);
        Ok(())
    }

    fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let base = parse_dn(base_dn)?;
        let state = self.state()?;
        if state.fail_searches {
            return Err(failure("Bad search filter"));
        }
        let filter = Filter::parse(filter)?;
        if !state.entries.contains_key(&key(&base)) {
            return match scope {
                SearchScope::Base => Ok(Vec::new()),
                SearchScope::OneLevel | SearchScope::Subtree => Err(failure("No such object")),
            };
        }

        let base_depth = base.rdns().len();
        let base_suffix = key(&base);
        let mut found = Vec::new();
        for entry in state.entries.values() {
            let entry_key = key(&entry.dn);
            let depth = entry.dn.rdns().len();
            let under_base = entry_key == base_suffix
                || entry_key.ends_with(&format!(",{base_suffix}"));
            let in_scope = under_base
                && match scope {
                    SearchScope::Base => depth == base_depth,
                    SearchScope::OneLevel => depth == base_depth + 1,
                    SearchScope::Subtree => true,
                };
            if in_scope && filter.matches(entry) {
                found.push(project(entry, attributes));
            }
        }
        Ok(found)
    }
}

fn project(entry: &StoredEntry, attributes: &[String]) -> LdapEntry {
    let mut result = LdapEntry::new(entry.dn.as_str());
    for requested in attributes {
        if requested == "1.1" {
            continue;
        }
        if let Some(values) = entry.values(requested) {
            match values
                .iter()
                .map(|value| String::from_utf8(value.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()
            {
                Ok(text) => {
                    result.attributes.insert(requested.clone(), text);
                }
                Err(_) => {
                    result
                        .binary_attributes
                        .insert(requested.clone(), values.clone());
                }
            }
        }
    }
    result
}

enum Filter {
    And(Vec<Filter>),
    Equals { attribute: String, pattern: String },
}

impl Filter {
    fn parse(input: &str) -> Result<Self> {
        let inner = input
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| failure("Bad search filter"))?;

        if let Some(mut rest) = inner.strip_prefix('&') {
            let mut parts = Vec::new();
            while !rest.is_empty() {
                let end = rest
                    .find(')')
                    .ok_or_else(|| failure("Bad search filter"))?;
                parts.push(Self::parse(&rest[..=end])?);
                rest = &rest[end + 1..];
            }
            return Ok(Self::And(parts));
        }

        let (attribute, value) = inner
            .split_once('=')
            .ok_or_else(|| failure("Bad search filter"))?;
        if attribute.is_empty() || attribute.contains(['(', ')']) {
            return Err(failure("Bad search filter"));
        }
        Ok(Self::Equals {
            attribute: attribute.to_string(),
            pattern: unescape_filter(value)?,
        })
    }

    fn matches(&self, entry: &StoredEntry) -> bool {
        match self {
            Self::And(parts) => parts.iter().all(|part| part.matches(entry)),
            Self::Equals { attribute, pattern } => entry.values(attribute).is_some_and(|values| {
                values
                    .iter()
                    .any(|value| glob(pattern, &String::from_utf8_lossy(value)))
            }),
        }
    }
}

fn unescape_filter(value: &str) -> Result<String> {
    let mut out = Vec::new();
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' {
            let hex = value
                .get(index + 1..index + 3)
                .ok_or_else(|| failure("Bad search filter"))?;
            let byte =
                u8::from_str_radix(hex, 16).map_err(|_| failure("Bad search filter"))?;
            out.push(byte);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).map_err(|_| failure("Bad search filter"))
}

/// Case-insensitive match where `*` stands for any run of characters.
fn glob(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let mut rest = value.as_str();
    for (index, part) in parts.iter().enumerate() {
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(position) = rest.find(part) {
            rest = &rest[position + part.len()..];
        } else {
            return false;
        }
    }
    true
}
