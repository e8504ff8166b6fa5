//! Layered configuration for directory clients.
//!
//! Settings come from three layers, highest priority first:
//!
//! 1. values supplied by the embedding application or command line ([`SettingsLayer`] overrides)
//! 2. the user file `~/.admgr.cfg`
//! 3. the system file `/etc/admgr.cfg`
//!
//! For every key the first layer that defines a non-empty value wins. Files hold one
//! `key value` pair per line:
//!
//! ```text
//! uri ldaps://dc1.example.com
//! binddn cn=administrator,cn=Users,dc=example,dc=com
//! bindpw passw0rd
//! searchbase ou=users,dc=example,dc=com
//! ```

use crate::credentials::{clone_secret, BindCredentials};
use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;
use validator::Validate;

/// File name of the per-user configuration file, relative to the home directory.
pub const USER_CONFIG_FILE_NAME: &str = ".admgr.cfg";

/// Location of the system-wide configuration file.
pub const SYSTEM_CONFIG_FILE: &str = "/etc/admgr.cfg";

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// One layer of optional settings.
///
/// Used both for caller-supplied overrides and for the contents of a single config file.
#[derive(Debug, Default)]
pub struct SettingsLayer {
    /// Directory server URI (`uri`)
    pub uri: Option<String>,
    /// Bind identity (`binddn`)
    pub bind_dn: Option<String>,
    /// Bind password (`bindpw`)
    pub bind_password: Option<SecretString>,
    /// Default search base (`searchbase`)
    pub search_base: Option<String>,
    /// Whether TLS certificates are verified (`tlsverify`)
    pub tls_verify: Option<bool>,
    /// Custom CA certificate (`tlscacert`)
    pub tls_ca_cert: Option<PathBuf>,
    /// Upgrade plain `ldap://` connections with StartTLS (`starttls`)
    pub starttls: Option<bool>,
    /// Connection timeout in seconds (`timeout`)
    pub timeout_secs: Option<u64>,
}

impl SettingsLayer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the contents of a config file.
    ///
    /// Unknown keys and `#` comments are ignored. When a key repeats, the first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfigParameter`] when a boolean or numeric value is malformed.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut layer = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };
            if value.is_empty() {
                continue;
            }

            match key {
                "uri" => fill(&mut layer.uri, value.to_string()),
                "binddn" => fill(&mut layer.bind_dn, value.to_string()),
                "bindpw" => {
                    if layer.bind_password.is_none() {
                        layer.bind_password = Some(SecretString::from(value.to_string()));
                    }
                }
                "searchbase" => fill(&mut layer.search_base, value.to_string()),
                "tlsverify" => fill(&mut layer.tls_verify, parse_bool(key, value)?),
                "tlscacert" => fill(&mut layer.tls_ca_cert, PathBuf::from(value)),
                "starttls" => fill(&mut layer.starttls, parse_bool(key, value)?),
                "timeout" => {
                    let secs = value.parse::<u64>().map_err(|_| {
                        Error::InvalidConfigParameter(format!(
                            "timeout: expected a number of seconds, got `{value}`"
                        ))
                    })?;
                    fill(&mut layer.timeout_secs, secs);
                }
                _ => {}
            }
        }

        Ok(layer)
    }

    /// Loads and parses a config file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFileUnreadable`] if the file exists but cannot be read, or any
    /// error from [`SettingsLayer::parse`].
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!("loading directory settings from {}", path.display());
                Self::parse(&contents).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::ConfigFileUnreadable(format!(
                "{}: {err}",
                path.display()
            ))),
        }
    }

    /// Fills every unset key from `lower`, leaving keys already set untouched.
    pub fn fill_from(&mut self, lower: Self) {
        fill_opt(&mut self.uri, lower.uri);
        fill_opt(&mut self.bind_dn, lower.bind_dn);
        fill_opt(&mut self.bind_password, lower.bind_password);
        fill_opt(&mut self.search_base, lower.search_base);
        fill_opt(&mut self.tls_verify, lower.tls_verify);
        fill_opt(&mut self.tls_ca_cert, lower.tls_ca_cert);
        fill_opt(&mut self.starttls, lower.starttls);
        fill_opt(&mut self.timeout_secs, lower.timeout_secs);
    }

    /// Sets the server URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = non_empty(uri.into());
        self
    }

    /// Sets the bind identity.
    #[must_use]
    pub fn with_bind_dn(mut self, bind_dn: impl Into<String>) -> Self {
        self.bind_dn = non_empty(bind_dn.into());
        self
    }

    /// Sets the bind password. An empty password leaves the key unset.
    #[must_use]
    pub fn with_bind_password(mut self, password: SecretString) -> Self {
        self.bind_password = (!password.expose_secret().is_empty()).then_some(password);
        self
    }

    /// Sets the default search base.
    #[must_use]
    pub fn with_search_base(mut self, search_base: impl Into<String>) -> Self {
        self.search_base = non_empty(search_base.into());
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = Some(verify);
        self
    }

    /// Sets a custom CA certificate path.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = Some(starttls);
        self
    }

    /// Sets the connection timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    fn clone_layer(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            bind_dn: self.bind_dn.clone(),
            bind_password: self.bind_password.as_ref().map(clone_secret),
            search_base: self.search_base.clone(),
            tls_verify: self.tls_verify,
            tls_ca_cert: self.tls_ca_cert.clone(),
            starttls: self.starttls,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Fully resolved settings, ready to build a directory connection.
#[derive(Debug, Validate)]
pub struct ResolvedSettings {
    /// Directory server URI
    #[validate(url)]
    pub uri: String,
    /// Bind identity and password
    pub credentials: BindCredentials,
    /// Default search base, if any source defined one
    pub search_base: Option<String>,
    /// Whether TLS certificates are verified
    pub tls_verify: bool,
    /// Custom CA certificate path
    pub tls_ca_cert: Option<PathBuf>,
    /// Whether plain connections are upgraded with StartTLS
    pub starttls: bool,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
}

/// The ordered set of configuration sources consulted when a session is established.
#[derive(Debug)]
pub struct ConfigSources {
    overrides: SettingsLayer,
    user_file: Option<PathBuf>,
    system_file: Option<PathBuf>,
}

impl ConfigSources {
    /// Creates sources with the given overrides and the default file locations.
    #[must_use]
    pub fn new(overrides: SettingsLayer) -> Self {
        Self {
            overrides,
            user_file: dirs::home_dir().map(|home| home.join(USER_CONFIG_FILE_NAME)),
            system_file: Some(PathBuf::from(SYSTEM_CONFIG_FILE)),
        }
    }

    /// Creates sources that consult only the given overrides.
    #[must_use]
    pub fn overrides_only(overrides: SettingsLayer) -> Self {
        Self {
            overrides,
            user_file: None,
            system_file: None,
        }
    }

    /// Overrides the user config file location.
    #[must_use]
    pub fn with_user_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_file = Some(path.into());
        self
    }

    /// Overrides the system config file location.
    #[must_use]
    pub fn with_system_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.system_file = Some(path.into());
        self
    }

    /// Returns the overrides layer.
    #[must_use]
    pub const fn overrides(&self) -> &SettingsLayer {
        &self.overrides
    }

    /// Config files consulted, highest priority first.
    pub fn files(&self) -> impl Iterator<Item = &Path> + '_ {
        self.user_file
            .iter()
            .chain(self.system_file.iter())
            .map(PathBuf::as_path)
    }

    /// Drops the bind password held by the overrides layer.
    pub fn forget_password(&mut self) {
        self.overrides.bind_password = None;
    }

    /// Resolves the layers into a complete set of settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFileUnreadable`] when a config file exists but cannot be read,
    /// [`Error::MissingConfigParameter`] when `uri`, `binddn` or `bindpw` is not defined by any
    /// source, and [`Error::InvalidConfigParameter`] for malformed values.
    pub fn resolve(&self) -> Result<ResolvedSettings> {
        let mut merged = self.overrides.clone_layer();
        for path in self.files() {
            if let Some(layer) = SettingsLayer::load(path)? {
                merged.fill_from(layer);
            }
        }

        let uri = merged.uri.ok_or_else(|| self.missing("uri"))?;
        let bind_dn = merged.bind_dn.ok_or_else(|| self.missing("binddn"))?;
        let bind_password = merged
            .bind_password
            .ok_or_else(|| self.missing("bindpw (bind password)"))?;

        let settings = ResolvedSettings {
            uri,
            credentials: BindCredentials::new(bind_dn, bind_password),
            search_base: merged.search_base,
            tls_verify: merged.tls_verify.unwrap_or(true),
            tls_ca_cert: merged.tls_ca_cert,
            starttls: merged.starttls.unwrap_or(false),
            connection_timeout_secs: merged
                .timeout_secs
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS),
        };
        settings.validate()?;

        let scheme = Url::parse(&settings.uri)?.scheme().to_ascii_lowercase();
        if scheme != "ldap" && scheme != "ldaps" {
            return Err(Error::InvalidConfigParameter(format!(
                "uri: unsupported scheme `{scheme}` in {}",
                settings.uri
            )));
        }

        Ok(settings)
    }

    fn missing(&self, key: &str) -> Error {
        let mut sources: Vec<String> = self
            .files()
            .map(|path| path.display().to_string())
            .collect();
        sources.push("command line".to_string());
        Error::MissingConfigParameter(format!(
            "couldn't read {key} parameter from {}",
            sources.join(", ")
        ))
    }
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self::new(SettingsLayer::default())
    }
}

fn fill<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn fill_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        _ => Err(Error::InvalidConfigParameter(format!(
            "{key}: expected yes or no, got `{value}`"
        ))),
    }
}
