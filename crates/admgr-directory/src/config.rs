//! Configuration types for directory connections.

use crate::dn::DistinguishedName;
use admgr_core::config::{ResolvedSettings, DEFAULT_CONNECTION_TIMEOUT_SECS};
use admgr_core::{BindCredentials, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Configuration for connecting to a directory server.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    url: String,
    credentials: BindCredentials,
    search_base: Option<DistinguishedName>,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    starttls: bool,
    connection_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a new directory configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn new(url: impl Into<String>, credentials: BindCredentials) -> Result<Self> {
        let url_string = url.into();
        Url::parse(&url_string)?;

        Ok(Self {
            url: url_string,
            credentials,
            search_base: None,
            tls_verify: true,
            tls_ca_cert: None,
            starttls: false,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
        })
    }

    /// Builds a configuration from resolved layered settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the search base is not a valid DN.
    pub fn from_settings(settings: ResolvedSettings) -> Result<Self> {
        let mut config = Self::new(settings.uri, settings.credentials)?
            .with_tls_verification(settings.tls_verify)
            .with_starttls(settings.starttls)
            .with_connection_timeout_secs(settings.connection_timeout_secs);

        if let Some(base) = settings.search_base {
            config = config.with_search_base(DistinguishedName::parse(base)?);
        }
        if let Some(path) = settings.tls_ca_cert {
            config = config.with_tls_ca_cert(path);
        }

        Ok(config)
    }

    /// Returns the directory server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the default search base, if configured.
    #[must_use]
    pub const fn search_base(&self) -> Option<&DistinguishedName> {
        self.search_base.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns whether plain connections are upgraded with StartTLS.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Returns true if traffic to the server is encrypted (`ldaps://` or StartTLS).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.starttls
            || Url::parse(&self.url)
                .map(|url| url.scheme().eq_ignore_ascii_case("ldaps"))
                .unwrap_or(false)
    }

    /// Sets the default search base.
    #[must_use]
    pub fn with_search_base(mut self, dn: DistinguishedName) -> Self {
        self.search_base = Some(dn);
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Enables or disables StartTLS on plain connections.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }
}
