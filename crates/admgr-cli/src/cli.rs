//! Command line argument parsing.

use admgr_core::SettingsLayer;
use clap::{ArgAction, Parser, Subcommand};
use secrecy::SecretString;
use std::convert::Infallible;
use std::path::PathBuf;

/// Manage Active Directory users, groups and organizational units.
///
/// Connection options may also come from ~/.admgr.cfg or /etc/admgr.cfg; options given on the
/// command line take precedence.
#[derive(Debug, Parser)]
#[command(name = "admgr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server URI, e.g. ldaps://ad1.example.com
    #[arg(short = 'H', long = "uri", global = true, value_name = "URI")]
    pub uri: Option<String>,

    /// DN to bind to the server with
    #[arg(short = 'D', long = "binddn", global = true, value_name = "DN")]
    pub bind_dn: Option<String>,

    /// Password to bind to the server with
    #[arg(
        short = 'w',
        long = "bindpw",
        global = true,
        value_name = "PASSWORD",
        value_parser = parse_secret
    )]
    pub bind_password: Option<SecretString>,

    /// Base DN for operations that search
    #[arg(short = 'b', long = "searchbase", global = true, value_name = "DN")]
    pub search_base: Option<String>,

    /// Upgrade plain ldap:// connections with StartTLS
    #[arg(long, global = true)]
    pub starttls: bool,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub no_tls_verify: bool,

    /// CA certificate (PEM) used to verify the server
    #[arg(long, global = true, value_name = "FILE")]
    pub ca_cert: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Print results and errors as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Settings given on the command line, the highest-priority configuration layer.
    ///
    /// The bind password moves into the layer; `self` no longer holds it afterwards.
    pub fn overrides(&mut self) -> SettingsLayer {
        let mut layer = SettingsLayer::new();
        if let Some(uri) = &self.uri {
            layer = layer.with_uri(uri.as_str());
        }
        if let Some(bind_dn) = &self.bind_dn {
            layer = layer.with_bind_dn(bind_dn.as_str());
        }
        if let Some(password) = self.bind_password.take() {
            layer = layer.with_bind_password(password);
        }
        if let Some(base) = &self.search_base {
            layer = layer.with_search_base(base.as_str());
        }
        if self.starttls {
            layer = layer.with_starttls(true);
        }
        if self.no_tls_verify {
            layer = layer.with_tls_verify(false);
        }
        if let Some(path) = &self.ca_cert {
            layer = layer.with_tls_ca_cert(path.clone());
        }
        if let Some(seconds) = self.timeout {
            layer = layer.with_timeout_secs(seconds);
        }
        layer
    }

    /// Default log filter for the requested verbosity.
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

fn parse_secret(value: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::from(value))
}

/// Directory operations.
#[derive(Debug, Subcommand)]
#[command(rename_all = "lower")]
pub enum Command {
    /// Create a new user
    #[command(alias = "useradd")]
    UserCreate {
        /// Account name
        username: String,
        /// DN of the container
        container: String,
    },

    /// Delete a user
    UserDelete {
        /// Name of the user
        username: String,
    },

    /// Disable a user account
    UserLock {
        /// Name of the user
        username: String,
    },

    /// Enable a user account
    UserUnlock {
        /// Name of the user
        username: String,
    },

    /// Set a user's password (prompts when omitted)
    SetPass {
        /// Name of the user
        user: String,
        /// New password
        password: Option<String>,
    },

    /// Move a user to another container
    UserMove {
        /// Name of the user
        user: String,
        /// DN of the new container
        container: String,
    },

    /// Rename a user
    UserRename {
        /// Current name
        old_username: String,
        /// New name
        new_username: String,
    },

    /// Create a computer account
    ComputerCreate {
        /// Computer name
        name: String,
        /// DN of the container
        container: String,
    },

    /// Create a new group
    #[command(alias = "groupadd")]
    GroupCreate {
        /// Group name
        group: String,
        /// DN of the container
        container: String,
    },

    /// Delete a group
    GroupDelete {
        /// Group name
        group: String,
    },

    /// Add a user to a group
    GroupAddUser {
        /// Group name
        group: String,
        /// Name of the user
        user: String,
    },

    /// Remove a user from a group
    GroupRemoveUser {
        /// Group name
        group: String,
        /// Name of the user
        user: String,
    },

    /// Remove a user from all groups below a container
    GroupSubtreeRemove {
        /// DN of the container
        container: String,
        /// Name of the user
        user: String,
    },

    /// Create a new organizational unit
    OuCreate {
        /// Organizational unit name
        ou: String,
        /// DN of the container
        container: String,
    },

    /// Delete an organizational unit
    OuDelete {
        /// Organizational unit name
        ou: String,
    },

    /// Display attribute values
    AttributeGet {
        /// Name of the object
        object: String,
        /// Attribute name
        attribute: String,
    },

    /// Add an attribute value
    AttributeAdd {
        /// Name of the object
        object: String,
        /// Attribute name
        attribute: String,
        /// Value to add
        value: String,
    },

    /// Add an attribute value read from a file
    AttributeAddBinary {
        /// Name of the object
        object: String,
        /// Attribute name
        attribute: String,
        /// File holding the value
        file: PathBuf,
    },

    /// Replace an attribute's values
    AttributeReplace {
        /// Name of the object
        object: String,
        /// Attribute name
        attribute: String,
        /// New value
        value: String,
    },

    /// Delete an attribute, or one of its values
    AttributeDelete {
        /// Name of the object
        object: String,
        /// Attribute name
        attribute: String,
        /// Value to delete (all values when omitted)
        value: Option<String>,
    },

    /// Simple directory search
    Search {
        /// Attribute to match
        attribute: String,
        /// Value to match (`*` wildcards allowed)
        value: String,
    },

    /// List the entries directly below a DN
    List {
        /// DN of the container
        dn: String,
    },
}
