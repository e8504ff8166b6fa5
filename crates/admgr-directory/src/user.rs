//! User and computer account lifecycle.

use crate::client::DirectoryClient;
use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::password::{encode_password, PASSWORD_ATTRIBUTE};
use crate::transport::{DirectoryModification, NewEntryAttributes, RenameRequest};
use admgr_core::{Error, Result};
use secrecy::zeroize::Zeroize;
use secrecy::SecretString;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use tracing::{debug, info, warn};

const ACCOUNT_NAME: &str = "sAMAccountName";
const PRINCIPAL_NAME: &str = "userPrincipalName";
const ACCOUNT_CONTROL: &str = "userAccountControl";

/// The `userAccountControl` bitmask of a user or computer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccountControl(u32);

impl AccountControl {
    /// The account is disabled (locked).
    pub const ACCOUNT_DISABLE: Self = Self(0x0002);
    /// No password is required.
    pub const PASSWD_NOTREQD: Self = Self(0x0020);
    /// Default account type for users.
    pub const NORMAL_ACCOUNT: Self = Self(0x0200);
    /// Computer account for a domain member.
    pub const WORKSTATION_TRUST_ACCOUNT: Self = Self(0x1000);
    /// The password never expires.
    pub const DONT_EXPIRE_PASSWORD: Self = Self(0x0001_0000);

    /// Flags for a freshly created user: disabled, normal, non-expiring (66050).
    pub const NEW_USER: Self = Self(
        Self::ACCOUNT_DISABLE.0 | Self::NORMAL_ACCOUNT.0 | Self::DONT_EXPIRE_PASSWORD.0,
    );
    /// Flags for a freshly created computer (4128).
    pub const NEW_COMPUTER: Self = Self(Self::WORKSTATION_TRUST_ACCOUNT.0 | Self::PASSWD_NOTREQD.0);

    /// Wraps a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `flags` is set.
    #[must_use]
    pub const fn contains(self, flags: Self) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Returns a copy with `flags` set.
    #[must_use]
    pub const fn with(self, flags: Self) -> Self {
        Self(self.0 | flags.0)
    }

    /// Returns a copy with `flags` cleared.
    #[must_use]
    pub const fn without(self, flags: Self) -> Self {
        Self(self.0 & !flags.0)
    }

    /// Returns true if the account is disabled.
    #[must_use]
    pub const fn is_disabled(self) -> bool {
        self.contains(Self::ACCOUNT_DISABLE)
    }

    #[allow(clippy::cast_sign_loss)]
    fn parse(entry: &DistinguishedName, value: &str) -> Result<Self> {
        let trimmed = value.trim();
        // Some servers render the attribute as a signed 32-bit value.
        trimmed
            .parse::<u32>()
            .or_else(|_| trimmed.parse::<i32>().map(|signed| signed as u32))
            .map(Self)
            .map_err(|_| {
                Error::DirectoryOperationFailure(format!(
                    "{ACCOUNT_CONTROL} of {entry} is not a number: {value}"
                ))
            })
    }
}

impl BitOr for AccountControl {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitAnd for AccountControl {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for AccountControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `<account>@<domain>` where the domain comes from the `dc=` components of `location`.
#[must_use]
pub fn principal_name(account: &str, location: &DistinguishedName) -> String {
    format!("{account}@{}", location.domain())
}

fn text(attribute: &str, value: impl Into<String>) -> (String, Vec<String>) {
    (attribute.to_string(), vec![value.into()])
}

impl DirectoryClient {
    /// Creates a disabled user account at `entry`.
    ///
    /// The account name is `username` and the principal name is `username@<domain of entry>`.
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`Error::DirectoryOperationFailure`] if the add is rejected.
    pub fn create_user(&mut self, username: &str, entry: &DistinguishedName) -> Result<()> {
        let attributes: NewEntryAttributes = vec![
            text("objectClass", "user"),
            text(ACCOUNT_NAME, username),
            text(ACCOUNT_CONTROL, AccountControl::NEW_USER.to_string()),
            text(PRINCIPAL_NAME, principal_name(username, entry)),
        ];
        self.add_entry(entry, &attributes)?;
        info!(%entry, username, "created user");
        Ok(())
    }

    /// Creates a computer account at `entry`.
    ///
    /// The account name is the uppercased `name` followed by `$`.
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`Error::DirectoryOperationFailure`] if the add is rejected.
    pub fn create_computer(&mut self, name: &str, entry: &DistinguishedName) -> Result<()> {
        let account = format!("{}$", name.to_uppercase());
        let object_classes = ["top", "person", "organizationalPerson", "user", "computer"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let attributes: NewEntryAttributes = vec![
            ("objectClass".to_string(), object_classes),
            text(ACCOUNT_NAME, account.as_str()),
            text(ACCOUNT_CONTROL, AccountControl::NEW_COMPUTER.to_string()),
        ];
        self.add_entry(entry, &attributes)?;
        info!(%entry, account, "created computer");
        Ok(())
    }

    /// Renames a user: account name, principal name, then the entry's `cn`.
    ///
    /// Returns the new DN. The principal name keeps the user's current domain. Steps are not
    /// atomic; a failure leaves the earlier steps applied and the error names the failing step.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub fn rename_user(
        &mut self,
        entry: &DistinguishedName,
        new_username: &str,
    ) -> Result<DistinguishedName> {
        self.replace_attribute(entry, ACCOUNT_NAME, new_username)
            .map_err(|err| err.with_context(format!("setting {ACCOUNT_NAME} of {entry}")))?;
        self.replace_attribute(entry, PRINCIPAL_NAME, &principal_name(new_username, entry))
            .map_err(|err| err.with_context(format!("setting {PRINCIPAL_NAME} of {entry}")))?;

        let rdn = RelativeDistinguishedName::new("cn", new_username);
        let request = RenameRequest {
            new_rdn: rdn.to_string(),
            new_parent: None,
            delete_old_rdn: true,
        };
        self.rename_entry(entry, &request)
            .map_err(|err| err.with_context(format!("renaming {entry}")))?;

        let renamed = entry.renamed(rdn);
        info!(from = %entry, to = %renamed, "renamed user");
        Ok(renamed)
    }

    /// Moves a user below `container`, updating the principal name to the destination domain
    /// before the entry is moved.
    ///
    /// Returns the new DN.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. A principal name update that succeeded stays
    /// applied when the move itself fails.
    pub fn move_user(
        &mut self,
        entry: &DistinguishedName,
        container: &DistinguishedName,
    ) -> Result<DistinguishedName> {
        let account = self
            .get_attribute(entry, ACCOUNT_NAME)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::AttributeNotFound(format!("no {ACCOUNT_NAME} found for {entry}"))
            })?;

        self.replace_attribute(entry, PRINCIPAL_NAME, &principal_name(&account, container))
            .map_err(|err| err.with_context(format!("setting {PRINCIPAL_NAME} of {entry}")))?;

        let new_rdn = entry
            .leading_rdn()
            .ok_or_else(|| Error::InvalidDn(format!("{entry} has no leading RDN")))?;
        let request = RenameRequest {
            new_rdn: new_rdn.to_string(),
            new_parent: Some(container.to_string()),
            delete_old_rdn: true,
        };
        self.rename_entry(entry, &request)
            .map_err(|err| err.with_context(format!("moving {entry} to {container}")))?;

        let moved = entry.moved_to(container);
        info!(from = %entry, to = %moved, "moved user");
        Ok(moved)
    }

    /// Disables the account. Already disabled accounts are left untouched.
    ///
    /// # Errors
    ///
    /// Returns lookup errors from [`DirectoryClient::get_attribute`] or the write's failure.
    pub fn lock_user(&mut self, entry: &DistinguishedName) -> Result<()> {
        let current = self.account_control(entry)?;
        if current.is_disabled() {
            debug!(%entry, "account already disabled");
            return Ok(());
        }
        self.write_account_control(entry, current.with(AccountControl::ACCOUNT_DISABLE))?;
        info!(%entry, "locked user");
        Ok(())
    }

    /// Enables the account. Accounts that are not disabled are left untouched.
    ///
    /// # Errors
    ///
    /// Returns lookup errors from [`DirectoryClient::get_attribute`] or the write's failure.
    pub fn unlock_user(&mut self, entry: &DistinguishedName) -> Result<()> {
        let current = self.account_control(entry)?;
        if !current.is_disabled() {
            debug!(%entry, "account not disabled");
            return Ok(());
        }
        self.write_account_control(entry, current.without(AccountControl::ACCOUNT_DISABLE))?;
        info!(%entry, "unlocked user");
        Ok(())
    }

    /// Current account-control flags of `entry`.
    ///
    /// # Errors
    ///
    /// Returns lookup errors, or [`Error::DirectoryOperationFailure`] if the stored value is not
    /// a number.
    pub fn account_control(&mut self, entry: &DistinguishedName) -> Result<AccountControl> {
        let values = self.get_attribute(entry, ACCOUNT_CONTROL)?;
        let raw = values.first().ok_or_else(|| {
            Error::AttributeNotFound(format!("no {ACCOUNT_CONTROL} found for {entry}"))
        })?;
        AccountControl::parse(entry, raw)
    }

    fn write_account_control(
        &mut self,
        entry: &DistinguishedName,
        flags: AccountControl,
    ) -> Result<()> {
        self.replace_attribute(entry, ACCOUNT_CONTROL, &flags.to_string())
    }

    /// Sets the user's password.
    ///
    /// Active Directory only accepts password writes over an encrypted connection; on a plain
    /// session a warning is logged and the server's verdict is returned. The encoded password is
    /// wiped after the write.
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`Error::DirectoryOperationFailure`] if the server rejects the
    /// password (policy, insecure transport, ...).
    pub fn set_password(&mut self, entry: &DistinguishedName, password: &SecretString) -> Result<()> {
        if !self.session()?.is_secure() {
            warn!(%entry, "setting a password over an unencrypted connection; the server will likely refuse it");
        }

        let mut modification = DirectoryModification::Replace {
            attribute: PASSWORD_ATTRIBUTE.to_string(),
            values: vec![encode_password(password)],
        };
        let result = self
            .transport()
            .and_then(|transport| transport.modify(entry.as_str(), std::slice::from_ref(&modification)));
        for value in modification.values_mut() {
            value.zeroize();
        }
        result?;

        info!(%entry, "password set");
        Ok(())
    }
}
