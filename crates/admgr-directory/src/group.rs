//! Groups, organizational units and group membership.

use crate::client::DirectoryClient;
use crate::dn::DistinguishedName;
use crate::transport::{escape_filter_value, NewEntryAttributes, SearchScope};
use admgr_core::Result;
use tracing::{debug, info};

const MEMBER: &str = "member";

impl DirectoryClient {
    /// Creates a group at `entry` named `name`.
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`admgr_core::Error::DirectoryOperationFailure`] if the add is
    /// rejected.
    pub fn create_group(&mut self, name: &str, entry: &DistinguishedName) -> Result<()> {
        let attributes: NewEntryAttributes = vec![
            ("objectClass".to_string(), vec!["group".to_string()]),
            ("name".to_string(), vec![name.to_string()]),
            ("sAMAccountName".to_string(), vec![name.to_string()]),
        ];
        self.add_entry(entry, &attributes)?;
        info!(%entry, name, "created group");
        Ok(())
    }

    /// Creates an organizational unit at `entry` named `name`.
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`admgr_core::Error::DirectoryOperationFailure`] if the add is
    /// rejected.
    pub fn create_ou(&mut self, name: &str, entry: &DistinguishedName) -> Result<()> {
        let attributes: NewEntryAttributes = vec![
            (
                "objectClass".to_string(),
                vec!["organizationalUnit".to_string()],
            ),
            ("name".to_string(), vec![name.to_string()]),
        ];
        self.add_entry(entry, &attributes)?;
        info!(%entry, name, "created organizational unit");
        Ok(())
    }

    /// Adds `user` to the members of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`admgr_core::Error::DirectoryOperationFailure`] if the user is already a member
    /// or the group does not exist.
    pub fn group_add_user(
        &mut self,
        group: &DistinguishedName,
        user: &DistinguishedName,
    ) -> Result<()> {
        self.add_attribute(group, MEMBER, user.as_str())
    }

    /// Removes `user` from the members of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`admgr_core::Error::DirectoryOperationFailure`] if the user is not a member.
    pub fn group_remove_user(
        &mut self,
        group: &DistinguishedName,
        user: &DistinguishedName,
    ) -> Result<()> {
        self.delete_attribute(group, MEMBER, Some(user.as_str()))
    }

    /// Removes `user` from every group below `container` that lists it as a member.
    ///
    /// Returns the DNs of the groups the user was removed from. Removals run in search order and
    /// stop at the first failure; groups handled before it stay changed and the error names the
    /// group that failed.
    ///
    /// # Errors
    ///
    /// Returns the search's failure or the first removal failure.
    pub fn group_subtree_remove_user(
        &mut self,
        container: &DistinguishedName,
        user: &DistinguishedName,
    ) -> Result<Vec<String>> {
        let filter = format!(
            "(&(objectclass=group)({MEMBER}={}))",
            escape_filter_value(user.as_str(), false)
        );
        let groups = self.transport()?.search(
            container.as_str(),
            SearchScope::Subtree,
            &filter,
            &["1.1".to_string()],
        )?;
        debug!(%container, %user, count = groups.len(), "groups with membership");

        let mut removed = Vec::with_capacity(groups.len());
        for group in groups {
            let group_dn = DistinguishedName::parse(&group.dn)?;
            self.group_remove_user(&group_dn, user).map_err(|err| {
                err.with_context(format!("removing {user} from group {group_dn}"))
            })?;
            info!(group = %group_dn, %user, "removed group membership");
            removed.push(group.dn);
        }
        Ok(removed)
    }
}
