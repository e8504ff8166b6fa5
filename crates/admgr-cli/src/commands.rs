//! Maps command line operations onto the directory client.

use crate::cli::Command;
use crate::output::Report;
use admgr_core::Error;
use admgr_directory::{DirectoryClient, DistinguishedName};
use anyhow::{bail, Context};
use dialoguer::Password;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Runs one operation.
///
/// # Errors
///
/// Returns the directory error of the failing step, with a short description of what was being
/// attempted.
pub fn execute(client: &mut DirectoryClient, command: Command) -> anyhow::Result<Report> {
    match command {
        Command::UserCreate {
            username,
            container,
        } => {
            let entry = parse_dn(&container)?.child("cn", &username);
            client
                .create_user(&username, &entry)
                .with_context(|| format!("can't create user {entry}"))?;
        }
        Command::UserDelete { username } => {
            let entry = find(client, "name", &username)?;
            client
                .delete_object(&entry)
                .with_context(|| format!("user {entry} could not be deleted"))?;
        }
        Command::UserLock { username } => {
            let entry = find(client, "name", &username)?;
            client.lock_user(&entry)?;
        }
        Command::UserUnlock { username } => {
            let entry = find(client, "name", &username)?;
            client.unlock_user(&entry)?;
        }
        Command::SetPass { user, password } => {
            let password = match password {
                Some(password) => SecretString::from(password),
                None => prompt_new_password()?,
            };
            let entry = find(client, "name", &user)?;
            client.set_password(&entry, &password).context(
                "the server refused the password; check the password policy and that the \
                 connection is encrypted (ldaps:// or --starttls)",
            )?;
        }
        Command::UserMove { user, container } => {
            let container = parse_dn(&container)?;
            let entry = find(client, "name", &user)?;
            client.move_user(&entry, &container)?;
        }
        Command::UserRename {
            old_username,
            new_username,
        } => {
            let entry = find(client, "name", &old_username)?;
            client.rename_user(&entry, &new_username)?;
        }
        Command::ComputerCreate { name, container } => {
            let entry = parse_dn(&container)?.child("cn", &name);
            client
                .create_computer(&name, &entry)
                .with_context(|| format!("can't create computer {entry}"))?;
        }
        Command::GroupCreate { group, container } => {
            let entry = parse_dn(&container)?.child("cn", &group);
            client.create_group(&group, &entry)?;
        }
        Command::GroupDelete { group } => {
            let entry = find(client, "name", &group)?;
            client
                .delete_object(&entry)
                .with_context(|| format!("group {entry} could not be deleted"))?;
        }
        Command::GroupAddUser { group, user } => {
            let group = find(client, "cn", &group)?;
            let user = find(client, "name", &user)?;
            client
                .group_add_user(&group, &user)
                .with_context(|| format!("error adding user {user} to group {group}"))?;
        }
        Command::GroupRemoveUser { group, user } => {
            let group = find(client, "name", &group)?;
            let user = find(client, "name", &user)?;
            client
                .group_remove_user(&group, &user)
                .with_context(|| format!("error removing user {user} from group {group}"))?;
        }
        Command::GroupSubtreeRemove { container, user } => {
            let container = parse_dn(&container)?;
            let user = find(client, "name", &user)?;
            let groups = client
                .group_subtree_remove_user(&container, &user)
                .with_context(|| format!("error removing user {user} from subtree {container}"))?;
            return Ok(Report::Removed { groups });
        }
        Command::OuCreate { ou, container } => {
            let entry = parse_dn(&container)?.child("ou", &ou);
            client.create_ou(&ou, &entry)?;
        }
        Command::OuDelete { ou } => {
            let entry = find(client, "ou", &ou)?;
            client
                .delete_object(&entry)
                .with_context(|| format!("ou {entry} could not be deleted"))?;
        }
        Command::AttributeGet { object, attribute } => {
            let entry = find(client, "name", &object)?;
            let values = client.get_attribute(&entry, &attribute)?;
            return Ok(Report::Values { values });
        }
        Command::AttributeAdd {
            object,
            attribute,
            value,
        } => {
            let entry = find(client, "name", &object)?;
            client
                .add_attribute(&entry, &attribute, &value)
                .context("error in attribute add")?;
        }
        Command::AttributeAddBinary {
            object,
            attribute,
            file,
        } => {
            let entry = find(client, "name", &object)?;
            let data = read_value_file(&file)?;
            client
                .add_attribute_binary(&entry, &attribute, &data)
                .context("error in attribute add")?;
        }
        Command::AttributeReplace {
            object,
            attribute,
            value,
        } => {
            let entry = find(client, "name", &object)?;
            client
                .replace_attribute(&entry, &attribute, &value)
                .context("error in attribute replace")?;
        }
        Command::AttributeDelete {
            object,
            attribute,
            value,
        } => {
            let entry = find(client, "name", &object)?;
            client
                .delete_attribute(&entry, &attribute, value.as_deref())
                .context("error in attribute delete")?;
        }
        Command::Search { attribute, value } => {
            let result = client.search(&attribute, &value)?;
            return Ok(Report::Entries { result });
        }
        Command::List { dn } => {
            let result = client.list(&parse_dn(&dn)?)?;
            return Ok(Report::Entries { result });
        }
    }
    Ok(Report::Done)
}

fn parse_dn(value: &str) -> Result<DistinguishedName, Error> {
    Ok(DistinguishedName::parse(value)?)
}

/// Resolves a short name to a DN with `(attribute=value)` below the search base.
///
/// The first match wins; more matches are logged.
fn find(
    client: &mut DirectoryClient,
    attribute: &str,
    value: &str,
) -> Result<DistinguishedName, Error> {
    let mut matches = client.search(attribute, value)?.into_dns().into_iter();
    let first = matches.next().ok_or_else(|| {
        Error::ObjectNotFound(format!("no object found with {attribute}={value}"))
    })?;
    let extra = matches.count();
    if extra > 0 {
        warn!(attribute, value, using = %first, extra, "name matches more than one object");
    }
    parse_dn(&first)
}

/// Reads an attribute value from a file, byte for byte.
fn read_value_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("couldn't open file {}", path.display()))
}

fn prompt_new_password() -> anyhow::Result<SecretString> {
    let first = Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")?;
    let second = Password::new()
        .with_prompt("Re-enter password")
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")?;
    confirm_password(first, second)
}

fn confirm_password(first: String, second: String) -> anyhow::Result<SecretString> {
    let first = SecretString::from(first);
    let second = SecretString::from(second);
    if first.expose_secret() != second.expose_secret() {
        bail!("passwords don't match");
    }
    Ok(first)
}
