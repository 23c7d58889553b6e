//! Helpers for the `system:serviceaccount:<namespace>:<name>` username form.

use crate::validate::validate_name;

/// Username prefix shared by all service accounts.
pub const USERNAME_PREFIX: &str = "system:serviceaccount:";

/// Build the username for a service account.
pub fn make_username(namespace: &str, name: &str) -> String {
    format!("{USERNAME_PREFIX}{namespace}:{name}")
}

/// Split a service-account username into (namespace, name).
/// Returns `None` for usernames that are not well-formed service accounts.
pub fn split_username(username: &str) -> Option<(&str, &str)> {
    let rest = username.strip_prefix(USERNAME_PREFIX)?;
    let (namespace, name) = rest.split_once(':')?;
    if name.contains(':') {
        return None;
    }
    if validate_name(namespace).is_err() || validate_name(name).is_err() {
        return None;
    }
    Some((namespace, name))
}
