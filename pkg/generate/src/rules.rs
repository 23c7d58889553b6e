use pkg_types::attributes::AttributesRecord;
use pkg_types::audit::UserInfo;
use pkg_types::rbac::{PolicyRule, Subject};
use pkg_types::serviceaccount;

use crate::GenerateOptions;

/// Map an authenticated identity onto the subject that goes into a binding.
/// Usernames in the `system:serviceaccount:<ns>:<name>` form become
/// ServiceAccount subjects; everything else is a User. Group membership is
/// consulted during authorization checks but never lands in a binding.
pub fn user_to_subject(user: &UserInfo) -> Subject {
    if let Some((namespace, name)) = serviceaccount::split_username(&user.username) {
        Subject::service_account(namespace, name)
    } else {
        Subject::user(&user.username)
    }
}

/// Build the single rule granting a resource request, applying the
/// configured verb expansion. A named request restricts the rule to that
/// name; a subresource becomes a "resource/subresource" entry.
pub fn attributes_to_resource_rule(
    attrs: &AttributesRecord,
    options: &GenerateOptions,
) -> PolicyRule {
    let mut verbs = vec![attrs.verb.clone()];
    if let Some(expansion) = options.verb_expansions.get(&attrs.verb) {
        verbs.extend(expansion.iter().cloned());
    }

    let mut rule = PolicyRule {
        verbs,
        api_groups: vec![attrs.api_group.clone()],
        resources: vec![attrs.combined_resource()],
        ..Default::default()
    };
    if !attrs.name.is_empty() {
        rule.resource_names = vec![attrs.name.clone()];
    }
    rule
}
