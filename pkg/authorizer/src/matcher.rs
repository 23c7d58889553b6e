//! Predicates deciding whether a single rule or subject list matches a
//! request. Wildcard `"*"` matches any value; non-resource URL patterns may
//! end in `*` to match a path prefix.

use pkg_types::attributes::AttributesRecord;
use pkg_types::audit::UserInfo;
use pkg_types::rbac::{PolicyRule, Subject, SubjectKind};
use pkg_types::serviceaccount;

/// True if any subject in the list covers the user, by username, group
/// membership, or service-account identity.
pub fn subjects_match(subjects: &[Subject], user: &UserInfo) -> bool {
    subjects.iter().any(|s| subject_matches(s, user))
}

fn subject_matches(subject: &Subject, user: &UserInfo) -> bool {
    match subject.kind {
        SubjectKind::User => subject.name == user.username,
        SubjectKind::Group => user.groups.iter().any(|g| *g == subject.name),
        SubjectKind::ServiceAccount => {
            user.username == serviceaccount::make_username(&subject.namespace, &subject.name)
        }
    }
}

/// True if the rule grants the request. Resource requests check verb, API
/// group, resource, and resource name; non-resource requests check verb and
/// URL pattern.
pub fn rule_allows(rule: &PolicyRule, attrs: &AttributesRecord) -> bool {
    if attrs.resource_request {
        verb_matches(rule, &attrs.verb)
            && api_group_matches(rule, &attrs.api_group)
            && resource_matches(rule, &attrs.combined_resource(), &attrs.subresource)
            && resource_name_matches(rule, &attrs.name)
    } else {
        verb_matches(rule, &attrs.verb) && non_resource_url_matches(rule, &attrs.path)
    }
}

fn has(values: &[String], target: &str) -> bool {
    values.iter().any(|v| v == target)
}

fn verb_matches(rule: &PolicyRule, verb: &str) -> bool {
    has(&rule.verbs, "*") || has(&rule.verbs, verb)
}

fn api_group_matches(rule: &PolicyRule, group: &str) -> bool {
    has(&rule.api_groups, "*") || has(&rule.api_groups, group)
}

fn resource_matches(rule: &PolicyRule, combined_resource: &str, subresource: &str) -> bool {
    if has(&rule.resources, "*") || has(&rule.resources, combined_resource) {
        return true;
    }
    // "*/status" grants the subresource on every resource type
    !subresource.is_empty() && has(&rule.resources, &format!("*/{subresource}"))
}

fn resource_name_matches(rule: &PolicyRule, name: &str) -> bool {
    rule.resource_names.is_empty() || has(&rule.resource_names, name)
}

fn non_resource_url_matches(rule: &PolicyRule, path: &str) -> bool {
    rule.non_resource_urls.iter().any(|url| {
        url == "*"
            || url == path
            || (url.ends_with('*') && path.starts_with(url.trim_end_matches('*')))
    })
}
